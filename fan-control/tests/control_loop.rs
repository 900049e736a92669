//! End-to-end runs of the daemon's control loops against mock hardware
//! and a scratch sysfs tree, under paused tokio time.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use fan_control::config::{Config, Thresholds};
use fan_control::curve::Profile;
use fan_control::daemon;
use fan_control::hw::{SysfsPwm, ThermalZone};
use fan_control::hw_trait::{
    Edge, EdgeCallback, EdgeSource, EdgeSubscription, HwError, PwmOutput, Result,
    TemperatureSource,
};

#[derive(Debug, Clone, PartialEq)]
enum PwmCall {
    Frequency(u32),
    Duty(f32),
    Disable,
}

/// Reports whatever temperature the test last set; `None` fails the read.
#[derive(Clone)]
struct SharedSensor(Arc<Mutex<Option<f32>>>);

impl SharedSensor {
    fn new(temp_c: f32) -> Self {
        Self(Arc::new(Mutex::new(Some(temp_c))))
    }

    fn set(&self, temp_c: Option<f32>) {
        *self.0.lock() = temp_c;
    }
}

impl TemperatureSource for SharedSensor {
    fn read_celsius(&mut self) -> Result<f32> {
        (*self.0.lock()).ok_or_else(|| HwError::Io(io::Error::from(io::ErrorKind::NotFound)))
    }
}

#[derive(Clone, Default)]
struct RecordingPwm {
    calls: Arc<Mutex<Vec<PwmCall>>>,
    reject_frequency: bool,
}

impl RecordingPwm {
    fn calls(&self) -> Vec<PwmCall> {
        self.calls.lock().clone()
    }
}

impl PwmOutput for RecordingPwm {
    fn set_frequency(&mut self, hz: u32) -> Result<()> {
        if self.reject_frequency {
            return Err(HwError::InvalidParameter(format!("{hz} Hz")));
        }
        self.calls.lock().push(PwmCall::Frequency(hz));
        Ok(())
    }

    fn set_duty(&mut self, fraction: f32) -> Result<()> {
        self.calls.lock().push(PwmCall::Duty(fraction));
        Ok(())
    }

    fn disable(&mut self) -> Result<()> {
        self.calls.lock().push(PwmCall::Disable);
        Ok(())
    }
}

/// Hands the subscribed callback back to the test so it can fire edges.
#[derive(Clone, Default)]
struct MockEdges {
    callback: Arc<Mutex<Option<EdgeCallback>>>,
    edge: Arc<Mutex<Option<Edge>>>,
    stopped: Arc<AtomicBool>,
    unavailable: bool,
}

impl MockEdges {
    fn pulse(&self, times: usize) {
        let callback = self.callback.lock().clone().expect("subscribed");
        for _ in 0..times {
            callback();
        }
    }
}

struct MockSubscription(Arc<AtomicBool>);

impl EdgeSubscription for MockSubscription {
    fn stop(self: Box<Self>) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl EdgeSource for MockEdges {
    fn subscribe(
        &mut self,
        edge: Edge,
        callback: EdgeCallback,
    ) -> Result<Box<dyn EdgeSubscription>> {
        if self.unavailable {
            return Err(HwError::Unsupported("no edge detection".into()));
        }
        *self.edge.lock() = Some(edge);
        *self.callback.lock() = Some(callback);
        Ok(Box::new(MockSubscription(Arc::clone(&self.stopped))))
    }
}

fn config() -> Arc<Config> {
    Arc::new(Config {
        thresholds: Thresholds {
            off_temp_c: 40.0,
            min_temp_c: 45.0,
            max_temp_c: 70.0,
        },
        tick_interval: Duration::from_secs(1),
        ..Config::default()
    })
}

#[tokio::test(start_paused = true)]
async fn duty_follows_temperature_and_fan_stops_on_shutdown() {
    let sensor = SharedSensor::new(57.5);
    let pwm = RecordingPwm::default();

    let running = daemon::start(
        config(),
        Profile::Linear,
        sensor.clone(),
        pwm.clone(),
        None::<MockEdges>,
    )
    .unwrap();
    assert!(!running.is_measuring_speed());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(pwm.calls(), vec![PwmCall::Frequency(100), PwmCall::Duty(0.5)]);

    sensor.set(Some(30.0));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(pwm.calls().last(), Some(&PwmCall::Disable));

    sensor.set(Some(80.0));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(pwm.calls().last(), Some(&PwmCall::Duty(1.0)));

    running.shutdown().await;
    assert_eq!(
        pwm.calls(),
        vec![
            PwmCall::Frequency(100),
            PwmCall::Duty(0.5),
            PwmCall::Disable,
            PwmCall::Duty(1.0),
            PwmCall::Disable,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn sensor_outage_holds_last_duty() {
    let sensor = SharedSensor::new(70.0);
    let pwm = RecordingPwm::default();
    let running = daemon::start(
        config(),
        Profile::EaseOut,
        sensor.clone(),
        pwm.clone(),
        None::<MockEdges>,
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    sensor.set(None);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(pwm.calls(), vec![PwmCall::Frequency(100), PwmCall::Duty(1.0)]);

    // Bottom of the band shapes to zero, which switches the output off.
    sensor.set(Some(45.0));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(pwm.calls().last(), Some(&PwmCall::Disable));

    running.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn rejected_frequency_is_not_fatal() {
    let pwm = RecordingPwm {
        reject_frequency: true,
        ..RecordingPwm::default()
    };
    let running = daemon::start(
        config(),
        Profile::Linear,
        SharedSensor::new(57.5),
        pwm.clone(),
        None::<MockEdges>,
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(pwm.calls(), vec![PwmCall::Duty(0.5)]);

    running.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn tachometer_pulses_become_published_rpm() {
    let edges = MockEdges::default();
    let running = daemon::start(
        config(),
        Profile::Linear,
        SharedSensor::new(30.0),
        RecordingPwm::default(),
        Some(edges.clone()),
    )
    .unwrap();

    assert!(running.is_measuring_speed());
    assert_eq!(*edges.edge.lock(), Some(Edge::Rising));

    let mut speed = running.fan_speed().expect("tachometer running");
    assert_eq!(*speed.borrow(), None);

    // 40 pulses at 2 per revolution over one second.
    edges.pulse(40);
    speed.changed().await.unwrap();
    let first = speed.borrow_and_update().expect("speed published");
    assert_eq!(first.pulses, 40);
    assert_eq!(first.interval, Duration::from_secs(1));
    assert!((first.rpm - 1200.0).abs() < 1e-3);

    // A stalled fan reads zero rather than the previous value.
    speed.changed().await.unwrap();
    let second = speed.borrow_and_update().expect("speed published");
    assert_eq!(second.pulses, 0);
    assert_eq!(second.rpm, 0.0);

    running.shutdown().await;
    assert!(edges.stopped.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn duty_loop_runs_without_tachometer() {
    let edges = MockEdges {
        unavailable: true,
        ..MockEdges::default()
    };
    let pwm = RecordingPwm::default();
    let running = daemon::start(
        config(),
        Profile::Linear,
        SharedSensor::new(57.5),
        pwm.clone(),
        Some(edges),
    )
    .unwrap();

    assert!(!running.is_measuring_speed());
    assert!(running.fan_speed().is_none());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(pwm.calls().last(), Some(&PwmCall::Duty(0.5)));

    running.shutdown().await;
}

fn scratch_sysfs() -> PathBuf {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let root = std::env::temp_dir().join(format!(
        "fan-control-e2e-{}-{}",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    ));
    fs::create_dir_all(root.join("pwm/pwmchip0/pwm0")).unwrap();
    fs::create_dir_all(root.join("thermal/thermal_zone0")).unwrap();
    root
}

fn read_attr(root: &std::path::Path, attr: &str) -> String {
    fs::read_to_string(root.join("pwm/pwmchip0/pwm0").join(attr))
        .unwrap()
        .trim()
        .to_string()
}

#[tokio::test(start_paused = true)]
async fn drives_sysfs_pwm_from_thermal_zone() {
    let root = scratch_sysfs();
    let temp_path = root.join("thermal/thermal_zone0/temp");
    fs::write(&temp_path, "57500\n").unwrap();

    let mut config = Config {
        sysfs_root: root.clone(),
        thermal_zone_path: temp_path.clone(),
        ..Config::default()
    };
    config.tach.enabled = false;
    let config = Arc::new(config);

    let pwm = SysfsPwm::open(&config.sysfs_root, &config.pwm).unwrap();
    let zone = ThermalZone::new(config.thermal_zone_path.clone());
    let running =
        daemon::start(Arc::clone(&config), Profile::Linear, zone, pwm, None::<MockEdges>).unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(read_attr(&root, "period"), "10000000");
    assert_eq!(read_attr(&root, "duty_cycle"), "5000000");
    assert_eq!(read_attr(&root, "enable"), "1");

    fs::write(&temp_path, "35000\n").unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(read_attr(&root, "duty_cycle"), "0");
    assert_eq!(read_attr(&root, "enable"), "0");

    fs::write(&temp_path, "70000\n").unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(read_attr(&root, "duty_cycle"), "10000000");

    running.shutdown().await;
    assert_eq!(read_attr(&root, "duty_cycle"), "0");
    assert_eq!(read_attr(&root, "enable"), "0");
}
