//! Startup, task wiring, and shutdown for `fan-controld`.
//!
//! The duty loop and the RPM loop share nothing but the read-only
//! configuration. Each runs as its own task until the cancellation token
//! fires; tachometer edges arrive on the edge source's thread.

use std::sync::Arc;

use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::Config;
use crate::curve::Profile;
use crate::duty::DutyController;
use crate::error::{Error, Result};
use crate::hw::{SysfsEdgeInput, SysfsPwm, ThermalZone};
use crate::hw_trait::{EdgeSource, EdgeSubscription, PwmOutput, TemperatureSource};
use crate::profile::resolve_profile;
use crate::tach::{FanSpeed, PulseAccumulator, RpmReducer};
use crate::tracing::prelude::*;

/// A started daemon. Call [`shutdown`](Self::shutdown) to stop it.
pub struct RunningDaemon {
    cancellation: CancellationToken,
    tracker: TaskTracker,
    subscription: Option<Box<dyn EdgeSubscription>>,
    speed_rx: Option<watch::Receiver<Option<FanSpeed>>>,
}

impl RunningDaemon {
    /// Latest fan speed, when the tachometer loop is running.
    pub fn fan_speed(&self) -> Option<watch::Receiver<Option<FanSpeed>>> {
        self.speed_rx.clone()
    }

    pub fn is_measuring_speed(&self) -> bool {
        self.speed_rx.is_some()
    }

    /// Stop both loops and the edge thread, waiting for each to finish.
    pub async fn shutdown(self) {
        self.cancellation.cancel();
        self.tracker.wait().await;
        if let Some(subscription) = self.subscription {
            subscription.stop();
        }
        info!("Fan control stopped");
    }
}

/// Open the Linux hardware described by `config`, run until SIGTERM or
/// SIGINT, then shut down.
///
/// The signal handlers go in before any hardware is touched, so a
/// signal arriving during startup still ends in an orderly shutdown.
pub async fn run(config: Config) -> Result<()> {
    let mut signals = ShutdownSignals::install()
        .map_err(|e| Error::Other(format!("cannot install signal handlers: {e}")))?;

    let config = Arc::new(config);
    info!(?config, "Starting fan control");

    let profile = resolve_profile(&config.profile_path);

    let pwm = SysfsPwm::open(&config.sysfs_root, &config.pwm).map_err(Error::HardwareWrite)?;
    let source = ThermalZone::new(config.thermal_zone_path.clone());

    let edges = if config.tach.enabled {
        match SysfsEdgeInput::open(&config.sysfs_root, config.tach.gpio) {
            Ok(input) => Some(input),
            Err(e) => {
                warn!(
                    gpio = config.tach.gpio,
                    error = %e,
                    "Tachometer unavailable; not measuring fan speed"
                );
                None
            }
        }
    } else {
        info!("Tachometer disabled");
        None
    };

    let daemon = start(config, profile, source, pwm, edges)?;

    let signal_name = signals.recv().await;
    info!(signal = signal_name, "Shutdown requested");

    daemon.shutdown().await;
    Ok(())
}

/// Wire up and spawn both control loops on the current runtime.
pub fn start<S, P, E>(
    config: Arc<Config>,
    profile: Profile,
    source: S,
    mut pwm: P,
    edges: Option<E>,
) -> Result<RunningDaemon>
where
    S: TemperatureSource + 'static,
    P: PwmOutput + 'static,
    E: EdgeSource,
{
    if let Err(e) = config.thresholds.validate() {
        warn!(error = %Error::from(e), "Continuing with misordered thresholds");
    }

    if let Err(e) = pwm.set_frequency(config.pwm.frequency_hz) {
        warn!(
            frequency_hz = config.pwm.frequency_hz,
            error = %e,
            "Failed to set PWM frequency; using hardware default"
        );
    }

    let cancellation = CancellationToken::new();
    let tracker = TaskTracker::new();

    let (subscription, speed_rx) = match edges {
        Some(mut edges) => match start_tachometer(&config, &mut edges, &tracker, &cancellation) {
            Ok((subscription, speed_rx)) => (Some(subscription), Some(speed_rx)),
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to subscribe to tachometer edges; not measuring fan speed"
                );
                (None, None)
            }
        },
        None => (None, None),
    };

    let duty = DutyController::new(Arc::clone(&config), profile, source, pwm);
    tracker.spawn(duty.run(cancellation.clone()));
    tracker.close();

    Ok(RunningDaemon {
        cancellation,
        tracker,
        subscription,
        speed_rx,
    })
}

fn start_tachometer<E: EdgeSource>(
    config: &Config,
    edges: &mut E,
    tracker: &TaskTracker,
    cancellation: &CancellationToken,
) -> Result<(Box<dyn EdgeSubscription>, watch::Receiver<Option<FanSpeed>>)> {
    let accumulator = Arc::new(PulseAccumulator::with_debounce(config.tach.debounce));
    let subscription = edges
        .subscribe(config.tach.edge, accumulator.edge_callback())
        .map_err(Error::HardwareWrite)?;

    let (speed_tx, speed_rx) = watch::channel(None);
    let reducer = RpmReducer::new(
        accumulator,
        config.tach.pulses_per_revolution,
        config.tick_interval,
        speed_tx,
    );
    tracker.spawn(reducer.run(cancellation.clone()));

    Ok((subscription, speed_rx))
}

struct ShutdownSignals {
    terminate: Signal,
    interrupt: Signal,
}

impl ShutdownSignals {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    /// Wait for either signal and return its name.
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.interrupt.recv() => "SIGINT",
        }
    }
}
