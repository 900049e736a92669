//! Temperature-driven duty control.
//!
//! Once per tick the controller reads the CPU temperature, maps it through
//! the configured curve, and either switches the PWM output off or drives
//! it at the computed fraction.

use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::curve::{self, Profile};
use crate::error::Error;
use crate::hw_trait::{PwmOutput, TemperatureSource};
use crate::tracing::prelude::*;
use crate::types::{FaultLatch, FaultStatus};

/// Duty fraction for `temperature`, in `[0.0, 1.0]`.
///
/// Zero at or below `off_temp` and anywhere below `min_temp`; otherwise
/// the shaped position of `temperature` within `[min_temp, max_temp]`.
pub fn compute_duty(
    temperature: f32,
    off_temp: f32,
    min_temp: f32,
    max_temp: f32,
    profile: Profile,
) -> f32 {
    if temperature <= off_temp {
        return 0.0;
    }
    if temperature < min_temp {
        return 0.0;
    }
    let progress = curve::normalize(temperature, min_temp, max_temp);
    curve::clamp(curve::shape(progress, profile))
}

/// What the controller last applied to the PWM output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DutyCommand {
    Off,
    On(f32),
}

impl DutyCommand {
    pub fn from_duty(duty: f32) -> Self {
        if duty <= 0.0 {
            DutyCommand::Off
        } else {
            DutyCommand::On(duty)
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, DutyCommand::On(_))
    }
}

pub struct DutyController<S, P> {
    config: Arc<Config>,
    profile: Profile,
    source: S,
    pwm: P,
    last_command: Option<DutyCommand>,
    sensor_fault: FaultLatch,
    write_fault: FaultLatch,
}

impl<S, P> DutyController<S, P>
where
    S: TemperatureSource,
    P: PwmOutput,
{
    pub fn new(config: Arc<Config>, profile: Profile, source: S, pwm: P) -> Self {
        Self {
            config,
            profile,
            source,
            pwm,
            last_command: None,
            sensor_fault: FaultLatch::new(),
            write_fault: FaultLatch::new(),
        }
    }

    pub async fn run(mut self, cancellation: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            profile = %self.profile,
            period_ms = self.config.tick_interval.as_millis() as u64,
            "Duty controller started"
        );

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    break;
                }
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }

        self.shutdown();
    }

    /// Last command successfully written to the output.
    pub fn last_command(&self) -> Option<DutyCommand> {
        self.last_command
    }

    /// Run one control step. Returns the command applied, or `None` when
    /// the temperature could not be read or the write failed.
    pub fn tick(&mut self) -> Option<DutyCommand> {
        let temperature = match self.source.read_celsius() {
            Ok(temp) => {
                if let FaultStatus::Cleared { failures } = self.sensor_fault.ok() {
                    info!(failed_ticks = failures, "Temperature sensor recovered");
                }
                temp
            }
            Err(e) => {
                let e = Error::SensorRead(e);
                match self.sensor_fault.fail() {
                    FaultStatus::Raised => {
                        warn!(error = %e, "Temperature read failed; leaving fan output unchanged")
                    }
                    FaultStatus::Repeated { count } => {
                        debug!(error = %e, failed_ticks = count, "Temperature read still failing")
                    }
                    _ => {}
                }
                return None;
            }
        };

        let t = &self.config.thresholds;
        let duty = compute_duty(
            temperature,
            t.off_temp_c,
            t.min_temp_c,
            t.max_temp_c,
            self.profile,
        );
        let command = DutyCommand::from_duty(duty);

        debug!(temp_c = %temperature, duty = %duty, profile = %self.profile, "Duty control tick");

        let result = match command {
            DutyCommand::Off => self.pwm.disable(),
            DutyCommand::On(fraction) => self.pwm.set_duty(fraction),
        };

        if let Err(e) = result.map_err(Error::HardwareWrite) {
            match self.write_fault.fail() {
                FaultStatus::Raised => warn!(error = %e, command = ?command, "PWM write failed"),
                FaultStatus::Repeated { count } => {
                    debug!(error = %e, failed_ticks = count, "PWM write still failing")
                }
                _ => {}
            }
            return None;
        }
        if let FaultStatus::Cleared { failures } = self.write_fault.ok() {
            info!(failed_ticks = failures, "PWM writes recovered");
        }

        let was_on = self.last_command.map(|c| c.is_on());
        if was_on != Some(command.is_on()) {
            info!(
                temp_c = %temperature,
                duty = %duty,
                fan_on = command.is_on(),
                "Fan output switched"
            );
        }

        self.last_command = Some(command);
        Some(command)
    }

    /// Switch the output off on the way out.
    fn shutdown(&mut self) {
        match self.pwm.disable() {
            Ok(()) => info!("Duty controller stopped; fan output disabled"),
            Err(e) => warn!(error = %e, "Failed to disable fan output on shutdown"),
        }
        self.last_command = Some(DutyCommand::Off);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Thresholds;
    use crate::hw_trait::{HwError, Result};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::io;
    use std::time::Duration;
    use strum::IntoEnumIterator;
    use test_case::test_case;

    const OFF: f32 = 40.0;
    const MIN: f32 = 45.0;
    const MAX: f32 = 70.0;

    #[derive(Debug, Clone, PartialEq)]
    enum PwmCall {
        Duty(f32),
        Disable,
    }

    struct ScriptedSensor {
        readings: VecDeque<Option<f32>>,
    }

    impl ScriptedSensor {
        fn new(readings: &[Option<f32>]) -> Self {
            Self {
                readings: readings.iter().copied().collect(),
            }
        }
    }

    impl TemperatureSource for ScriptedSensor {
        fn read_celsius(&mut self) -> Result<f32> {
            match self.readings.pop_front().flatten() {
                Some(temp) => Ok(temp),
                None => Err(HwError::Io(io::Error::from(io::ErrorKind::NotFound))),
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingPwm {
        calls: Arc<Mutex<Vec<PwmCall>>>,
        fail_writes: Arc<Mutex<bool>>,
    }

    impl PwmOutput for RecordingPwm {
        fn set_frequency(&mut self, _hz: u32) -> Result<()> {
            Ok(())
        }

        fn set_duty(&mut self, fraction: f32) -> Result<()> {
            if *self.fail_writes.lock() {
                return Err(HwError::Unsupported("write".into()));
            }
            self.calls.lock().push(PwmCall::Duty(fraction));
            Ok(())
        }

        fn disable(&mut self) -> Result<()> {
            if *self.fail_writes.lock() {
                return Err(HwError::Unsupported("disable".into()));
            }
            self.calls.lock().push(PwmCall::Disable);
            Ok(())
        }
    }

    fn controller(
        readings: &[Option<f32>],
        profile: Profile,
    ) -> (DutyController<ScriptedSensor, RecordingPwm>, RecordingPwm) {
        let config = Config {
            thresholds: Thresholds {
                off_temp_c: OFF,
                min_temp_c: MIN,
                max_temp_c: MAX,
            },
            tick_interval: Duration::from_millis(100),
            ..Config::default()
        };
        let pwm = RecordingPwm::default();
        let controller = DutyController::new(
            Arc::new(config),
            profile,
            ScriptedSensor::new(readings),
            pwm.clone(),
        );
        (controller, pwm)
    }

    #[test_case(20.0; "well_below_off")]
    #[test_case(40.0; "at_off")]
    fn duty_is_zero_at_or_below_off(temp: f32) {
        assert_eq!(compute_duty(temp, OFF, MIN, MAX, Profile::EaseOut), 0.0);
    }

    #[test_case(40.01; "just_above_off")]
    #[test_case(42.5; "mid_band")]
    #[test_case(44.99; "just_below_min")]
    fn duty_is_zero_inside_hysteresis_band(temp: f32) {
        assert_eq!(compute_duty(temp, OFF, MIN, MAX, Profile::EaseOut), 0.0);
    }

    #[test_case(70.0; "at_max")]
    #[test_case(95.0; "above_max")]
    fn duty_is_full_at_or_above_max(temp: f32) {
        assert_eq!(compute_duty(temp, OFF, MIN, MAX, Profile::Linear), 1.0);
    }

    #[test]
    fn linear_midpoint_gives_half_duty() {
        assert!((compute_duty(57.5, OFF, MIN, MAX, Profile::Linear) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn profile_shapes_active_band() {
        let linear = compute_duty(50.0, OFF, MIN, MAX, Profile::Linear);
        let ease_in = compute_duty(50.0, OFF, MIN, MAX, Profile::EaseIn);
        let ease_out = compute_duty(50.0, OFF, MIN, MAX, Profile::EaseOut);
        assert!(ease_in < linear && linear < ease_out);
    }

    #[test_case(f32::NAN, OFF, MIN, MAX; "nan_temperature")]
    #[test_case(57.5, OFF, MIN, f32::NAN; "nan_max")]
    #[test_case(57.5, f32::NAN, f32::NAN, f32::NAN; "nan_thresholds")]
    fn duty_is_zero_for_nan_inputs(temp: f32, off: f32, min: f32, max: f32) {
        for profile in Profile::iter() {
            assert_eq!(compute_duty(temp, off, min, max, profile), 0.0, "{profile}");
        }
    }

    #[test]
    fn nan_reading_switches_output_off() {
        let (mut controller, pwm) = controller(&[Some(f32::NAN)], Profile::Linear);

        assert_eq!(controller.tick(), Some(DutyCommand::Off));
        assert_eq!(*pwm.calls.lock(), vec![PwmCall::Disable]);
    }

    #[test]
    fn degenerate_band_switches_at_max() {
        assert_eq!(compute_duty(59.0, 40.0, 60.0, 60.0, Profile::Linear), 0.0);
        assert_eq!(compute_duty(60.0, 40.0, 60.0, 60.0, Profile::Linear), 1.0);
    }

    #[test]
    fn off_above_min_keeps_fan_off_until_off_threshold() {
        // Empty hysteresis band: the off check wins below 50, the curve
        // applies above it.
        assert_eq!(compute_duty(48.0, 50.0, 45.0, 70.0, Profile::Linear), 0.0);
        assert!((compute_duty(57.5, 50.0, 45.0, 70.0, Profile::Linear) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn tick_disables_output_when_cold() {
        let (mut controller, pwm) = controller(&[Some(30.0)], Profile::Linear);

        assert_eq!(controller.tick(), Some(DutyCommand::Off));
        assert_eq!(*pwm.calls.lock(), vec![PwmCall::Disable]);
    }

    #[test]
    fn tick_writes_duty_when_warm() {
        let (mut controller, pwm) = controller(&[Some(57.5)], Profile::Linear);

        assert_eq!(controller.tick(), Some(DutyCommand::On(0.5)));
        assert_eq!(*pwm.calls.lock(), vec![PwmCall::Duty(0.5)]);
    }

    #[test]
    fn tick_leaves_output_untouched_on_sensor_failure() {
        let readings = [Some(70.0), None, None, Some(30.0)];
        let (mut controller, pwm) = controller(&readings, Profile::Linear);

        assert_eq!(controller.tick(), Some(DutyCommand::On(1.0)));
        assert_eq!(controller.tick(), None);
        assert_eq!(controller.tick(), None);
        assert_eq!(controller.last_command(), Some(DutyCommand::On(1.0)));
        assert_eq!(controller.tick(), Some(DutyCommand::Off));

        assert_eq!(*pwm.calls.lock(), vec![PwmCall::Duty(1.0), PwmCall::Disable]);
    }

    #[test]
    fn tick_survives_pwm_write_failure() {
        let (mut controller, pwm) = controller(&[Some(60.0), Some(60.0)], Profile::Linear);

        *pwm.fail_writes.lock() = true;
        assert_eq!(controller.tick(), None);
        assert_eq!(controller.last_command(), None);

        *pwm.fail_writes.lock() = false;
        assert!(matches!(controller.tick(), Some(DutyCommand::On(_))));
        assert_eq!(pwm.calls.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_ticks_until_cancelled_then_disables() {
        let readings = vec![Some(57.5); 16];
        let (controller, pwm) = controller(&readings, Profile::Linear);
        let cancellation = CancellationToken::new();

        let handle = tokio::spawn(controller.run(cancellation.clone()));

        // First tick fires immediately, then every 100 ms.
        tokio::time::sleep(Duration::from_millis(250)).await;
        cancellation.cancel();
        handle.await.unwrap();

        let calls = pwm.calls.lock().clone();
        assert_eq!(
            calls,
            vec![
                PwmCall::Duty(0.5),
                PwmCall::Duty(0.5),
                PwmCall::Duty(0.5),
                PwmCall::Disable
            ]
        );
    }
}
