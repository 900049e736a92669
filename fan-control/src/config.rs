//! Daemon configuration.
//!
//! Built once at startup, then shared read-only by both control loops.
//! Defaults suit a Noctua-style 4-pin fan on a Raspberry Pi; every field
//! can be overridden through a `FAN_CONTROL_*` environment variable.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::hw_trait::Edge;
use crate::tracing::prelude::*;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "thresholds out of order: off {off_c}°C, min {min_c}°C, max {max_c}°C \
         (expected off <= min < max)"
    )]
    ThresholdOrder { off_c: f32, min_c: f32, max_c: f32 },

    #[error("thresholds must be finite: off {off_c}°C, min {min_c}°C, max {max_c}°C")]
    NonFinite { off_c: f32, min_c: f32, max_c: f32 },

    #[error("{var}: cannot parse '{value}'")]
    InvalidValue { var: &'static str, value: String },
}

/// Temperature thresholds for the duty curve, in °C.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// At or below this the fan is switched off.
    pub off_temp_c: f32,

    /// Start of the active band. Between `off_temp_c` and here the fan
    /// stays off, which keeps it from chattering around the off point.
    pub min_temp_c: f32,

    /// Full speed at or above this.
    pub max_temp_c: f32,
}

impl Thresholds {
    /// Check that every threshold is finite and ordered `off <= min < max`.
    ///
    /// An ordering violation is not fatal: `max <= min` degrades the curve
    /// to a step at `max`, and `off > min` empties the hysteresis band.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let all = [self.off_temp_c, self.min_temp_c, self.max_temp_c];
        if !all.iter().all(|t| t.is_finite()) {
            return Err(ConfigError::NonFinite {
                off_c: self.off_temp_c,
                min_c: self.min_temp_c,
                max_c: self.max_temp_c,
            });
        }
        if self.max_temp_c <= self.min_temp_c || self.off_temp_c > self.min_temp_c {
            return Err(ConfigError::ThresholdOrder {
                off_c: self.off_temp_c,
                min_c: self.min_temp_c,
                max_c: self.max_temp_c,
            });
        }
        Ok(())
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            off_temp_c: 40.0,
            min_temp_c: 45.0,
            max_temp_c: 70.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PwmConfig {
    /// Directory name under `/sys/class/pwm`.
    pub chip: String,

    /// Channel index within the chip. Channel 0 of `pwmchip0` is BCM 12
    /// on a Raspberry Pi with the `pwm` overlay.
    pub channel: u32,

    /// Carrier frequency. Noctua specifies 25 kHz, but common Pi PWM
    /// backends top out at 10 kHz and the fan then clamps to a higher
    /// minimum speed; 100 Hz keeps low-RPM control at the cost of some
    /// stutter at very low duty.
    pub frequency_hz: u32,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            chip: "pwmchip0".to_string(),
            channel: 0,
            frequency_hz: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TachConfig {
    pub enabled: bool,

    /// Sysfs GPIO number of the tachometer line (BCM numbering on a Pi).
    pub gpio: u32,

    pub edge: Edge,

    /// Tachometer pulses per fan revolution. Two for most PC fans.
    pub pulses_per_revolution: u32,

    /// Ignore edges arriving sooner than this after the previous counted
    /// edge. `None` counts every edge.
    pub debounce: Option<Duration>,
}

impl Default for TachConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gpio: 13,
            edge: Edge::Rising,
            pulses_per_revolution: 2,
            debounce: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub thresholds: Thresholds,

    /// Period of both control loops.
    pub tick_interval: Duration,

    /// Sysfs file holding the CPU temperature in millidegrees.
    pub thermal_zone_path: PathBuf,

    /// One-line file naming the shaping profile.
    pub profile_path: PathBuf,

    /// Root of the sysfs tree the PWM and GPIO adapters operate under.
    pub sysfs_root: PathBuf,

    pub pwm: PwmConfig,
    pub tach: TachConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            tick_interval: Duration::from_secs(1),
            thermal_zone_path: PathBuf::from("/sys/class/thermal/thermal_zone0/temp"),
            profile_path: PathBuf::from("/etc/fan-control/profile"),
            sysfs_root: PathBuf::from("/sys/class"),
            pwm: PwmConfig::default(),
            tach: TachConfig::default(),
        }
    }
}

impl Config {
    /// Defaults overridden by `FAN_CONTROL_*` environment variables.
    ///
    /// Unparsable values are logged and the default kept.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable
    /// source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        let mut overrides = Overrides { lookup };

        let t = &mut config.thresholds;
        overrides.apply("FAN_CONTROL_OFF_TEMP", &mut t.off_temp_c, parse_celsius);
        overrides.apply("FAN_CONTROL_MIN_TEMP", &mut t.min_temp_c, parse_celsius);
        overrides.apply("FAN_CONTROL_MAX_TEMP", &mut t.max_temp_c, parse_celsius);

        let mut tick_ms = config.tick_interval.as_millis() as u64;
        overrides.parse("FAN_CONTROL_TICK_MS", &mut tick_ms);
        if tick_ms == 0 {
            warn!("FAN_CONTROL_TICK_MS must be positive; keeping default");
        } else {
            config.tick_interval = Duration::from_millis(tick_ms);
        }

        overrides.parse("FAN_CONTROL_THERMAL_ZONE", &mut config.thermal_zone_path);
        overrides.parse("FAN_CONTROL_PROFILE_PATH", &mut config.profile_path);
        overrides.parse("FAN_CONTROL_SYSFS_ROOT", &mut config.sysfs_root);

        overrides.parse("FAN_CONTROL_PWM_CHIP", &mut config.pwm.chip);
        overrides.parse("FAN_CONTROL_PWM_CHANNEL", &mut config.pwm.channel);
        overrides.parse("FAN_CONTROL_PWM_FREQ_HZ", &mut config.pwm.frequency_hz);

        overrides.apply("FAN_CONTROL_TACH", &mut config.tach.enabled, parse_switch);
        overrides.parse("FAN_CONTROL_TACH_GPIO", &mut config.tach.gpio);
        overrides.apply("FAN_CONTROL_TACH_EDGE", &mut config.tach.edge, Edge::parse);
        overrides.parse(
            "FAN_CONTROL_PULSES_PER_REV",
            &mut config.tach.pulses_per_revolution,
        );

        let mut debounce_ms = config
            .tach
            .debounce
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        overrides.parse("FAN_CONTROL_TACH_DEBOUNCE_MS", &mut debounce_ms);
        config.tach.debounce = (debounce_ms > 0).then(|| Duration::from_millis(debounce_ms));

        config
    }
}

struct Overrides<F> {
    lookup: F,
}

impl<F> Overrides<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn parse<T: FromStr>(&mut self, var: &'static str, slot: &mut T) {
        self.apply(var, slot, |raw| raw.trim().parse().ok());
    }

    fn apply<T>(&mut self, var: &'static str, slot: &mut T, parse: impl Fn(&str) -> Option<T>) {
        let Some(raw) = (self.lookup)(var) else {
            return;
        };
        match parse(&raw) {
            Some(value) => *slot = value,
            None => {
                let err = ConfigError::InvalidValue { var, value: raw };
                warn!(error = %err, "Ignoring configuration override");
            }
        }
    }
}

/// A temperature in °C. `NaN` and infinities parse as `f32` but are
/// rejected.
fn parse_celsius(raw: &str) -> Option<f32> {
    raw.trim().parse::<f32>().ok().filter(|t| t.is_finite())
}

fn parse_switch(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
