//! PWM output through the kernel's sysfs PWM interface.
//!
//! ```text
//! <root>/pwm/<chip>/export          write channel number to create pwmN/
//! <root>/pwm/<chip>/pwmN/period     period in ns
//! <root>/pwm/<chip>/pwmN/duty_cycle active time in ns, <= period
//! <root>/pwm/<chip>/pwmN/enable     0 or 1
//! ```

use std::path::{Path, PathBuf};

use super::{read_attr, write_attr};
use crate::config::PwmConfig;
use crate::hw_trait::{HwError, PwmOutput, Result};
use crate::tracing::prelude::*;

const NANOS_PER_SEC: u64 = 1_000_000_000;

pub struct SysfsPwm {
    dir: PathBuf,
    period_ns: u64,
    fraction: f32,
    enabled: bool,
}

impl SysfsPwm {
    /// Export (if needed) and take over the configured channel.
    ///
    /// The output starts disabled.
    pub fn open(sysfs_root: &Path, config: &PwmConfig) -> Result<Self> {
        let chip_dir = sysfs_root.join("pwm").join(&config.chip);
        let dir = chip_dir.join(format!("pwm{}", config.channel));

        if !dir.is_dir() {
            debug!(chip = %config.chip, channel = config.channel, "Exporting PWM channel");
            write_attr(&chip_dir.join("export"), config.channel)?;
            if !dir.is_dir() {
                return Err(HwError::Unsupported(format!(
                    "{} did not appear after export",
                    dir.display()
                )));
            }
        }

        let period_ns = match read_attr(&dir.join("period")) {
            Ok(raw) => raw.parse().unwrap_or(0),
            Err(_) => 0,
        };

        let mut pwm = Self {
            dir,
            period_ns,
            fraction: 0.0,
            enabled: true,
        };
        pwm.disable()?;
        Ok(pwm)
    }

    pub fn period_ns(&self) -> u64 {
        self.period_ns
    }

    fn duty_ns(&self, fraction: f32) -> u64 {
        (self.period_ns as f64 * fraction as f64).round() as u64
    }

    fn attr(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl PwmOutput for SysfsPwm {
    fn set_frequency(&mut self, hz: u32) -> Result<()> {
        if hz == 0 {
            return Err(HwError::InvalidParameter("PWM frequency must be positive".into()));
        }
        let period_ns = NANOS_PER_SEC / u64::from(hz);
        if period_ns == 0 {
            return Err(HwError::InvalidParameter(format!("{hz} Hz is above 1 GHz")));
        }

        // The kernel rejects any state where duty_cycle > period, so
        // shrink whichever one has to move down first.
        let old_duty_ns = if self.enabled {
            self.duty_ns(self.fraction)
        } else {
            0
        };
        let new_duty_ns = (period_ns as f64 * self.fraction as f64).round() as u64;
        let new_duty_ns = if self.enabled { new_duty_ns } else { 0 };

        if period_ns < old_duty_ns {
            write_attr(&self.attr("duty_cycle"), new_duty_ns)?;
            write_attr(&self.attr("period"), period_ns)?;
            self.period_ns = period_ns;
        } else {
            write_attr(&self.attr("period"), period_ns)?;
            self.period_ns = period_ns;
            write_attr(&self.attr("duty_cycle"), new_duty_ns)?;
        }
        Ok(())
    }

    fn set_duty(&mut self, fraction: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(HwError::InvalidParameter(format!(
                "duty fraction {fraction} outside [0, 1]"
            )));
        }
        if self.period_ns == 0 {
            return Err(HwError::InvalidParameter("PWM period not configured".into()));
        }

        write_attr(&self.attr("duty_cycle"), self.duty_ns(fraction))?;
        if !self.enabled {
            write_attr(&self.attr("enable"), 1)?;
            self.enabled = true;
        }
        self.fraction = fraction;
        Ok(())
    }

    fn disable(&mut self) -> Result<()> {
        if self.period_ns > 0 {
            write_attr(&self.attr("duty_cycle"), 0)?;
        }
        write_attr(&self.attr("enable"), 0)?;
        self.enabled = false;
        self.fraction = 0.0;
        Ok(())
    }
}
