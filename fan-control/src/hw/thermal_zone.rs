use std::path::{Path, PathBuf};

use super::read_attr;
use crate::hw_trait::{HwError, Result, TemperatureSource};

/// A kernel thermal zone, e.g. `/sys/class/thermal/thermal_zone0/temp`.
///
/// The file holds the temperature in millidegrees Celsius.
#[derive(Debug, Clone)]
pub struct ThermalZone {
    path: PathBuf,
}

impl ThermalZone {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TemperatureSource for ThermalZone {
    fn read_celsius(&mut self) -> Result<f32> {
        let raw = read_attr(&self.path)?;
        let millidegrees: f32 = raw.parse().map_err(|_| {
            HwError::InvalidParameter(format!(
                "{}: expected millidegrees, got '{}'",
                self.path.display(),
                raw
            ))
        })?;
        if !millidegrees.is_finite() {
            return Err(HwError::InvalidParameter(format!(
                "{}: non-finite temperature '{}'",
                self.path.display(),
                raw
            )));
        }
        Ok(millidegrees / 1000.0)
    }
}
