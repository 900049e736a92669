//! Linux implementations of the [`hw_trait`](crate::hw_trait) interfaces.
//!
//! All three talk to sysfs. Paths are rooted at a caller-supplied
//! directory (normally `/sys/class`) so they can be pointed at a scratch
//! tree in tests.

pub mod sysfs_gpio;
pub mod sysfs_pwm;
pub mod thermal_zone;

pub use sysfs_gpio::SysfsEdgeInput;
pub use sysfs_pwm::SysfsPwm;
pub use thermal_zone::ThermalZone;

use std::fs;
use std::path::Path;

use crate::hw_trait::Result;

/// Write a sysfs attribute.
pub(crate) fn write_attr(path: &Path, value: impl ToString) -> Result<()> {
    fs::write(path, value.to_string())?;
    Ok(())
}

/// Read a sysfs attribute with surrounding whitespace removed.
pub(crate) fn read_attr(path: &Path) -> Result<String> {
    Ok(fs::read_to_string(path)?.trim().to_string())
}
