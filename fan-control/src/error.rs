//! Crate-level error type.

use crate::config::ConfigError;
use crate::hw_trait::HwError;
use crate::profile::OverrideError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The temperature source could not be read.
    #[error("temperature read failed: {0}")]
    SensorRead(#[source] HwError),

    /// A PWM or GPIO operation failed.
    #[error("hardware write failed: {0}")]
    HardwareWrite(#[source] HwError),

    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    #[error("profile override: {0}")]
    OverrideFile(#[from] OverrideError),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
