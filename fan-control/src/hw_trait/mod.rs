//! Traits for the hardware the control loops talk to.
//!
//! The loops only ever see these traits. Linux implementations live in
//! [`crate::hw`]; tests substitute recording mocks.

pub mod gpio;
pub mod pwm;
pub mod thermal;

pub use gpio::{Edge, EdgeCallback, EdgeSource, EdgeSubscription};
pub use pwm::PwmOutput;
pub use thermal::TemperatureSource;

/// Errors reported by hardware collaborators.
#[derive(Debug, thiserror::Error)]
pub enum HwError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, HwError>;
