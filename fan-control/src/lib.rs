//! Temperature-driven PWM fan control with tachometer readout.
//!
//! Two independent loops run on a fixed period: [`duty`] maps the CPU
//! temperature through a [`curve`] onto the fan's PWM duty, and [`tach`]
//! turns tachometer pulses into RPM. [`daemon`] wires them to the Linux
//! hardware in [`hw`].

pub mod config;
pub mod curve;
pub mod daemon;
pub mod duty;
pub mod error;
pub mod hw;
pub mod hw_trait;
pub mod profile;
pub mod tach;
pub mod tracing;
pub mod types;
