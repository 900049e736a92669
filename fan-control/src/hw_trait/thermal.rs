use super::Result;

/// A temperature sensor polled once per control tick.
pub trait TemperatureSource: Send {
    /// Current reading in degrees Celsius.
    fn read_celsius(&mut self) -> Result<f32>;
}
