use super::Result;

/// A PWM output driving the fan's control line.
///
/// Implementations must treat [`disable`](Self::disable) as a real
/// de-energize of the output, not a write of duty zero: some fan
/// controllers cannot hold a near-zero duty and keep spinning.
pub trait PwmOutput: Send {
    /// Change the carrier frequency.
    fn set_frequency(&mut self, hz: u32) -> Result<()>;

    /// Drive the output at `fraction` of each period, in `[0.0, 1.0]`.
    fn set_duty(&mut self, fraction: f32) -> Result<()>;

    /// Switch the output off.
    fn disable(&mut self) -> Result<()>;
}
