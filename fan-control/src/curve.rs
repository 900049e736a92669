//! Temperature-to-duty shaping curves.
//!
//! A reading is first normalized into `[0, 1]` against the active band
//! `[min_temp, max_temp]`, then bent by a [`Profile`] to bias the fan
//! toward quiet (ease-in) or aggressive (ease-out) response.

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Shape applied to normalized temperature progress.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Profile {
    /// Duty proportional to progress.
    #[default]
    Linear,
    /// Cubic. Stays quiet through most of the band, ramps hard at the top.
    EaseIn,
    /// Inverted cubic. Responds quickly, flattens out near full speed.
    EaseOut,
    /// Ease-in below the midpoint, ease-out above it.
    EaseInOut,
}

/// Map `temperature` onto `[0, 1]` across `[min_temp, max_temp]`.
///
/// When `max_temp <= min_temp` the band is empty and the result is a
/// step at `max_temp`.
pub fn normalize(temperature: f32, min_temp: f32, max_temp: f32) -> f32 {
    if max_temp <= min_temp {
        return if temperature >= max_temp { 1.0 } else { 0.0 };
    }
    if temperature <= min_temp {
        return 0.0;
    }
    if temperature >= max_temp {
        return 1.0;
    }
    (temperature - min_temp) / (max_temp - min_temp)
}

/// Apply `profile` to `progress`. Maps `[0, 1]` onto `[0, 1]`.
pub fn shape(progress: f32, profile: Profile) -> f32 {
    match profile {
        Profile::Linear => linear(progress),
        Profile::EaseIn => ease_in(progress),
        Profile::EaseOut => ease_out(progress),
        Profile::EaseInOut => ease_in_out(progress),
    }
}

/// Clamp to the valid duty range. `NaN` maps to 0.
pub fn clamp(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

fn linear(progress: f32) -> f32 {
    progress
}

fn ease_in(progress: f32) -> f32 {
    progress * progress * progress
}

fn ease_out(progress: f32) -> f32 {
    let p = progress - 1.0;
    p * p * p + 1.0
}

fn ease_in_out(progress: f32) -> f32 {
    if progress < 0.5 {
        0.5 * ease_in(2.0 * progress)
    } else {
        0.5 * ease_out(2.0 * progress - 1.0) + 0.5
    }
}
