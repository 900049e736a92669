//! Fan speed from tachometer pulses.
//!
//! The tachometer line pulses a fixed number of times per revolution. An
//! edge callback running on the GPIO source's own thread bumps a
//! [`PulseAccumulator`]; once per tick the [`RpmReducer`] drains it and
//! turns the count and the elapsed interval into RPM.
//!
//! Two ways of counting exist in the field: every edge counts, or edges
//! closer together than a minimum interval are dropped as noise. The
//! accumulator does the former unless built with a debounce interval.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::hw_trait::EdgeCallback;
use crate::tracing::prelude::*;

/// RPM for `pulse_count` pulses seen over `interval_seconds`.
///
/// Returns 0.0 rather than infinity or NaN when the interval is not
/// positive or `pulses_per_revolution` is zero.
pub fn estimate_rpm(pulse_count: u64, interval_seconds: f32, pulses_per_revolution: u32) -> f32 {
    if interval_seconds <= 0.0 || pulses_per_revolution == 0 {
        return 0.0;
    }
    (pulse_count as f32 / pulses_per_revolution as f32) * (60.0 / interval_seconds)
}

#[derive(Debug, Default)]
struct PulseState {
    count: u64,
    last_edge: Option<std::time::Instant>,
}

/// Pulse counter shared between the edge callback and the reducer.
///
/// All access goes through one lock that is never held across anything
/// but the counter update.
#[derive(Debug)]
pub struct PulseAccumulator {
    state: Mutex<PulseState>,
    debounce: Option<Duration>,
}

impl PulseAccumulator {
    /// Counts every edge.
    pub fn new() -> Self {
        Self::with_debounce(None)
    }

    /// Drops edges arriving less than `debounce` after the previous
    /// counted edge. `None` counts every edge.
    pub fn with_debounce(debounce: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(PulseState::default()),
            debounce,
        }
    }

    pub fn debounce(&self) -> Option<Duration> {
        self.debounce
    }

    /// Record one tachometer edge.
    pub fn record_pulse(&self) {
        self.record_pulse_at(std::time::Instant::now());
    }

    /// Record an edge observed at `at`. Returns whether it was counted.
    pub fn record_pulse_at(&self, at: std::time::Instant) -> bool {
        let mut state = self.state.lock();

        if let (Some(min_gap), Some(last)) = (self.debounce, state.last_edge) {
            if at.saturating_duration_since(last) < min_gap {
                return false;
            }
        }

        state.count += 1;
        state.last_edge = Some(at);
        true
    }

    /// Take the count accumulated since the previous drain.
    ///
    /// The last-edge time survives so debouncing spans drain boundaries.
    pub fn drain(&self) -> u64 {
        std::mem::take(&mut self.state.lock().count)
    }

    /// Callback suitable for [`EdgeSource::subscribe`](crate::hw_trait::EdgeSource::subscribe).
    pub fn edge_callback(self: &Arc<Self>) -> EdgeCallback {
        let accumulator = Arc::clone(self);
        Arc::new(move || accumulator.record_pulse())
    }
}

impl Default for PulseAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// One RPM estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FanSpeed {
    pub rpm: f32,
    pub pulses: u64,
    pub interval: Duration,
}

pub struct RpmReducer {
    accumulator: Arc<PulseAccumulator>,
    pulses_per_revolution: u32,
    period: Duration,
    last_drain: Instant,
    speed_tx: watch::Sender<Option<FanSpeed>>,
}

impl RpmReducer {
    /// Start a measurement window now. Pulses recorded before this point
    /// are discarded.
    pub fn new(
        accumulator: Arc<PulseAccumulator>,
        pulses_per_revolution: u32,
        period: Duration,
        speed_tx: watch::Sender<Option<FanSpeed>>,
    ) -> Self {
        accumulator.drain();
        Self {
            accumulator,
            pulses_per_revolution,
            period,
            last_drain: Instant::now(),
            speed_tx,
        }
    }

    pub async fn run(mut self, cancellation: CancellationToken) {
        // First estimate after a full period, not immediately.
        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            pulses_per_revolution = self.pulses_per_revolution,
            debounce_ms = ?self.accumulator.debounce().map(|d| d.as_millis()),
            "RPM reducer started"
        );

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    break;
                }
                now = interval.tick() => {
                    self.tick_at(now);
                }
            }
        }

        debug!("RPM reducer stopped");
    }

    /// Close the window ending at `now` and publish its estimate.
    pub fn tick_at(&mut self, now: Instant) -> FanSpeed {
        let interval = now.saturating_duration_since(self.last_drain);
        self.last_drain = now;

        let pulses = self.accumulator.drain();
        let rpm = estimate_rpm(pulses, interval.as_secs_f32(), self.pulses_per_revolution);
        let speed = FanSpeed {
            rpm,
            pulses,
            interval,
        };

        info!(
            rpm = rpm.round() as u32,
            pulses,
            interval_ms = interval.as_millis() as u64,
            "Fan speed"
        );

        self.speed_tx.send_replace(Some(speed));
        speed
    }
}
