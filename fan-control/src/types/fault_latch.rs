//! Edge reporting for faults that recur every tick.
//!
//! A sensor that has gone away fails on every control tick. Logging each
//! failure at warning level floods the journal, while logging none hides
//! the outage. The latch turns the per-tick stream of outcomes into
//! episodes so callers can log the start and end loudly and the middle
//! quietly.
//!
//! ```text
//!           fail()                      fail()
//!  Healthy ────────► Faulted(1) ───────────────► Faulted(n + 1)
//!     ▲                  │                            │
//!     │      ok()        │           ok()             │
//!     └──────────────────┴────────────────────────────┘
//! ```

/// Outcome of reporting to a [`FaultLatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultStatus {
    /// No fault, none in progress.
    Healthy,

    /// First failure of a new episode.
    Raised,

    /// Another failure in the current episode. `count` includes the
    /// failure that raised it.
    Repeated { count: u32 },

    /// The episode ended after `failures` consecutive failures. Returned
    /// once; the next success is [`Healthy`](FaultStatus::Healthy).
    Cleared { failures: u32 },
}

#[derive(Debug, Default)]
pub struct FaultLatch {
    consecutive: u32,
}

impl FaultLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed attempt.
    pub fn fail(&mut self) -> FaultStatus {
        self.consecutive = self.consecutive.saturating_add(1);
        if self.consecutive == 1 {
            FaultStatus::Raised
        } else {
            FaultStatus::Repeated {
                count: self.consecutive,
            }
        }
    }

    /// Record a successful attempt.
    pub fn ok(&mut self) -> FaultStatus {
        match std::mem::take(&mut self.consecutive) {
            0 => FaultStatus::Healthy,
            failures => FaultStatus::Cleared { failures },
        }
    }

    pub fn is_faulted(&self) -> bool {
        self.consecutive > 0
    }
}
