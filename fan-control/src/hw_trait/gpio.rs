use std::str::FromStr;
use std::sync::Arc;

use strum::{Display, EnumString};

use super::Result;

/// Signal transition that triggers an edge callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

impl Edge {
    /// Parse a configuration value, ignoring surrounding whitespace.
    pub fn parse(value: &str) -> Option<Self> {
        Self::from_str(value.trim()).ok()
    }
}

/// Invoked once per detected edge, from the edge source's own thread.
pub type EdgeCallback = Arc<dyn Fn() + Send + Sync>;

/// Keeps an edge subscription alive. Dropping it stops delivery.
pub trait EdgeSubscription: Send {
    /// Stop delivering callbacks and wait for the delivery context to end.
    fn stop(self: Box<Self>);
}

/// An input line that reports signal edges asynchronously.
pub trait EdgeSource {
    /// Register `callback` for every `edge` transition on the line.
    ///
    /// Each physical edge yields exactly one invocation; ordering across
    /// invocations is not guaranteed.
    fn subscribe(&mut self, edge: Edge, callback: EdgeCallback)
    -> Result<Box<dyn EdgeSubscription>>;
}
