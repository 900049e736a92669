pub mod fault_latch;

pub use fault_latch::{FaultLatch, FaultStatus};
