//! Background Tasks Module
//!
//! The cache refresh scheduler and the state it publishes.

mod scheduler;
mod state;

pub use scheduler::{CacheScheduler, SchedulerConfig, SchedulerDeps, SchedulerHandle, TickReport};
pub use state::{SchedulerPhase, SchedulerState, SchedulerStatus};
