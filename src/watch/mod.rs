//! Watchers: filesystem paths and the wall clock.
//!
//! Both watchers deliver asynchronously through a per-registration queue and
//! task, so one observer never blocks another.

mod drift;
mod file;

pub use drift::ClockDriftDetector;
pub use file::{FileWatcher, WatchState};
