//! Event sources: raw filesystem events and wall-clock samples.

mod event_source;
mod wall_clock;

#[cfg(feature = "file-watch")]
mod notify_source;

pub use event_source::{EventSource, Op, RawEvent, Subscription};
pub use wall_clock::{ManualClock, SystemClock, WallClock};

#[cfg(feature = "file-watch")]
pub use notify_source::NotifySource;
