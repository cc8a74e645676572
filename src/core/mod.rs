//! Core types: change events, observer traits and the watch registry.

mod event;
mod observer;
mod registry;

#[cfg(feature = "validation")]
mod validation;

pub use event::{ChangeEvent, ChangeKind};
pub use observer::{ChangeNotifier, ConfigConsumer, TimeNotifier};
pub use registry::NotifierRegistry;
pub(crate) use registry::run_queue;

#[cfg(feature = "validation")]
pub use validation::Validate;
