//! Configuration hot reload: directory watches feeding per-file consumers.

mod reloader;
mod slot;
mod subscriber;

pub use reloader::ConfigReloader;
pub use slot::ConfigSlot;
pub use subscriber::SubscriptionHandle;
