//! # hotswap-watch
//!
//! Change notification for long-running services: filesystem watches,
//! wall-clock change detection, and hot reload of configuration files.
//!
//! ## Overview
//!
//! `hotswap-watch` provides:
//! - [`FileWatcher`](watch::FileWatcher): per-path watches with canonical
//!   event kinds and automatic resubscription when a path is deleted and
//!   recreated
//! - [`ClockDriftDetector`](watch::ClockDriftDetector): notices when the wall
//!   clock is set manually or jumps after a suspend
//! - [`ConfigReloader`](reload::ConfigReloader): watches directories and
//!   re-applies a file to its consumer whenever it changes
//! - [`ConfigSlot`](reload::ConfigSlot): a lock-free, validated config value
//!   that parses JSON, YAML or TOML
//!
//! Every registration gets its own queue and dispatch task, so a slow or
//! failing observer never holds up the others.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hotswap_watch::prelude::*;
//! use serde::Deserialize;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Deserialize)]
//! struct ServerConfig {
//!     port: u16,
//! }
//!
//! # async fn example() -> hotswap_watch::error::Result<()> {
//! let reloader = ConfigReloader::new();
//!
//! let server = Arc::new(ConfigSlot::new("server.yaml", ServerConfig { port: 8080 }));
//! let consumer: Arc<dyn ConfigConsumer> = server.clone();
//! reloader.register("config", Arc::downgrade(&consumer)).await?;
//!
//! // Lock-free read of whatever config/server.yaml last contained
//! println!("port: {}", server.get().port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `file-watch` (default): native file events through `notify`
//! - `validation` (default): the [`Validate`](core::Validate) trait
//! - `metrics`: OpenTelemetry counters for deliveries, reloads and clock changes

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod reload;
pub mod settings;
pub mod sources;
pub mod watch;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{ChangeKind, ChangeNotifier, ConfigConsumer, TimeNotifier};
    pub use crate::error::{Result, ValidationError, WatchError};
    pub use crate::reload::{ConfigReloader, ConfigSlot, SubscriptionHandle};
    pub use crate::settings::Settings;
    pub use crate::watch::{ClockDriftDetector, FileWatcher, WatchState};

    #[cfg(feature = "validation")]
    pub use crate::core::Validate;
}
