//! Built-in metrics for watch and reload operations.
//!
//! Provides OpenTelemetry metrics tracking:
//! - Events delivered / failed / dropped
//! - Resubscriptions after a watched path vanished
//! - Detected wall-clock changes
//! - Reload success/failures and duration
//! - Active watches
//!
//! # Examples
//!
//! ```rust,no_run
//! use hotswap_watch::metrics::WatchMetrics;
//! use hotswap_watch::watch::FileWatcher;
//! use opentelemetry::global;
//!
//! let watcher = FileWatcher::new();
//! watcher.set_metrics(WatchMetrics::new(global::meter("my-app")));
//! ```

mod watch_metrics;

pub use watch_metrics::WatchMetrics;
