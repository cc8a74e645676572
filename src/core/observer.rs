//! Observer capabilities invoked by the watch registries.

use crate::core::ChangeKind;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Receives classified filesystem changes for a watched path.
///
/// An error return is logged by the watcher; it never stops delivery of
/// later events.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    /// Handle one change.
    async fn notify(&self, kind: ChangeKind, path: &Path) -> Result<()>;
}

/// Receives a timestamp each time the wall clock is found to have jumped.
#[async_trait]
pub trait TimeNotifier: Send + Sync {
    /// Handle one detected clock change.
    async fn notify(&self, at: DateTime<Utc>) -> Result<()>;
}

/// A configuration value that can be rebuilt from the bytes of one file.
///
/// # Transactional apply
///
/// `apply` must leave the consumer untouched when it returns an error:
/// parse into a temporary first, then swap it in.
///
/// # Examples
///
/// ```rust
/// use hotswap_watch::core::ConfigConsumer;
/// use hotswap_watch::error::{Result, WatchError};
/// use parking_lot::RwLock;
///
/// struct Banner {
///     text: RwLock<String>,
/// }
///
/// impl ConfigConsumer for Banner {
///     fn name(&self) -> &str {
///         "banner.txt"
///     }
///
///     fn apply(&self, bytes: &[u8]) -> Result<()> {
///         let text = std::str::from_utf8(bytes)
///             .map_err(|e| WatchError::ParseError(e.to_string()))?;
///         *self.text.write() = text.trim().to_string();
///         Ok(())
///     }
/// }
/// ```
pub trait ConfigConsumer: Send + Sync {
    /// File name (not path) this consumer is loaded from.
    fn name(&self) -> &str;

    /// Replace the current value with one parsed from `bytes`.
    fn apply(&self, bytes: &[u8]) -> Result<()>;
}
