//! A typed, atomically swapped configuration value fed by file contents.

use super::subscriber::{SubscriberRegistry, SubscriptionHandle};
use crate::core::ConfigConsumer;
use crate::error::{Result, ValidationError, WatchError};
use arc_swap::ArcSwap;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Type alias for validator functions.
type Validator<T> = Arc<dyn Fn(&T) -> std::result::Result<(), ValidationError> + Send + Sync>;

/// A configuration value loaded from one file and replaced on every change.
///
/// Reads are lock-free: [`get`](Self::get) returns an `Arc<T>` snapshot that
/// stays valid while newer values are swapped in. [`apply`](ConfigConsumer::apply)
/// parses into a temporary, validates it, and only then swaps, so a bad file
/// never replaces a good value.
///
/// The file format follows the extension of `name`: `.json`, `.yaml`/`.yml`
/// or `.toml`.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_watch::prelude::*;
/// use serde::Deserialize;
/// use std::sync::Arc;
///
/// #[derive(Debug, Deserialize)]
/// struct Limits {
///     max_connections: u32,
/// }
///
/// # async fn example() -> hotswap_watch::error::Result<()> {
/// let limits = Arc::new(ConfigSlot::new("limits.yaml", Limits { max_connections: 16 }));
/// let consumer: Arc<dyn ConfigConsumer> = limits.clone();
///
/// let reloader = ConfigReloader::new();
/// reloader.register("/etc/myapp", Arc::downgrade(&consumer)).await?;
///
/// println!("max connections: {}", limits.get().max_connections);
/// # Ok(())
/// # }
/// ```
pub struct ConfigSlot<T> {
    name: String,
    format: Option<Format>,
    current: ArcSwap<T>,
    validator: Option<Validator<T>>,
    version: AtomicU64,
    subscribers: SubscriberRegistry,
}

impl<T> ConfigSlot<T> {
    /// Create a slot for the file `name`, starting at `initial`.
    pub fn new(name: impl Into<String>, initial: T) -> Self {
        let name = name.into();
        let format = format_for(&name);
        Self {
            name,
            format,
            current: ArcSwap::from_pointee(initial),
            validator: None,
            version: AtomicU64::new(0),
            subscribers: SubscriberRegistry::new(),
        }
    }

    /// Reject values for which `validator` returns an error.
    pub fn with_validation<F>(mut self, validator: F) -> Self
    where
        F: Fn(&T) -> std::result::Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Reject values whose [`Validate`](crate::core::Validate) impl fails.
    #[cfg(feature = "validation")]
    pub fn validated(self) -> Self
    where
        T: crate::core::Validate,
    {
        self.with_validation(|value: &T| value.validate())
    }

    /// Current value.
    ///
    /// Lock-free; never blocks on a concurrent apply.
    pub fn get(&self) -> Arc<T> {
        self.current.load_full()
    }

    /// Number of values swapped in since creation.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Validate `value` and swap it in, then notify subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::ValidationError`] and keeps the previous value if
    /// validation fails.
    pub fn update(&self, value: T) -> Result<()> {
        if let Some(validator) = &self.validator {
            validator(&value)?;
        }

        self.current.store(Arc::new(value));
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(name = %self.name, version, "configuration swapped");

        self.subscribers.notify_all();
        Ok(())
    }

    /// Invoke `callback` after every successful swap.
    ///
    /// Dropping the returned handle unsubscribes.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.subscriber_count()
    }
}

impl<T: DeserializeOwned> ConfigSlot<T> {
    /// Parse `bytes` in this slot's format without touching the current value.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::ParseError`] for an unknown extension, non-UTF-8
    /// input, malformed content or a shape mismatch with `T`.
    pub fn parse(&self, bytes: &[u8]) -> Result<T> {
        let format = self.format.ok_or_else(|| {
            WatchError::ParseError(format!("unsupported file extension: {}", self.name))
        })?;
        let parsed = match format {
            Format::Json => serde_json::from_slice(bytes).map_err(|e| e.to_string()),
            Format::Yaml => serde_yaml::from_slice(bytes).map_err(|e| e.to_string()),
            Format::Toml => std::str::from_utf8(bytes)
                .map_err(|e| e.to_string())
                .and_then(|text| toml::from_str(text).map_err(|e| e.to_string())),
        };
        parsed.map_err(|e| WatchError::ParseError(format!("{}: {}", self.name, e)))
    }
}

impl<T> ConfigConsumer for ConfigSlot<T>
where
    T: DeserializeOwned + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, bytes: &[u8]) -> Result<()> {
        let value = self.parse(bytes)?;
        self.update(value)
    }
}

impl<T> std::fmt::Debug for ConfigSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigSlot")
            .field("name", &self.name)
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
    Toml,
}

fn format_for(name: &str) -> Option<Format> {
    let extension = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "json" => Some(Format::Json),
        "yaml" | "yml" => Some(Format::Yaml),
        "toml" => Some(Format::Toml),
        _ => None,
    }
}
