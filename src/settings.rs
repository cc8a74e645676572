//! Tunables for the watchers, loadable from a file and environment variables.

use crate::error::{Result, WatchError};
use config::{Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Settings for every component, with production defaults.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_watch::settings::Settings;
///
/// # fn example() -> hotswap_watch::error::Result<()> {
/// // HOTSWAP_CLOCK__THRESHOLD_MS=10000 overrides the file value
/// let settings = Settings::load(Some("config/watch.yaml".as_ref()), Some("HOTSWAP"))?;
/// println!("drift threshold: {:?}", settings.clock.threshold());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Clock-drift detector settings
    pub clock: ClockSettings,
    /// File watcher settings
    pub watch: WatchSettings,
    /// Config reloader settings
    pub reload: ReloadSettings,
}

impl Settings {
    /// Load settings from an optional file, then apply environment overrides.
    ///
    /// The file format is detected from its extension (YAML, TOML or JSON).
    /// Environment variables use `{prefix}_{SECTION}__{FIELD}`, for example
    /// `HOTSWAP_WATCH__RESUBSCRIBE_BACKOFF_MS`, and take precedence over the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed, or a value has
    /// the wrong type.
    pub fn load(file: Option<&Path>, env_prefix: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        if let Some(prefix) = env_prefix {
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        builder
            .build()
            .map_err(|e| WatchError::SettingsError(e.to_string()))?
            .try_deserialize::<Settings>()
            .map_err(|e| WatchError::SettingsError(e.to_string()))
    }
}

/// Clock-drift detector settings.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClockSettings {
    /// Sampling interval in milliseconds
    pub accuracy_ms: u64,
    /// Allowed divergence between consecutive samples before a change is reported
    pub threshold_ms: u64,
    /// Start the sampling loop on the first registration
    pub autostart: bool,
}

impl ClockSettings {
    /// Sampling interval.
    pub fn accuracy(&self) -> Duration {
        Duration::from_millis(self.accuracy_ms.max(1))
    }

    /// Drift threshold.
    pub fn threshold(&self) -> Duration {
        Duration::from_millis(self.threshold_ms)
    }
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            accuracy_ms: 1_000,
            threshold_ms: 5_000,
            autostart: true,
        }
    }
}

/// File watcher settings.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchSettings {
    /// Pause between resubscription attempts after the watched path vanished
    pub resubscribe_backoff_ms: u64,
    /// Window for collapsing bursts of identical events; 0 disables it
    pub debounce_ms: u64,
}

impl WatchSettings {
    /// Resubscription backoff; never zero, so the retry loop cannot spin.
    pub fn resubscribe_backoff(&self) -> Duration {
        Duration::from_millis(self.resubscribe_backoff_ms.max(1))
    }

    /// Debounce window.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            resubscribe_backoff_ms: 3_000,
            debounce_ms: 0,
        }
    }
}

/// Config reloader settings.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReloadSettings {
    /// Debounce window for directory watches created by the reloader
    pub debounce_ms: u64,
}

impl ReloadSettings {
    /// Watch settings for a reloader's directory watches.
    pub fn watch_settings(&self, base: &WatchSettings) -> WatchSettings {
        WatchSettings {
            debounce_ms: self.debounce_ms,
            ..*base
        }
    }
}

impl Default for ReloadSettings {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}
