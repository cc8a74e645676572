//! Per-path file watching with automatic resubscription.

use crate::core::{ChangeKind, ChangeNotifier, NotifierRegistry};
use crate::error::{Result, WatchError};
use crate::settings::WatchSettings;
use crate::sources::{EventSource, RawEvent, Subscription};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[cfg(feature = "metrics")]
use crate::metrics::WatchMetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

/// Lifecycle of one path watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Subscribed and delivering events.
    Active,
    /// The watched path was removed; waiting for it to come back.
    Reinitializing,
    /// Cancelled; delivering what was already queued before exiting.
    Closed,
}

/// State shared between the watcher handle and its dispatch tasks.
struct Shared {
    source: Arc<dyn EventSource>,
    settings: WatchSettings,
    states: RwLock<HashMap<PathBuf, WatchState>>,
    /// Absolute form of each path passed to `add`, mapped to its watch key.
    aliases: RwLock<HashMap<PathBuf, PathBuf>>,
    #[cfg(feature = "metrics")]
    metrics: OnceLock<WatchMetrics>,
}

impl Shared {
    fn set_state(&self, path: &Path, state: WatchState) {
        if let Some(current) = self.states.write().get_mut(path) {
            *current = state;
        }
    }

    #[cfg(feature = "metrics")]
    fn observe(&self, record: impl FnOnce(&WatchMetrics)) {
        if let Some(metrics) = self.metrics.get() {
            record(metrics);
        }
    }
}

/// Watches individual paths and delivers classified changes to observers.
///
/// Every registered path gets its own event-source subscription and its own
/// dispatch task, so events for one path are delivered strictly in order and
/// a slow observer only delays its own path. If the watched path itself is
/// removed, the watch closes its subscription and retries at a fixed backoff
/// until the path exists again, then delivers a synthetic
/// [`ChangeKind::Create`] for it.
///
/// The watcher only holds a [`Weak`] reference to each observer; keeping the
/// observer alive is the caller's job.
///
/// # Examples
///
/// ```rust,no_run
/// use async_trait::async_trait;
/// use hotswap_watch::core::{ChangeKind, ChangeNotifier};
/// use hotswap_watch::watch::FileWatcher;
/// use std::path::Path;
/// use std::sync::Arc;
///
/// struct Printer;
///
/// #[async_trait]
/// impl ChangeNotifier for Printer {
///     async fn notify(&self, kind: ChangeKind, path: &Path) -> hotswap_watch::error::Result<()> {
///         println!("{} {}", kind, path.display());
///         Ok(())
///     }
/// }
///
/// # async fn example() -> hotswap_watch::error::Result<()> {
/// let watcher = FileWatcher::new();
/// let printer: Arc<dyn ChangeNotifier> = Arc::new(Printer);
/// watcher.add("/etc/myapp/app.json", Arc::downgrade(&printer)).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FileWatcher {
    shared: Arc<Shared>,
    registry: NotifierRegistry,
}

impl FileWatcher {
    /// Create a watcher backed by the platform's native file events.
    #[cfg(feature = "file-watch")]
    pub fn new() -> Self {
        Self::with_source(
            Arc::new(crate::sources::NotifySource),
            WatchSettings::default(),
        )
    }

    /// Create a watcher on top of a custom event source.
    pub fn with_source(source: Arc<dyn EventSource>, settings: WatchSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                settings,
                states: RwLock::new(HashMap::new()),
                aliases: RwLock::new(HashMap::new()),
                #[cfg(feature = "metrics")]
                metrics: OnceLock::new(),
            }),
            registry: NotifierRegistry::new(),
        }
    }

    /// Attach a metrics collector. Only the first call has an effect.
    #[cfg(feature = "metrics")]
    pub fn set_metrics(&self, metrics: WatchMetrics) {
        let _ = self.shared.metrics.set(metrics);
    }

    /// Start watching `path`, delivering its changes to `observer`.
    ///
    /// The path is canonicalized and the canonical form is both the watch key
    /// and the path reported for the watched entry itself. Returns that key.
    ///
    /// # Errors
    ///
    /// - [`WatchError::EmptyKey`] if `path` is empty
    /// - [`WatchError::NilObserver`] if `observer` can no longer be upgraded
    /// - [`WatchError::IoError`] (not found) if `path` does not exist
    /// - [`WatchError::DuplicateKey`] if `path` is already watched
    /// - any error from the event source's `subscribe`
    pub async fn add(
        &self,
        path: impl AsRef<Path>,
        observer: Weak<dyn ChangeNotifier>,
    ) -> Result<PathBuf> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(WatchError::EmptyKey);
        }
        if observer.strong_count() == 0 {
            return Err(WatchError::NilObserver);
        }

        let canonical = tokio::fs::canonicalize(path).await?;
        let key = canonical.to_string_lossy().into_owned();
        self.registry.check_available(&key)?;

        let subscription = self.shared.source.subscribe(&canonical)?;
        let task = PathWatch {
            path: canonical.clone(),
            observer,
            subscription,
            shared: Arc::clone(&self.shared),
        };

        self.registry.register(key, |token| {
            self.shared
                .states
                .write()
                .insert(canonical.clone(), WatchState::Active);
            tokio::spawn(task.run(token))
        })?;

        if let Ok(absolute) = std::path::absolute(path) {
            self.shared
                .aliases
                .write()
                .insert(absolute, canonical.clone());
        }

        info!(path = %canonical.display(), "watching path");
        #[cfg(feature = "metrics")]
        self.shared.observe(|m| m.update_watch_count(self.registry.len()));
        Ok(canonical)
    }

    /// Stop watching `path`.
    ///
    /// `path` may be the canonical key or the path originally passed to
    /// [`add`](Self::add), even while the watched entry is missing from disk.
    /// Events already received for the path are delivered before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::NotRegistered`] if the path is not watched.
    pub async fn remove(&self, path: impl AsRef<Path>) -> Result<()> {
        let key = self.key_for(path.as_ref());
        self.registry.cancel(&key.to_string_lossy()).await?;
        self.shared.states.write().remove(&key);
        self.shared.aliases.write().retain(|_, target| *target != key);

        info!(path = %key.display(), "stopped watching path");
        #[cfg(feature = "metrics")]
        self.shared.observe(|m| m.update_watch_count(self.registry.len()));
        Ok(())
    }

    /// Whether `path` is watched.
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        let key = self.key_for(path.as_ref());
        self.registry.contains(&key.to_string_lossy())
    }

    /// All watched paths, sorted.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.registry.keys().into_iter().map(PathBuf::from).collect()
    }

    /// Current lifecycle state of the watch for `path`.
    pub fn state(&self, path: impl AsRef<Path>) -> Option<WatchState> {
        let key = self.key_for(path.as_ref());
        self.shared.states.read().get(&key).copied()
    }

    /// The settings this watcher was created with.
    pub fn settings(&self) -> &WatchSettings {
        &self.shared.settings
    }

    /// Stop every watch.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
        self.shared.states.write().clear();
        self.shared.aliases.write().clear();
    }

    /// Resolve `path` to its watch key without requiring it to exist.
    fn key_for(&self, path: &Path) -> PathBuf {
        let Ok(absolute) = std::path::absolute(path) else {
            return path.to_path_buf();
        };
        if let Some(key) = self.shared.aliases.read().get(&absolute) {
            return key.clone();
        }
        if self.shared.states.read().contains_key(&absolute) {
            return absolute;
        }
        absolute.canonicalize().unwrap_or(absolute)
    }
}

#[cfg(feature = "file-watch")]
impl Default for FileWatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether the loop should keep reading the current batch.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    /// The subscription was replaced; the rest of the batch is stale.
    Resubscribed,
    Stopped,
}

/// Dispatch task state for one watched path.
struct PathWatch {
    path: PathBuf,
    observer: Weak<dyn ChangeNotifier>,
    subscription: Subscription,
    shared: Arc<Shared>,
}

impl PathWatch {
    async fn run(mut self, token: CancellationToken) {
        'events: loop {
            let first = tokio::select! {
                biased;
                raw = self.subscription.recv() => raw,
                _ = token.cancelled() => break 'events,
            };

            let Some(first) = first else {
                warn!(path = %self.path.display(), "event source closed the subscription");
                match self.reinitialize(&token).await {
                    Flow::Stopped => break 'events,
                    _ => continue 'events,
                }
            };

            for raw in self.collect_burst(first).await {
                match self.handle(raw, &token).await {
                    Flow::Continue => {}
                    Flow::Resubscribed => continue 'events,
                    Flow::Stopped => break 'events,
                }
            }
        }

        self.shared.set_state(&self.path, WatchState::Closed);
        self.subscription.close();
        while let Some(raw) = self.subscription.recv().await {
            let kind = ChangeKind::classify(raw.op);
            if kind == ChangeKind::Unknown || (kind == ChangeKind::Remove && raw.path == self.path) {
                continue;
            }
            self.deliver(kind, &raw.path).await;
        }
        debug!(path = %self.path.display(), "watch closed");
    }

    /// Gather events that arrive within the debounce window after `first`,
    /// collapsing consecutive duplicates.
    async fn collect_burst(&mut self, first: RawEvent) -> Vec<RawEvent> {
        let mut batch = vec![first];

        let window = self.shared.settings.debounce();
        if !window.is_zero() {
            let deadline = Instant::now() + window;
            while let Ok(Some(raw)) =
                tokio::time::timeout_at(deadline, self.subscription.recv()).await
            {
                batch.push(raw);
            }
            batch.dedup_by(|later, earlier| {
                later.path == earlier.path
                    && ChangeKind::classify(later.op) == ChangeKind::classify(earlier.op)
            });
        }

        batch
    }

    async fn handle(&mut self, raw: RawEvent, token: &CancellationToken) -> Flow {
        let kind = ChangeKind::classify(raw.op);
        match kind {
            ChangeKind::Unknown => {
                debug!(path = %raw.path.display(), op = ?raw.op, "dropping unclassified event");
                #[cfg(feature = "metrics")]
                self.shared.observe(|m| m.record_dropped());
                Flow::Continue
            }
            ChangeKind::Remove if raw.path == self.path => self.reinitialize(token).await,
            _ => {
                self.deliver(kind, &raw.path).await;
                Flow::Continue
            }
        }
    }

    /// Drop the current subscription and retry until the path can be watched
    /// again, then announce it with a synthetic `Create`.
    async fn reinitialize(&mut self, token: &CancellationToken) -> Flow {
        self.shared.set_state(&self.path, WatchState::Reinitializing);
        std::mem::replace(&mut self.subscription, Subscription::closed()).unsubscribe();
        info!(path = %self.path.display(), "watched path removed, resubscribing");

        let backoff = self.shared.settings.resubscribe_backoff();
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            match self.shared.source.subscribe(&self.path) {
                Ok(subscription) => {
                    self.subscription = subscription;
                    break;
                }
                Err(e) => {
                    warn!(path = %self.path.display(), attempt, error = %e, "resubscription failed");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = token.cancelled() => return Flow::Stopped,
            }
        }

        self.shared.set_state(&self.path, WatchState::Active);
        info!(path = %self.path.display(), attempts = attempt, "watch re-established");
        #[cfg(feature = "metrics")]
        self.shared.observe(|m| m.record_resubscription());

        let path = self.path.clone();
        self.deliver(ChangeKind::Create, &path).await;
        Flow::Resubscribed
    }

    async fn deliver(&mut self, kind: ChangeKind, path: &Path) {
        let Some(observer) = self.observer.upgrade() else {
            debug!(path = %path.display(), %kind, "observer dropped, discarding event");
            #[cfg(feature = "metrics")]
            self.shared.observe(|m| m.record_dropped());
            return;
        };

        let result = observer.notify(kind, path).await;
        #[cfg(feature = "metrics")]
        self.shared.observe(|m| m.record_delivery(result.is_ok()));
        match result {
            Ok(()) => debug!(path = %path.display(), %kind, "event delivered"),
            Err(e) => warn!(path = %path.display(), %kind, error = %e, "observer failed to handle event"),
        }
    }
}
