//! Directory-scoped hot reload on top of [`FileWatcher`].

use crate::core::{ChangeKind, ChangeNotifier, ConfigConsumer};
use crate::error::{Result, WatchError};
use crate::watch::FileWatcher;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio::sync::OnceCell;
use tracing::{debug, info};

#[cfg(feature = "file-watch")]
use crate::settings::Settings;

#[cfg(feature = "metrics")]
use crate::metrics::WatchMetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

/// Applies files in watched directories to the consumers registered for them.
///
/// Each directory gets one watch, created on the first registration for it.
/// When a file in the directory is created or modified, the consumer whose
/// [`name`](ConfigConsumer::name) matches the file name receives the file's
/// full contents. Removing a file does not un-apply it.
///
/// Consumers are held weakly: the caller owns them, and a consumer dropped
/// after registration simply stops receiving updates.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_watch::prelude::*;
/// use serde::Deserialize;
/// use std::sync::Arc;
///
/// #[derive(Debug, Deserialize)]
/// struct Features {
///     dark_mode: bool,
/// }
///
/// # async fn example() -> hotswap_watch::error::Result<()> {
/// let reloader = ConfigReloader::new();
///
/// let features = Arc::new(ConfigSlot::new("features.json", Features { dark_mode: false }));
/// let consumer: Arc<dyn ConfigConsumer> = features.clone();
/// reloader.register("/etc/myapp", Arc::downgrade(&consumer)).await?;
///
/// let _handle = features.subscribe(|| println!("features reloaded"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConfigReloader {
    inner: Arc<Inner>,
}

struct Inner {
    watcher: FileWatcher,
    directories: Mutex<HashMap<PathBuf, Arc<DirectoryHandler>>>,
    #[cfg(feature = "metrics")]
    metrics: Arc<OnceLock<WatchMetrics>>,
}

impl ConfigReloader {
    /// Create a reloader on native file events with default settings.
    #[cfg(feature = "file-watch")]
    pub fn new() -> Self {
        Self::from_settings(&Settings::default())
    }

    /// Create a reloader on native file events.
    ///
    /// Directory watches use `settings.watch` with the debounce window from
    /// `settings.reload`.
    #[cfg(feature = "file-watch")]
    pub fn from_settings(settings: &Settings) -> Self {
        let watch = settings.reload.watch_settings(&settings.watch);
        Self::with_watcher(FileWatcher::with_source(
            Arc::new(crate::sources::NotifySource),
            watch,
        ))
    }

    /// Create a reloader that watches directories through `watcher`.
    pub fn with_watcher(watcher: FileWatcher) -> Self {
        Self {
            inner: Arc::new(Inner {
                watcher,
                directories: Mutex::new(HashMap::new()),
                #[cfg(feature = "metrics")]
                metrics: Arc::new(OnceLock::new()),
            }),
        }
    }

    /// Attach a metrics collector to the reloader and its watcher.
    #[cfg(feature = "metrics")]
    pub fn set_metrics(&self, metrics: WatchMetrics) {
        self.inner.watcher.set_metrics(metrics.clone());
        let _ = self.inner.metrics.set(metrics);
    }

    /// The underlying file watcher.
    pub fn watcher(&self) -> &FileWatcher {
        &self.inner.watcher
    }

    /// Register `consumer` for the file `directory/consumer.name()`.
    ///
    /// Starts watching `directory` if nothing registered for it yet, then
    /// applies the file's current contents if it exists. A consumer with the
    /// same name in the same directory is replaced.
    ///
    /// # Errors
    ///
    /// - [`WatchError::NilConsumer`] if `consumer` can no longer be upgraded
    /// - [`WatchError::EmptyName`] if the consumer's name is empty
    /// - [`WatchError::IoError`] if `directory` does not exist
    /// - any error from subscribing to the directory
    /// - the error of the initial read or apply; the consumer stays
    ///   registered and later changes are still applied
    pub async fn register(
        &self,
        directory: impl AsRef<Path>,
        consumer: Weak<dyn ConfigConsumer>,
    ) -> Result<()> {
        let name = match consumer.upgrade() {
            Some(strong) => strong.name().to_string(),
            None => return Err(WatchError::NilConsumer),
        };
        if name.is_empty() {
            return Err(WatchError::EmptyName);
        }

        let directory = tokio::fs::canonicalize(directory.as_ref()).await?;
        let handler = self.handler_for(&directory);
        handler.ensure_watching(&self.inner.watcher).await?;

        handler.consumers.write().insert(name.clone(), consumer);
        info!(directory = %directory.display(), name = %name, "config consumer registered");

        handler.load(&name).await
    }

    /// Stop applying `directory/name`.
    ///
    /// The directory stays watched.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::NotRegistered`] if no such consumer exists.
    pub async fn unregister(&self, directory: impl AsRef<Path>, name: &str) -> Result<()> {
        let directory = canonical_or_given(directory.as_ref()).await;
        let removed = self
            .handler(&directory)
            .and_then(|handler| handler.consumers.write().remove(name));
        if removed.is_none() {
            return Err(WatchError::NotRegistered(
                directory.join(name).display().to_string(),
            ));
        }

        info!(directory = %directory.display(), name, "config consumer unregistered");
        Ok(())
    }

    /// Names of the consumers registered for `directory`, sorted.
    pub async fn consumers(&self, directory: impl AsRef<Path>) -> Vec<String> {
        let directory = canonical_or_given(directory.as_ref()).await;
        let Some(handler) = self.handler(&directory) else {
            return Vec::new();
        };
        let mut names: Vec<String> = handler.consumers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Read `directory/name` now and apply it to its consumer.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::NotRegistered`] if no such consumer exists, or
    /// the read or apply error.
    pub async fn load(&self, directory: impl AsRef<Path>, name: &str) -> Result<()> {
        let directory = canonical_or_given(directory.as_ref()).await;
        let handler = self
            .handler(&directory)
            .filter(|handler| handler.consumers.read().contains_key(name))
            .ok_or_else(|| WatchError::NotRegistered(directory.join(name).display().to_string()))?;
        handler.load(name).await
    }

    /// Stop every directory watch.
    pub async fn shutdown(&self) {
        self.inner.watcher.shutdown().await;
        self.inner.directories.lock().clear();
    }

    fn handler(&self, directory: &Path) -> Option<Arc<DirectoryHandler>> {
        self.inner.directories.lock().get(directory).cloned()
    }

    fn handler_for(&self, directory: &Path) -> Arc<DirectoryHandler> {
        let mut directories = self.inner.directories.lock();
        let handler = directories
            .entry(directory.to_path_buf())
            .or_insert_with(|| {
                Arc::new(DirectoryHandler {
                    directory: directory.to_path_buf(),
                    consumers: RwLock::new(HashMap::new()),
                    watching: OnceCell::new(),
                    gate: tokio::sync::Mutex::new(()),
                    #[cfg(feature = "metrics")]
                    metrics: Arc::clone(&self.inner.metrics),
                })
            });
        Arc::clone(handler)
    }
}

#[cfg(feature = "file-watch")]
impl Default for ConfigReloader {
    fn default() -> Self {
        Self::new()
    }
}

async fn canonical_or_given(path: &Path) -> PathBuf {
    tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| path.to_path_buf())
}

/// The watch observer for one directory.
struct DirectoryHandler {
    directory: PathBuf,
    consumers: RwLock<HashMap<String, Weak<dyn ConfigConsumer>>>,
    /// Set once the directory watch exists.
    watching: OnceCell<()>,
    /// Serializes read-then-apply for this directory.
    gate: tokio::sync::Mutex<()>,
    #[cfg(feature = "metrics")]
    metrics: Arc<OnceLock<WatchMetrics>>,
}

impl DirectoryHandler {
    async fn ensure_watching(self: &Arc<Self>, watcher: &FileWatcher) -> Result<()> {
        self.watching
            .get_or_try_init(|| async move {
                let observer: Arc<dyn ChangeNotifier> = self.clone();
                watcher
                    .add(&self.directory, Arc::downgrade(&observer))
                    .await
                    .map(|_| ())
            })
            .await?;
        Ok(())
    }

    /// Read the current contents of `name` and apply them.
    ///
    /// A missing file or a dropped consumer is not an error.
    async fn load(&self, name: &str) -> Result<()> {
        let consumer = self.consumers.read().get(name).cloned();
        let Some(consumer) = consumer.and_then(|weak| weak.upgrade()) else {
            debug!(directory = %self.directory.display(), name, "consumer gone, skipping");
            return Ok(());
        };

        let _gate = self.gate.lock().await;
        let path = self.directory.join(name);

        #[cfg(feature = "metrics")]
        let timer = self.metrics.get().map(WatchMetrics::start_reload);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config file absent, nothing to apply");
                return Ok(());
            }
            Err(e) => {
                #[cfg(feature = "metrics")]
                self.record(timer, false);
                return Err(e.into());
            }
        };

        let result = consumer.apply(&bytes);
        #[cfg(feature = "metrics")]
        self.record(timer, result.is_ok());
        result?;

        info!(path = %path.display(), bytes = bytes.len(), "configuration applied");
        Ok(())
    }

    async fn load_all(&self) -> Result<()> {
        let names: Vec<String> = self.consumers.read().keys().cloned().collect();
        let mut first_error = None;
        for name in names {
            if let Err(e) = self.load(&name).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    #[cfg(feature = "metrics")]
    fn record(&self, timer: Option<std::time::Instant>, ok: bool) {
        let (Some(metrics), Some(timer)) = (self.metrics.get(), timer) else {
            return;
        };
        if ok {
            metrics.record_reload_success(timer);
        } else {
            metrics.record_reload_failure(timer);
        }
    }
}

#[async_trait]
impl ChangeNotifier for DirectoryHandler {
    async fn notify(&self, kind: ChangeKind, path: &Path) -> Result<()> {
        if !matches!(kind, ChangeKind::Create | ChangeKind::Modify) {
            debug!(%kind, path = %path.display(), "ignoring change");
            return Ok(());
        }

        if path == self.directory {
            // Recreated directory: every file in it may be new.
            if kind == ChangeKind::Create {
                return self.load_all().await;
            }
            return Ok(());
        }

        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            return Ok(());
        };
        if !self.consumers.read().contains_key(name) {
            debug!(path = %path.display(), "no consumer for file");
            return Ok(());
        }
        self.load(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::WatchSettings;
    use crate::sources::{EventSource, Op, RawEvent, Subscription};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[derive(Default)]
    struct FakeSource {
        senders: Mutex<HashMap<PathBuf, mpsc::UnboundedSender<RawEvent>>>,
        subscribes: AtomicUsize,
    }

    impl FakeSource {
        fn emit(&self, path: &Path, op: Op) {
            let parent = path.parent().unwrap();
            let senders = self.senders.lock();
            senders[parent].send(RawEvent::new(path, op)).unwrap();
        }
    }

    impl EventSource for FakeSource {
        fn subscribe(&self, path: &Path) -> Result<Subscription> {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders.lock().insert(path.to_path_buf(), tx);
            Ok(Subscription::new(rx, ()))
        }
    }

    #[derive(Default)]
    struct Recorder {
        name: String,
        applied: Mutex<Vec<Vec<u8>>>,
        rejects: HashSet<Vec<u8>>,
    }

    impl Recorder {
        fn named(name: &str) -> Self {
            Self {
                name: name.to_string(),
                ..Self::default()
            }
        }

        async fn wait_for(&self, count: usize) -> Vec<Vec<u8>> {
            timeout(Duration::from_secs(5), async {
                loop {
                    if self.applied.lock().len() >= count {
                        return self.applied.lock().clone();
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("timed out waiting for apply")
        }
    }

    impl ConfigConsumer for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        fn apply(&self, bytes: &[u8]) -> Result<()> {
            if self.rejects.contains(bytes) {
                return Err(WatchError::ParseError("rejected".to_string()));
            }
            self.applied.lock().push(bytes.to_vec());
            Ok(())
        }
    }

    fn fake_reloader() -> (Arc<FakeSource>, ConfigReloader) {
        let source = Arc::new(FakeSource::default());
        let watcher = FileWatcher::with_source(source.clone(), WatchSettings::default());
        (source, ConfigReloader::with_watcher(watcher))
    }

    #[tokio::test]
    async fn test_register_applies_existing_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("app.json"), b"v1").unwrap();
        let (source, reloader) = fake_reloader();

        let recorder = Arc::new(Recorder::named("app.json"));
        let consumer: Arc<dyn ConfigConsumer> = recorder.clone();
        reloader
            .register(dir.path(), Arc::downgrade(&consumer))
            .await
            .unwrap();

        assert_eq!(*recorder.applied.lock(), vec![b"v1".to_vec()]);
        assert_eq!(source.subscribes.load(Ordering::SeqCst), 1);
        assert_eq!(reloader.consumers(dir.path()).await, vec!["app.json"]);
    }

    #[tokio::test]
    async fn test_register_missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let (_source, reloader) = fake_reloader();

        let recorder = Arc::new(Recorder::named("absent.json"));
        let consumer: Arc<dyn ConfigConsumer> = recorder.clone();
        reloader
            .register(dir.path(), Arc::downgrade(&consumer))
            .await
            .unwrap();
        assert!(recorder.applied.lock().is_empty());
    }

    #[tokio::test]
    async fn test_registration_errors() {
        let dir = TempDir::new().unwrap();
        let (_source, reloader) = fake_reloader();

        let dead = {
            let gone: Arc<dyn ConfigConsumer> = Arc::new(Recorder::named("x.json"));
            Arc::downgrade(&gone)
        };
        assert!(matches!(
            reloader.register(dir.path(), dead).await,
            Err(WatchError::NilConsumer)
        ));

        let unnamed: Arc<dyn ConfigConsumer> = Arc::new(Recorder::named(""));
        assert!(matches!(
            reloader.register(dir.path(), Arc::downgrade(&unnamed)).await,
            Err(WatchError::EmptyName)
        ));

        let missing_dir = dir.path().join("nope");
        let named: Arc<dyn ConfigConsumer> = Arc::new(Recorder::named("x.json"));
        let err = reloader
            .register(&missing_dir, Arc::downgrade(&named))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_dispatch_on_create_and_modify_only() {
        let dir = TempDir::new().unwrap();
        let canonical = dir.path().canonicalize().unwrap();
        let file = canonical.join("app.json");
        let (source, reloader) = fake_reloader();

        let recorder = Arc::new(Recorder::named("app.json"));
        let consumer: Arc<dyn ConfigConsumer> = recorder.clone();
        reloader
            .register(dir.path(), Arc::downgrade(&consumer))
            .await
            .unwrap();

        std::fs::write(&file, b"v1").unwrap();
        source.emit(&file, Op::CREATE);
        recorder.wait_for(1).await;

        std::fs::write(&file, b"v2").unwrap();
        source.emit(&file, Op::WRITE);
        source.emit(&canonical.join("other.json"), Op::WRITE);
        source.emit(&file, Op::CHMOD | Op::WRITE);
        let applied = recorder.wait_for(3).await;
        assert_eq!(applied, vec![b"v1".to_vec(), b"v2".to_vec(), b"v2".to_vec()]);

        std::fs::remove_file(&file).unwrap();
        source.emit(&file, Op::REMOVE);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(recorder.applied.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_initial_apply_keeps_registration() {
        let dir = TempDir::new().unwrap();
        let canonical = dir.path().canonicalize().unwrap();
        let file = canonical.join("app.json");
        std::fs::write(&file, b"bad").unwrap();
        let (source, reloader) = fake_reloader();

        let recorder = Arc::new(Recorder {
            rejects: HashSet::from([b"bad".to_vec()]),
            ..Recorder::named("app.json")
        });
        let consumer: Arc<dyn ConfigConsumer> = recorder.clone();
        let err = reloader
            .register(dir.path(), Arc::downgrade(&consumer))
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::ParseError(_)));

        std::fs::write(&file, b"good").unwrap();
        source.emit(&file, Op::WRITE);
        assert_eq!(recorder.wait_for(1).await, vec![b"good".to_vec()]);
    }

    #[tokio::test]
    async fn test_unregister_and_load() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("app.json"), b"v1").unwrap();
        let (_source, reloader) = fake_reloader();

        let recorder = Arc::new(Recorder::named("app.json"));
        let consumer: Arc<dyn ConfigConsumer> = recorder.clone();
        reloader
            .register(dir.path(), Arc::downgrade(&consumer))
            .await
            .unwrap();

        std::fs::write(dir.path().join("app.json"), b"v2").unwrap();
        reloader.load(dir.path(), "app.json").await.unwrap();
        assert_eq!(recorder.applied.lock().len(), 2);

        reloader.unregister(dir.path(), "app.json").await.unwrap();
        assert!(reloader.consumers(dir.path()).await.is_empty());
        assert!(matches!(
            reloader.unregister(dir.path(), "app.json").await,
            Err(WatchError::NotRegistered(_))
        ));
        assert!(matches!(
            reloader.load(dir.path(), "app.json").await,
            Err(WatchError::NotRegistered(_))
        ));
    }

    #[cfg(feature = "metrics")]
    #[tokio::test]
    async fn test_reload_records_metrics() {
        let dir = TempDir::new().unwrap();
        let canonical = dir.path().canonicalize().unwrap();
        let file = canonical.join("app.json");
        std::fs::write(&file, b"v1").unwrap();
        let (source, reloader) = fake_reloader();
        reloader.set_metrics(WatchMetrics::new(opentelemetry::global::meter("test")));

        let recorder = Arc::new(Recorder {
            rejects: HashSet::from([b"bad".to_vec()]),
            ..Recorder::named("app.json")
        });
        let consumer: Arc<dyn ConfigConsumer> = recorder.clone();
        reloader
            .register(dir.path(), Arc::downgrade(&consumer))
            .await
            .unwrap();

        std::fs::write(&file, b"bad").unwrap();
        assert!(reloader.load(dir.path(), "app.json").await.is_err());

        std::fs::write(&file, b"v2").unwrap();
        source.emit(&file, Op::WRITE);
        assert_eq!(recorder.wait_for(2).await, vec![b"v1".to_vec(), b"v2".to_vec()]);
    }

    #[tokio::test]
    async fn test_recreated_directory_reloads_every_consumer() {
        let dir = TempDir::new().unwrap();
        let canonical = dir.path().canonicalize().unwrap();
        let (_source, reloader) = fake_reloader();

        let mut recorders = Vec::new();
        let mut consumers = Vec::new();
        for name in ["a.json", "b.json"] {
            std::fs::write(canonical.join(name), name.as_bytes()).unwrap();
            let recorder = Arc::new(Recorder::named(name));
            let consumer: Arc<dyn ConfigConsumer> = recorder.clone();
            reloader
                .register(dir.path(), Arc::downgrade(&consumer))
                .await
                .unwrap();
            recorders.push(recorder);
            consumers.push(consumer);
        }

        let handler = reloader.handler(&canonical).unwrap();
        handler.notify(ChangeKind::Create, &canonical).await.unwrap();
        handler.notify(ChangeKind::Modify, &canonical).await.unwrap();

        for recorder in &recorders {
            assert_eq!(recorder.applied.lock().len(), 2);
        }
    }
}
