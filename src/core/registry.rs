//! Key → watch registry shared by the clock and file watchers.

use crate::error::{Result, WatchError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A live watch: the cancellation signal and the dispatch task it controls.
struct Watch {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Registry of live watches, at most one per key.
///
/// Each registration spawns exactly one dispatch task which owns the watch's
/// event queue. The map lock is only held while inserting, looking up or
/// removing entries; observers always run on the dispatch tasks.
///
/// # Examples
///
/// ```rust
/// use hotswap_watch::core::NotifierRegistry;
///
/// # async fn example() -> hotswap_watch::error::Result<()> {
/// let registry = NotifierRegistry::new();
///
/// registry.register("tick", |token| {
///     tokio::spawn(async move { token.cancelled().await })
/// })?;
/// assert!(registry.register("tick", |token| {
///     tokio::spawn(async move { token.cancelled().await })
/// }).is_err());
///
/// registry.cancel("tick").await?;
/// assert!(registry.is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct NotifierRegistry {
    watches: Arc<Mutex<HashMap<String, Watch>>>,
}

impl NotifierRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail fast if `key` is empty or already taken.
    ///
    /// Callers use this before acquiring external resources; `register`
    /// repeats the check atomically.
    pub fn check_available(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(WatchError::EmptyKey);
        }
        if self.contains(key) {
            return Err(WatchError::DuplicateKey(key.to_string()));
        }
        Ok(())
    }

    /// Register a watch under `key`.
    ///
    /// `spawn` receives the watch's cancellation token and must start the
    /// dispatch task. It is only called when the key is free.
    ///
    /// # Errors
    ///
    /// - [`WatchError::EmptyKey`] if `key` is empty
    /// - [`WatchError::DuplicateKey`] if a watch already exists for `key`
    pub fn register<F>(&self, key: impl Into<String>, spawn: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> JoinHandle<()>,
    {
        let key = key.into();
        if key.is_empty() {
            return Err(WatchError::EmptyKey);
        }

        let mut watches = self.watches.lock();
        match watches.entry(key) {
            Entry::Occupied(entry) => Err(WatchError::DuplicateKey(entry.key().clone())),
            Entry::Vacant(slot) => {
                let token = CancellationToken::new();
                let task = spawn(token.clone());
                debug!(key = %slot.key(), "watch registered");
                slot.insert(Watch { token, task });
                Ok(())
            }
        }
    }

    /// Whether a live watch exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.watches.lock().contains_key(key)
    }

    /// All registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.watches.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of live watches.
    pub fn len(&self) -> usize {
        self.watches.lock().len()
    }

    /// Whether the registry holds no watches.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel the watch for `key` and wait for its dispatch task to finish.
    ///
    /// Events already queued for the watch are still delivered before the
    /// task exits.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::NotRegistered`] if no watch exists for `key`.
    pub async fn cancel(&self, key: &str) -> Result<()> {
        let watch = self
            .watches
            .lock()
            .remove(key)
            .ok_or_else(|| WatchError::NotRegistered(key.to_string()))?;
        stop(key, watch).await;
        Ok(())
    }

    /// Cancel every watch.
    pub async fn shutdown(&self) {
        let drained: Vec<(String, Watch)> = self.watches.lock().drain().collect();
        for (key, watch) in drained {
            stop(&key, watch).await;
        }
    }
}

async fn stop(key: &str, watch: Watch) {
    watch.token.cancel();
    if let Err(e) = watch.task.await {
        warn!(key, error = %e, "dispatch task ended abnormally");
    }
    debug!(key, "watch cancelled");
}

/// Deliver queued events in arrival order until the queue closes or the
/// token is cancelled. On cancellation the queue is closed and whatever it
/// still holds is delivered before returning.
pub(crate) async fn run_queue<E, F, Fut>(
    mut queue: mpsc::UnboundedReceiver<E>,
    token: CancellationToken,
    mut deliver: F,
) where
    F: FnMut(E) -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        tokio::select! {
            biased;
            event = queue.recv() => match event {
                Some(event) => deliver(event).await,
                None => return,
            },
            _ = token.cancelled() => break,
        }
    }

    queue.close();
    while let Some(event) = queue.recv().await {
        deliver(event).await;
    }
}
