//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use hotswap_watch::prelude::*;
use hotswap_watch::sources::{EventSource, Op, RawEvent, Subscription};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Upper bound for every wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// An event source driven by the test instead of the OS.
#[derive(Default)]
pub struct ScriptedSource {
    senders: Mutex<HashMap<PathBuf, mpsc::UnboundedSender<RawEvent>>>,
    missing: Mutex<HashSet<PathBuf>>,
    subscribes: AtomicUsize,
}

impl ScriptedSource {
    /// Successful and failed `subscribe` calls so far.
    pub fn subscribe_count(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    /// Send `op` for `path` on the subscription for `watched`.
    ///
    /// Returns false if `watched` has no live subscription.
    pub fn emit(&self, watched: &Path, path: &Path, op: Op) -> bool {
        self.senders
            .lock()
            .get(watched)
            .is_some_and(|tx| tx.send(RawEvent::new(path, op)).is_ok())
    }

    /// Make later `subscribe` calls for `path` fail with "not found".
    pub fn set_missing(&self, path: &Path, missing: bool) {
        let mut set = self.missing.lock();
        if missing {
            set.insert(path.to_path_buf());
        } else {
            set.remove(path);
        }
    }
}

impl EventSource for ScriptedSource {
    fn subscribe(&self, path: &Path) -> Result<Subscription> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        if self.missing.lock().contains(path) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "scripted missing path").into());
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().insert(path.to_path_buf(), tx);
        Ok(Subscription::new(rx, ()))
    }
}

/// Records every change it is notified of.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<(ChangeKind, PathBuf)>>,
    fail: bool,
}

impl Recorder {
    /// A recorder whose `notify` always errors after recording.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<(ChangeKind, PathBuf)> {
        self.events.lock().clone()
    }

    pub fn count(&self, kind: ChangeKind) -> usize {
        self.events.lock().iter().filter(|(k, _)| *k == kind).count()
    }

    /// Wait until at least `count` events were recorded.
    pub async fn wait_for(&self, count: usize) -> Vec<(ChangeKind, PathBuf)> {
        self.wait_until(|events| events.len() >= count).await
    }

    /// Wait until `done` holds for the recorded events.
    pub async fn wait_until<F>(&self, done: F) -> Vec<(ChangeKind, PathBuf)>
    where
        F: Fn(&[(ChangeKind, PathBuf)]) -> bool,
    {
        timeout(WAIT, async {
            loop {
                {
                    let events = self.events.lock();
                    if done(&events) {
                        return events.clone();
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for events")
    }
}

#[async_trait]
impl ChangeNotifier for Recorder {
    async fn notify(&self, kind: ChangeKind, path: &Path) -> Result<()> {
        self.events.lock().push((kind, path.to_path_buf()));
        if self.fail {
            return Err(WatchError::observer("recorder set to fail"));
        }
        Ok(())
    }
}

/// Poll `check` until it holds or [`WAIT`] elapses.
pub async fn eventually<F>(check: F)
where
    F: Fn() -> bool,
{
    timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
