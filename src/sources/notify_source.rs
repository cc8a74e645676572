//! Event source backed by the `notify` crate.

use super::{EventSource, Op, RawEvent, Subscription};
use crate::error::{Result, WatchError};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::Path;
use tokio::sync::mpsc;
use tracing::error;

/// Production event source using the platform's native watcher
/// (inotify, FSEvents/kqueue, ReadDirectoryChangesW).
///
/// Every subscription owns its own non-recursive OS watcher, so dropping the
/// subscription closes exactly that watch.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_watch::sources::{EventSource, NotifySource};
///
/// # async fn example() -> hotswap_watch::error::Result<()> {
/// let mut subscription = NotifySource.subscribe("/etc/myapp".as_ref())?;
/// while let Some(event) = subscription.recv().await {
///     println!("{:?} {}", event.op, event.path.display());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifySource;

impl EventSource for NotifySource {
    fn subscribe(&self, path: &Path) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for raw in translate(&event) {
                    // Receiver gone means the subscription was dropped.
                    let _ = tx.send(raw);
                }
            }
            Err(e) => error!(error = %e, "filesystem watcher reported an error"),
        })
        .map_err(|e| subscribe_error(path, e))?;

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| subscribe_error(path, e))?;

        Ok(Subscription::new(rx, watcher))
    }
}

fn subscribe_error(path: &Path, err: notify::Error) -> WatchError {
    match err.kind {
        notify::ErrorKind::Io(io) => WatchError::IoError(io),
        notify::ErrorKind::PathNotFound => {
            WatchError::IoError(std::io::Error::from(std::io::ErrorKind::NotFound))
        }
        other => WatchError::SubscribeError {
            path: path.to_path_buf(),
            reason: format!("{:?}", other),
        },
    }
}

/// Map a `notify` event to one raw event per affected path.
///
/// A rename's destination counts as a creation, matching what a watcher of
/// that destination observes: a file appeared.
pub(crate) fn translate(event: &Event) -> Vec<RawEvent> {
    let uniform = |op: Op| -> Vec<RawEvent> {
        event
            .paths
            .iter()
            .map(|path| RawEvent::new(path.clone(), op))
            .collect()
    };

    match &event.kind {
        EventKind::Create(_) => uniform(Op::CREATE),
        EventKind::Remove(_) => uniform(Op::REMOVE),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => uniform(Op::CREATE),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.iter();
            let mut raw = Vec::with_capacity(2);
            if let Some(from) = paths.next() {
                raw.push(RawEvent::new(from.clone(), Op::RENAME));
            }
            if let Some(to) = paths.next() {
                raw.push(RawEvent::new(to.clone(), Op::CREATE));
            }
            raw
        }
        EventKind::Modify(ModifyKind::Name(_)) => uniform(Op::RENAME),
        EventKind::Modify(ModifyKind::Metadata(_)) => uniform(Op::CHMOD),
        EventKind::Modify(_) => uniform(Op::WRITE),
        // Opening or reading a file is not a change.
        EventKind::Access(_) => Vec::new(),
        EventKind::Any | EventKind::Other => uniform(Op::empty()),
    }
}
