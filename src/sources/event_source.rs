//! Raw filesystem event source trait.

use crate::error::Result;
use std::any::Any;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Set of raw operation bits reported by an event source.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Op(u8);

impl Op {
    /// A path was created or moved into place.
    pub const CREATE: Op = Op(1);
    /// File contents were written.
    pub const WRITE: Op = Op(1 << 1);
    /// A path was deleted.
    pub const REMOVE: Op = Op(1 << 2);
    /// A path was renamed away.
    pub const RENAME: Op = Op(1 << 3);
    /// Permissions or other metadata changed.
    pub const CHMOD: Op = Op(1 << 4);

    const ALL: u8 = 0b1_1111;

    /// No bits set.
    pub const fn empty() -> Self {
        Op(0)
    }

    /// Build from raw bits; unknown bits are discarded.
    pub const fn from_bits(bits: u8) -> Self {
        Op(bits & Self::ALL)
    }

    /// Raw bit value.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit of `other` is set.
    pub const fn contains(self, other: Op) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any bit of `other` is set.
    pub const fn intersects(self, other: Op) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether no bits are set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Op {
    type Output = Op;

    fn bitor(self, rhs: Op) -> Op {
        Op(self.0 | rhs.0)
    }
}

impl BitOrAssign for Op {
    fn bitor_assign(&mut self, rhs: Op) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Op, &str); 5] = [
            (Op::CREATE, "CREATE"),
            (Op::WRITE, "WRITE"),
            (Op::REMOVE, "REMOVE"),
            (Op::RENAME, "RENAME"),
            (Op::CHMOD, "CHMOD"),
        ];
        let set: Vec<&str> = NAMES
            .iter()
            .filter(|(op, _)| self.contains(*op))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            f.write_str("Op(empty)")
        } else {
            write!(f, "Op({})", set.join(" | "))
        }
    }
}

/// One unclassified event for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Path the operation applies to
    pub path: PathBuf,
    /// Operation bits
    pub op: Op,
}

impl RawEvent {
    /// Create a raw event.
    pub fn new(path: impl Into<PathBuf>, op: Op) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }
}

/// An open subscription: a stream of raw events for one path.
///
/// Dropping the subscription (or calling [`unsubscribe`](Self::unsubscribe))
/// releases whatever the source keeps alive for it.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<RawEvent>,
    _guard: Box<dyn Any + Send>,
}

impl Subscription {
    /// Wrap an event receiver together with the handle that keeps the
    /// underlying OS watch alive.
    pub fn new(events: mpsc::UnboundedReceiver<RawEvent>, guard: impl Any + Send) -> Self {
        Self {
            events,
            _guard: Box::new(guard),
        }
    }

    /// A subscription that never yields anything.
    pub fn closed() -> Self {
        let (_tx, rx) = mpsc::unbounded_channel();
        Self::new(rx, ())
    }

    /// Wait for the next event. Returns `None` once the source has stopped.
    pub async fn recv(&mut self) -> Option<RawEvent> {
        self.events.recv().await
    }

    /// Stop accepting new events; already buffered events can still be received.
    pub fn close(&mut self) {
        self.events.close();
    }

    /// End the subscription.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Opens per-path subscriptions to filesystem changes.
///
/// The subscription must report changes to the path itself and, when the
/// path is a directory, to its direct children. Subscribing to a path that
/// does not exist must fail.
pub trait EventSource: Send + Sync + 'static {
    /// Start receiving raw events for `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be watched.
    fn subscribe(&self, path: &Path) -> Result<Subscription>;
}
