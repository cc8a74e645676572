//! Wall-clock and uptime sampling.

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of wall-clock samples for the drift detector.
pub trait WallClock: Send + Sync + 'static {
    /// Current wall-clock time. Must not carry any monotonic component:
    /// this is what an administrator can change.
    fn now(&self) -> DateTime<Utc>;

    /// Time since the host booted; unaffected by wall-clock changes.
    fn uptime(&self) -> Duration;
}

/// The host's real clock.
#[derive(Debug, Clone)]
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    /// Create a system clock.
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn uptime(&self) -> Duration {
        host_uptime().unwrap_or_else(|| self.started.elapsed())
    }
}

#[cfg(target_os = "linux")]
fn host_uptime() -> Option<Duration> {
    let text = std::fs::read_to_string("/proc/uptime").ok()?;
    let seconds: f64 = text.split_whitespace().next()?.parse().ok()?;
    Some(Duration::from_secs_f64(seconds))
}

// Falls back to process uptime; boot-time estimates are then process start times.
#[cfg(not(target_os = "linux"))]
fn host_uptime() -> Option<Duration> {
    None
}

/// A hand-driven clock for deterministic tests.
///
/// [`advance`](Self::advance) models normal passage of time (wall clock and
/// uptime move together); [`jump`](Self::jump) models someone setting the
/// clock (only the wall clock moves).
///
/// # Examples
///
/// ```rust
/// use chrono::TimeDelta;
/// use hotswap_watch::sources::{ManualClock, WallClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::default();
/// let start = clock.now();
///
/// clock.advance(Duration::from_secs(1));
/// clock.jump(TimeDelta::hours(-1));
/// assert_eq!(clock.now() - start, TimeDelta::seconds(1) - TimeDelta::hours(1));
/// assert_eq!(clock.uptime(), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

#[derive(Debug)]
struct ManualState {
    now: DateTime<Utc>,
    uptime: Duration,
}

impl ManualClock {
    /// Start at `now` with zero uptime.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                now,
                uptime: Duration::ZERO,
            })),
        }
    }

    /// Let `elapsed` pass normally.
    pub fn advance(&self, elapsed: Duration) {
        let mut state = self.state.lock();
        state.now += TimeDelta::from_std(elapsed).unwrap_or(TimeDelta::MAX);
        state.uptime += elapsed;
    }

    /// Move only the wall clock, forwards or backwards.
    pub fn jump(&self, delta: TimeDelta) {
        self.state.lock().now += delta;
    }

    /// Set the wall clock to an absolute time.
    pub fn set(&self, now: DateTime<Utc>) {
        self.state.lock().now = now;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.state.lock().now
    }

    fn uptime(&self) -> Duration {
        self.state.lock().uptime
    }
}
