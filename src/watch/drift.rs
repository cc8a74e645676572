//! Wall-clock change detection.

use crate::core::{NotifierRegistry, TimeNotifier, run_queue};
use crate::error::{Result, WatchError};
use crate::settings::ClockSettings;
use crate::sources::{SystemClock, WallClock};
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[cfg(feature = "metrics")]
use crate::metrics::WatchMetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

type TimeQueue = mpsc::UnboundedSender<DateTime<Utc>>;

#[derive(Debug, Clone, Copy)]
struct Sample {
    wall: DateTime<Utc>,
    boot: DateTime<Utc>,
}

struct Inner {
    settings: ClockSettings,
    clock: Arc<dyn WallClock>,
    registry: NotifierRegistry,
    /// Broadcast targets in registration order. Also serializes registration
    /// against an in-flight broadcast.
    observers: Mutex<Vec<(String, TimeQueue)>>,
    last: RwLock<Option<Sample>>,
    started: AtomicBool,
    sampler: Mutex<Option<JoinHandle<()>>>,
    #[cfg(feature = "metrics")]
    metrics: OnceLock<WatchMetrics>,
}

impl Inner {
    fn sample(&self) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        let uptime = TimeDelta::from_std(self.clock.uptime()).unwrap_or(TimeDelta::zero());
        let current = Sample {
            wall: now,
            boot: now.checked_sub_signed(uptime).unwrap_or(now),
        };

        let previous = self.last.write().replace(current)?;

        let threshold = TimeDelta::from_std(self.settings.threshold()).unwrap_or(TimeDelta::MAX);
        let steady = now >= previous.wall
            && previous
                .wall
                .checked_add_signed(threshold)
                .is_none_or(|limit| now <= limit);
        if steady {
            return None;
        }

        let at = self.clock.now();
        info!(
            previous = %previous.wall,
            current = %now,
            drift_ms = (now - previous.wall).num_milliseconds(),
            "wall clock changed"
        );
        #[cfg(feature = "metrics")]
        if let Some(metrics) = self.metrics.get() {
            metrics.record_clock_change();
        }

        let observers = self.observers.lock();
        for (name, queue) in observers.iter() {
            if queue.send(at).is_err() {
                debug!(name = %name, "time watch already closed");
            }
        }
        Some(at)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.sampler.get_mut().take() {
            task.abort();
        }
    }
}

/// Detects manual wall-clock changes and suspend/resume gaps.
///
/// The detector samples the wall clock every `accuracy` interval. When a
/// sample is earlier than the previous one, or later than the previous one
/// plus `threshold`, every registered [`TimeNotifier`] receives the current
/// time. The first sample only establishes the baseline.
///
/// Each observer has its own queue and dispatch task, so a slow or failing
/// observer never delays the others. Failures are logged and dropped.
///
/// The baseline lives in memory only: a clock change that happens while the
/// process is not running goes unnoticed.
///
/// # Examples
///
/// ```rust,no_run
/// use async_trait::async_trait;
/// use chrono::{DateTime, Utc};
/// use hotswap_watch::core::TimeNotifier;
/// use hotswap_watch::watch::ClockDriftDetector;
/// use std::sync::Arc;
///
/// struct ScheduleRebuilder;
///
/// #[async_trait]
/// impl TimeNotifier for ScheduleRebuilder {
///     async fn notify(&self, at: DateTime<Utc>) -> hotswap_watch::error::Result<()> {
///         println!("clock changed, now {}", at);
///         Ok(())
///     }
/// }
///
/// # async fn example() -> hotswap_watch::error::Result<()> {
/// let detector = ClockDriftDetector::new();
/// let observer: Arc<dyn TimeNotifier> = Arc::new(ScheduleRebuilder);
/// detector.add("scheduler", Arc::downgrade(&observer))?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ClockDriftDetector {
    inner: Arc<Inner>,
}

impl ClockDriftDetector {
    /// Create a detector on the system clock with default settings.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()), ClockSettings::default())
    }

    /// Create a detector on a custom clock.
    pub fn with_clock(clock: Arc<dyn WallClock>, settings: ClockSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                clock,
                registry: NotifierRegistry::new(),
                observers: Mutex::new(Vec::new()),
                last: RwLock::new(None),
                started: AtomicBool::new(false),
                sampler: Mutex::new(None),
                #[cfg(feature = "metrics")]
                metrics: OnceLock::new(),
            }),
        }
    }

    /// Attach a metrics collector. Only the first call has an effect.
    #[cfg(feature = "metrics")]
    pub fn set_metrics(&self, metrics: WatchMetrics) {
        let _ = self.inner.metrics.set(metrics);
    }

    /// Register `observer` under `name`.
    ///
    /// Starts the sampling loop on first use unless
    /// [`ClockSettings::autostart`] is off. Must be called from within a
    /// Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`WatchError::EmptyKey`] if `name` is empty
    /// - [`WatchError::NilObserver`] if `observer` can no longer be upgraded
    /// - [`WatchError::DuplicateKey`] if `name` is taken
    pub fn add(&self, name: impl Into<String>, observer: Weak<dyn TimeNotifier>) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(WatchError::EmptyKey);
        }
        if observer.strong_count() == 0 {
            return Err(WatchError::NilObserver);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut observers = self.inner.observers.lock();
            let label = name.clone();
            self.inner.registry.register(name.clone(), move |token| {
                tokio::spawn(run_queue(rx, token, move |at| {
                    let observer = observer.clone();
                    let label = label.clone();
                    async move { deliver(&label, &observer, at).await }
                }))
            })?;
            observers.push((name.clone(), tx));
        }

        info!(name = %name, "time observer registered");
        if self.inner.settings.autostart {
            self.start();
        }
        Ok(())
    }

    /// Unregister the observer named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::NotRegistered`] if no observer has that name.
    pub async fn remove(&self, name: &str) -> Result<()> {
        self.inner.observers.lock().retain(|(n, _)| n != name);
        self.inner.registry.cancel(name).await?;
        info!(name, "time observer removed");
        Ok(())
    }

    /// Registered observer names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.inner
            .observers
            .lock()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Take one sample now.
    ///
    /// Returns the broadcast timestamp if a clock change was detected.
    pub fn sample(&self) -> Option<DateTime<Utc>> {
        self.inner.sample()
    }

    /// Spawn the periodic sampling loop. Later calls do nothing.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return;
        }

        let accuracy = self.inner.settings.accuracy();
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(accuracy);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                inner.sample();
            }
        });
        *self.inner.sampler.lock() = Some(task);
        debug!(accuracy_ms = accuracy.as_millis() as u64, "clock sampler started");
    }

    /// Whether the sampling loop has been started.
    pub fn is_running(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    /// Wall-clock time of the most recent sample.
    pub fn last_sample(&self) -> Option<DateTime<Utc>> {
        self.inner.last.read().map(|sample| sample.wall)
    }

    /// Estimated boot time (wall clock minus uptime) at the most recent sample.
    ///
    /// Stable while time passes normally; shifts by exactly the amount the
    /// wall clock was moved.
    pub fn boot_time(&self) -> Option<DateTime<Utc>> {
        self.inner.last.read().map(|sample| sample.boot)
    }

    /// The settings this detector was created with.
    pub fn settings(&self) -> &ClockSettings {
        &self.inner.settings
    }

    /// Stop sampling and cancel every observer watch.
    ///
    /// The detector stays usable: a later [`add`](Self::add) or
    /// [`start`](Self::start) resumes sampling against the last baseline.
    pub async fn shutdown(&self) {
        if let Some(task) = self.inner.sampler.lock().take() {
            task.abort();
        }
        self.inner.started.store(false, Ordering::Release);
        self.inner.observers.lock().clear();
        self.inner.registry.shutdown().await;
    }
}

impl Default for ClockDriftDetector {
    fn default() -> Self {
        Self::new()
    }
}

async fn deliver(name: &str, observer: &Weak<dyn TimeNotifier>, at: DateTime<Utc>) {
    let Some(observer) = observer.upgrade() else {
        debug!(name, "time observer dropped, discarding event");
        return;
    };
    match observer.notify(at).await {
        Ok(()) => debug!(name, %at, "clock change delivered"),
        Err(e) => warn!(name, error = %e, "time observer failed"),
    }
}
