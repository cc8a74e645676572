//! Change callbacks for a [`ConfigSlot`](super::ConfigSlot).

use parking_lot::RwLock;
use std::sync::{Arc, Weak};

type Callback = Arc<dyn Fn() + Send + Sync>;

struct Inner {
    subscribers: Vec<(u64, Callback)>,
    next_id: u64,
}

/// Handle for a subscription; dropping it unsubscribes.
#[must_use = "dropping the handle unsubscribes immediately"]
pub struct SubscriptionHandle {
    id: u64,
    registry: Weak<RwLock<Inner>>,
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let id = self.id;
            registry.write().subscribers.retain(|(sub_id, _)| *sub_id != id);
        }
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle").field("id", &self.id).finish()
    }
}

/// Callbacks invoked after every successful swap.
pub(crate) struct SubscriberRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl SubscriberRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                subscribers: Vec::new(),
                next_id: 0,
            })),
        }
    }

    pub(crate) fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut inner = self.inner.write();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, Arc::new(callback)));

        SubscriptionHandle {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Invoke every callback in subscription order.
    ///
    /// Callbacks run outside the lock, so they may subscribe or drop handles.
    pub(crate) fn notify_all(&self) {
        let callbacks: Vec<Callback> = self
            .inner
            .read()
            .subscribers
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback();
        }
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.inner.read().subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscribe_and_notify() {
        let registry = SubscriberRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = Arc::clone(&counter);
        let _handle = registry.subscribe(move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        registry.notify_all();
        registry.notify_all();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_notify_in_subscription_order() {
        let registry = SubscriberRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..3)
            .map(|i| {
                let order = Arc::clone(&order);
                registry.subscribe(move || order.lock().push(i))
            })
            .collect();

        registry.notify_all();
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        drop(handles);
    }

    #[test]
    fn test_drop_unsubscribes_immediately() {
        let registry = SubscriberRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = Arc::clone(&counter);
        let handle = registry.subscribe(move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(registry.subscriber_count(), 1);

        drop(handle);
        assert_eq!(registry.subscriber_count(), 0);

        registry.notify_all();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handle_outliving_registry() {
        let registry = SubscriberRegistry::new();
        let handle = registry.subscribe(|| {});
        drop(registry);
        drop(handle);
    }

    #[test]
    fn test_callback_may_subscribe() {
        let registry = Arc::new(SubscriberRegistry::new());
        let spawned = Arc::new(Mutex::new(Vec::new()));

        let inner_registry = Arc::clone(&registry);
        let inner_spawned = Arc::clone(&spawned);
        let _handle = registry.subscribe(move || {
            inner_spawned.lock().push(inner_registry.subscribe(|| {}));
        });

        registry.notify_all();
        assert_eq!(registry.subscriber_count(), 2);
    }
}
