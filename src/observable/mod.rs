//! Latest-value observables.
//!
//! A [`LiveValue`] holds the most recently published value and a count of attached
//! subscribers. Its [`LiveSource`] is activated when the count goes from zero to one and
//! deactivated when it drops back to zero, which is where the service adapters register and
//! remove their listeners.

use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Hooks driven by the subscriber count of a [`LiveValue`].
///
/// Both hooks run while the count is locked, so they must not block; spawn work instead.
pub trait LiveSource<T>: Send + Sync + 'static {
    fn on_active(&self, publisher: Publisher<T>);
    fn on_inactive(&self);
}

struct NoSource;

impl<T> LiveSource<T> for NoSource {
    fn on_active(&self, _publisher: Publisher<T>) {}
    fn on_inactive(&self) {}
}

struct Inner<T> {
    sender: Arc<watch::Sender<Option<Arc<T>>>>,
    observers: Mutex<usize>,
    source: Box<dyn LiveSource<T>>,
}

impl<T: Send + Sync + 'static> Inner<T> {
    fn publisher(&self) -> Publisher<T> {
        Publisher {
            sender: self.sender.clone(),
        }
    }

    fn acquire(&self) {
        let mut observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        if *observers == 0 {
            self.source.on_active(self.publisher());
        }
        *observers += 1;
    }

    fn release(&self) {
        let mut observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        *observers = observers.saturating_sub(1);
        if *observers == 0 {
            self.source.on_inactive();
        }
    }
}

/// A shareable cell holding the latest published value.
pub struct LiveValue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for LiveValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> LiveValue<T> {
    pub fn new(source: impl LiveSource<T>) -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                sender: Arc::new(sender),
                observers: Mutex::new(0),
                source: Box::new(source),
            }),
        }
    }

    /// A value with no activation hooks; updates come only through [`LiveValue::publisher`].
    pub fn detached() -> Self {
        Self::new(NoSource)
    }

    pub fn publisher(&self) -> Publisher<T> {
        self.inner.publisher()
    }

    /// The latest published value.
    pub fn value(&self) -> Option<Arc<T>> {
        self.inner.sender.borrow().clone()
    }

    pub fn observer_count(&self) -> usize {
        *self.inner.observers.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn has_active_observers(&self) -> bool {
        self.observer_count() > 0
    }

    /// Attaches a subscriber. The returned [`Subscription`] detaches when dropped.
    pub fn subscribe(&self) -> Subscription<T> {
        let receiver = self.inner.sender.subscribe();
        self.inner.acquire();
        Subscription {
            receiver,
            inner: self.inner.clone(),
        }
    }
}

/// Write side of a [`LiveValue`].
pub struct Publisher<T> {
    sender: Arc<watch::Sender<Option<Arc<T>>>>,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T> Publisher<T> {
    /// Replaces the current value and wakes every subscriber.
    pub fn publish(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.sender.send_replace(Some(value.clone()));
        value
    }

    pub fn current(&self) -> Option<Arc<T>> {
        self.sender.borrow().clone()
    }
}

/// An attached subscriber of a [`LiveValue`].
pub struct Subscription<T: Send + Sync + 'static> {
    receiver: watch::Receiver<Option<Arc<T>>>,
    inner: Arc<Inner<T>>,
}

impl<T: Send + Sync + 'static> Subscription<T> {
    /// The latest published value, whether or not it was seen already.
    pub fn value(&self) -> Option<Arc<T>> {
        self.receiver.borrow().clone()
    }

    /// Waits for the next value published after the last one seen by this subscription.
    pub async fn changed(&mut self) -> Arc<T> {
        loop {
            // The sender lives in `inner`, which this subscription keeps alive.
            let _ = self.receiver.changed().await;
            if let Some(value) = self.receiver.borrow_and_update().clone() {
                return value;
            }
        }
    }

    /// Waits until a value matching `predicate` is current and returns it.
    pub async fn wait_for(&mut self, mut predicate: impl FnMut(&T) -> bool) -> Arc<T> {
        if let Some(value) = self.receiver.borrow_and_update().clone() {
            if predicate(&value) {
                return value;
            }
        }
        loop {
            let value = self.changed().await;
            if predicate(&value) {
                return value;
            }
        }
    }

    pub fn unsubscribe(self) {}
}

impl<T: Send + Sync + 'static> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.inner.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        active: Arc<AtomicUsize>,
        inactive: Arc<AtomicUsize>,
    }

    impl LiveSource<u32> for Counting {
        fn on_active(&self, publisher: Publisher<u32>) {
            self.active.fetch_add(1, Ordering::SeqCst);
            publisher.publish(7);
        }

        fn on_inactive(&self) {
            self.inactive.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_activation_follows_observer_count() {
        let source = Counting::default();
        let active = source.active.clone();
        let inactive = source.inactive.clone();
        let live = LiveValue::new(source);

        let first = live.subscribe();
        let second = live.subscribe();
        assert_eq!(active.load(Ordering::SeqCst), 1);
        assert_eq!(live.observer_count(), 2);

        drop(first);
        assert_eq!(inactive.load(Ordering::SeqCst), 0);
        second.unsubscribe();
        assert_eq!(inactive.load(Ordering::SeqCst), 1);
        assert!(!live.has_active_observers());

        let _third = live.subscribe();
        assert_eq!(active.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_subscriber_sees_only_later_updates() {
        let live = LiveValue::<u32>::detached();
        let publisher = live.publisher();
        publisher.publish(1);

        let mut subscription = live.subscribe();
        assert_eq!(subscription.value().as_deref(), Some(&1));

        publisher.publish(2);
        assert_eq!(*subscription.changed().await, 2);

        publisher.publish(3);
        publisher.publish(4);
        assert_eq!(*subscription.changed().await, 4);
        assert_eq!(live.value().as_deref(), Some(&4));
    }

    #[tokio::test]
    async fn test_value_published_on_activation_is_delivered() {
        let live = LiveValue::new(Counting::default());
        let mut subscription = live.subscribe();
        assert_eq!(*subscription.changed().await, 7);
    }

    #[tokio::test]
    async fn test_wait_for_checks_current_value_first() {
        let live = LiveValue::<u32>::detached();
        live.publisher().publish(5);
        let mut subscription = live.subscribe();
        assert_eq!(*subscription.wait_for(|v| *v == 5).await, 5);
    }
}
