use crate::subscription::{SubscriberId, SubscriberList, Subscription};
use smallvec::SmallVec;
use std::{cell::RefCell, fmt, mem, rc::Rc};
use tracing::trace;
use trellis_common::Data;

type Callback<T> = Rc<dyn Fn(&T)>;

struct SignalInner<T> {
    value: RefCell<T>,
    /// Subscribers, in subscription order.
    subscribers: RefCell<SmallVec<[(SubscriberId, Callback<T>); 4]>>,
}

impl<T> SubscriberList for SignalInner<T> {
    fn remove_subscriber(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let len = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != len
    }

    fn has_subscriber(&self, id: SubscriberId) -> bool {
        self.subscribers.borrow().iter().any(|(sid, _)| *sid == id)
    }
}

/// An observable value.
///
/// Setting the value synchronously notifies every subscriber, in subscription order, on the
/// calling stack. There is no batching or deferred scheduling.
///
/// # Reentrancy
///
/// No internal borrow is held while subscribers run: a subscriber may read or set this signal or
/// any other, and may subscribe or unsubscribe. The subscriber list is snapshotted before
/// notification; subscribers added during a notification are first called on the next `set`,
/// subscribers removed during a notification are not called anymore.
///
/// # Usage
///
/// ```
/// use trellis_signal::Signal;
///
/// let focus = Signal::new(None::<String>);
/// let mut sub = focus.subscribe(|v| println!("focus is now {:?}", v));
/// focus.set(Some("session/thread-1".to_string()));
/// sub.unsubscribe();
/// ```
pub struct Signal<T>(Rc<SignalInner<T>>);

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Signal(self.0.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Signal")
            .field("value", &*self.0.value.borrow())
            .field("subscribers", &self.0.subscribers.borrow().len())
            .finish()
    }
}

impl<T: Default + Clone + 'static> Default for Signal<T> {
    fn default() -> Self {
        Signal::new(T::default())
    }
}

impl<T: 'static> Signal<T> {
    /// Creates a new signal holding the specified value.
    pub fn new(value: T) -> Signal<T> {
        Signal(Rc::new(SignalInner {
            value: RefCell::new(value),
            subscribers: RefCell::new(SmallVec::new()),
        }))
    }

    /// Borrows the current value.
    ///
    /// Setting the signal from inside `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.0.value.borrow())
    }

    /// Registers a subscriber, called with the new value each time the signal is set.
    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> Subscription {
        let id = SubscriberId::next();
        self.0.subscribers.borrow_mut().push((id, Rc::new(f)));
        let inner = Rc::downgrade(&self.0);
        Subscription::new(id, inner)
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.0.subscribers.borrow().len()
    }

    /// Removes all subscribers.
    ///
    /// Outstanding `Subscription` handles become inert.
    pub fn dispose(&self) {
        // drop the callbacks outside of the borrow: they may own other signals
        let subscribers = mem::take(&mut *self.0.subscribers.borrow_mut());
        if !subscribers.is_empty() {
            trace!("signal disposed with {} subscribers", subscribers.len());
        }
        drop(subscribers);
    }

    /// Returns whether both handles refer to the same signal.
    pub fn ptr_eq(&self, other: &Signal<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Returns the current value.
    pub fn get(&self) -> T {
        self.0.value.borrow().clone()
    }

    /// Sets the value and notifies the subscribers.
    pub fn set(&self, value: T) {
        self.replace(value);
    }

    /// Sets the value, notifies the subscribers, and returns the previous value.
    pub fn replace(&self, value: T) -> T {
        let prev = mem::replace(&mut *self.0.value.borrow_mut(), value);
        self.notify();
        prev
    }

    /// Notifies the subscribers with the current value, without changing it.
    pub fn notify(&self) {
        let subscribers: SmallVec<[(SubscriberId, Callback<T>); 4]> = self.0.subscribers.borrow().clone();
        if subscribers.is_empty() {
            return;
        }
        let value = self.get();
        for (id, callback) in subscribers {
            // skip subscribers removed by a previous callback of this round
            if self.0.has_subscriber(id) {
                callback(&value);
            }
        }
    }
}

impl<T: Data> Signal<T> {
    /// Sets the value if it differs from the current one.
    ///
    /// Returns whether the value changed (and subscribers were notified).
    pub fn update(&self, value: T) -> bool {
        let changed = !self.0.value.borrow().same(&value);
        if changed {
            self.set(value);
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::Signal;
    use std::{cell::RefCell, rc::Rc};

    #[test]
    fn set_notifies_in_subscription_order() {
        let signal = Signal::new(0);
        let log = Rc::new(RefCell::new(vec![]));
        let _a = signal.subscribe({
            let log = log.clone();
            move |v| log.borrow_mut().push(("a", *v))
        });
        let _b = signal.subscribe({
            let log = log.clone();
            move |v| log.borrow_mut().push(("b", *v))
        });
        signal.set(3);
        assert_eq!(signal.get(), 3);
        assert_eq!(*log.borrow(), vec![("a", 3), ("b", 3)]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let signal = Signal::new(0);
        let hits = Rc::new(RefCell::new(0));
        let mut sub = signal.subscribe({
            let hits = hits.clone();
            move |_| *hits.borrow_mut() += 1
        });
        assert!(sub.is_active());
        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        assert!(!sub.is_active());
        signal.set(1);
        assert_eq!(*hits.borrow(), 0);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn subscriber_may_set_other_and_same_signal() {
        let a = Signal::new(0);
        let b = Signal::new(0);
        let _forward = a.subscribe({
            let b = b.clone();
            move |v| b.set(*v * 10)
        });
        // clamps the value by setting the signal it observes
        let _clamp = a.subscribe({
            let a2 = a.clone();
            move |v| {
                if *v > 5 {
                    a2.set(5);
                }
            }
        });
        a.set(7);
        assert_eq!(a.get(), 5);
        assert_eq!(b.get(), 50);
    }

    #[test]
    fn subscriber_removed_mid_notification_is_skipped() {
        let signal = Signal::new(0);
        let hits = Rc::new(RefCell::new(vec![]));
        let second: Rc<RefCell<Option<crate::Subscription>>> = Rc::new(RefCell::new(None));
        let _first = signal.subscribe({
            let second = second.clone();
            move |_| {
                if let Some(mut sub) = second.borrow_mut().take() {
                    sub.unsubscribe();
                }
            }
        });
        let sub = signal.subscribe({
            let hits = hits.clone();
            move |v| hits.borrow_mut().push(*v)
        });
        *second.borrow_mut() = Some(sub);
        signal.set(1);
        signal.set(2);
        assert!(hits.borrow().is_empty());
    }

    #[test]
    fn update_skips_same_value() {
        let signal = Signal::new(true);
        let hits = Rc::new(RefCell::new(0));
        let _sub = signal.subscribe({
            let hits = hits.clone();
            move |_| *hits.borrow_mut() += 1
        });
        assert!(!signal.update(true));
        assert!(signal.update(false));
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn dispose_clears_subscribers() {
        let signal = Signal::new(String::new());
        let sub = signal.subscribe(|_| {});
        let _other = signal.subscribe(|_| {});
        assert_eq!(signal.subscriber_count(), 2);
        signal.dispose();
        assert_eq!(signal.subscriber_count(), 0);
        assert!(!sub.is_active());
        signal.set("still usable".to_string());
        assert_eq!(signal.get(), "still usable");
    }
}
