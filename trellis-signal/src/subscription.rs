use std::{fmt, num::NonZeroU64, rc::Weak};
use trellis_common::counter::Counter;

/// Identifies a subscriber within a signal.
#[derive(Clone, Copy, Hash, PartialEq, Eq, Ord, PartialOrd)]
#[repr(transparent)]
pub struct SubscriberId(NonZeroU64);

static SUBSCRIBER_ID_COUNTER: Counter = Counter::new();

impl SubscriberId {
    pub(crate) fn next() -> SubscriberId {
        SubscriberId(SUBSCRIBER_ID_COUNTER.next_nonzero())
    }
}

impl fmt::Debug for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Type-erased view of a signal's subscriber list.
pub(crate) trait SubscriberList {
    fn remove_subscriber(&self, id: SubscriberId) -> bool;
    fn has_subscriber(&self, id: SubscriberId) -> bool;
}

/// Handle returned by `Signal::subscribe`.
///
/// Dropping the handle does *not* unsubscribe: call `unsubscribe` explicitly. The handle only holds
/// a weak reference, so it never keeps the signal alive.
pub struct Subscription {
    id: SubscriberId,
    source: Option<Weak<dyn SubscriberList>>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, source: Weak<dyn SubscriberList>) -> Subscription {
        Subscription {
            id,
            source: Some(source),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Removes the subscriber from its signal.
    ///
    /// Returns whether a subscriber was actually removed. Calling this more than once, or after the
    /// signal was disposed or dropped, is a no-op.
    pub fn unsubscribe(&mut self) -> bool {
        match self.source.take().and_then(|source| source.upgrade()) {
            Some(source) => source.remove_subscriber(self.id),
            None => false,
        }
    }

    /// Whether the subscriber is still registered on a live signal.
    pub fn is_active(&self) -> bool {
        self.source
            .as_ref()
            .and_then(|source| source.upgrade())
            .map_or(false, |source| source.has_subscriber(self.id))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
