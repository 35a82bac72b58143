//! Subscription persistence port trait.

use crate::domain::error::StratforgeError;
use crate::domain::subscription::{NewSubscription, Subscription, SubscriptionHandle};

pub trait SubscriptionPort {
    /// Persist a new subscription, assigning the next sequential id.
    fn insert(&self, draft: NewSubscription) -> Result<Subscription, StratforgeError>;

    fn fetch(&self, id: SubscriptionHandle) -> Result<Option<Subscription>, StratforgeError>;

    /// Returns `false` when no subscription has this id.
    fn set_enabled(&self, id: SubscriptionHandle, enabled: bool) -> Result<bool, StratforgeError>;

    /// Returns `false` when no subscription has this id.
    fn remove(&self, id: SubscriptionHandle) -> Result<bool, StratforgeError>;

    fn count(&self) -> Result<usize, StratforgeError>;
}

impl<P: SubscriptionPort + ?Sized> SubscriptionPort for Box<P> {
    fn insert(&self, draft: NewSubscription) -> Result<Subscription, StratforgeError> {
        (**self).insert(draft)
    }

    fn fetch(&self, id: SubscriptionHandle) -> Result<Option<Subscription>, StratforgeError> {
        (**self).fetch(id)
    }

    fn set_enabled(&self, id: SubscriptionHandle, enabled: bool) -> Result<bool, StratforgeError> {
        (**self).set_enabled(id, enabled)
    }

    fn remove(&self, id: SubscriptionHandle) -> Result<bool, StratforgeError> {
        (**self).remove(id)
    }

    fn count(&self) -> Result<usize, StratforgeError> {
        (**self).count()
    }
}
