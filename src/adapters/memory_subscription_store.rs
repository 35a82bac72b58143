//! In-process subscription store.

use crate::domain::error::StratforgeError;
use crate::domain::subscription::{NewSubscription, Subscription, SubscriptionHandle};
use crate::ports::subscription_port::SubscriptionPort;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    last_id: u64,
    records: BTreeMap<SubscriptionHandle, Subscription>,
}

#[derive(Debug, Default)]
pub struct MemorySubscriptionStore {
    state: Mutex<State>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StratforgeError> {
        self.state.lock().map_err(|e| StratforgeError::Database {
            reason: e.to_string(),
        })
    }
}

impl SubscriptionPort for MemorySubscriptionStore {
    fn insert(&self, draft: NewSubscription) -> Result<Subscription, StratforgeError> {
        let mut state = self.lock()?;
        state.last_id += 1;
        let subscription = Subscription {
            id: SubscriptionHandle(state.last_id),
            target: draft.target,
            owner: draft.owner,
            values: draft.values,
            enabled: true,
            created_at: draft.created_at,
        };
        state.records.insert(subscription.id, subscription.clone());
        Ok(subscription)
    }

    fn fetch(&self, id: SubscriptionHandle) -> Result<Option<Subscription>, StratforgeError> {
        Ok(self.lock()?.records.get(&id).cloned())
    }

    fn set_enabled(&self, id: SubscriptionHandle, enabled: bool) -> Result<bool, StratforgeError> {
        Ok(match self.lock()?.records.get_mut(&id) {
            Some(record) => {
                record.enabled = enabled;
                true
            }
            None => false,
        })
    }

    fn remove(&self, id: SubscriptionHandle) -> Result<bool, StratforgeError> {
        Ok(self.lock()?.records.remove(&id).is_some())
    }

    fn count(&self) -> Result<usize, StratforgeError> {
        Ok(self.lock()?.records.len())
    }
}
