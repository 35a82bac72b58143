//! Subscriptions and the subscription manager.
//!
//! A subscription fixes the sub-slot values of one strategy (or of every
//! member of a bundle) for one owner. The manager validates new
//! subscriptions against the declared sub-slot table and enforces owner-only
//! lifecycle changes; persistence sits behind [`SubscriptionPort`].

use crate::domain::binding::PROXY_SLOT;
use crate::domain::bundle::BundleKey;
use crate::domain::encoder::StrategyId;
use crate::domain::error::StratforgeError;
use crate::domain::strategy::{Strategy, SubSlotDecl};
use crate::domain::strategy_store::{BundleId, StrategyStore};
use crate::domain::value::AbiValue;
use crate::ports::subscription_port::SubscriptionPort;
use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, B256, keccak256};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(pub u64);

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionTarget {
    Strategy(StrategyId),
    Bundle(BundleKey),
}

impl fmt::Display for SubscriptionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionTarget::Strategy(id) => write!(f, "strategy {id}"),
            SubscriptionTarget::Bundle(key) => write!(f, "bundle {key}"),
        }
    }
}

/// A validated subscription not yet given an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubscription {
    pub target: SubscriptionTarget,
    pub owner: Address,
    pub values: Vec<(String, AbiValue)>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: SubscriptionHandle,
    pub target: SubscriptionTarget,
    pub owner: Address,
    /// Sub-slot values in declaration order.
    pub values: Vec<(String, AbiValue)>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn value(&self, name: &str) -> Option<&AbiValue> {
        self.values
            .iter()
            .find(|(slot, _)| slot == name)
            .map(|(_, value)| value)
    }

    /// Value of a sub-slot as seen by a binding; `proxy` is the owner.
    pub fn resolve(&self, name: &str) -> Result<AbiValue, StratforgeError> {
        if name == PROXY_SLOT {
            return Ok(AbiValue::Address(self.owner));
        }
        self.value(name)
            .cloned()
            .ok_or_else(|| StratforgeError::UndeclaredSubSlot {
                operation: format!("subscription {}", self.id),
                name: name.to_string(),
            })
    }

    /// keccak256 over the ABI encoding of target, owner and stored values.
    pub fn hash(&self) -> B256 {
        let (target, is_bundle) = match self.target {
            SubscriptionTarget::Strategy(id) => (DynSolValue::FixedBytes(id.0, 32), false),
            SubscriptionTarget::Bundle(key) => (DynSolValue::FixedBytes(key.0, 32), true),
        };
        let words = self
            .values
            .iter()
            .map(|(_, value)| {
                DynSolValue::FixedBytes(B256::from_slice(&value.to_sol().abi_encode()), 32)
            })
            .collect();
        let encoded = DynSolValue::Tuple(vec![
            target,
            DynSolValue::Bool(is_bundle),
            DynSolValue::Address(self.owner),
            DynSolValue::Array(words),
        ])
        .abi_encode();
        keccak256(encoded)
    }
}

pub struct SubscriptionManager<P: SubscriptionPort> {
    port: P,
}

impl<P: SubscriptionPort> SubscriptionManager<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    /// Subscribe `owner` to a single strategy.
    pub fn subscribe(
        &self,
        strategy: &Strategy,
        owner: Address,
        values: BTreeMap<String, AbiValue>,
    ) -> Result<SubscriptionHandle, StratforgeError> {
        let target = SubscriptionTarget::Strategy(strategy.id());
        self.create(target, strategy.sub_slots(), owner, values)
    }

    /// Subscribe `owner` to every member of a bundle through their shared
    /// sub-slot table.
    pub fn subscribe_bundle(
        &self,
        store: &StrategyStore,
        bundle: BundleId,
        owner: Address,
        values: BTreeMap<String, AbiValue>,
    ) -> Result<SubscriptionHandle, StratforgeError> {
        let sub_slots = store.bundle_sub_slots(bundle)?;
        let key = store.bundle_key(bundle)?;
        self.create(SubscriptionTarget::Bundle(key), sub_slots, owner, values)
    }

    fn create(
        &self,
        target: SubscriptionTarget,
        sub_slots: &[SubSlotDecl],
        owner: Address,
        mut values: BTreeMap<String, AbiValue>,
    ) -> Result<SubscriptionHandle, StratforgeError> {
        let mut ordered = Vec::with_capacity(sub_slots.len());
        for slot in sub_slots {
            let value = values
                .remove(&slot.name)
                .ok_or_else(|| StratforgeError::MissingSubSlotValue {
                    name: slot.name.clone(),
                })?;
            if value.slot_type() != slot.ty {
                return Err(StratforgeError::TypeMismatch {
                    name: slot.name.clone(),
                    expected: slot.ty,
                    found: value.slot_type(),
                });
            }
            ordered.push((slot.name.clone(), value));
        }
        if let Some(extra) = values.into_keys().next() {
            return Err(StratforgeError::UndeclaredSubSlot {
                operation: target.to_string(),
                name: extra,
            });
        }

        let subscription = self.port.insert(NewSubscription {
            target,
            owner,
            values: ordered,
            created_at: Utc::now(),
        })?;
        info!(
            id = %subscription.id,
            %target,
            %owner,
            hash = %subscription.hash(),
            "created subscription"
        );
        Ok(subscription.id)
    }

    /// Load a subscription whatever its state.
    pub fn load(&self, handle: SubscriptionHandle) -> Result<Subscription, StratforgeError> {
        self.port
            .fetch(handle)?
            .ok_or(StratforgeError::UnknownSubscription { id: handle.0 })
    }

    /// Load a subscription that may currently be executed.
    pub fn load_active(&self, handle: SubscriptionHandle) -> Result<Subscription, StratforgeError> {
        let subscription = self.load(handle)?;
        if !subscription.enabled {
            return Err(StratforgeError::InactiveSubscription { id: handle.0 });
        }
        Ok(subscription)
    }

    pub fn resolve(&self, handle: SubscriptionHandle, name: &str) -> Result<AbiValue, StratforgeError> {
        self.load_active(handle)?.resolve(name)
    }

    pub fn revoke(&self, handle: SubscriptionHandle, caller: Address) -> Result<(), StratforgeError> {
        self.check_owner(handle, caller)?;
        if !self.port.remove(handle)? {
            return Err(StratforgeError::UnknownSubscription { id: handle.0 });
        }
        info!(id = %handle, "revoked subscription");
        Ok(())
    }

    pub fn activate(&self, handle: SubscriptionHandle, caller: Address) -> Result<(), StratforgeError> {
        self.set_enabled(handle, caller, true)
    }

    pub fn deactivate(&self, handle: SubscriptionHandle, caller: Address) -> Result<(), StratforgeError> {
        self.set_enabled(handle, caller, false)
    }

    fn set_enabled(
        &self,
        handle: SubscriptionHandle,
        caller: Address,
        enabled: bool,
    ) -> Result<(), StratforgeError> {
        self.check_owner(handle, caller)?;
        if !self.port.set_enabled(handle, enabled)? {
            return Err(StratforgeError::UnknownSubscription { id: handle.0 });
        }
        info!(id = %handle, enabled, "changed subscription state");
        Ok(())
    }

    fn check_owner(&self, handle: SubscriptionHandle, caller: Address) -> Result<(), StratforgeError> {
        let subscription = self.load(handle)?;
        if subscription.owner != caller {
            return Err(StratforgeError::NotSubscriptionOwner { id: handle.0 });
        }
        Ok(())
    }
}
