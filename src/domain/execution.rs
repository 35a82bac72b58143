//! Keeper-side execution preparation.
//!
//! Ties bundle selection to substitution: pick the bundle member whose
//! precondition holds, gather its variable values, resolve the strategy
//! against the subscription and produce the calldata arrays the keeper
//! submits. Submission itself is left to the caller.

use crate::domain::bundle::{StateSnapshot, select_and_prepare};
use crate::domain::encoder::StrategyId;
use crate::domain::error::StratforgeError;
use crate::domain::strategy_store::{BundleId, StrategyStore};
use crate::domain::subscription::{SubscriptionHandle, SubscriptionManager, SubscriptionTarget};
use crate::domain::substitution::{ResolvedStrategy, substitute};
use crate::domain::value::AbiValue;
use crate::ports::subscription_port::SubscriptionPort;
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedExecution {
    pub subscription: SubscriptionHandle,
    /// Position of the selected member within the subscribed bundle; the
    /// strategy index submitted alongside the subscription.
    pub strategy_index: usize,
    /// Where the selected strategy sits in the store's registration order.
    pub registration_index: usize,
    pub strategy: StrategyId,
    pub variables: BTreeMap<String, AbiValue>,
    pub trigger_call_data: Vec<Vec<u8>>,
    pub actions_call_data: Vec<Vec<u8>>,
    pub resolved: ResolvedStrategy,
}

/// Prepare one execution of `bundle` for subscription `handle`.
///
/// `extra` carries caller-measured values (gas used, signed prices); a value
/// sourced by the selected bundle member wins over an extra value of the
/// same name.
pub fn prepare_execution<P: SubscriptionPort>(
    store: &StrategyStore,
    manager: &SubscriptionManager<P>,
    handle: SubscriptionHandle,
    bundle: BundleId,
    snapshot: &StateSnapshot,
    extra: &BTreeMap<String, AbiValue>,
) -> Result<PreparedExecution, StratforgeError> {
    let selection = select_and_prepare(store.bundle(bundle)?, snapshot)?;
    let strategy = store.get(&selection.strategy)?;
    let registration_index = store.index_of(&selection.strategy)?;
    let target = SubscriptionTarget::Bundle(store.bundle_key(bundle)?);

    let mut variables = extra.clone();
    variables.extend(selection.variables);

    let resolved = substitute(strategy, &target, manager, handle, &variables)?;

    info!(
        subscription = %handle,
        %bundle,
        strategy = %strategy.name(),
        strategy_index = selection.index,
        "prepared execution"
    );

    Ok(PreparedExecution {
        subscription: handle,
        strategy_index: selection.index,
        registration_index,
        strategy: selection.strategy,
        variables,
        trigger_call_data: resolved.trigger_call_data(),
        actions_call_data: resolved.actions_call_data(),
        resolved,
    })
}
