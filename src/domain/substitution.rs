//! Execution-time substitution.
//!
//! Fills every binding that can be known before submission: constants pass
//! through, sub-slots come from the subscription, variables from the
//! keeper-supplied map. Piped parameters stay references; the interpreter
//! fills them from its per-invocation return-value array.

use crate::domain::binding::Binding;
use crate::domain::encoder::StrategyId;
use crate::domain::error::StratforgeError;
use crate::domain::strategy::{Operation, Strategy};
use crate::domain::subscription::{
    Subscription, SubscriptionHandle, SubscriptionManager, SubscriptionTarget,
};
use crate::domain::value::{AbiValue, SlotType};
use crate::ports::subscription_port::SubscriptionPort;
use alloy_dyn_abi::DynSolValue;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedParam {
    Value(AbiValue),
    /// Return value of the action at this 1-based position.
    Piped(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOperation {
    pub name: &'static str,
    pub id: [u8; 4],
    pub params: Vec<ResolvedParam>,
    types: Vec<SlotType>,
}

impl ResolvedOperation {
    /// ABI-encoded parameter tuple; piped parameters are written as zero.
    pub fn call_data(&self) -> Vec<u8> {
        let values = self
            .params
            .iter()
            .zip(&self.types)
            .map(|(param, ty)| match param {
                ResolvedParam::Value(value) => value.to_sol(),
                ResolvedParam::Piped(_) => AbiValue::zero(*ty).to_sol(),
            })
            .collect();
        DynSolValue::Tuple(values).abi_encode_params()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStrategy {
    pub strategy_id: StrategyId,
    pub subscription: SubscriptionHandle,
    pub triggers: Vec<ResolvedOperation>,
    pub actions: Vec<ResolvedOperation>,
}

impl ResolvedStrategy {
    pub fn trigger_call_data(&self) -> Vec<Vec<u8>> {
        self.triggers.iter().map(ResolvedOperation::call_data).collect()
    }

    pub fn actions_call_data(&self) -> Vec<Vec<u8>> {
        self.actions.iter().map(ResolvedOperation::call_data).collect()
    }
}

/// Resolve `strategy` for one execution through subscription `handle`,
/// which must target `target`.
pub fn substitute<P: SubscriptionPort>(
    strategy: &Strategy,
    target: &SubscriptionTarget,
    manager: &SubscriptionManager<P>,
    handle: SubscriptionHandle,
    variables: &BTreeMap<String, AbiValue>,
) -> Result<ResolvedStrategy, StratforgeError> {
    let subscription = manager.load_active(handle)?;
    if subscription.target != *target {
        return Err(StratforgeError::SubscriptionMismatch {
            id: handle.0,
            expected: target.to_string(),
        });
    }

    let resolve_all = |ops: &[Operation]| {
        ops.iter()
            .map(|op| resolve_operation(op, &subscription, variables))
            .collect::<Result<Vec<_>, _>>()
    };

    Ok(ResolvedStrategy {
        strategy_id: strategy.id(),
        subscription: handle,
        triggers: resolve_all(strategy.triggers())?,
        actions: resolve_all(strategy.actions())?,
    })
}

fn resolve_operation(
    op: &Operation,
    subscription: &Subscription,
    variables: &BTreeMap<String, AbiValue>,
) -> Result<ResolvedOperation, StratforgeError> {
    let mut params = Vec::with_capacity(op.bindings().len());
    let mut types = Vec::with_capacity(op.bindings().len());

    for (binding, spec) in op.bindings().iter().zip(op.signature().params) {
        let param = match binding {
            Binding::Constant(value) => ResolvedParam::Value(value.clone()),
            Binding::SubSlot(name) => {
                let value = subscription.resolve(name)?;
                check_type(name, spec.ty, &value)?;
                ResolvedParam::Value(value)
            }
            Binding::Variable(placeholder) => {
                let value = variables.get(placeholder).ok_or_else(|| {
                    StratforgeError::MissingVariableValue {
                        operation: op.name().to_string(),
                        placeholder: placeholder.clone(),
                    }
                })?;
                check_type(&format!("%{placeholder}"), spec.ty, value)?;
                ResolvedParam::Value(value.clone())
            }
            Binding::Piped(index) => ResolvedParam::Piped(*index),
        };
        params.push(param);
        types.push(spec.ty);
    }

    Ok(ResolvedOperation {
        name: op.name(),
        id: op.signature().id(),
        params,
        types,
    })
}

fn check_type(name: &str, expected: SlotType, value: &AbiValue) -> Result<(), StratforgeError> {
    if value.slot_type() != expected {
        return Err(StratforgeError::TypeMismatch {
            name: name.to_string(),
            expected,
            found: value.slot_type(),
        });
    }
    Ok(())
}
