//! Dataflow validation for strategies.
//!
//! Runs once per build as a single linear scan: triggers first, then the
//! actions in order while recording which positions declared a return value.
//! Because every `Piped` index must point strictly backwards, a strategy
//! that passes is acyclic by construction.

use crate::domain::binding::{Binding, PROXY_SLOT};
use crate::domain::error::StratforgeError;
use crate::domain::registry::ParamSpec;
use crate::domain::strategy::{Operation, SubSlotDecl};
use crate::domain::value::SlotType;
use std::collections::{BTreeMap, HashSet};

pub fn validate_dataflow(
    sub_slots: &[SubSlotDecl],
    triggers: &[Operation],
    actions: &[Operation],
) -> Result<(), StratforgeError> {
    let mut scan = Scan {
        sub_slots,
        returns: Vec::with_capacity(actions.len()),
        variable_types: BTreeMap::new(),
    };

    for trigger in triggers {
        scan.check_trigger(trigger)?;
    }
    for action in actions {
        scan.check_action(action)?;
        scan.returns.push(action.signature().returns);
    }
    Ok(())
}

struct Scan<'a> {
    sub_slots: &'a [SubSlotDecl],
    /// Return type of each action already visited, by 0-based position.
    returns: Vec<Option<SlotType>>,
    /// First type seen for each variable placeholder.
    variable_types: BTreeMap<String, SlotType>,
}

impl Scan<'_> {
    fn check_trigger(&mut self, trigger: &Operation) -> Result<(), StratforgeError> {
        for (position, (binding, param)) in trigger
            .bindings()
            .iter()
            .zip(trigger.signature().params)
            .enumerate()
        {
            match binding {
                Binding::Piped(target) => {
                    return Err(StratforgeError::InvalidPipeReference {
                        operation: trigger.name().to_string(),
                        position: position + 1,
                        target: *target,
                        reason: "triggers run before any action".into(),
                    });
                }
                Binding::Variable(_) if !param.caller_verified => {
                    return Err(StratforgeError::UnverifiedTriggerInput {
                        trigger: trigger.name().to_string(),
                        position: position + 1,
                    });
                }
                _ => {}
            }
        }
        self.check_common(trigger)
    }

    fn check_action(&mut self, action: &Operation) -> Result<(), StratforgeError> {
        let own_index = self.returns.len() + 1;
        for (position, (binding, param)) in action
            .bindings()
            .iter()
            .zip(action.signature().params)
            .enumerate()
        {
            if let Binding::Piped(target) = binding {
                let invalid = |reason: String| StratforgeError::InvalidPipeReference {
                    operation: action.name().to_string(),
                    position: position + 1,
                    target: *target,
                    reason,
                };
                if *target == 0 {
                    return Err(invalid("action indices start at 1".into()));
                }
                if *target == own_index {
                    return Err(invalid("an action cannot consume its own output".into()));
                }
                if *target > own_index {
                    return Err(invalid(format!(
                        "action {target} runs after action {own_index}"
                    )));
                }
                let Some(returned) = self.returns[*target - 1] else {
                    return Err(invalid(format!(
                        "action {target} declares no return value"
                    )));
                };
                expect_type(action, param, returned)?;
            }
        }
        self.check_common(action)
    }

    /// Checks shared by triggers and actions: constants, sub-slots and
    /// variable placeholders.
    fn check_common(&mut self, op: &Operation) -> Result<(), StratforgeError> {
        let mut placeholders = HashSet::new();
        for (binding, param) in op.bindings().iter().zip(op.signature().params) {
            match binding {
                Binding::Constant(value) => expect_type(op, param, value.slot_type())?,
                Binding::SubSlot(name) => {
                    let ty = self.sub_slot_type(name).ok_or_else(|| {
                        StratforgeError::UndeclaredSubSlot {
                            operation: op.name().to_string(),
                            name: name.clone(),
                        }
                    })?;
                    expect_type(op, param, ty)?;
                }
                Binding::Variable(name) => {
                    if !placeholders.insert(name.as_str()) {
                        return Err(StratforgeError::DuplicateVariable {
                            operation: op.name().to_string(),
                            placeholder: name.clone(),
                        });
                    }
                    match self.variable_types.get(name) {
                        Some(&seen) if seen != param.ty => {
                            return Err(StratforgeError::TypeMismatch {
                                name: format!("%{name}"),
                                expected: seen,
                                found: param.ty,
                            });
                        }
                        Some(_) => {}
                        None => {
                            self.variable_types.insert(name.clone(), param.ty);
                        }
                    }
                }
                Binding::Piped(_) => {}
            }
        }
        Ok(())
    }

    fn sub_slot_type(&self, name: &str) -> Option<SlotType> {
        if name == PROXY_SLOT {
            return Some(SlotType::Address);
        }
        self.sub_slots.iter().find(|s| s.name == name).map(|s| s.ty)
    }
}

fn expect_type(op: &Operation, param: &ParamSpec, found: SlotType) -> Result<(), StratforgeError> {
    if param.ty != found {
        return Err(StratforgeError::TypeMismatch {
            name: format!("{}.{}", op.name(), param.name),
            expected: param.ty,
            found,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::domain::binding::Binding;
    use crate::domain::error::StratforgeError;
    use crate::domain::strategy::{Strategy, StrategyBuilder};
    use crate::domain::value::{AbiValue, SlotType};
    use alloy_primitives::U256;

    fn base() -> StrategyBuilder {
        Strategy::builder("Test")
            .sub_slot("vaultId", SlotType::UINT256)
            .sub_slot("daiJoin", SlotType::Address)
    }

    fn withdraw(amount: Binding) -> Vec<Binding> {
        vec![
            Binding::sub_slot("vaultId"),
            amount,
            Binding::sub_slot("daiJoin"),
            Binding::sub_slot("proxy"),
            Binding::variable("manager"),
        ]
    }

    fn send(amount: Binding) -> Vec<Binding> {
        vec![
            Binding::variable("token"),
            Binding::sub_slot("proxy"),
            amount,
        ]
    }

    #[test]
    fn backward_pipe_is_accepted() {
        let strategy = base()
            .action("MakerWithdraw", withdraw(Binding::variable("amount")))
            .action("SendToken", send(Binding::piped(1)))
            .build();
        assert!(strategy.is_ok());
    }

    #[test]
    fn self_reference_is_rejected() {
        let err = base()
            .action("MakerWithdraw", withdraw(Binding::variable("amount")))
            .action("SendToken", send(Binding::piped(2)))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            StratforgeError::InvalidPipeReference {
                position: 3,
                target: 2,
                ..
            }
        ));
    }

    #[test]
    fn forward_reference_is_rejected() {
        let err = base()
            .action("SendToken", send(Binding::piped(2)))
            .action("MakerWithdraw", withdraw(Binding::variable("amount")))
            .build()
            .unwrap_err();
        assert!(matches!(err, StratforgeError::InvalidPipeReference { target: 2, .. }));
    }

    #[test]
    fn index_zero_is_rejected() {
        let err = base()
            .action("SendToken", send(Binding::piped(0)))
            .build()
            .unwrap_err();
        assert!(matches!(err, StratforgeError::InvalidPipeReference { target: 0, .. }));
    }

    #[test]
    fn pipe_from_action_without_return_is_rejected() {
        let err = base()
            .action(
                "AaveV3RatioCheck",
                [
                    Binding::constant(AbiValue::uint(U256::from(1u64), 8)),
                    Binding::variable("target"),
                ],
            )
            .action("SendToken", send(Binding::piped(1)))
            .build()
            .unwrap_err();
        match err {
            StratforgeError::InvalidPipeReference { reason, .. } => {
                assert!(reason.contains("no return value"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn undeclared_sub_slot_is_rejected() {
        let err = base()
            .action(
                "SendToken",
                [
                    Binding::sub_slot("token"),
                    Binding::sub_slot("proxy"),
                    Binding::variable("amount"),
                ],
            )
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            StratforgeError::UndeclaredSubSlot { ref name, .. } if name == "token"
        ));
    }

    #[test]
    fn duplicate_variable_within_operation_is_rejected() {
        let err = base()
            .action(
                "Sell",
                [
                    Binding::variable("token"),
                    Binding::variable("token"),
                    Binding::variable("amount"),
                    Binding::variable("wrapper"),
                    Binding::sub_slot("proxy"),
                    Binding::sub_slot("proxy"),
                ],
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, StratforgeError::DuplicateVariable { .. }));
    }

    #[test]
    fn same_variable_across_operations_is_allowed() {
        let strategy = base()
            .action("MakerWithdraw", withdraw(Binding::variable("amount")))
            .action("SendToken", send(Binding::variable("amount")))
            .build();
        assert!(strategy.is_ok());
    }

    #[test]
    fn variable_type_must_agree_across_operations() {
        let err = base()
            .action("MakerWithdraw", withdraw(Binding::variable("amount")))
            .action(
                "SendToken",
                [
                    Binding::variable("amount"),
                    Binding::sub_slot("proxy"),
                    Binding::piped(1),
                ],
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, StratforgeError::TypeMismatch { ref name, .. } if name == "%amount"));
    }

    #[test]
    fn constant_type_is_checked() {
        let err = base()
            .action(
                "SendToken",
                [
                    Binding::constant(AbiValue::uint256(1)),
                    Binding::sub_slot("proxy"),
                    Binding::variable("amount"),
                ],
            )
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            StratforgeError::TypeMismatch {
                expected: SlotType::Address,
                ..
            }
        ));
    }

    #[test]
    fn sub_slot_type_is_checked() {
        let err = base()
            .action(
                "SendToken",
                [
                    Binding::sub_slot("vaultId"),
                    Binding::sub_slot("proxy"),
                    Binding::variable("amount"),
                ],
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, StratforgeError::TypeMismatch { .. }));
    }

    #[test]
    fn trigger_cannot_pipe() {
        let err = base()
            .trigger("GasPriceTrigger", [Binding::piped(1)])
            .action("MakerWithdraw", withdraw(Binding::variable("amount")))
            .build()
            .unwrap_err();
        assert!(matches!(err, StratforgeError::InvalidPipeReference { .. }));
    }

    #[test]
    fn trigger_variable_requires_verified_param() {
        let err = base()
            .trigger("GasPriceTrigger", [Binding::variable("gas")])
            .action("MakerWithdraw", withdraw(Binding::variable("amount")))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            StratforgeError::UnverifiedTriggerInput { position: 1, .. }
        ));

        let ok = base()
            .trigger(
                "OffchainPriceTrigger",
                [
                    Binding::constant(AbiValue::uint256(1_500)),
                    Binding::constant(AbiValue::uint(U256::from(0u64), 8)),
                    Binding::variable("signedPrice"),
                ],
            )
            .action("MakerWithdraw", withdraw(Binding::variable("amount")))
            .build();
        assert!(ok.is_ok());
    }
}
