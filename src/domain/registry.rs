//! Static registry of known actions and triggers.
//!
//! Every operation a strategy may reference is listed here with its ordered
//! parameter types and, for actions, the type of the value it returns for
//! piping. Strategies are checked against these signatures when built.

use crate::domain::value::SlotType;
use alloy_primitives::keccak256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Action,
    Trigger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub ty: SlotType,
    /// The interpreter verifies this input on its own (signed attestation),
    /// so a trigger may take it from the keeper.
    pub caller_verified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSignature {
    pub name: &'static str,
    pub kind: OperationKind,
    pub params: &'static [ParamSpec],
    pub returns: Option<SlotType>,
}

impl OperationSignature {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn id(&self) -> [u8; 4] {
        operation_id(self.name)
    }
}

/// First four bytes of `keccak256(name)`.
pub fn operation_id(name: &str) -> [u8; 4] {
    let hash = keccak256(name.as_bytes());
    let mut id = [0u8; 4];
    id.copy_from_slice(&hash[..4]);
    id
}

macro_rules! param {
    (verified $name:literal, $ty:expr) => {
        ParamSpec {
            name: $name,
            ty: $ty,
            caller_verified: true,
        }
    };
    ($name:literal, $ty:expr) => {
        ParamSpec {
            name: $name,
            ty: $ty,
            caller_verified: false,
        }
    };
}

macro_rules! action_sig {
    ($name:literal, [$($param:expr),* $(,)?], $returns:expr $(,)?) => {
        OperationSignature {
            name: $name,
            kind: OperationKind::Action,
            params: &[$($param),*],
            returns: $returns,
        }
    };
}

macro_rules! trigger_sig {
    ($name:literal, [$($param:expr),* $(,)?] $(,)?) => {
        OperationSignature {
            name: $name,
            kind: OperationKind::Trigger,
            params: &[$($param),*],
            returns: None,
        }
    };
}

const U8: SlotType = SlotType::UINT8;
const U16: SlotType = SlotType::UINT16;
const U256: SlotType = SlotType::UINT256;
const ADDR: SlotType = SlotType::Address;
const BOOL: SlotType = SlotType::Bool;
const B32: SlotType = SlotType::Bytes32;

pub static ACTIONS: &[OperationSignature] = &[
    action_sig!(
        "FlashLoan",
        [param!("token", ADDR), param!("amount", U256)],
        Some(U256),
    ),
    action_sig!("MakerRatio", [param!("vault_id", U256)], Some(U256)),
    action_sig!(
        "MakerWithdraw",
        [
            param!("vault_id", U256),
            param!("amount", U256),
            param!("join", ADDR),
            param!("to", ADDR),
            param!("manager", ADDR),
        ],
        Some(U256),
    ),
    action_sig!(
        "MakerSupply",
        [
            param!("vault_id", U256),
            param!("amount", U256),
            param!("join", ADDR),
            param!("from", ADDR),
            param!("manager", ADDR),
        ],
        Some(U256),
    ),
    action_sig!(
        "MakerGenerate",
        [
            param!("vault_id", U256),
            param!("amount", U256),
            param!("to", ADDR),
            param!("manager", ADDR),
        ],
        Some(U256),
    ),
    action_sig!(
        "MakerPayback",
        [
            param!("vault_id", U256),
            param!("amount", U256),
            param!("from", ADDR),
            param!("manager", ADDR),
        ],
        Some(U256),
    ),
    action_sig!(
        "MakerRatioCheck",
        [
            param!("ratio_state", U8),
            param!("check_target", BOOL),
            param!("target_ratio", U256),
            param!("vault_id", U256),
            param!("ratio_action_position", U8),
        ],
        None,
    ),
    action_sig!(
        "AaveV3Supply",
        [
            param!("amount", U256),
            param!("from", ADDR),
            param!("asset_id", U16),
            param!("enable_as_coll", BOOL),
            param!("market", ADDR),
        ],
        Some(U256),
    ),
    action_sig!(
        "AaveV3Borrow",
        [
            param!("amount", U256),
            param!("to", ADDR),
            param!("rate_mode", U8),
            param!("asset_id", U16),
            param!("market", ADDR),
        ],
        Some(U256),
    ),
    action_sig!(
        "AaveV3Payback",
        [
            param!("amount", U256),
            param!("from", ADDR),
            param!("rate_mode", U8),
            param!("asset_id", U16),
            param!("market", ADDR),
        ],
        Some(U256),
    ),
    action_sig!(
        "AaveV3Withdraw",
        [
            param!("asset_id", U16),
            param!("amount", U256),
            param!("to", ADDR),
            param!("market", ADDR),
        ],
        Some(U256),
    ),
    action_sig!(
        "AaveV3RatioCheck",
        [param!("ratio_state", U8), param!("target_ratio", U256)],
        None,
    ),
    action_sig!(
        "Sell",
        [
            param!("src_token", ADDR),
            param!("dest_token", ADDR),
            param!("amount", U256),
            param!("wrapper", ADDR),
            param!("from", ADDR),
            param!("to", ADDR),
        ],
        Some(U256),
    ),
    action_sig!(
        "GasFee",
        [param!("gas_used", U256), param!("token", ADDR), param!("amount", U256)],
        Some(U256),
    ),
    action_sig!(
        "SendToken",
        [param!("token", ADDR), param!("to", ADDR), param!("amount", U256)],
        Some(U256),
    ),
];

pub static TRIGGERS: &[OperationSignature] = &[
    trigger_sig!(
        "MakerRatioTrigger",
        [param!("vault_id", U256), param!("ratio", U256), param!("ratio_state", U8)],
    ),
    trigger_sig!(
        "AaveV3RatioTrigger",
        [
            param!("user", ADDR),
            param!("market", ADDR),
            param!("ratio", U256),
            param!("ratio_state", U8),
        ],
    ),
    trigger_sig!(
        "ChainlinkPriceTrigger",
        [param!("token", ADDR), param!("price", U256), param!("price_state", U8)],
    ),
    trigger_sig!(
        "AaveV3QuotePriceTrigger",
        [
            param!("base_token", ADDR),
            param!("quote_token", ADDR),
            param!("price", U256),
            param!("price_state", U8),
        ],
    ),
    trigger_sig!(
        "OffchainPriceTrigger",
        [
            param!("limit_price", U256),
            param!("order_type", U8),
            param!(verified "signed_price", B32),
        ],
    ),
    trigger_sig!("GasPriceTrigger", [param!("max_gas_price", U256)]),
    trigger_sig!("TimestampTrigger", [param!("timestamp", U256)]),
];

pub fn action(name: &str) -> Option<&'static OperationSignature> {
    ACTIONS.iter().find(|sig| sig.name == name)
}

pub fn trigger(name: &str) -> Option<&'static OperationSignature> {
    TRIGGERS.iter().find(|sig| sig.name == name)
}

pub fn lookup(kind: OperationKind, name: &str) -> Option<&'static OperationSignature> {
    match kind {
        OperationKind::Action => action(name),
        OperationKind::Trigger => trigger(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_are_unique() {
        let mut seen = HashSet::new();
        for sig in ACTIONS.iter().chain(TRIGGERS.iter()) {
            assert!(seen.insert(sig.name), "duplicate {}", sig.name);
        }
    }

    #[test]
    fn ids_are_unique() {
        let mut seen = HashSet::new();
        for sig in ACTIONS.iter().chain(TRIGGERS.iter()) {
            assert!(seen.insert(sig.id()), "id collision for {}", sig.name);
        }
    }

    #[test]
    fn tables_hold_matching_kinds() {
        assert!(ACTIONS.iter().all(|s| s.kind == OperationKind::Action));
        assert!(TRIGGERS.iter().all(|s| s.kind == OperationKind::Trigger));
        assert!(TRIGGERS.iter().all(|s| s.returns.is_none()));
    }

    #[test]
    fn ratio_check_declares_no_return() {
        let sig = action("MakerRatioCheck").unwrap();
        assert_eq!(sig.returns, None);
        assert_eq!(sig.arity(), 5);
    }

    #[test]
    fn lookup_respects_kind() {
        assert!(lookup(OperationKind::Action, "Sell").is_some());
        assert!(lookup(OperationKind::Trigger, "Sell").is_none());
        assert!(lookup(OperationKind::Trigger, "GasPriceTrigger").is_some());
    }

    #[test]
    fn operation_id_is_keccak_prefix() {
        let full = keccak256("Sell".as_bytes());
        assert_eq!(&operation_id("Sell")[..], &full[..4]);
    }

    #[test]
    fn only_offchain_price_accepts_caller_input() {
        let verified: Vec<&str> = TRIGGERS
            .iter()
            .filter(|t| t.params.iter().any(|p| p.caller_verified))
            .map(|t| t.name)
            .collect();
        assert_eq!(verified, vec!["OffchainPriceTrigger"]);
    }
}
