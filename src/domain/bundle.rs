//! Strategy bundles and member selection.
//!
//! A bundle groups strategies that reach the same end state by different
//! means (own funds vs. flash loan). Each member carries a precondition over
//! a caller-supplied state snapshot; selection walks the members in declared
//! order and takes the first whose precondition holds.

use crate::domain::encoder::StrategyId;
use crate::domain::error::StratforgeError;
use crate::domain::value::AbiValue;
use alloy_primitives::{B256, U256, keccak256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Observed chain state keyed by name, e.g. `balance`, `debt`, `ratio`.
pub type StateSnapshot = BTreeMap<String, AbiValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// `@key`
    Snapshot(String),
    Literal(U256),
}

impl Operand {
    fn resolve(&self, snapshot: &StateSnapshot) -> Option<U256> {
        match self {
            Operand::Literal(value) => Some(*value),
            Operand::Snapshot(key) => {
                let value = snapshot.get(key).and_then(AbiValue::as_uint);
                if value.is_none() {
                    debug!(key = %key, "snapshot value missing or not a uint");
                }
                value
            }
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Snapshot(key) => write!(f, "@{key}"),
            Operand::Literal(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Always,
    AtLeast(Operand, Operand),
    AtMost(Operand, Operand),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Whether the predicate holds. A comparison whose operand cannot be
    /// read from the snapshot does not hold.
    pub fn holds(&self, snapshot: &StateSnapshot) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::AtLeast(left, right) => compare(left, right, snapshot, |l, r| l >= r),
            Predicate::AtMost(left, right) => compare(left, right, snapshot, |l, r| l <= r),
            Predicate::And(children) => children.iter().all(|p| p.holds(snapshot)),
            Predicate::Or(children) => children.iter().any(|p| p.holds(snapshot)),
            Predicate::Not(inner) => !inner.holds(snapshot),
        }
    }
}

fn compare(
    left: &Operand,
    right: &Operand,
    snapshot: &StateSnapshot,
    op: impl Fn(U256, U256) -> bool,
) -> bool {
    match (left.resolve(snapshot), right.resolve(snapshot)) {
        (Some(l), Some(r)) => op(l, r),
        _ => false,
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, name: &str, items: &[Predicate]) -> fmt::Result {
            write!(f, "{name}(")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{item}")?;
            }
            write!(f, ")")
        }

        match self {
            Predicate::Always => write!(f, "ALWAYS"),
            Predicate::AtLeast(l, r) => write!(f, "AT_LEAST({l}, {r})"),
            Predicate::AtMost(l, r) => write!(f, "AT_MOST({l}, {r})"),
            Predicate::And(items) => list(f, "AND", items),
            Predicate::Or(items) => list(f, "OR", items),
            Predicate::Not(inner) => write!(f, "NOT({inner})"),
        }
    }
}

/// Where a member takes the value of one of its strategy's variables from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableSource {
    Constant(AbiValue),
    Snapshot(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleMember {
    pub strategy: StrategyId,
    pub label: String,
    pub precondition: Predicate,
    pub variables: BTreeMap<String, VariableSource>,
}

impl BundleMember {
    pub fn new(strategy: StrategyId, label: impl Into<String>, precondition: Predicate) -> Self {
        Self {
            strategy,
            label: label.into(),
            precondition,
            variables: BTreeMap::new(),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, source: VariableSource) -> Self {
        self.variables.insert(name.into(), source);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyBundle {
    pub name: String,
    pub members: Vec<BundleMember>,
}

impl StrategyBundle {
    /// keccak256 over the member strategy ids in declared order. Stable
    /// across processes, so persisted subscriptions can name their bundle.
    pub fn key(&self) -> BundleKey {
        let mut bytes = Vec::with_capacity(self.members.len() * 32);
        for member in &self.members {
            bytes.extend_from_slice(member.strategy.0.as_slice());
        }
        BundleKey(keccak256(bytes))
    }
}

/// Content address of a bundle's member list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleKey(pub B256);

impl fmt::Display for BundleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for BundleKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        B256::from_str(s.trim())
            .map(BundleKey)
            .map_err(|_| format!("'{s}' is not a bundle key"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Position of the chosen member within the bundle.
    pub index: usize,
    pub strategy: StrategyId,
    pub variables: BTreeMap<String, AbiValue>,
}

/// Pick the first member whose precondition holds and source its variables.
pub fn select_and_prepare(
    bundle: &StrategyBundle,
    snapshot: &StateSnapshot,
) -> Result<Selection, StratforgeError> {
    for (index, member) in bundle.members.iter().enumerate() {
        if !member.precondition.holds(snapshot) {
            debug!(
                bundle = %bundle.name,
                member = %member.label,
                precondition = %member.precondition,
                "precondition does not hold"
            );
            continue;
        }

        let mut variables = BTreeMap::new();
        for (name, source) in &member.variables {
            let value = match source {
                VariableSource::Constant(value) => value.clone(),
                VariableSource::Snapshot(key) => snapshot.get(key).cloned().ok_or_else(|| {
                    StratforgeError::MissingSnapshotValue { key: key.clone() }
                })?,
            };
            variables.insert(name.clone(), value);
        }

        debug!(bundle = %bundle.name, member = %member.label, index, "selected bundle member");
        return Ok(Selection {
            index,
            strategy: member.strategy,
            variables,
        });
    }

    Err(StratforgeError::NoEligibleStrategy {
        bundle: bundle.name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;

    fn id(byte: u8) -> StrategyId {
        StrategyId(B256::repeat_byte(byte))
    }

    fn snap(pairs: &[(&str, u64)]) -> StateSnapshot {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), AbiValue::uint256(*v)))
            .collect()
    }

    fn at_least(l: &str, r: &str) -> Predicate {
        Predicate::AtLeast(Operand::Snapshot(l.into()), Operand::Snapshot(r.into()))
    }

    fn direct_or_flash_loan() -> StrategyBundle {
        StrategyBundle {
            name: "McdRepay".into(),
            members: vec![
                BundleMember::new(id(1), "direct", at_least("localBalance", "amount"))
                    .with_variable("amount", VariableSource::Snapshot("amount".into())),
                BundleMember::new(id(2), "flash-loan", Predicate::Always)
                    .with_variable("amount", VariableSource::Snapshot("amount".into()))
                    .with_variable(
                        "flAmount",
                        VariableSource::Constant(AbiValue::uint256(0)),
                    ),
            ],
        }
    }

    #[test]
    fn zero_balance_falls_back_to_flash_loan() {
        let selection = select_and_prepare(
            &direct_or_flash_loan(),
            &snap(&[("localBalance", 0), ("amount", 500)]),
        )
        .unwrap();
        assert_eq!(selection.index, 1);
        assert_eq!(selection.strategy, id(2));
        assert_eq!(selection.variables["amount"], AbiValue::uint256(500));
        assert_eq!(selection.variables["flAmount"], AbiValue::uint256(0));
    }

    #[test]
    fn sufficient_balance_prefers_direct() {
        let selection = select_and_prepare(
            &direct_or_flash_loan(),
            &snap(&[("localBalance", 500), ("amount", 500)]),
        )
        .unwrap();
        assert_eq!(selection.index, 0);
        assert_eq!(selection.strategy, id(1));
    }

    #[test]
    fn no_member_holds() {
        let bundle = StrategyBundle {
            name: "OnlyDirect".into(),
            members: vec![BundleMember::new(
                id(1),
                "direct",
                at_least("localBalance", "amount"),
            )],
        };
        let err = select_and_prepare(&bundle, &snap(&[("localBalance", 1), ("amount", 2)]))
            .unwrap_err();
        assert!(matches!(err, StratforgeError::NoEligibleStrategy { bundle } if bundle == "OnlyDirect"));
    }

    #[test]
    fn missing_snapshot_key_fails_precondition() {
        let pred = at_least("localBalance", "amount");
        assert!(!pred.holds(&snap(&[("amount", 1)])));
        assert!(Predicate::Not(Box::new(pred)).holds(&snap(&[("amount", 1)])));
    }

    #[test]
    fn non_uint_snapshot_value_fails_precondition() {
        let mut snapshot = snap(&[("amount", 1)]);
        snapshot.insert("localBalance".into(), AbiValue::Bool(true));
        assert!(!at_least("localBalance", "amount").holds(&snapshot));
    }

    #[test]
    fn missing_variable_source_is_an_error() {
        let err = select_and_prepare(&direct_or_flash_loan(), &snap(&[("localBalance", 0)]))
            .unwrap_err();
        assert!(matches!(err, StratforgeError::MissingSnapshotValue { key } if key == "amount"));
    }

    #[test]
    fn combinators() {
        let s = snap(&[("a", 5), ("b", 10)]);
        let lit = |v: u64| Operand::Literal(U256::from(v));
        let a = || Operand::Snapshot("a".into());
        assert!(Predicate::AtMost(a(), lit(5)).holds(&s));
        assert!(!Predicate::AtMost(a(), lit(4)).holds(&s));
        assert!(Predicate::And(vec![at_least("b", "a"), Predicate::Always]).holds(&s));
        assert!(!Predicate::And(vec![at_least("a", "b"), Predicate::Always]).holds(&s));
        assert!(Predicate::Or(vec![at_least("a", "b"), at_least("b", "a")]).holds(&s));
        assert!(Predicate::And(vec![]).holds(&s));
        assert!(!Predicate::Or(vec![]).holds(&s));
    }

    #[test]
    fn display_is_readable() {
        let pred = Predicate::Or(vec![
            Predicate::Not(Box::new(at_least("a", "b"))),
            Predicate::AtMost(Operand::Snapshot("c".into()), Operand::Literal(U256::from(7u64))),
        ]);
        assert_eq!(pred.to_string(), "OR(NOT(AT_LEAST(@a, @b)), AT_MOST(@c, 7))");
    }

    #[test]
    fn key_follows_member_strategies() {
        let bundle = direct_or_flash_loan();
        let mut relabelled = bundle.clone();
        relabelled.name = "Other".into();
        relabelled.members[0].label = "own-funds".into();
        relabelled.members[0].precondition = Predicate::Always;
        assert_eq!(bundle.key(), relabelled.key());

        let mut reordered = bundle.clone();
        reordered.members.reverse();
        assert_ne!(bundle.key(), reordered.key());

        let mut flash_only = bundle.clone();
        flash_only.members.remove(0);
        assert_ne!(bundle.key(), flash_only.key());
    }

    #[test]
    fn key_parses_back() {
        let key = direct_or_flash_loan().key();
        assert_eq!(key.to_string().parse::<BundleKey>().unwrap(), key);
        assert!("0x12".parse::<BundleKey>().is_err());
    }
}
