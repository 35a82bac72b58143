//! Registry of published strategies and bundles.
//!
//! Strategies are content-addressed by [`StrategyId`] and also receive a
//! sequential index in registration order. Bundles are numbered the same
//! way within one store; across processes a bundle is named by its
//! [`BundleKey`].

use crate::domain::bundle::{BundleKey, BundleMember, StrategyBundle};
use crate::domain::encoder::StrategyId;
use crate::domain::error::StratforgeError;
use crate::domain::strategy::{Strategy, SubSlotDecl};
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

pub const MAX_BUNDLE_MEMBERS: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleId(pub u64);

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct StrategyStore {
    strategies: Vec<(StrategyId, Strategy)>,
    by_id: HashMap<StrategyId, usize>,
    bundles: Vec<StrategyBundle>,
}

impl StrategyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strategy; registering identical content again returns the
    /// existing id.
    pub fn register(&mut self, strategy: Strategy) -> StrategyId {
        let id = strategy.id();
        if let Some(&index) = self.by_id.get(&id) {
            warn!(strategy = %strategy.name(), %id, index, "strategy already registered");
            return id;
        }
        let index = self.strategies.len();
        info!(strategy = %strategy.name(), %id, index, "registered strategy");
        self.by_id.insert(id, index);
        self.strategies.push((id, strategy));
        id
    }

    pub fn get(&self, id: &StrategyId) -> Result<&Strategy, StratforgeError> {
        self.by_id
            .get(id)
            .map(|&index| &self.strategies[index].1)
            .ok_or_else(|| StratforgeError::UnknownStrategy { id: id.to_string() })
    }

    /// Registration index of a strategy.
    pub fn index_of(&self, id: &StrategyId) -> Result<usize, StratforgeError> {
        self.by_id
            .get(id)
            .copied()
            .ok_or_else(|| StratforgeError::UnknownStrategy { id: id.to_string() })
    }

    pub fn strategy_at(&self, index: usize) -> Option<(&StrategyId, &Strategy)> {
        self.strategies.get(index).map(|(id, s)| (id, s))
    }

    pub fn strategy_count(&self) -> usize {
        self.strategies.len()
    }

    /// Group registered strategies into a bundle. Every member must share
    /// the same sub-slot table so one subscription can drive any of them.
    pub fn create_bundle(
        &mut self,
        name: impl Into<String>,
        members: Vec<BundleMember>,
    ) -> Result<BundleId, StratforgeError> {
        let name = name.into();
        let incompatible = |reason: String| StratforgeError::IncompatibleBundle {
            name: name.clone(),
            reason,
        };

        if members.is_empty() {
            return Err(incompatible("a bundle needs at least one member".into()));
        }
        if members.len() > MAX_BUNDLE_MEMBERS {
            return Err(incompatible(format!(
                "{} members, limit is {MAX_BUNDLE_MEMBERS}",
                members.len()
            )));
        }

        let first = self.get(&members[0].strategy)?;
        for member in &members[1..] {
            let strategy = self.get(&member.strategy)?;
            if strategy.sub_slots() != first.sub_slots() {
                return Err(incompatible(format!(
                    "'{}' declares different sub-slots than '{}'",
                    strategy.name(),
                    first.name()
                )));
            }
        }

        let id = BundleId(self.bundles.len() as u64);
        let bundle = StrategyBundle { name, members };
        info!(
            bundle = %bundle.name,
            %id,
            key = %bundle.key(),
            members = bundle.members.len(),
            "created bundle"
        );
        self.bundles.push(bundle);
        Ok(id)
    }

    pub fn bundle(&self, id: BundleId) -> Result<&StrategyBundle, StratforgeError> {
        usize::try_from(id.0)
            .ok()
            .and_then(|index| self.bundles.get(index))
            .ok_or(StratforgeError::UnknownBundle { id: id.0 })
    }

    pub fn bundle_key(&self, id: BundleId) -> Result<BundleKey, StratforgeError> {
        self.bundle(id).map(StrategyBundle::key)
    }

    /// The sub-slot table shared by every member of a bundle.
    pub fn bundle_sub_slots(&self, id: BundleId) -> Result<&[SubSlotDecl], StratforgeError> {
        let bundle = self.bundle(id)?;
        let first = bundle
            .members
            .first()
            .ok_or(StratforgeError::UnknownBundle { id: id.0 })?;
        Ok(self.get(&first.strategy)?.sub_slots())
    }

    pub fn bundle_count(&self) -> usize {
        self.bundles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::binding::Binding;
    use crate::domain::bundle::Predicate;
    use crate::domain::value::SlotType;

    fn ratio(name: &str, slot: &str) -> Strategy {
        Strategy::builder(name)
            .sub_slot(slot, SlotType::UINT256)
            .action("MakerRatio", [Binding::sub_slot(slot)])
            .build()
            .unwrap()
    }

    #[test]
    fn register_is_idempotent() {
        let mut store = StrategyStore::new();
        let a = store.register(ratio("A", "vaultId"));
        let again = store.register(ratio("A", "vaultId"));
        let b = store.register(ratio("B", "vaultId"));
        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(store.strategy_count(), 2);
        assert_eq!(store.index_of(&a).unwrap(), 0);
        assert_eq!(store.index_of(&b).unwrap(), 1);
        assert_eq!(store.strategy_at(1).unwrap().1.name(), "B");
    }

    #[test]
    fn unknown_strategy_lookup() {
        let store = StrategyStore::new();
        let id = ratio("A", "vaultId").id();
        assert!(matches!(
            store.get(&id),
            Err(StratforgeError::UnknownStrategy { .. })
        ));
    }

    #[test]
    fn bundle_requires_registered_members() {
        let mut store = StrategyStore::new();
        let unregistered = ratio("A", "vaultId").id();
        let err = store
            .create_bundle("x", vec![BundleMember::new(unregistered, "a", Predicate::Always)])
            .unwrap_err();
        assert!(matches!(err, StratforgeError::UnknownStrategy { .. }));
    }

    #[test]
    fn bundle_requires_members() {
        let mut store = StrategyStore::new();
        let err = store.create_bundle("empty", Vec::new()).unwrap_err();
        assert!(matches!(err, StratforgeError::IncompatibleBundle { .. }));
    }

    #[test]
    fn bundle_members_share_sub_slots() {
        let mut store = StrategyStore::new();
        let a = store.register(ratio("A", "vaultId"));
        let b = store.register(ratio("B", "cdpId"));
        let err = store
            .create_bundle(
                "mixed",
                vec![
                    BundleMember::new(a, "a", Predicate::Always),
                    BundleMember::new(b, "b", Predicate::Always),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, StratforgeError::IncompatibleBundle { .. }));
    }

    #[test]
    fn bundle_ids_are_sequential() {
        let mut store = StrategyStore::new();
        let a = store.register(ratio("A", "vaultId"));
        let b = store.register(ratio("B", "vaultId"));
        let first = store
            .create_bundle(
                "repay",
                vec![
                    BundleMember::new(a, "a", Predicate::Always),
                    BundleMember::new(b, "b", Predicate::Always),
                ],
            )
            .unwrap();
        let second = store
            .create_bundle("boost", vec![BundleMember::new(b, "b", Predicate::Always)])
            .unwrap();
        assert_eq!(first, BundleId(0));
        assert_eq!(second, BundleId(1));
        assert_eq!(store.bundle(first).unwrap().members.len(), 2);
        assert_eq!(store.bundle_sub_slots(second).unwrap()[0].name, "vaultId");
        assert_ne!(store.bundle_key(first).unwrap(), store.bundle_key(second).unwrap());
        assert!(matches!(
            store.bundle(BundleId(7)),
            Err(StratforgeError::UnknownBundle { id: 7 })
        ));
    }
}
