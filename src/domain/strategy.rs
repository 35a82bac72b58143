//! Strategy model and builder.
//!
//! A strategy is an ordered list of actions gated by an ordered list of
//! triggers, plus the named sub-slots every subscription must fill in.
//! The only way to obtain a `Strategy` is [`StrategyBuilder::build`], which
//! checks every operation against the registry and validates the dataflow.

use crate::domain::binding::{Binding, PROXY_SLOT};
use crate::domain::encoder::{self, StrategyId};
use crate::domain::error::StratforgeError;
use crate::domain::registry::{self, OperationKind, OperationSignature};
use crate::domain::validation;
use crate::domain::value::SlotType;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Piped indices and the on-chain parameter mapping fit actions in 1..=127.
pub const MAX_ACTIONS: usize = 127;
/// Sub-slot `i` is mapped to byte `128 + i`; 254 and 255 are reserved.
pub const MAX_SUB_SLOTS: usize = 126;
pub const MAX_TRIGGERS: usize = 255;
pub const MAX_PARAMS: usize = 255;
/// Sub-slot names and variable placeholders carry a one-byte length.
pub const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubSlotDecl {
    pub name: String,
    pub ty: SlotType,
}

impl SubSlotDecl {
    pub fn new(name: impl Into<String>, ty: SlotType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

impl fmt::Display for SubSlotDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.ty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// May run again whenever its triggers pass.
    Continuous,
    /// Terminal after one successful execution.
    OneShot,
}

impl Flavor {
    pub fn tag(self) -> u8 {
        match self {
            Flavor::Continuous => 0,
            Flavor::OneShot => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Flavor::Continuous),
            1 => Some(Flavor::OneShot),
            _ => None,
        }
    }
}

/// One action or trigger of a strategy with its parameter bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    signature: &'static OperationSignature,
    bindings: Vec<Binding>,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        self.signature.name
    }

    pub fn kind(&self) -> OperationKind {
        self.signature.kind
    }

    pub fn signature(&self) -> &'static OperationSignature {
        self.signature
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn declares_return_value(&self) -> bool {
        self.signature.returns.is_some()
    }

    /// Variable placeholders in parameter order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().filter_map(|b| match b {
            Binding::Variable(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    name: String,
    flavor: Flavor,
    sub_slots: Vec<SubSlotDecl>,
    triggers: Vec<Operation>,
    actions: Vec<Operation>,
}

impl Strategy {
    pub fn builder(name: impl Into<String>) -> StrategyBuilder {
        StrategyBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    pub fn is_continuous(&self) -> bool {
        self.flavor == Flavor::Continuous
    }

    pub fn sub_slots(&self) -> &[SubSlotDecl] {
        &self.sub_slots
    }

    pub fn triggers(&self) -> &[Operation] {
        &self.triggers
    }

    pub fn actions(&self) -> &[Operation] {
        &self.actions
    }

    /// Action at 1-based position `index`.
    pub fn action(&self, index: usize) -> Option<&Operation> {
        index.checked_sub(1).and_then(|i| self.actions.get(i))
    }

    pub fn sub_slot_index(&self, name: &str) -> Option<usize> {
        self.sub_slots.iter().position(|s| s.name == name)
    }

    /// Type of a sub-slot, including the reserved `proxy` slot.
    pub fn sub_slot_type(&self, name: &str) -> Option<SlotType> {
        if name == PROXY_SLOT {
            return Some(SlotType::Address);
        }
        self.sub_slots.iter().find(|s| s.name == name).map(|s| s.ty)
    }

    /// Type of every variable placeholder used by any trigger or action.
    pub fn variable_types(&self) -> BTreeMap<String, SlotType> {
        let mut types = BTreeMap::new();
        for op in self.triggers.iter().chain(self.actions.iter()) {
            for (binding, param) in op.bindings.iter().zip(op.signature.params) {
                if let Binding::Variable(name) = binding {
                    types.insert(name.clone(), param.ty);
                }
            }
        }
        types
    }

    /// Content address of the strategy's encoding.
    pub fn id(&self) -> StrategyId {
        encoder::encode(self).id
    }
}

/// Consuming builder; nothing is checked until [`StrategyBuilder::build`].
#[derive(Debug, Clone)]
pub struct StrategyBuilder {
    name: String,
    flavor: Flavor,
    sub_slots: Vec<SubSlotDecl>,
    triggers: Vec<(String, Vec<Binding>)>,
    actions: Vec<(String, Vec<Binding>)>,
}

impl StrategyBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flavor: Flavor::Continuous,
            sub_slots: Vec::new(),
            triggers: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn flavor(mut self, flavor: Flavor) -> Self {
        self.flavor = flavor;
        self
    }

    pub fn one_shot(self) -> Self {
        self.flavor(Flavor::OneShot)
    }

    pub fn sub_slot(mut self, name: impl Into<String>, ty: SlotType) -> Self {
        self.sub_slots.push(SubSlotDecl::new(name, ty));
        self
    }

    pub fn trigger(
        mut self,
        name: impl Into<String>,
        bindings: impl IntoIterator<Item = Binding>,
    ) -> Self {
        self.triggers
            .push((name.into(), bindings.into_iter().collect()));
        self
    }

    pub fn action(
        mut self,
        name: impl Into<String>,
        bindings: impl IntoIterator<Item = Binding>,
    ) -> Self {
        self.actions.push((name.into(), bindings.into_iter().collect()));
        self
    }

    pub fn build(self) -> Result<Strategy, StratforgeError> {
        if self.name.trim().is_empty() {
            return Err(StratforgeError::StrategyInvalid {
                name: self.name,
                reason: "name must not be empty".into(),
            });
        }
        if self.actions.is_empty() {
            return Err(StratforgeError::StrategyInvalid {
                name: self.name,
                reason: "at least one action is required".into(),
            });
        }
        check_limit("bytes in strategy name", self.name.len(), u16::MAX as usize)?;
        check_limit("actions", self.actions.len(), MAX_ACTIONS)?;
        check_limit("triggers", self.triggers.len(), MAX_TRIGGERS)?;
        check_limit("sub-slots", self.sub_slots.len(), MAX_SUB_SLOTS)?;
        check_sub_slot_names(&self.name, &self.sub_slots)?;

        let triggers = resolve_operations(OperationKind::Trigger, self.triggers)?;
        let actions = resolve_operations(OperationKind::Action, self.actions)?;

        validation::validate_dataflow(&self.sub_slots, &triggers, &actions)?;

        Ok(Strategy {
            name: self.name,
            flavor: self.flavor,
            sub_slots: self.sub_slots,
            triggers,
            actions,
        })
    }
}

fn check_limit(what: &str, count: usize, max: usize) -> Result<(), StratforgeError> {
    if count > max {
        return Err(StratforgeError::LimitExceeded {
            what: what.to_string(),
            max,
        });
    }
    Ok(())
}

fn check_sub_slot_names(strategy: &str, sub_slots: &[SubSlotDecl]) -> Result<(), StratforgeError> {
    let mut seen = HashSet::new();
    for slot in sub_slots {
        if slot.name.is_empty() || slot.name == PROXY_SLOT {
            return Err(StratforgeError::StrategyInvalid {
                name: strategy.to_string(),
                reason: format!("'{}' is not a usable sub-slot name", slot.name),
            });
        }
        check_limit("bytes in sub-slot name", slot.name.len(), MAX_NAME_LEN)?;
        if !seen.insert(slot.name.as_str()) {
            return Err(StratforgeError::DuplicateSubSlot {
                name: slot.name.clone(),
            });
        }
    }
    Ok(())
}

fn resolve_operations(
    kind: OperationKind,
    raw: Vec<(String, Vec<Binding>)>,
) -> Result<Vec<Operation>, StratforgeError> {
    raw.into_iter()
        .map(|(name, bindings)| {
            let signature = registry::lookup(kind, &name)
                .ok_or(StratforgeError::UnknownOperation { name })?;
            check_limit("parameters", bindings.len(), MAX_PARAMS)?;
            for binding in &bindings {
                if let Binding::Variable(placeholder) = binding {
                    if placeholder.is_empty() {
                        return Err(StratforgeError::StrategyInvalid {
                            name: signature.name.to_string(),
                            reason: "empty variable placeholder".into(),
                        });
                    }
                    check_limit("bytes in variable name", placeholder.len(), MAX_NAME_LEN)?;
                }
            }
            if bindings.len() != signature.arity() {
                return Err(StratforgeError::ArityMismatch {
                    operation: signature.name.to_string(),
                    expected: signature.arity(),
                    found: bindings.len(),
                });
            }
            Ok(Operation {
                signature,
                bindings,
            })
        })
        .collect()
}
