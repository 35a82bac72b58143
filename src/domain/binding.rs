//! Parameter bindings.
//!
//! A `Binding` says where one parameter of an action or trigger gets its
//! value from:
//! - `Constant`: fixed when the strategy is authored
//! - `SubSlot`: read from the calling subscription's stored values
//! - `Variable`: supplied by the keeper right before execution
//! - `Piped`: the return value of an earlier action (1-based position)

use crate::domain::value::AbiValue;
use std::fmt;

/// Reserved sub-slot resolving to the subscription owner's wallet.
pub const PROXY_SLOT: &str = "proxy";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Constant(AbiValue),
    SubSlot(String),
    Variable(String),
    Piped(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BindingKind {
    Constant = 0,
    SubSlot = 1,
    Variable = 2,
    Piped = 3,
}

impl BindingKind {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(BindingKind::Constant),
            1 => Some(BindingKind::SubSlot),
            2 => Some(BindingKind::Variable),
            3 => Some(BindingKind::Piped),
            _ => None,
        }
    }
}

impl Binding {
    pub fn constant(value: AbiValue) -> Self {
        Binding::Constant(value)
    }

    pub fn sub_slot(name: impl Into<String>) -> Self {
        Binding::SubSlot(name.into())
    }

    pub fn variable(placeholder: impl Into<String>) -> Self {
        Binding::Variable(placeholder.into())
    }

    pub fn piped(index: usize) -> Self {
        Binding::Piped(index)
    }

    pub fn kind(&self) -> BindingKind {
        match self {
            Binding::Constant(_) => BindingKind::Constant,
            Binding::SubSlot(_) => BindingKind::SubSlot,
            Binding::Variable(_) => BindingKind::Variable,
            Binding::Piped(_) => BindingKind::Piped,
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Constant(value) => write!(f, "{value}"),
            Binding::SubSlot(name) => write!(f, "&{name}"),
            Binding::Variable(name) => write!(f, "%{name}"),
            Binding::Piped(index) => write!(f, "${index}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_match_wire_contract() {
        assert_eq!(BindingKind::Constant.tag(), 0);
        assert_eq!(BindingKind::SubSlot.tag(), 1);
        assert_eq!(BindingKind::Variable.tag(), 2);
        assert_eq!(BindingKind::Piped.tag(), 3);
    }

    #[test]
    fn from_tag_rejects_unknown() {
        assert_eq!(BindingKind::from_tag(3), Some(BindingKind::Piped));
        assert_eq!(BindingKind::from_tag(4), None);
    }

    #[test]
    fn display_uses_sigils() {
        assert_eq!(Binding::sub_slot("vaultId").to_string(), "&vaultId");
        assert_eq!(Binding::variable("amount").to_string(), "%amount");
        assert_eq!(Binding::piped(2).to_string(), "$2");
        assert_eq!(Binding::constant(AbiValue::uint256(7)).to_string(), "7");
    }
}
