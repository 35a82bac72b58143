//! Typed parameter values.
//!
//! `SlotType` names the Solidity type a parameter, sub-slot or return value
//! carries; `AbiValue` is a concrete value of one of those types.

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, B256, U256};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotType {
    /// Unsigned integer of the given bit width (8..=256, multiple of 8).
    Uint(u16),
    Address,
    Bool,
    Bytes32,
}

impl SlotType {
    pub const UINT8: SlotType = SlotType::Uint(8);
    pub const UINT16: SlotType = SlotType::Uint(16);
    pub const UINT256: SlotType = SlotType::Uint(256);

    /// Wire tag used by the encoder.
    pub fn tag(&self) -> u8 {
        match self {
            SlotType::Uint(_) => 0,
            SlotType::Address => 1,
            SlotType::Bool => 2,
            SlotType::Bytes32 => 3,
        }
    }

    /// `uint<bits>` if the width is one Solidity allows.
    pub fn uint(bits: u16) -> Option<SlotType> {
        SlotType::valid_bits(bits).then_some(SlotType::Uint(bits))
    }

    fn valid_bits(bits: u16) -> bool {
        (8..=256).contains(&bits) && bits % 8 == 0
    }
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotType::Uint(bits) => write!(f, "uint{bits}"),
            SlotType::Address => write!(f, "address"),
            SlotType::Bool => write!(f, "bool"),
            SlotType::Bytes32 => write!(f, "bytes32"),
        }
    }
}

impl FromStr for SlotType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "address" => Ok(SlotType::Address),
            "bool" => Ok(SlotType::Bool),
            "bytes32" => Ok(SlotType::Bytes32),
            "uint" => Ok(SlotType::UINT256),
            other => {
                let bits = other
                    .strip_prefix("uint")
                    .and_then(|b| b.parse::<u16>().ok())
                    .ok_or_else(|| format!("unknown type '{other}'"))?;
                if !SlotType::valid_bits(bits) {
                    return Err(format!("invalid uint width {bits}"));
                }
                Ok(SlotType::Uint(bits))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AbiValue {
    Uint { value: U256, bits: u16 },
    Address(Address),
    Bool(bool),
    Bytes32(B256),
}

impl AbiValue {
    pub fn uint256(value: u64) -> Self {
        AbiValue::Uint {
            value: U256::from(value),
            bits: 256,
        }
    }

    pub fn uint(value: U256, bits: u16) -> Self {
        AbiValue::Uint { value, bits }
    }

    pub fn slot_type(&self) -> SlotType {
        match self {
            AbiValue::Uint { bits, .. } => SlotType::Uint(*bits),
            AbiValue::Address(_) => SlotType::Address,
            AbiValue::Bool(_) => SlotType::Bool,
            AbiValue::Bytes32(_) => SlotType::Bytes32,
        }
    }

    /// The zero value of `ty`, written into calldata where the interpreter
    /// overwrites a parameter with a piped return value.
    pub fn zero(ty: SlotType) -> Self {
        match ty {
            SlotType::Uint(bits) => AbiValue::Uint {
                value: U256::ZERO,
                bits,
            },
            SlotType::Address => AbiValue::Address(Address::ZERO),
            SlotType::Bool => AbiValue::Bool(false),
            SlotType::Bytes32 => AbiValue::Bytes32(B256::ZERO),
        }
    }

    /// Parse a literal of the given type. Integers accept decimal or `0x` hex.
    pub fn parse(ty: SlotType, text: &str) -> Result<Self, String> {
        let text = text.trim();
        match ty {
            SlotType::Uint(bits) => {
                let value = U256::from_str(text)
                    .map_err(|_| format!("'{text}' is not an unsigned integer"))?;
                if value.bit_len() > bits as usize {
                    return Err(format!("{text} does not fit in uint{bits}"));
                }
                Ok(AbiValue::Uint { value, bits })
            }
            SlotType::Address => Address::from_str(text)
                .map(AbiValue::Address)
                .map_err(|_| format!("'{text}' is not an address")),
            SlotType::Bool => match text.to_lowercase().as_str() {
                "true" | "1" => Ok(AbiValue::Bool(true)),
                "false" | "0" => Ok(AbiValue::Bool(false)),
                _ => Err(format!("'{text}' is not a bool")),
            },
            SlotType::Bytes32 => B256::from_str(text)
                .map(AbiValue::Bytes32)
                .map_err(|_| format!("'{text}' is not a bytes32 value")),
        }
    }

    /// Parse the `type:value` form used by snapshot files.
    pub fn parse_typed(text: &str) -> Result<Self, String> {
        let (ty, value) = text
            .split_once(':')
            .ok_or_else(|| format!("expected 'type:value', found '{text}'"))?;
        AbiValue::parse(ty.parse()?, value)
    }

    pub fn as_uint(&self) -> Option<U256> {
        match self {
            AbiValue::Uint { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            AbiValue::Address(addr) => Some(*addr),
            _ => None,
        }
    }

    pub fn to_sol(&self) -> DynSolValue {
        match self {
            AbiValue::Uint { value, bits } => DynSolValue::Uint(*value, *bits as usize),
            AbiValue::Address(addr) => DynSolValue::Address(*addr),
            AbiValue::Bool(b) => DynSolValue::Bool(*b),
            AbiValue::Bytes32(word) => DynSolValue::FixedBytes(*word, 32),
        }
    }
}

impl fmt::Display for AbiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiValue::Uint { value, .. } => write!(f, "{value}"),
            AbiValue::Address(addr) => write!(f, "{addr}"),
            AbiValue::Bool(b) => write!(f, "{b}"),
            AbiValue::Bytes32(word) => write!(f, "{word}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_type_names_round_trip() {
        for name in ["uint8", "uint16", "uint256", "address", "bool", "bytes32"] {
            let ty: SlotType = name.parse().unwrap();
            assert_eq!(ty.to_string(), name);
        }
    }

    #[test]
    fn bare_uint_is_uint256() {
        assert_eq!("uint".parse::<SlotType>().unwrap(), SlotType::UINT256);
    }

    #[test]
    fn rejects_odd_uint_widths() {
        assert!("uint7".parse::<SlotType>().is_err());
        assert!("uint264".parse::<SlotType>().is_err());
        assert!("int256".parse::<SlotType>().is_err());
    }

    #[test]
    fn parse_uint_checks_width() {
        assert_eq!(
            AbiValue::parse(SlotType::UINT8, "255").unwrap(),
            AbiValue::Uint {
                value: U256::from(255u64),
                bits: 8
            }
        );
        assert!(AbiValue::parse(SlotType::UINT8, "256").is_err());
        assert!(AbiValue::parse(SlotType::UINT256, "-1").is_err());
    }

    #[test]
    fn parse_uint_accepts_hex() {
        let v = AbiValue::parse(SlotType::UINT256, "0xff").unwrap();
        assert_eq!(v.as_uint(), Some(U256::from(255u64)));
    }

    #[test]
    fn parse_address_and_bool() {
        let addr = AbiValue::parse(
            SlotType::Address,
            "0x6B175474E89094C44Da98b954EedeAC495271d0F",
        )
        .unwrap();
        assert_eq!(addr.slot_type(), SlotType::Address);
        assert_eq!(
            AbiValue::parse(SlotType::Bool, "true").unwrap(),
            AbiValue::Bool(true)
        );
        assert!(AbiValue::parse(SlotType::Address, "0x1234").is_err());
        assert!(AbiValue::parse(SlotType::Bool, "maybe").is_err());
    }

    #[test]
    fn parse_typed_splits_on_colon() {
        let v = AbiValue::parse_typed("uint256:1000").unwrap();
        assert_eq!(v, AbiValue::uint256(1000));
        assert!(AbiValue::parse_typed("1000").is_err());
    }

    #[test]
    fn zero_has_requested_type() {
        for ty in [
            SlotType::UINT16,
            SlotType::Address,
            SlotType::Bool,
            SlotType::Bytes32,
        ] {
            assert_eq!(AbiValue::zero(ty).slot_type(), ty);
        }
    }
}
