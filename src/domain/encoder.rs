//! Wire encoding of strategies.
//!
//! Layout, all integers big-endian:
//!
//! ```text
//! version u8 | name_hash [32] | name (u16 len, utf8) | flavor u8
//! sub-slots: u8 count, each (u8 len, name, type)
//! triggers:  u8 count, each operation
//! actions:   u8 count, each operation
//!
//! operation = id [4] | u8 len, name | u8 param count | params
//! param     = kind u8 | payload
//!   CONSTANT  type, value bytes
//!   SUBSLOT   u8 table index (255 = proxy)
//!   VARIABLE  u8 slot index, u8 len, name
//!   PIPED     u8 action index (1-based)
//! type      = 0 uint (u16 bits) | 1 address | 2 bool | 3 bytes32
//! ```
//!
//! Encoding is a pure function of the strategy value; the strategy id is the
//! keccak256 of the whole encoding.

use crate::domain::binding::{Binding, BindingKind, PROXY_SLOT};
use crate::domain::error::StratforgeError;
use crate::domain::registry::{self, OperationKind};
use crate::domain::strategy::{Flavor, Operation, Strategy, StrategyBuilder};
use crate::domain::value::{AbiValue, SlotType};
use alloy_primitives::{Address, B256, U256, keccak256};
use std::fmt;
use std::str::FromStr;

pub const ENCODING_VERSION: u8 = 1;
/// Sub-slot index standing for the reserved `proxy` slot.
pub const PROXY_SLOT_INDEX: u8 = 255;
/// Parameter mapping byte: sub-slot `i` maps to `SUB_SLOT_MAPPING_BASE + i`.
pub const SUB_SLOT_MAPPING_BASE: u8 = 128;

/// Content address of an encoded strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrategyId(pub B256);

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for StrategyId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        B256::from_str(s.trim())
            .map(StrategyId)
            .map_err(|_| format!("'{s}' is not a strategy id"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedStrategy {
    pub id: StrategyId,
    pub bytes: Vec<u8>,
    /// Encoding of each trigger, in declared order.
    pub triggers: Vec<Vec<u8>>,
    /// Encoding of each action, in declared order.
    pub actions: Vec<Vec<u8>>,
    /// One byte per action parameter: 0 call data, 1..=127 piped action,
    /// 128 + i sub-slot i, 255 proxy.
    pub param_mapping: Vec<Vec<u8>>,
}

pub fn encode(strategy: &Strategy) -> EncodedStrategy {
    let triggers: Vec<Vec<u8>> = strategy
        .triggers()
        .iter()
        .map(|op| encode_operation(strategy, op))
        .collect();
    let actions: Vec<Vec<u8>> = strategy
        .actions()
        .iter()
        .map(|op| encode_operation(strategy, op))
        .collect();

    let mut bytes = Vec::new();
    bytes.push(ENCODING_VERSION);
    bytes.extend_from_slice(keccak256(strategy.name().as_bytes()).as_slice());
    bytes.extend_from_slice(&(strategy.name().len() as u16).to_be_bytes());
    bytes.extend_from_slice(strategy.name().as_bytes());
    bytes.push(strategy.flavor().tag());

    bytes.push(strategy.sub_slots().len() as u8);
    for slot in strategy.sub_slots() {
        push_short_str(&mut bytes, &slot.name);
        encode_type(&mut bytes, slot.ty);
    }

    bytes.push(triggers.len() as u8);
    for op in &triggers {
        bytes.extend_from_slice(op);
    }
    bytes.push(actions.len() as u8);
    for op in &actions {
        bytes.extend_from_slice(op);
    }

    EncodedStrategy {
        id: StrategyId(keccak256(&bytes)),
        param_mapping: param_mapping(strategy),
        bytes,
        triggers,
        actions,
    }
}

/// The on-chain parameter mapping for every action of `strategy`.
pub fn param_mapping(strategy: &Strategy) -> Vec<Vec<u8>> {
    strategy
        .actions()
        .iter()
        .map(|action| {
            action
                .bindings()
                .iter()
                .map(|binding| match binding {
                    Binding::Constant(_) | Binding::Variable(_) => 0,
                    Binding::Piped(index) => *index as u8,
                    Binding::SubSlot(name) => sub_slot_index(strategy, name)
                        .map(|i| {
                            if i == PROXY_SLOT_INDEX {
                                i
                            } else {
                                SUB_SLOT_MAPPING_BASE + i
                            }
                        })
                        .unwrap_or(0),
                })
                .collect()
        })
        .collect()
}

fn sub_slot_index(strategy: &Strategy, name: &str) -> Option<u8> {
    if name == PROXY_SLOT {
        return Some(PROXY_SLOT_INDEX);
    }
    strategy.sub_slot_index(name).map(|i| i as u8)
}

fn push_short_str(out: &mut Vec<u8>, s: &str) {
    out.push(s.len() as u8);
    out.extend_from_slice(s.as_bytes());
}

fn encode_type(out: &mut Vec<u8>, ty: SlotType) {
    out.push(ty.tag());
    if let SlotType::Uint(bits) = ty {
        out.extend_from_slice(&bits.to_be_bytes());
    }
}

fn encode_value(out: &mut Vec<u8>, value: &AbiValue) {
    encode_type(out, value.slot_type());
    match value {
        AbiValue::Uint { value, .. } => out.extend_from_slice(&value.to_be_bytes::<32>()),
        AbiValue::Address(addr) => out.extend_from_slice(addr.as_slice()),
        AbiValue::Bool(b) => out.push(u8::from(*b)),
        AbiValue::Bytes32(word) => out.extend_from_slice(word.as_slice()),
    }
}

fn encode_operation(strategy: &Strategy, op: &Operation) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&op.signature().id());
    push_short_str(&mut out, op.name());
    out.push(op.bindings().len() as u8);

    let mut variable_slot = 0u8;
    for binding in op.bindings() {
        out.push(binding.kind().tag());
        match binding {
            Binding::Constant(value) => encode_value(&mut out, value),
            Binding::SubSlot(name) => {
                out.push(sub_slot_index(strategy, name).unwrap_or(PROXY_SLOT_INDEX))
            }
            Binding::Variable(name) => {
                out.push(variable_slot);
                variable_slot += 1;
                push_short_str(&mut out, name);
            }
            Binding::Piped(index) => out.push(*index as u8),
        }
    }
    out
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn error(&self, offset: usize, reason: impl Into<String>) -> StratforgeError {
        StratforgeError::Decode {
            offset,
            reason: reason.into(),
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], StratforgeError> {
        let end = self.pos + len;
        if end > self.bytes.len() {
            return Err(self.error(
                self.pos,
                format!("unexpected end of input, needed {len} more bytes"),
            ));
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, StratforgeError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, StratforgeError> {
        let raw = self.take(2)?;
        Ok(u16::from_be_bytes([raw[0], raw[1]]))
    }

    fn str(&mut self, len: usize) -> Result<String, StratforgeError> {
        let start = self.pos;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| self.error(start, "name is not valid UTF-8"))
    }

    fn short_str(&mut self) -> Result<String, StratforgeError> {
        let len = self.u8()? as usize;
        self.str(len)
    }

    fn slot_type(&mut self) -> Result<SlotType, StratforgeError> {
        let start = self.pos;
        match self.u8()? {
            0 => {
                let bits = self.u16()?;
                SlotType::uint(bits)
                    .ok_or_else(|| self.error(start, format!("invalid uint width {bits}")))
            }
            1 => Ok(SlotType::Address),
            2 => Ok(SlotType::Bool),
            3 => Ok(SlotType::Bytes32),
            tag => Err(self.error(start, format!("unknown type tag {tag}"))),
        }
    }

    fn value(&mut self) -> Result<AbiValue, StratforgeError> {
        let ty = self.slot_type()?;
        let start = self.pos;
        match ty {
            SlotType::Uint(bits) => {
                let value = U256::from_be_slice(self.take(32)?);
                if value.bit_len() > bits as usize {
                    return Err(self.error(start, format!("constant does not fit in uint{bits}")));
                }
                Ok(AbiValue::Uint { value, bits })
            }
            SlotType::Address => Ok(AbiValue::Address(Address::from_slice(self.take(20)?))),
            SlotType::Bool => match self.u8()? {
                0 => Ok(AbiValue::Bool(false)),
                1 => Ok(AbiValue::Bool(true)),
                other => Err(self.error(start, format!("invalid bool byte {other}"))),
            },
            SlotType::Bytes32 => Ok(AbiValue::Bytes32(B256::from_slice(self.take(32)?))),
        }
    }
}

/// Decode a strategy from its wire form and re-validate it.
pub fn decode(bytes: &[u8]) -> Result<Strategy, StratforgeError> {
    let mut reader = Reader::new(bytes);

    let version = reader.u8()?;
    if version != ENCODING_VERSION {
        return Err(reader.error(0, format!("unsupported encoding version {version}")));
    }
    let hash_offset = reader.pos;
    let name_hash = B256::from_slice(reader.take(32)?);
    let name_len = reader.u16()? as usize;
    let name = reader.str(name_len)?;
    if keccak256(name.as_bytes()) != name_hash {
        return Err(reader.error(hash_offset, "name hash does not match name"));
    }

    let flavor_offset = reader.pos;
    let flavor_tag = reader.u8()?;
    let flavor = Flavor::from_tag(flavor_tag)
        .ok_or_else(|| reader.error(flavor_offset, format!("unknown flavor {flavor_tag}")))?;

    let mut builder = StrategyBuilder::new(name).flavor(flavor);
    let mut sub_slot_names = Vec::new();
    for _ in 0..reader.u8()? {
        let slot = reader.short_str()?;
        let ty = reader.slot_type()?;
        sub_slot_names.push(slot.clone());
        builder = builder.sub_slot(slot, ty);
    }

    for _ in 0..reader.u8()? {
        let (op, bindings) = decode_operation(&mut reader, OperationKind::Trigger, &sub_slot_names)?;
        builder = builder.trigger(op, bindings);
    }
    for _ in 0..reader.u8()? {
        let (op, bindings) = decode_operation(&mut reader, OperationKind::Action, &sub_slot_names)?;
        builder = builder.action(op, bindings);
    }

    if reader.pos != bytes.len() {
        return Err(reader.error(
            reader.pos,
            format!("{} trailing bytes", bytes.len() - reader.pos),
        ));
    }
    builder.build()
}

fn decode_operation(
    reader: &mut Reader<'_>,
    kind: OperationKind,
    sub_slot_names: &[String],
) -> Result<(String, Vec<Binding>), StratforgeError> {
    let id_offset = reader.pos;
    let id = reader.take(4)?;
    let mut expected = [0u8; 4];
    expected.copy_from_slice(id);
    let name = reader.short_str()?;
    if registry::operation_id(&name) != expected {
        return Err(reader.error(id_offset, format!("operation id does not match '{name}'")));
    }
    if registry::lookup(kind, &name).is_none() {
        return Err(StratforgeError::UnknownOperation { name });
    }

    let count = reader.u8()?;
    let mut bindings = Vec::with_capacity(count as usize);
    let mut variable_slot = 0u8;
    for _ in 0..count {
        let tag_offset = reader.pos;
        let tag = reader.u8()?;
        let binding_kind = BindingKind::from_tag(tag)
            .ok_or_else(|| reader.error(tag_offset, format!("unknown binding tag {tag}")))?;
        let binding = match binding_kind {
            BindingKind::Constant => Binding::Constant(reader.value()?),
            BindingKind::SubSlot => {
                let index_offset = reader.pos;
                let index = reader.u8()?;
                if index == PROXY_SLOT_INDEX {
                    Binding::SubSlot(PROXY_SLOT.to_string())
                } else {
                    let slot = sub_slot_names.get(index as usize).ok_or_else(|| {
                        reader.error(index_offset, format!("sub-slot index {index} out of range"))
                    })?;
                    Binding::SubSlot(slot.clone())
                }
            }
            BindingKind::Variable => {
                let slot_offset = reader.pos;
                let slot = reader.u8()?;
                if slot != variable_slot {
                    return Err(reader.error(
                        slot_offset,
                        format!("variable slot {slot} out of order, expected {variable_slot}"),
                    ));
                }
                variable_slot = variable_slot.saturating_add(1);
                Binding::Variable(reader.short_str()?)
            }
            BindingKind::Piped => Binding::Piped(reader.u8()? as usize),
        };
        bindings.push(binding);
    }
    Ok((name, bindings))
}
