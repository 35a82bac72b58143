//! Configuration validation.
//!
//! Checks the shape of strategy and keeper files before anything is built,
//! so a typo is reported against its section and key rather than as a
//! dataflow error further down.

use crate::domain::error::StratforgeError;
use crate::domain::value::{AbiValue, SlotType};
use crate::ports::config_port::ConfigPort;
use alloy_primitives::Address;
use std::str::FromStr;

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), StratforgeError> {
    require_non_empty(config, "strategy", "name")?;
    validate_continuous(config)?;
    validate_sub_slots(config)?;
    validate_operations(config, "trigger", false)?;
    validate_operations(config, "action", true)?;
    Ok(())
}

pub fn validate_keeper_config(config: &dyn ConfigPort) -> Result<(), StratforgeError> {
    require_non_empty(config, "bundle", "name")?;
    validate_members(config)?;
    validate_owner(config)?;
    validate_subscription_id(config)?;
    validate_snapshot(config)?;
    sqlite_pool_size(config)?;
    Ok(())
}

pub const DEFAULT_POOL_SIZE: u32 = 4;

/// `[sqlite] pool_size`, at least 1; defaults to [`DEFAULT_POOL_SIZE`].
pub fn sqlite_pool_size(config: &dyn ConfigPort) -> Result<u32, StratforgeError> {
    if config.get_string("sqlite", "pool_size").is_none() {
        return Ok(DEFAULT_POOL_SIZE);
    }
    u32::try_from(config.get_int("sqlite", "pool_size", 0))
        .ok()
        .filter(|size| *size >= 1)
        .ok_or_else(|| StratforgeError::ConfigInvalid {
            section: "sqlite".to_string(),
            key: "pool_size".to_string(),
            reason: "pool size must be a positive integer".to_string(),
        })
}

/// Numbers of the `prefix.N` sections, checked to run 1..=count.
///
/// Sections with a further dot (`member.1.variables`) belong to their parent
/// and are skipped.
pub fn numbered_sections(config: &dyn ConfigPort, prefix: &str) -> Result<usize, StratforgeError> {
    let mut numbers = Vec::new();
    for section in config.sections() {
        let Some(rest) = section
            .strip_prefix(prefix)
            .and_then(|r| r.strip_prefix('.'))
        else {
            continue;
        };
        if rest.contains('.') {
            continue;
        }
        let number: usize = rest.parse().map_err(|_| StratforgeError::ConfigInvalid {
            section: section.clone(),
            key: "section".to_string(),
            reason: format!("expected [{prefix}.N] with N a positive number"),
        })?;
        numbers.push(number);
    }
    numbers.sort_unstable();

    for (expected, found) in (1..).zip(&numbers) {
        if *found != expected {
            return Err(StratforgeError::ConfigInvalid {
                section: format!("{prefix}.{found}"),
                key: "section".to_string(),
                reason: format!(
                    "{prefix} sections must be numbered contiguously from 1, missing {prefix}.{expected}"
                ),
            });
        }
    }
    Ok(numbers.len())
}

/// Split a `name:type, name:type` list.
pub fn parse_sub_slot_list(text: &str) -> Result<Vec<(String, SlotType)>, String> {
    text.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, ty) = entry
                .split_once(':')
                .ok_or_else(|| format!("expected 'name:type', found '{entry}'"))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(format!("missing sub-slot name in '{entry}'"));
            }
            Ok((name.to_string(), ty.parse::<SlotType>()?))
        })
        .collect()
}

fn require_non_empty(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<String, StratforgeError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(StratforgeError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

fn validate_continuous(config: &dyn ConfigPort) -> Result<(), StratforgeError> {
    let Some(value) = config.get_string("strategy", "continuous") else {
        return Ok(());
    };
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "false" | "no" | "0" => Ok(()),
        other => Err(StratforgeError::ConfigInvalid {
            section: "strategy".to_string(),
            key: "continuous".to_string(),
            reason: format!("expected true or false, found '{other}'"),
        }),
    }
}

fn validate_sub_slots(config: &dyn ConfigPort) -> Result<(), StratforgeError> {
    let Some(list) = config.get_string("strategy", "sub_slots") else {
        return Ok(());
    };
    parse_sub_slot_list(&list).map_err(|reason| StratforgeError::ConfigInvalid {
        section: "strategy".to_string(),
        key: "sub_slots".to_string(),
        reason,
    })?;
    Ok(())
}

fn validate_operations(
    config: &dyn ConfigPort,
    prefix: &str,
    required: bool,
) -> Result<(), StratforgeError> {
    let count = numbered_sections(config, prefix)?;
    if required && count == 0 {
        return Err(StratforgeError::ConfigMissing {
            section: format!("{prefix}.1"),
            key: "op".to_string(),
        });
    }
    for n in 1..=count {
        require_non_empty(config, &format!("{prefix}.{n}"), "op")?;
    }
    Ok(())
}

fn validate_members(config: &dyn ConfigPort) -> Result<(), StratforgeError> {
    let count = numbered_sections(config, "member")?;
    if count == 0 {
        return Err(StratforgeError::ConfigMissing {
            section: "member.1".to_string(),
            key: "strategy".to_string(),
        });
    }
    for n in 1..=count {
        require_non_empty(config, &format!("member.{n}"), "strategy")?;
    }
    Ok(())
}

fn validate_owner(config: &dyn ConfigPort) -> Result<(), StratforgeError> {
    let owner = require_non_empty(config, "subscription", "owner")?;
    Address::from_str(owner.trim()).map_err(|_| StratforgeError::ConfigInvalid {
        section: "subscription".to_string(),
        key: "owner".to_string(),
        reason: format!("'{}' is not an address", owner.trim()),
    })?;
    Ok(())
}

fn validate_subscription_id(config: &dyn ConfigPort) -> Result<(), StratforgeError> {
    if config.get_string("subscription", "id").is_none() {
        return Ok(());
    }
    if config.get_int("subscription", "id", 0) < 1 {
        return Err(StratforgeError::ConfigInvalid {
            section: "subscription".to_string(),
            key: "id".to_string(),
            reason: "id must be a positive integer".to_string(),
        });
    }
    Ok(())
}

fn validate_snapshot(config: &dyn ConfigPort) -> Result<(), StratforgeError> {
    for key in config.keys("snapshot") {
        let value = config.get_string("snapshot", &key).unwrap_or_default();
        AbiValue::parse_typed(&value).map_err(|reason| StratforgeError::ConfigInvalid {
            section: "snapshot".to_string(),
            key: key.clone(),
            reason,
        })?;
    }
    Ok(())
}
