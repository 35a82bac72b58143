//! Core domain types and logic.

pub mod value;
pub mod binding;
pub mod registry;
pub mod strategy;
pub mod validation;
pub mod binding_parser;
pub mod encoder;
pub mod strategy_store;
pub mod subscription;
pub mod substitution;
pub mod bundle;
pub mod predicate_parser;
pub mod execution;
pub mod config_validation;
pub mod error;
