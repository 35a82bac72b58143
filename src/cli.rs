//! CLI definition and dispatch.

use alloy_primitives::Address;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use tracing::warn;

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::memory_subscription_store::MemorySubscriptionStore;
use crate::domain::binding::Binding;
use crate::domain::binding_parser;
use crate::domain::bundle::{BundleMember, Predicate, StateSnapshot, VariableSource};
use crate::domain::config_validation::{
    numbered_sections, parse_sub_slot_list, validate_keeper_config, validate_strategy_config,
};
use crate::domain::encoder;
use crate::domain::error::StratforgeError;
use crate::domain::execution::{PreparedExecution, prepare_execution};
use crate::domain::predicate_parser;
use crate::domain::registry::{self, OperationKind};
use crate::domain::strategy::{Flavor, Operation, Strategy, SubSlotDecl};
use crate::domain::strategy_store::{BundleId, StrategyStore};
use crate::domain::subscription::{SubscriptionHandle, SubscriptionManager};
use crate::domain::value::{AbiValue, SlotType};
use crate::ports::config_port::ConfigPort;
use crate::ports::subscription_port::SubscriptionPort;

#[derive(Parser, Debug)]
#[command(name = "stratforge", about = "Composable DeFi automation strategies")]
pub struct Cli {
    /// Log level or filter directives, e.g. `debug` or `info,r2d2=warn`
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build and validate a strategy file
    Validate {
        #[arg(short, long)]
        strategy: PathBuf,
    },
    /// Encode a strategy file and print its id and byte layout
    Encode {
        #[arg(short, long)]
        strategy: PathBuf,
        /// Write the raw encoding to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Decode a raw strategy encoding
    Decode {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Subscribe the keeper file's owner to its bundle
    Subscribe {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Select a bundle member and print the calldata for one execution
    Prepare {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Validate { strategy } => run_validate(&strategy),
        Command::Encode { strategy, output } => run_encode(&strategy, output.as_deref()),
        Command::Decode { input } => run_decode(&input),
        Command::Subscribe { config } => run_subscribe(&config),
        Command::Prepare { config } => run_prepare(&config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, StratforgeError> {
    FileConfigAdapter::from_file(path).map_err(|e| StratforgeError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Load, validate and build the strategy file at `path`.
pub fn load_strategy(path: &Path) -> Result<Strategy, StratforgeError> {
    let adapter = load_config(path)?;
    validate_strategy_config(&adapter)?;
    build_strategy(&adapter)
}

pub fn build_strategy(config: &dyn ConfigPort) -> Result<Strategy, StratforgeError> {
    let name = config.get_string("strategy", "name").unwrap_or_default();
    let mut builder = Strategy::builder(name.trim());
    if !config.get_bool("strategy", "continuous", true) {
        builder = builder.one_shot();
    }

    let sub_slots = config.get_string("strategy", "sub_slots").unwrap_or_default();
    let sub_slots =
        parse_sub_slot_list(&sub_slots).map_err(|reason| StratforgeError::ConfigInvalid {
            section: "strategy".to_string(),
            key: "sub_slots".to_string(),
            reason,
        })?;
    for (slot, ty) in sub_slots {
        builder = builder.sub_slot(slot, ty);
    }

    for n in 1..=numbered_sections(config, "trigger")? {
        let (op, bindings) = operation_section(config, OperationKind::Trigger, &format!("trigger.{n}"))?;
        builder = builder.trigger(op, bindings);
    }
    for n in 1..=numbered_sections(config, "action")? {
        let (op, bindings) = operation_section(config, OperationKind::Action, &format!("action.{n}"))?;
        builder = builder.action(op, bindings);
    }

    builder.build()
}

fn operation_section(
    config: &dyn ConfigPort,
    kind: OperationKind,
    section: &str,
) -> Result<(String, Vec<Binding>), StratforgeError> {
    let op = config
        .get_string(section, "op")
        .unwrap_or_default()
        .trim()
        .to_string();
    let signature =
        registry::lookup(kind, &op).ok_or_else(|| StratforgeError::UnknownOperation {
            name: op.clone(),
        })?;

    let params = config.get_string(section, "params").unwrap_or_default();
    let bindings = binding_parser::parse_bindings(&params, signature.params).map_err(|e| {
        eprintln!(
            "error: failed to parse [{section}] params:\n{}",
            e.display_with_context(&params)
        );
        StratforgeError::from(e)
    })?;
    Ok((op, bindings))
}

/// Render `strategy` in the strategy file format.
pub fn render_strategy_config(strategy: &Strategy) -> String {
    let mut out = String::new();
    let sub_slots: Vec<String> = strategy.sub_slots().iter().map(SubSlotDecl::to_string).collect();

    out.push_str("[strategy]\n");
    out.push_str(&format!("name = {}\n", strategy.name()));
    out.push_str(&format!("continuous = {}\n", strategy.flavor() == Flavor::Continuous));
    if !sub_slots.is_empty() {
        out.push_str(&format!("sub_slots = {}\n", sub_slots.join(", ")));
    }

    let mut section = |prefix: &str, ops: &[Operation]| {
        for (i, op) in ops.iter().enumerate() {
            let params: Vec<String> = op.bindings().iter().map(ToString::to_string).collect();
            out.push_str(&format!("\n[{prefix}.{}]\n", i + 1));
            out.push_str(&format!("op = {}\n", op.name()));
            out.push_str(&format!("params = {}\n", params.join(", ")));
        }
    };
    section("trigger", strategy.triggers());
    section("action", strategy.actions());
    out
}

fn run_validate(strategy_path: &Path) -> Result<(), StratforgeError> {
    eprintln!("Validating strategy: {}", strategy_path.display());
    let strategy = load_strategy(strategy_path)?;

    println!("Strategy:  {}", strategy.name());
    println!("Id:        {}", strategy.id());
    println!(
        "Flavor:    {}",
        if strategy.is_continuous() { "continuous" } else { "one-shot" }
    );
    println!("Sub-slots: {}", strategy.sub_slots().len());
    for slot in strategy.sub_slots() {
        println!("  {slot}");
    }
    println!("Triggers:  {}", strategy.triggers().len());
    println!("Actions:   {}", strategy.actions().len());
    let variables = strategy.variable_types();
    if !variables.is_empty() {
        println!("Variables:");
        for (name, ty) in &variables {
            println!("  %{name}: {ty}");
        }
    }
    eprintln!("\nStrategy is valid.");
    Ok(())
}

fn run_encode(strategy_path: &Path, output: Option<&Path>) -> Result<(), StratforgeError> {
    let strategy = load_strategy(strategy_path)?;
    let encoded = encoder::encode(&strategy);

    println!("id: {}", encoded.id);
    println!("bytes: {}", encoded.bytes.len());
    for (i, (op, bytes)) in strategy.triggers().iter().zip(&encoded.triggers).enumerate() {
        println!("trigger.{} {}: 0x{}", i + 1, op.name(), hex::encode(bytes));
    }
    for (i, (op, bytes)) in strategy.actions().iter().zip(&encoded.actions).enumerate() {
        println!("action.{} {}: 0x{}", i + 1, op.name(), hex::encode(bytes));
    }
    for (i, mapping) in encoded.param_mapping.iter().enumerate() {
        println!("mapping.{}: {:?}", i + 1, mapping);
    }

    if let Some(path) = output {
        fs::write(path, &encoded.bytes)?;
        eprintln!("Wrote {} bytes to {}", encoded.bytes.len(), path.display());
    }
    Ok(())
}

fn run_decode(input: &Path) -> Result<(), StratforgeError> {
    let bytes = fs::read(input)?;
    let strategy = encoder::decode(&bytes)?;
    println!("; id: {}", strategy.id());
    print!("{}", render_strategy_config(&strategy));
    Ok(())
}

/// Everything a keeper file describes, built and validated.
pub struct KeeperSetup {
    pub store: StrategyStore,
    pub bundle: BundleId,
    pub owner: Address,
    /// A persisted subscription to reuse instead of subscribing afresh.
    pub subscription: Option<SubscriptionHandle>,
    pub values: BTreeMap<String, AbiValue>,
    pub snapshot: StateSnapshot,
    pub variables: BTreeMap<String, AbiValue>,
}

/// Build the keeper file's bundle and inputs. Member strategy paths are
/// resolved against `base_dir`.
pub fn build_keeper(config: &dyn ConfigPort, base_dir: &Path) -> Result<KeeperSetup, StratforgeError> {
    validate_keeper_config(config)?;

    let mut store = StrategyStore::new();
    let bundle = build_bundle(config, base_dir, &mut store)?;

    let mut variable_types = BTreeMap::new();
    for member in &store.bundle(bundle)?.members {
        for (name, ty) in store.get(&member.strategy)?.variable_types() {
            variable_types.entry(name).or_insert(ty);
        }
    }

    let owner = config.get_string("subscription", "owner").unwrap_or_default();
    let owner = Address::from_str(owner.trim()).map_err(|_| StratforgeError::ConfigInvalid {
        section: "subscription".to_string(),
        key: "owner".to_string(),
        reason: format!("'{}' is not an address", owner.trim()),
    })?;
    let subscription = config
        .get_string("subscription", "id")
        .map(|_| SubscriptionHandle(config.get_int("subscription", "id", 0) as u64));

    Ok(KeeperSetup {
        values: subscription_values(config, store.bundle_sub_slots(bundle)?)?,
        snapshot: build_snapshot(config)?,
        variables: caller_variables(config, &variable_types)?,
        store,
        bundle,
        owner,
        subscription,
    })
}

/// Register each member strategy and group them into the keeper's bundle.
pub fn build_bundle(
    config: &dyn ConfigPort,
    base_dir: &Path,
    store: &mut StrategyStore,
) -> Result<BundleId, StratforgeError> {
    let name = config.get_string("bundle", "name").unwrap_or_default();
    let mut members = Vec::new();

    for n in 1..=numbered_sections(config, "member")? {
        let section = format!("member.{n}");
        let path = config.get_string(&section, "strategy").unwrap_or_default();
        let strategy = load_strategy(&base_dir.join(path.trim()))?;
        let variable_types = strategy.variable_types();
        let id = store.register(strategy);

        let precondition = match config.get_string(&section, "precondition") {
            Some(text) if !text.trim().is_empty() => parse_precondition(&section, &text)?,
            _ => Predicate::Always,
        };
        let label = config.get_string(&section, "label").unwrap_or_else(|| section.clone());
        let mut member = BundleMember::new(id, label, precondition);

        let variables_section = format!("{section}.variables");
        for key in config.keys(&variables_section) {
            let text = config
                .get_string(&variables_section, &key)
                .unwrap_or_default();
            let source = match text.trim().strip_prefix('@') {
                Some(snapshot_key) => VariableSource::Snapshot(snapshot_key.to_string()),
                None => {
                    let ty = variable_types.get(&key).copied().ok_or_else(|| {
                        StratforgeError::ConfigInvalid {
                            section: variables_section.clone(),
                            key: key.clone(),
                            reason: format!("the member strategy has no variable '%{key}'"),
                        }
                    })?;
                    VariableSource::Constant(typed_value(&variables_section, &key, ty, &text)?)
                }
            };
            member = member.with_variable(key, source);
        }
        members.push(member);
    }

    store.create_bundle(name.trim(), members)
}

fn parse_precondition(section: &str, text: &str) -> Result<Predicate, StratforgeError> {
    predicate_parser::parse(text).map_err(|e| {
        eprintln!(
            "error: failed to parse [{section}] precondition:\n{}",
            e.display_with_context(text)
        );
        StratforgeError::from(e)
    })
}

pub fn build_snapshot(config: &dyn ConfigPort) -> Result<StateSnapshot, StratforgeError> {
    config
        .keys("snapshot")
        .into_iter()
        .map(|key| {
            let text = config.get_string("snapshot", &key).unwrap_or_default();
            let value = AbiValue::parse_typed(&text).map_err(|reason| {
                StratforgeError::ConfigInvalid {
                    section: "snapshot".to_string(),
                    key: key.clone(),
                    reason,
                }
            })?;
            Ok((key, value))
        })
        .collect()
}

/// `[subscription.values]`, typed by the bundle's sub-slot table.
pub fn subscription_values(
    config: &dyn ConfigPort,
    sub_slots: &[SubSlotDecl],
) -> Result<BTreeMap<String, AbiValue>, StratforgeError> {
    let section = "subscription.values";
    config
        .keys(section)
        .into_iter()
        .map(|key| {
            let slot = sub_slots.iter().find(|s| s.name == key).ok_or_else(|| {
                StratforgeError::UndeclaredSubSlot {
                    operation: format!("[{section}]"),
                    name: key.clone(),
                }
            })?;
            let text = config.get_string(section, &key).unwrap_or_default();
            let value = typed_value(section, &key, slot.ty, &text)?;
            Ok((key, value))
        })
        .collect()
}

/// `[variables]`, typed by the placeholders the bundle's strategies use.
pub fn caller_variables(
    config: &dyn ConfigPort,
    types: &BTreeMap<String, SlotType>,
) -> Result<BTreeMap<String, AbiValue>, StratforgeError> {
    config
        .keys("variables")
        .into_iter()
        .map(|key| {
            let ty = types
                .get(&key)
                .copied()
                .ok_or_else(|| StratforgeError::ConfigInvalid {
                    section: "variables".to_string(),
                    key: key.clone(),
                    reason: format!("no strategy in the bundle uses '%{key}'"),
                })?;
            let text = config.get_string("variables", &key).unwrap_or_default();
            let value = typed_value("variables", &key, ty, &text)?;
            Ok((key, value))
        })
        .collect()
}

fn typed_value(
    section: &str,
    key: &str,
    ty: SlotType,
    text: &str,
) -> Result<AbiValue, StratforgeError> {
    AbiValue::parse(ty, text).map_err(|reason| StratforgeError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason,
    })
}

/// The configured subscription store: sqlite when `[sqlite] path` is set,
/// otherwise an in-process store that is dropped on exit.
pub fn open_store(config: &dyn ConfigPort) -> Result<Box<dyn SubscriptionPort>, StratforgeError> {
    if config.get_string("sqlite", "path").is_some() {
        return open_sqlite_store(config);
    }
    Ok(Box::new(MemorySubscriptionStore::new()))
}

#[cfg(feature = "sqlite")]
fn open_sqlite_store(config: &dyn ConfigPort) -> Result<Box<dyn SubscriptionPort>, StratforgeError> {
    use crate::adapters::sqlite_adapter::SqliteSubscriptionStore;
    Ok(Box::new(SqliteSubscriptionStore::from_config(config)?))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite_store(_config: &dyn ConfigPort) -> Result<Box<dyn SubscriptionPort>, StratforgeError> {
    Err(StratforgeError::ConfigInvalid {
        section: "sqlite".to_string(),
        key: "path".to_string(),
        reason: "built without the sqlite feature".to_string(),
    })
}

fn load_keeper(config_path: &Path) -> Result<(FileConfigAdapter, KeeperSetup), StratforgeError> {
    eprintln!("Loading keeper config from {}", config_path.display());
    let adapter = load_config(config_path)?;
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let setup = build_keeper(&adapter, base_dir)?;
    Ok((adapter, setup))
}

fn run_subscribe(config_path: &Path) -> Result<(), StratforgeError> {
    let (adapter, setup) = load_keeper(config_path)?;
    if adapter.get_string("sqlite", "path").is_none() {
        warn!("no [sqlite] path configured, the subscription will not be persisted");
    }
    let manager = SubscriptionManager::new(open_store(&adapter)?);
    let handle = manager.subscribe_bundle(
        &setup.store,
        setup.bundle,
        setup.owner,
        setup.values.clone(),
    )?;
    let subscription = manager.load(handle)?;

    println!("subscription: {handle}");
    println!("target: {}", subscription.target);
    println!("owner: {}", subscription.owner);
    println!("hash: {}", subscription.hash());
    Ok(())
}

fn run_prepare(config_path: &Path) -> Result<(), StratforgeError> {
    let (adapter, setup) = load_keeper(config_path)?;
    let prepared = match setup.subscription {
        Some(handle) => {
            let manager = SubscriptionManager::new(open_store(&adapter)?);
            prepare_for(&setup, &manager, handle)?
        }
        None => {
            let manager = SubscriptionManager::new(MemorySubscriptionStore::new());
            let handle = manager.subscribe_bundle(
                &setup.store,
                setup.bundle,
                setup.owner,
                setup.values.clone(),
            )?;
            prepare_for(&setup, &manager, handle)?
        }
    };
    print!("{}", render_prepared(&setup, &prepared)?);
    Ok(())
}

pub fn prepare_for<P: SubscriptionPort>(
    setup: &KeeperSetup,
    manager: &SubscriptionManager<P>,
    handle: SubscriptionHandle,
) -> Result<PreparedExecution, StratforgeError> {
    prepare_execution(
        &setup.store,
        manager,
        handle,
        setup.bundle,
        &setup.snapshot,
        &setup.variables,
    )
}

pub fn render_prepared(
    setup: &KeeperSetup,
    prepared: &PreparedExecution,
) -> Result<String, StratforgeError> {
    let bundle = setup.store.bundle(setup.bundle)?;
    let strategy = setup.store.get(&prepared.strategy)?;
    let mut out = String::new();

    out.push_str(&format!("bundle: {}\n", bundle.name));
    out.push_str(&format!("subscription: {}\n", prepared.subscription));
    out.push_str(&format!(
        "selected: {} (strategy index {} '{}')\n",
        bundle.members[prepared.strategy_index].label,
        prepared.strategy_index,
        strategy.name()
    ));
    out.push_str(&format!("strategy id: {}\n", prepared.strategy));
    for (name, value) in &prepared.variables {
        out.push_str(&format!("%{name} = {value}\n"));
    }
    for (i, data) in prepared.trigger_call_data.iter().enumerate() {
        out.push_str(&format!("trigger.{}: 0x{}\n", i + 1, hex::encode(data)));
    }
    for (i, data) in prepared.actions_call_data.iter().enumerate() {
        out.push_str(&format!("action.{}: 0x{}\n", i + 1, hex::encode(data)));
    }
    Ok(out)
}
