#![allow(dead_code)]

use alloy_primitives::{Address, U256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use stratforge::adapters::memory_subscription_store::MemorySubscriptionStore;
use stratforge::domain::binding::Binding;
use stratforge::domain::error::StratforgeError;
use stratforge::domain::strategy::Strategy;
use stratforge::domain::subscription::{NewSubscription, Subscription, SubscriptionHandle};
use stratforge::domain::value::{AbiValue, SlotType};
use stratforge::ports::subscription_port::SubscriptionPort;

pub const DAI: &str = "0x6B175474E89094C44Da98b954EedeAC495271d0F";
pub const WETH: &str = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";
pub const OWNER: &str = "0x00000000000000000000000000000000000000aa";

/// Subscription port that records every call before delegating to an
/// in-memory store.
#[derive(Default)]
pub struct RecordingPort {
    inner: MemorySubscriptionStore,
    pub calls: Mutex<Vec<String>>,
}

impl RecordingPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl SubscriptionPort for RecordingPort {
    fn insert(&self, draft: NewSubscription) -> Result<Subscription, StratforgeError> {
        self.record(format!("insert {}", draft.target));
        self.inner.insert(draft)
    }

    fn fetch(&self, id: SubscriptionHandle) -> Result<Option<Subscription>, StratforgeError> {
        self.record(format!("fetch {id}"));
        self.inner.fetch(id)
    }

    fn set_enabled(&self, id: SubscriptionHandle, enabled: bool) -> Result<bool, StratforgeError> {
        self.record(format!("set_enabled {id} {enabled}"));
        self.inner.set_enabled(id, enabled)
    }

    fn remove(&self, id: SubscriptionHandle) -> Result<bool, StratforgeError> {
        self.record(format!("remove {id}"));
        self.inner.remove(id)
    }

    fn count(&self) -> Result<usize, StratforgeError> {
        self.inner.count()
    }
}

pub fn owner() -> Address {
    OWNER.parse().unwrap()
}

pub fn addr(byte: u8) -> AbiValue {
    AbiValue::Address(Address::repeat_byte(byte))
}

pub fn uint8(value: u64) -> AbiValue {
    AbiValue::uint(U256::from(value), 8)
}

fn with_repay_tail(builder: stratforge::domain::strategy::StrategyBuilder) -> Strategy {
    builder
        .action("MakerRatio", [Binding::sub_slot("vaultId")])
        .action(
            "MakerRatioCheck",
            [
                Binding::constant(uint8(1)),
                Binding::constant(AbiValue::Bool(true)),
                Binding::sub_slot("targetRatio"),
                Binding::sub_slot("vaultId"),
                Binding::constant(uint8(5)),
            ],
        )
        .build()
        .unwrap()
}

fn repay_header(name: &str) -> stratforge::domain::strategy::StrategyBuilder {
    Strategy::builder(name)
        .sub_slot("vaultId", SlotType::UINT256)
        .sub_slot("targetRatio", SlotType::UINT256)
        .sub_slot("daiAddr", SlotType::Address)
        .trigger(
            "MakerRatioTrigger",
            [
                Binding::sub_slot("vaultId"),
                Binding::sub_slot("targetRatio"),
                Binding::constant(uint8(1)),
            ],
        )
}

/// Maker repay funded from the vault's own collateral.
pub fn repay_strategy() -> Strategy {
    with_repay_tail(
        repay_header("McdRepayStrategy")
            .action(
                "MakerWithdraw",
                [
                    Binding::sub_slot("vaultId"),
                    Binding::variable("withdrawAmount"),
                    Binding::variable("ethJoin"),
                    Binding::sub_slot("proxy"),
                    Binding::variable("mcdManager"),
                ],
            )
            .action(
                "GasFee",
                [
                    Binding::variable("gasUsed"),
                    Binding::variable("wethAddr"),
                    Binding::piped(1),
                ],
            )
            .action(
                "Sell",
                [
                    Binding::variable("wethAddr"),
                    Binding::sub_slot("daiAddr"),
                    Binding::piped(2),
                    Binding::variable("exchangeWrapper"),
                    Binding::sub_slot("proxy"),
                    Binding::sub_slot("proxy"),
                ],
            )
            .action(
                "MakerPayback",
                [
                    Binding::sub_slot("vaultId"),
                    Binding::piped(3),
                    Binding::sub_slot("proxy"),
                    Binding::variable("mcdManager"),
                ],
            ),
    )
}

/// Maker repay funded by a flash loan, same sub-slot table as
/// [`repay_strategy`].
pub fn repay_fl_strategy() -> Strategy {
    with_repay_tail(
        repay_header("McdFLRepayStrategy")
            .action(
                "FlashLoan",
                [Binding::variable("wethAddr"), Binding::variable("flAmount")],
            )
            .action(
                "Sell",
                [
                    Binding::variable("wethAddr"),
                    Binding::sub_slot("daiAddr"),
                    Binding::piped(1),
                    Binding::variable("exchangeWrapper"),
                    Binding::sub_slot("proxy"),
                    Binding::sub_slot("proxy"),
                ],
            )
            .action(
                "MakerPayback",
                [
                    Binding::sub_slot("vaultId"),
                    Binding::piped(2),
                    Binding::sub_slot("proxy"),
                    Binding::variable("mcdManager"),
                ],
            )
            .action(
                "MakerWithdraw",
                [
                    Binding::sub_slot("vaultId"),
                    Binding::piped(1),
                    Binding::variable("ethJoin"),
                    Binding::variable("flAddr"),
                    Binding::variable("mcdManager"),
                ],
            ),
    )
}

pub fn repay_values() -> BTreeMap<String, AbiValue> {
    BTreeMap::from([
        ("vaultId".to_string(), AbiValue::uint256(42)),
        ("targetRatio".to_string(), AbiValue::uint256(200)),
        ("daiAddr".to_string(), AbiValue::parse(SlotType::Address, DAI).unwrap()),
    ])
}

/// Variables both repay strategies need from the keeper.
pub fn caller_variables() -> BTreeMap<String, AbiValue> {
    BTreeMap::from([
        ("ethJoin".to_string(), addr(0x01)),
        ("mcdManager".to_string(), addr(0x02)),
        ("wethAddr".to_string(), AbiValue::parse(SlotType::Address, WETH).unwrap()),
        ("exchangeWrapper".to_string(), addr(0x03)),
        ("flAddr".to_string(), addr(0x04)),
        ("gasUsed".to_string(), AbiValue::uint256(400_000)),
    ])
}

pub const REPAY_INI: &str = r#"
[strategy]
name = McdRepayStrategy
continuous = true
sub_slots = vaultId:uint256, targetRatio:uint256, daiAddr:address

[trigger.1]
op = MakerRatioTrigger
params = &vaultId, &targetRatio, 1

[action.1]
op = MakerWithdraw
params = &vaultId, %withdrawAmount, %ethJoin, &proxy, %mcdManager

[action.2]
op = GasFee
params = %gasUsed, %wethAddr, $1

[action.3]
op = Sell
params = %wethAddr, &daiAddr, $2, %exchangeWrapper, &proxy, &proxy

[action.4]
op = MakerPayback
params = &vaultId, $3, &proxy, %mcdManager

[action.5]
op = MakerRatio
params = &vaultId

[action.6]
op = MakerRatioCheck
params = 1, true, &targetRatio, &vaultId, 5
"#;

pub const REPAY_FL_INI: &str = r#"
[strategy]
name = McdFLRepayStrategy
sub_slots = vaultId:uint256, targetRatio:uint256, daiAddr:address

[trigger.1]
op = MakerRatioTrigger
params = &vaultId, &targetRatio, 1

[action.1]
op = FlashLoan
params = %wethAddr, %flAmount

[action.2]
op = Sell
params = %wethAddr, &daiAddr, $1, %exchangeWrapper, &proxy, &proxy

[action.3]
op = MakerPayback
params = &vaultId, $2, &proxy, %mcdManager

[action.4]
op = MakerWithdraw
params = &vaultId, $1, %ethJoin, %flAddr, %mcdManager

[action.5]
op = MakerRatio
params = &vaultId

[action.6]
op = MakerRatioCheck
params = 1, true, &targetRatio, &vaultId, 5
"#;

/// Keeper file selecting between the two repay strategies.
pub fn keeper_ini(local_balance: u64, amount: u64) -> String {
    format!(
        r#"
[bundle]
name = McdRepayBundle

[member.1]
strategy = repay.ini
label = direct
precondition = AT_LEAST(@localBalance, @amount)

[member.1.variables]
withdrawAmount = @amount

[member.2]
strategy = repay_fl.ini
label = flashloan
precondition = ALWAYS

[member.2.variables]
flAmount = @amount

[snapshot]
localBalance = uint256:{local_balance}
amount = uint256:{amount}

[subscription]
owner = {OWNER}

[subscription.values]
vaultId = 42
targetRatio = 200
daiAddr = {DAI}

[variables]
ethJoin = 0x0101010101010101010101010101010101010101
mcdManager = 0x0202020202020202020202020202020202020202
wethAddr = {WETH}
exchangeWrapper = 0x0303030303030303030303030303030303030303
flAddr = 0x0404040404040404040404040404040404040404
gasUsed = 400000
"#
    )
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// Lay out both strategy files and a keeper file in `dir`; returns the
/// keeper file's path.
pub fn write_keeper_files(dir: &Path, keeper: &str) -> PathBuf {
    write_file(dir, "repay.ini", REPAY_INI);
    write_file(dir, "repay_fl.ini", REPAY_FL_INI);
    write_file(dir, "keeper.ini", keeper)
}
