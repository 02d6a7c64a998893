use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Tinybars per HBAR.
pub const TINYBARS_PER_HBAR: f64 = 100_000_000.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Ledger,
    Dex,
    Lending,
}

impl Source {
    /// Fixed fetch order for every cross-source operation.
    pub const ORDER: [Source; 3] = [Source::Ledger, Source::Dex, Source::Lending];

    pub fn label(&self) -> &'static str {
        match self {
            Source::Ledger => "ledger",
            Source::Dex => "dex",
            Source::Lending => "lending",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Dex,
    Lending,
    Staking,
    Unknown,
}

impl From<&str> for ProtocolKind {
    fn from(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "dex" => ProtocolKind::Dex,
            "lending" => ProtocolKind::Lending,
            "staking" => ProtocolKind::Staking,
            _ => ProtocolKind::Unknown,
        }
    }
}

/// Hedera entity id in `shard.realm.num` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    pub shard: u64,
    pub realm: u64,
    pub num: u64,
}

impl FromStr for EntityId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidEntityId(s.to_string());
        let mut parts = s.trim().split('.');
        let mut next = || -> Result<u64, Error> {
            parts
                .next()
                .filter(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|p| p.parse().ok())
                .ok_or_else(invalid)
        };
        let id = EntityId {
            shard: next()?,
            realm: next()?,
            num: next()?,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.shard, self.realm, self.num)
    }
}

/// Fungible or non-fungible token as reported by one source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Token {
    pub token_id: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u32,
    pub total_supply: u128,
    pub price_usd: Option<f64>,
    pub in_top_pools: bool,
    pub due_diligence_complete: bool,
    pub icon: Option<String>,
    pub source: Source,
}

/// One side of a DEX pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolToken {
    pub token_id: String,
    pub symbol: String,
    pub decimals: u32,
    pub price_usd: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pool {
    pub pool_id: String,
    pub contract_id: String,
    pub token_a: PoolToken,
    pub token_b: PoolToken,
    pub reserve_a: u128,
    pub reserve_b: u128,
    pub fee: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DexStats {
    pub tvl_usd: f64,
    pub volume_total_usd: f64,
    pub swap_total: u64,
    pub circulating_sauce: f64,
}

/// Lending market reserve. Rates and utilization are percentages, LTV and
/// liquidation threshold are fractions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Reserve {
    pub symbol: String,
    pub name: String,
    pub token_id: Option<String>,
    pub decimals: u32,
    pub supply_apy: f64,
    pub variable_borrow_apy: f64,
    pub stable_borrow_apy: f64,
    pub utilization_rate: f64,
    pub ltv: f64,
    pub liquidation_threshold: f64,
    pub liquidation_bonus: f64,
    pub active: bool,
    pub frozen: bool,
    pub borrowing_enabled: bool,
    pub available_liquidity_usd: f64,
    pub total_supplied_usd: f64,
    pub total_borrowed_usd: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LendingMarket {
    pub network_name: String,
    pub chain_id: Option<u64>,
    pub reserves: Vec<Reserve>,
    pub total_supplied_usd: f64,
    pub total_borrowed_usd: f64,
    pub total_liquidity_usd: f64,
}

/// Registry entry for a known protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProtocolEntry {
    pub id: String,
    pub name: String,
    pub kind: ProtocolKind,
    pub contracts: Vec<String>,
}

impl ProtocolEntry {
    pub fn primary_contract(&self) -> Option<&str> {
        self.contracts.first().map(String::as_str)
    }
}

/// Protocol with its TVL approximated by the HBAR balance of its primary
/// contract. This is a lower bound, not a valuation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Protocol {
    pub name: String,
    pub kind: ProtocolKind,
    pub contract_id: String,
    pub contracts: Vec<String>,
    pub tvl_hbar: f64,
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WhaleAlert {
    pub timestamp: Option<DateTime<Utc>>,
    pub token: String,
    pub amount: u64,
    pub amount_hbar: f64,
    pub value_usd: Option<f64>,
    pub from_account: String,
    pub to_account: String,
    pub transaction_hash: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NetworkSupply {
    pub released_supply: u128,
    pub total_supply: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExchangeRate {
    pub cent_equivalent: u64,
    pub hbar_equivalent: u64,
    pub expiration_time: i64,
}

impl ExchangeRate {
    pub fn hbar_usd(&self) -> Option<f64> {
        if self.hbar_equivalent == 0 || self.cent_equivalent == 0 {
            return None;
        }
        Some(self.cent_equivalent as f64 / self.hbar_equivalent as f64 / 100.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeInfo {
    pub node_id: u64,
    pub node_account_id: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenBalance {
    pub token_id: String,
    pub balance: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountBalance {
    pub account: String,
    pub balance_tinybars: u64,
    pub tokens: Vec<TokenBalance>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transfer {
    pub account: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerTransaction {
    pub transaction_id: String,
    pub transaction_hash: String,
    pub consensus_timestamp: Option<DateTime<Utc>>,
    pub name: String,
    pub result: String,
    pub transfers: Vec<Transfer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractInfo {
    pub contract_id: String,
    pub evm_address: String,
    pub deleted: bool,
    pub created_timestamp: Option<DateTime<Utc>>,
    pub memo: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractSlot {
    pub slot: String,
    pub value: String,
}

/// Parses a mirror node `seconds.nanos` consensus timestamp.
pub fn parse_consensus_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let (secs, nanos) = match raw.split_once('.') {
        Some((s, n)) => (s, n),
        None => (raw, "0"),
    };
    let secs: i64 = secs.parse().ok()?;
    let nanos: u32 = format!("{:0<9}", nanos).get(..9)?.parse().ok()?;
    DateTime::from_timestamp(secs, nanos)
}

/// Formats a timestamp as the mirror node `seconds.nanos` filter value.
pub fn format_consensus_timestamp(ts: DateTime<Utc>) -> String {
    format!("{}.{:09}", ts.timestamp(), ts.timestamp_subsec_nanos())
}
