use crate::types::{DexStats, NetworkSupply, Pool, Reserve, Source, Token};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RiskAssessment {
    pub score: u32,
    pub level: RiskLevel,
}

/// Field a protocol search matches against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchBy {
    Name,
    Address,
    Token,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceQuote {
    pub source: Source,
    pub price_usd: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AggregatedPrice {
    pub average: f64,
    pub source_count: usize,
    pub sources: Vec<Source>,
}

/// How widely one symbol is confirmed across sources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EcosystemPresence {
    pub symbol: String,
    pub token_id: Option<String>,
    pub name: String,
    pub in_ledger: bool,
    pub in_dex: bool,
    pub in_lending: bool,
    pub in_top_pools: bool,
    pub pair_count: usize,
    pub lending_active: bool,
    pub supply_apy: Option<f64>,
    pub price: AggregatedPrice,
    pub sources: Vec<Source>,
    pub score: u8,
}

impl EcosystemPresence {
    /// A token no source knows a symbol for. It takes part in no join.
    pub fn absent(token_id: &str) -> Self {
        Self {
            symbol: String::new(),
            token_id: Some(token_id.to_string()),
            name: String::new(),
            in_ledger: false,
            in_dex: false,
            in_lending: false,
            in_top_pools: false,
            pair_count: 0,
            lending_active: false,
            supply_apy: None,
            price: AggregatedPrice::default(),
            sources: Vec::new(),
            score: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenDiscovery {
    pub tokens: Vec<EcosystemPresence>,
    pub contributing_sources: Vec<Source>,
}

/// A pool seen from one of its tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenPair {
    pub pool_id: String,
    pub contract_id: String,
    pub pair: String,
    pub counterpart_id: String,
    pub counterpart_symbol: String,
    pub tvl_usd: f64,
    pub fee: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolSummary {
    pub pool: Pool,
    pub pair: String,
    pub tvl_usd: f64,
    pub spot_price: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DexAnalytics {
    pub total_pools: usize,
    pub active_pools: usize,
    pub total_tokens: usize,
    pub tokens_with_prices: usize,
    pub computed_tvl_usd: f64,
    pub reported_tvl_usd: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenIcon {
    pub symbol: String,
    pub icon_url: String,
}

/// Token icons keyed by token id, PNGs apart from every other format.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenIcons {
    pub png: BTreeMap<String, TokenIcon>,
    pub other: BTreeMap<String, TokenIcon>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct YieldOpportunity {
    pub symbol: String,
    pub supply_apy: f64,
    pub variable_borrow_apy: f64,
    pub utilization_rate: f64,
    pub ltv: f64,
    pub available_liquidity_usd: f64,
    pub risk: RiskAssessment,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BorrowOption {
    pub symbol: String,
    pub variable_borrow_apy: f64,
    pub stable_borrow_apy: f64,
    pub ltv: f64,
    pub available_liquidity_usd: f64,
}

/// Token listed on both the DEX and the lending market. A cross-listing
/// opportunity, not a price spread: the lending side carries no price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArbitrageCandidate {
    pub symbol: String,
    pub token_id: String,
    pub dex_price_usd: f64,
    pub supply_apy: f64,
    pub borrow_apy: f64,
    pub potential_yield: f64,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TvlBreakdown {
    pub ledger_usd: f64,
    pub dex_usd: f64,
    pub lending_usd: f64,
    pub total_usd: f64,
    pub contributing_sources: Vec<Source>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LiquiditySummary {
    pub tvl: TvlBreakdown,
    pub ledger_protocol_tvl_hbar: f64,
    pub dex_pools: usize,
    pub active_dex_pools: usize,
    pub lending_reserves: usize,
    pub active_lending_reserves: usize,
    pub cross_protocol_tokens: usize,
    pub multi_source_tokens: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenPriceComparison {
    pub token_id: String,
    pub symbol: Option<String>,
    pub quotes: Vec<PriceQuote>,
    pub aggregated: AggregatedPrice,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MultiProtocolTokenData {
    pub token_id: String,
    pub symbol: Option<String>,
    pub ledger: Option<Token>,
    pub dex: Option<Token>,
    pub lending: Option<Reserve>,
    pub pairs: Vec<TokenPair>,
    pub price: AggregatedPrice,
    pub presence: EcosystemPresence,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractValidation {
    pub contract_id: String,
    pub exists: bool,
    pub deleted: bool,
    pub evm_address: Option<String>,
    pub is_valid: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LendingTotals {
    pub total_supplied_usd: f64,
    pub total_borrowed_usd: f64,
    pub total_liquidity_usd: f64,
    pub reserve_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefiOverview {
    pub timestamp: DateTime<Utc>,
    pub hbar_price_usd: Option<f64>,
    pub network_supply: Option<NetworkSupply>,
    pub dex_stats: Option<DexStats>,
    pub lending: Option<LendingTotals>,
    pub liquidity: LiquiditySummary,
    pub protocol_count: usize,
    pub top_pools: Vec<PoolSummary>,
    pub top_tokens: Vec<EcosystemPresence>,
    pub best_yields: Vec<YieldOpportunity>,
}
