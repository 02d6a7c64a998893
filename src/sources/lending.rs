use super::fields::{array, flag, num, opt_str, opt_u128, small_int, text};
use crate::fetcher::Fetcher;
use crate::types::{LendingMarket, Reserve, Source};
use serde_json::Value;
use std::sync::Arc;

/// Bonzo Finance data API adapter. Everything derives from the single
/// `/Market` payload.
pub struct LendingSource {
    fetcher: Arc<Fetcher>,
}

impl LendingSource {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn market(&self) -> Option<LendingMarket> {
        let payload = self.fetcher.request(Source::Lending, "/Market", &[]).await;
        if !payload.is_object() {
            return None;
        }
        Some(LendingMarket {
            network_name: text(&payload, "network_name"),
            chain_id: opt_u128(&payload, "chain_id").and_then(|n| u64::try_from(n).ok()),
            reserves: array(&payload, "reserves").iter().map(parse_reserve).collect(),
            total_supplied_usd: usd_display(&payload, "total_market_supplied"),
            total_borrowed_usd: usd_display(&payload, "total_market_borrowed"),
            total_liquidity_usd: usd_display(&payload, "total_market_liquidity"),
        })
    }

    pub async fn reserves(&self) -> Vec<Reserve> {
        self.market().await.map(|m| m.reserves).unwrap_or_default()
    }

    /// Case-insensitive lookup by symbol.
    pub async fn reserve(&self, symbol: &str) -> Option<Reserve> {
        let wanted = symbol.trim();
        self.reserves()
            .await
            .into_iter()
            .find(|r| !r.symbol.is_empty() && r.symbol.eq_ignore_ascii_case(wanted))
    }
}

/// Amount objects carry a comma-grouped `usd_display` string.
fn usd_display(v: &Value, key: &str) -> f64 {
    v.get(key)
        .and_then(|amount| opt_str(amount, "usd_display"))
        .and_then(|s| s.replace(',', "").trim_start_matches('$').parse::<f64>().ok())
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}

fn parse_reserve(v: &Value) -> Reserve {
    Reserve {
        symbol: text(v, "symbol"),
        name: text(v, "name"),
        token_id: opt_str(v, "hts_address").map(str::to_string),
        decimals: small_int(v, "decimals"),
        supply_apy: num(v, "supply_apy"),
        variable_borrow_apy: num(v, "variable_borrow_apy"),
        stable_borrow_apy: num(v, "stable_borrow_apy"),
        utilization_rate: num(v, "utilization_rate"),
        ltv: num(v, "ltv"),
        liquidation_threshold: num(v, "liquidation_threshold"),
        liquidation_bonus: num(v, "liquidation_bonus"),
        active: flag(v, "active"),
        frozen: flag(v, "frozen"),
        borrowing_enabled: flag(v, "variable_borrowing_enabled"),
        available_liquidity_usd: usd_display(v, "available_liquidity"),
        total_supplied_usd: usd_display(v, "total_supply"),
        total_borrowed_usd: usd_display(v, "total_variable_debt"),
    }
}
