use super::fields::{flag, id, int, list, num, opt_str, price, small_int, text, uint};
use crate::fetcher::Fetcher;
use crate::types::{DexStats, Pool, PoolToken, Source, Token};
use serde_json::Value;
use std::sync::Arc;

/// SaucerSwap public API adapter.
pub struct DexSource {
    fetcher: Arc<Fetcher>,
}

impl DexSource {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn stats(&self) -> Option<DexStats> {
        let payload = self.fetcher.request(Source::Dex, "/stats", &[]).await;
        if !payload.is_object() {
            return None;
        }
        Some(DexStats {
            tvl_usd: num(&payload, "tvlUsd"),
            volume_total_usd: num(&payload, "volumeTotalUsd"),
            swap_total: uint(&payload, "swapTotal"),
            circulating_sauce: num(&payload, "circulatingSauce"),
        })
    }

    pub async fn tokens(&self) -> Vec<Token> {
        let payload = self.fetcher.request(Source::Dex, "/tokens", &[]).await;
        list(&payload, "tokens").iter().map(parse_token).collect()
    }

    pub async fn pools(&self) -> Vec<Pool> {
        let payload = self.fetcher.request(Source::Dex, "/pools", &[]).await;
        list(&payload, "pools").iter().map(parse_pool).collect()
    }

    /// Pools the DEX marks as verified.
    pub async fn known_pools(&self) -> Vec<Pool> {
        let payload = self.fetcher.request(Source::Dex, "/pools/known", &[]).await;
        list(&payload, "pools").iter().map(parse_pool).collect()
    }
}

fn parse_token(v: &Value) -> Token {
    Token {
        token_id: id(v, "id"),
        symbol: text(v, "symbol"),
        name: text(v, "name"),
        decimals: small_int(v, "decimals"),
        total_supply: 0,
        price_usd: price(v, "priceUsd"),
        in_top_pools: flag(v, "inTopPools"),
        due_diligence_complete: flag(v, "dueDiligenceComplete"),
        icon: opt_str(v, "icon").map(str::to_string),
        source: Source::Dex,
    }
}

fn parse_pool_token(v: Option<&Value>) -> PoolToken {
    match v {
        Some(token) => PoolToken {
            token_id: id(token, "id"),
            symbol: text(token, "symbol"),
            decimals: small_int(token, "decimals"),
            price_usd: price(token, "priceUsd"),
        },
        None => PoolToken {
            token_id: String::new(),
            symbol: String::new(),
            decimals: 0,
            price_usd: None,
        },
    }
}

fn parse_pool(v: &Value) -> Pool {
    Pool {
        pool_id: id(v, "id"),
        contract_id: text(v, "contractId"),
        token_a: parse_pool_token(v.get("tokenA")),
        token_b: parse_pool_token(v.get("tokenB")),
        reserve_a: int(v, "tokenReserveA"),
        reserve_b: int(v, "tokenReserveB"),
        fee: small_int(v, "fee"),
    }
}
