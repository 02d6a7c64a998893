use crate::types::{Pool, PoolToken, Token};
use std::collections::HashMap;

/// USD prices by token id, built from the DEX token listing.
#[derive(Debug, Clone, Default)]
pub struct PriceBook {
    prices: HashMap<String, f64>,
}

impl PriceBook {
    pub fn from_tokens<'a>(tokens: impl IntoIterator<Item = &'a Token>) -> Self {
        let prices = tokens
            .into_iter()
            .filter(|t| !t.token_id.is_empty())
            .filter_map(|t| t.price_usd.map(|p| (t.token_id.clone(), p)))
            .collect();
        Self { prices }
    }

    pub fn get(&self, token_id: &str) -> Option<f64> {
        self.prices.get(token_id).copied()
    }

    /// Listing price first, then the price embedded in the pool entry.
    pub fn price_of(&self, token: &PoolToken) -> Option<f64> {
        self.get(&token.token_id)
            .or(token.price_usd)
            .filter(|p| p.is_finite() && *p > 0.0)
    }
}

/// Raw on-chain amount scaled by token decimals.
pub fn normalize_amount(raw: u128, decimals: u32) -> f64 {
    raw as f64 / 10f64.powi(decimals as i32)
}

/// Pool TVL recomputed from reserves and current prices. A side without a
/// price contributes 0.
pub fn pool_tvl(pool: &Pool, prices: &PriceBook) -> f64 {
    let side = |token: &PoolToken, reserve: u128| {
        prices
            .price_of(token)
            .map(|price| normalize_amount(reserve, token.decimals) * price)
            .unwrap_or(0.0)
    };
    side(&pool.token_a, pool.reserve_a) + side(&pool.token_b, pool.reserve_b)
}

/// Spot price of token A quoted in token B, from the reserve ratio.
pub fn spot_price(pool: &Pool) -> f64 {
    if pool.reserve_a == 0 {
        return 0.0;
    }
    let a = normalize_amount(pool.reserve_a, pool.token_a.decimals);
    let b = normalize_amount(pool.reserve_b, pool.token_b.decimals);
    b / a
}

/// Both sides hold liquidity.
pub fn is_active(pool: &Pool) -> bool {
    pool.reserve_a > 0 && pool.reserve_b > 0
}

pub fn contains_token(pool: &Pool, token_id: &str) -> bool {
    !token_id.is_empty() && (pool.token_a.token_id == token_id || pool.token_b.token_id == token_id)
}

/// The side of the pool opposite to `token_id`.
pub fn counterpart<'a>(pool: &'a Pool, token_id: &str) -> &'a PoolToken {
    if pool.token_a.token_id == token_id {
        &pool.token_b
    } else {
        &pool.token_a
    }
}
