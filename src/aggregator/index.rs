use super::scoring::{aggregate_price, assess_reserve_risk, ecosystem_score};
use super::views::{ArbitrageCandidate, EcosystemPresence, PriceQuote, TokenPair};
use crate::liquidity_pools::{counterpart, pool_tvl, PriceBook};
use crate::types::{DexStats, LendingMarket, Pool, Reserve, Source, Token};
use std::collections::{HashMap, HashSet};

/// Symbols whose price also follows from the ledger exchange rate.
const HBAR_SYMBOLS: [&str; 2] = ["HBAR", "WHBAR"];

/// Join key for cross-source lookups. Empty symbols join nothing.
pub fn symbol_key(symbol: &str) -> Option<String> {
    let key = symbol.trim().to_uppercase();
    (!key.is_empty()).then_some(key)
}

/// Everything the cross-source views need, fetched once per operation.
#[derive(Debug, Default)]
pub struct SourceSnapshot {
    pub ledger_tokens: Vec<Token>,
    pub hbar_usd: Option<f64>,
    pub dex_stats: Option<DexStats>,
    pub dex_tokens: Vec<Token>,
    pub pools: Vec<Pool>,
    pub market: Option<LendingMarket>,
}

/// Lookup maps over one snapshot. Built in a single pass per listing so every
/// join afterwards is a map lookup.
///
/// When two records share a symbol the first one listed wins; tokens that
/// collide on symbol are indistinguishable here.
#[derive(Debug, Default)]
pub struct SourceIndex {
    snapshot: SourceSnapshot,
    prices: PriceBook,
    ledger_by_symbol: HashMap<String, usize>,
    ledger_by_id: HashMap<String, usize>,
    dex_by_symbol: HashMap<String, usize>,
    dex_by_id: HashMap<String, usize>,
    reserve_by_symbol: HashMap<String, usize>,
    pools_by_token: HashMap<String, Vec<usize>>,
}

fn index_tokens(tokens: &[Token]) -> (HashMap<String, usize>, HashMap<String, usize>) {
    let mut by_symbol = HashMap::new();
    let mut by_id = HashMap::new();
    for (i, token) in tokens.iter().enumerate() {
        let Some(key) = symbol_key(&token.symbol) else {
            continue;
        };
        by_symbol.entry(key).or_insert(i);
        if !token.token_id.is_empty() {
            by_id.entry(token.token_id.clone()).or_insert(i);
        }
    }
    (by_symbol, by_id)
}

impl SourceIndex {
    pub fn build(snapshot: SourceSnapshot) -> Self {
        let (ledger_by_symbol, ledger_by_id) = index_tokens(&snapshot.ledger_tokens);
        let (dex_by_symbol, dex_by_id) = index_tokens(&snapshot.dex_tokens);

        let mut reserve_by_symbol = HashMap::new();
        for (i, reserve) in snapshot.reserves().iter().enumerate() {
            if let Some(key) = symbol_key(&reserve.symbol) {
                reserve_by_symbol.entry(key).or_insert(i);
            }
        }

        let mut pools_by_token: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, pool) in snapshot.pools.iter().enumerate() {
            let a = &pool.token_a.token_id;
            let b = &pool.token_b.token_id;
            if !a.is_empty() {
                pools_by_token.entry(a.clone()).or_default().push(i);
            }
            if !b.is_empty() && b != a {
                pools_by_token.entry(b.clone()).or_default().push(i);
            }
        }

        let prices = PriceBook::from_tokens(&snapshot.dex_tokens);

        Self {
            snapshot,
            prices,
            ledger_by_symbol,
            ledger_by_id,
            dex_by_symbol,
            dex_by_id,
            reserve_by_symbol,
            pools_by_token,
        }
    }

    pub fn snapshot(&self) -> &SourceSnapshot {
        &self.snapshot
    }

    pub fn prices(&self) -> &PriceBook {
        &self.prices
    }

    /// Sources that returned anything at all.
    pub fn contributing_sources(&self) -> Vec<Source> {
        let s = &self.snapshot;
        let mut sources = Vec::new();
        if !s.ledger_tokens.is_empty() || s.hbar_usd.is_some() {
            sources.push(Source::Ledger);
        }
        if !s.dex_tokens.is_empty() || !s.pools.is_empty() || s.dex_stats.is_some() {
            sources.push(Source::Dex);
        }
        if s.market.is_some() {
            sources.push(Source::Lending);
        }
        sources
    }

    pub fn ledger_token(&self, symbol: &str) -> Option<&Token> {
        let key = symbol_key(symbol)?;
        self.ledger_by_symbol.get(&key).map(|&i| &self.snapshot.ledger_tokens[i])
    }

    pub fn dex_token(&self, symbol: &str) -> Option<&Token> {
        let key = symbol_key(symbol)?;
        self.dex_by_symbol.get(&key).map(|&i| &self.snapshot.dex_tokens[i])
    }

    pub fn reserve(&self, symbol: &str) -> Option<&Reserve> {
        let key = symbol_key(symbol)?;
        self.reserve_by_symbol.get(&key).map(|&i| &self.snapshot.reserves()[i])
    }

    pub fn token_by_id(&self, token_id: &str) -> Option<&Token> {
        self.dex_by_id
            .get(token_id)
            .map(|&i| &self.snapshot.dex_tokens[i])
            .or_else(|| self.ledger_by_id.get(token_id).map(|&i| &self.snapshot.ledger_tokens[i]))
    }

    /// Symbol the listings know `token_id` by, DEX first.
    pub fn symbol_for_id(&self, token_id: &str) -> Option<String> {
        self.token_by_id(token_id).and_then(|t| symbol_key(&t.symbol))
    }

    pub fn pools_for(&self, token_id: &str) -> impl Iterator<Item = &Pool> {
        self.pools_by_token
            .get(token_id)
            .into_iter()
            .flatten()
            .map(|&i| &self.snapshot.pools[i])
    }

    /// Every pool holding `token_id`, highest TVL first.
    pub fn token_pairs(&self, token_id: &str) -> Vec<TokenPair> {
        token_pairs(self.pools_for(token_id), token_id, &self.prices)
    }

    pub fn price_quotes(&self, symbol: &str) -> Vec<PriceQuote> {
        let mut quotes = Vec::new();
        let Some(key) = symbol_key(symbol) else {
            return quotes;
        };
        if let Some(price) = self.dex_token(&key).and_then(|t| t.price_usd) {
            quotes.push(PriceQuote {
                source: Source::Dex,
                price_usd: price,
            });
        }
        if HBAR_SYMBOLS.contains(&key.as_str()) {
            if let Some(price) = self.snapshot.hbar_usd {
                quotes.push(PriceQuote {
                    source: Source::Ledger,
                    price_usd: price,
                });
            }
        }
        quotes
    }

    /// Presence of `symbol`. `ledger_hint` marks ledger presence learned
    /// outside the listing, e.g. from a token detail lookup.
    pub fn presence(&self, symbol: &str, ledger_hint: Option<&Token>) -> Option<EcosystemPresence> {
        let key = symbol_key(symbol)?;
        let ledger = self.ledger_token(&key).or(ledger_hint);
        let dex = self.dex_token(&key);
        let reserve = self.reserve(&key);

        let in_ledger = ledger.is_some();
        let in_dex = dex.is_some();
        let in_lending = reserve.is_some();
        let in_top_pools = dex.is_some_and(|t| t.in_top_pools);

        let mut sources = Vec::new();
        for (present, source) in [(in_ledger, Source::Ledger), (in_dex, Source::Dex), (in_lending, Source::Lending)] {
            if present {
                sources.push(source);
            }
        }

        let token_id = dex
            .map(|t| t.token_id.clone())
            .or_else(|| reserve.and_then(|r| r.token_id.clone()))
            .or_else(|| ledger.map(|t| t.token_id.clone()))
            .filter(|id| !id.is_empty());
        let name = dex
            .map(|t| t.name.clone())
            .or_else(|| reserve.map(|r| r.name.clone()))
            .or_else(|| ledger.map(|t| t.name.clone()))
            .unwrap_or_default();
        let pair_count = dex.map(|t| self.pools_for(&t.token_id).count()).unwrap_or(0);

        Some(EcosystemPresence {
            symbol: key.clone(),
            token_id,
            name,
            in_ledger,
            in_dex,
            in_lending,
            in_top_pools,
            pair_count,
            lending_active: reserve.is_some_and(|r| r.active),
            supply_apy: reserve.map(|r| r.supply_apy),
            price: aggregate_price(&self.price_quotes(&key)),
            score: ecosystem_score(!sources.is_empty(), in_top_pools, in_lending),
            sources,
        })
    }

    /// Union of DEX tokens and lending reserves keyed by symbol, best
    /// confirmed first.
    pub fn discover(&self) -> Vec<EcosystemPresence> {
        let mut seen = HashSet::new();
        let symbols = self
            .snapshot
            .dex_tokens
            .iter()
            .map(|t| t.symbol.as_str())
            .chain(self.snapshot.reserves().iter().map(|r| r.symbol.as_str()))
            .filter_map(symbol_key)
            .filter(|key| seen.insert(key.clone()));

        let mut tokens: Vec<EcosystemPresence> =
            symbols.filter_map(|key| self.presence(&key, None)).collect();
        tokens.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(b.pair_count.cmp(&a.pair_count))
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        tokens
    }

    /// Tokens listed on the DEX with a price and on the lending market,
    /// highest supply yield first.
    pub fn arbitrage_candidates(&self) -> Vec<ArbitrageCandidate> {
        let mut seen = HashSet::new();
        let mut candidates: Vec<ArbitrageCandidate> = self
            .snapshot
            .dex_tokens
            .iter()
            .filter_map(|token| {
                let key = symbol_key(&token.symbol)?;
                if !seen.insert(key.clone()) {
                    return None;
                }
                // first listing for the symbol is the one joined
                let token = self.dex_token(&key)?;
                let dex_price_usd = token.price_usd.filter(|p| *p > 0.0)?;
                let reserve = self.reserve(&key)?;
                Some(ArbitrageCandidate {
                    symbol: key,
                    token_id: token.token_id.clone(),
                    dex_price_usd,
                    supply_apy: reserve.supply_apy,
                    borrow_apy: reserve.variable_borrow_apy,
                    potential_yield: reserve.supply_apy,
                    risk_level: assess_reserve_risk(reserve).level,
                })
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.potential_yield
                .total_cmp(&a.potential_yield)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        candidates
    }
}

impl SourceSnapshot {
    pub fn reserves(&self) -> &[Reserve] {
        self.market.as_ref().map(|m| m.reserves.as_slice()).unwrap_or(&[])
    }
}

/// Pools seen from `token_id`, highest TVL first.
pub fn token_pairs<'a>(
    pools: impl IntoIterator<Item = &'a Pool>,
    token_id: &str,
    prices: &PriceBook,
) -> Vec<TokenPair> {
    let mut pairs: Vec<TokenPair> = pools
        .into_iter()
        .map(|pool| {
            let other = counterpart(pool, token_id);
            TokenPair {
                pool_id: pool.pool_id.clone(),
                contract_id: pool.contract_id.clone(),
                pair: format!("{}/{}", pool.token_a.symbol, pool.token_b.symbol),
                counterpart_id: other.token_id.clone(),
                counterpart_symbol: other.symbol.clone(),
                tvl_usd: pool_tvl(pool, prices),
                fee: pool.fee,
            }
        })
        .collect();
    pairs.sort_by(|a, b| b.tvl_usd.total_cmp(&a.tvl_usd));
    pairs
}
