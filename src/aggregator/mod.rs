//! Cross-source aggregation over the ledger, DEX and lending adapters.
//!
//! Every operation fetches what it needs in the fixed order ledger, DEX,
//! lending, one listing per source at most, and joins the results in memory
//! by uppercase symbol. Source failures arrive as empty data; the operation
//! still completes with whatever the remaining sources returned.

pub mod index;
pub mod scoring;
pub mod views;

use crate::accountant::CallStatistics;
use crate::config::ClientConfig;
use crate::error::{ensure_non_negative, ensure_positive, Error, Result};
use crate::fetcher::{Fetcher, HttpTransport, Transport};
use crate::liquidity_pools::{is_active, pool_tvl, spot_price, PriceBook};
use crate::sources::ledger::{MAX_PAGE_SIZE, MAX_SCAN_PAGES};
use crate::sources::{DexSource, LedgerSource, LendingSource, TokenType, TransactionFilter};
use crate::types::{
    AccountBalance, ContractSlot, DexStats, EntityId, ExchangeRate, LedgerTransaction,
    LendingMarket, NetworkSupply, NodeInfo, Pool, Protocol, ProtocolEntry, ProtocolKind, Reserve,
    Source, Token, TokenBalance, WhaleAlert, TINYBARS_PER_HBAR,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use index::{symbol_key, SourceIndex, SourceSnapshot};
use scoring::{aggregate_price, assess_reserve_risk};
use std::sync::Arc;
use tracing::{debug, info};
use views::{
    ArbitrageCandidate, BorrowOption, ContractValidation, DefiOverview, DexAnalytics,
    EcosystemPresence, LendingTotals, LiquiditySummary, MultiProtocolTokenData, PoolSummary,
    SearchBy, TokenDiscovery, TokenIcon, TokenIcons, TokenPair, TokenPriceComparison, TvlBreakdown,
    YieldOpportunity,
};

const OVERVIEW_TOP_N: usize = 5;

pub struct Aggregator {
    fetcher: Arc<Fetcher>,
    ledger: LedgerSource,
    dex: DexSource,
    lending: LendingSource,
    protocols: Vec<ProtocolEntry>,
}

impl Aggregator {
    /// Client over HTTP with the configured request timeout.
    pub fn new(config: ClientConfig) -> eyre::Result<Self> {
        let transport = HttpTransport::new(config.request_timeout)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let fetcher = Arc::new(Fetcher::new(&config, transport));
        info!(
            "aggregator ready: cache ttl {:?}, {} registry protocols",
            config.cache_ttl,
            config.protocols.len()
        );
        Self {
            ledger: LedgerSource::new(Arc::clone(&fetcher)),
            dex: DexSource::new(Arc::clone(&fetcher)),
            lending: LendingSource::new(Arc::clone(&fetcher)),
            protocols: config.protocols,
            fetcher,
        }
    }

    // ---- diagnostics ----

    pub fn call_statistics(&self) -> CallStatistics {
        self.fetcher.accountant().snapshot()
    }

    pub fn reset_call_counts(&self) {
        self.fetcher.accountant().reset();
    }

    pub async fn clear_cache(&self) {
        self.fetcher.clear_cache().await;
    }

    // ---- network ----

    pub async fn network_supply(&self) -> Option<NetworkSupply> {
        self.ledger.network_supply().await
    }

    pub async fn network_nodes(&self) -> Vec<NodeInfo> {
        self.ledger.network_nodes().await
    }

    pub async fn exchange_rate(&self) -> Option<ExchangeRate> {
        self.ledger.exchange_rate().await
    }

    /// HBAR price in USD from the current network exchange rate.
    pub async fn hbar_price_usd(&self) -> Option<f64> {
        self.ledger.exchange_rate().await.and_then(|rate| rate.hbar_usd())
    }

    // ---- accounts ----

    pub async fn account_balance(&self, account_id: &str) -> Result<Option<AccountBalance>> {
        let account: EntityId = account_id.parse()?;
        Ok(self.ledger.account_balance(&account).await)
    }

    pub async fn account_tokens(&self, account_id: &str) -> Result<Vec<TokenBalance>> {
        let account: EntityId = account_id.parse()?;
        Ok(self.ledger.account_tokens(&account).await)
    }

    pub async fn account_transactions(&self, account_id: &str, limit: u32) -> Result<Vec<LedgerTransaction>> {
        let account: EntityId = account_id.parse()?;
        ensure_positive("limit", f64::from(limit))?;
        let filter = TransactionFilter {
            account: Some(account),
            limit,
            ..Default::default()
        };
        Ok(self.ledger.transactions(&filter).await)
    }

    pub async fn recent_transactions(&self, limit: u32) -> Result<Vec<LedgerTransaction>> {
        ensure_positive("limit", f64::from(limit))?;
        let filter = TransactionFilter {
            limit,
            ..Default::default()
        };
        Ok(self.ledger.transactions(&filter).await)
    }

    // ---- tokens ----

    pub async fn top_tokens(&self, limit: u32) -> Result<Vec<Token>> {
        ensure_positive("limit", f64::from(limit))?;
        Ok(self.ledger.tokens(TokenType::Fungible, limit).await)
    }

    pub async fn nft_collections(&self, limit: u32) -> Result<Vec<Token>> {
        ensure_positive("limit", f64::from(limit))?;
        Ok(self.ledger.tokens(TokenType::NonFungible, limit).await)
    }

    // ---- protocols ----

    pub fn protocol_contracts(&self) -> &[ProtocolEntry] {
        &self.protocols
    }

    /// Registry protocols valued by primary contract balance, highest TVL first.
    pub async fn protocols(&self, min_tvl_hbar: f64, kind: Option<ProtocolKind>) -> Result<Vec<Protocol>> {
        ensure_non_negative("min_tvl_hbar", min_tvl_hbar)?;
        let mut protocols = self.valued_protocols(kind).await;
        protocols.retain(|p| p.tvl_hbar >= min_tvl_hbar);
        Ok(protocols)
    }

    async fn valued_protocols(&self, kind: Option<ProtocolKind>) -> Vec<Protocol> {
        let mut protocols = Vec::new();
        for entry in self.protocols.iter().filter(|e| kind.is_none_or(|k| e.kind == k)) {
            if let Some(protocol) = self.ledger.protocol(entry).await {
                protocols.push(protocol);
            }
        }
        protocols.sort_by(|a, b| b.tvl_hbar.total_cmp(&a.tvl_hbar));
        protocols
    }

    /// Registry protocols whose name, contract address or held token
    /// contains `query`, ignoring case.
    pub async fn search_protocols(&self, query: &str, by: SearchBy) -> Vec<Protocol> {
        let needle = query.trim().to_lowercase();
        let mut protocols = self.valued_protocols(None).await;
        protocols.retain(|p| protocol_matches(p, &needle, by));
        protocols
    }

    /// HBAR transfers of at least `threshold_hbar` within the last
    /// `window_minutes`, largest first.
    pub async fn whale_transactions(&self, threshold_hbar: f64, window_minutes: u32) -> Result<Vec<WhaleAlert>> {
        ensure_positive("threshold_hbar", threshold_hbar)?;
        ensure_positive("window_minutes", f64::from(window_minutes))?;

        let hbar_usd = self.hbar_price_usd().await;
        let now = Utc::now();
        let cutoff = now - ChronoDuration::minutes(i64::from(window_minutes));
        let filter = TransactionFilter {
            since: Some(window_start(now, window_minutes)),
            transaction_type: Some("CRYPTOTRANSFER"),
            limit: MAX_PAGE_SIZE,
            ..Default::default()
        };
        let mut transactions = self.ledger.transactions_paged(&filter, MAX_SCAN_PAGES).await;
        // the query start is floored to the minute
        transactions.retain(|tx| tx.consensus_timestamp.is_none_or(|ts| ts >= cutoff));
        let threshold_tinybars = (threshold_hbar * TINYBARS_PER_HBAR).round() as u64;
        let alerts = crate::sources::ledger::detect_whales(&transactions, threshold_tinybars, hbar_usd);
        debug!("{} of {} transfers above {} HBAR", alerts.len(), transactions.len(), threshold_hbar);
        Ok(alerts)
    }

    pub async fn validate_pool_contract(&self, contract_id: &str) -> Result<ContractValidation> {
        let contract: EntityId = contract_id.parse()?;
        let info = self.ledger.contract_info(&contract).await;
        let exists = info.is_some();
        let deleted = info.as_ref().is_some_and(|i| i.deleted);
        Ok(ContractValidation {
            contract_id: contract.to_string(),
            exists,
            deleted,
            evm_address: info.map(|i| i.evm_address).filter(|a| !a.is_empty()),
            is_valid: exists && !deleted,
        })
    }

    pub async fn pool_contract_state(&self, contract_id: &str, limit: u32) -> Result<Vec<ContractSlot>> {
        let contract: EntityId = contract_id.parse()?;
        ensure_positive("limit", f64::from(limit))?;
        Ok(self.ledger.contract_state(&contract, limit).await)
    }

    // ---- dex ----

    pub async fn dex_stats(&self) -> Option<DexStats> {
        self.dex.stats().await
    }

    pub async fn dex_tokens(&self) -> Vec<Token> {
        self.dex.tokens().await
    }

    pub async fn dex_pools(&self) -> Vec<Pool> {
        self.dex.pools().await
    }

    pub async fn dex_known_pools(&self) -> Vec<Pool> {
        self.dex.known_pools().await
    }

    /// Pools ranked by TVL recomputed from reserves and listing prices.
    pub async fn top_pools(&self, limit: u32) -> Result<Vec<PoolSummary>> {
        ensure_positive("limit", f64::from(limit))?;
        let tokens = self.dex.tokens().await;
        let pools = self.dex.pools().await;
        let prices = PriceBook::from_tokens(&tokens);
        Ok(rank_pools(&pools, &prices, limit as usize))
    }

    pub async fn dex_token(&self, token_id: &str) -> Result<Option<Token>> {
        let token: EntityId = token_id.parse()?;
        let wanted = token.to_string();
        Ok(self.dex.tokens().await.into_iter().find(|t| t.token_id == wanted))
    }

    /// Listing price, 0 when the token is unknown or unpriced.
    pub async fn dex_token_price(&self, token_id: &str) -> Result<f64> {
        Ok(self.dex_token(token_id).await?.and_then(|t| t.price_usd).unwrap_or(0.0))
    }

    pub async fn token_pairs(&self, token_id: &str) -> Result<Vec<TokenPair>> {
        let token: EntityId = token_id.parse()?;
        let wanted = token.to_string();
        let tokens = self.dex.tokens().await;
        let pools = self.dex.pools().await;
        let prices = PriceBook::from_tokens(&tokens);
        let holding = pools.iter().filter(|p| crate::liquidity_pools::contains_token(p, &wanted));
        Ok(index::token_pairs(holding, &wanted, &prices))
    }

    pub async fn dex_analytics(&self) -> DexAnalytics {
        let stats = self.dex.stats().await;
        let tokens = self.dex.tokens().await;
        let pools = self.dex.pools().await;
        let prices = PriceBook::from_tokens(&tokens);
        DexAnalytics {
            total_pools: pools.len(),
            active_pools: pools.iter().filter(|p| is_active(p)).count(),
            total_tokens: tokens.len(),
            tokens_with_prices: tokens.iter().filter(|t| t.price_usd.is_some()).count(),
            computed_tvl_usd: pools.iter().map(|p| pool_tvl(p, &prices)).sum(),
            reported_tvl_usd: stats.map(|s| s.tvl_usd),
        }
    }

    pub async fn token_icons(&self) -> TokenIcons {
        let mut icons = TokenIcons::default();
        for token in self.dex.tokens().await {
            let Some(url) = token.icon.filter(|u| !u.is_empty()) else {
                continue;
            };
            let bucket = if url.to_ascii_lowercase().ends_with(".png") {
                &mut icons.png
            } else {
                &mut icons.other
            };
            bucket.entry(token.token_id).or_insert(TokenIcon {
                symbol: token.symbol,
                icon_url: url,
            });
        }
        icons
    }

    // ---- lending ----

    pub async fn lending_market(&self) -> Option<LendingMarket> {
        self.lending.market().await
    }

    pub async fn lending_reserves(&self) -> Vec<Reserve> {
        self.lending.reserves().await
    }

    pub async fn lending_reserve(&self, symbol: &str) -> Result<Option<Reserve>> {
        if symbol_key(symbol).is_none() {
            return Err(Error::EmptySymbol);
        }
        Ok(self.lending.reserve(symbol).await)
    }

    /// Active reserves paying at least `min_apy`, highest supply APY first.
    pub async fn best_lending_rates(&self, min_apy: f64) -> Result<Vec<YieldOpportunity>> {
        ensure_non_negative("min_apy", min_apy)?;
        Ok(yield_opportunities(&self.lending.reserves().await, min_apy))
    }

    /// Active, borrowable reserves, cheapest variable rate first.
    pub async fn borrowing_rates(&self) -> Vec<BorrowOption> {
        let mut options: Vec<BorrowOption> = self
            .lending
            .reserves()
            .await
            .into_iter()
            .filter(|r| r.active && r.borrowing_enabled && !r.frozen)
            .map(|r| BorrowOption {
                symbol: r.symbol,
                variable_borrow_apy: r.variable_borrow_apy,
                stable_borrow_apy: r.stable_borrow_apy,
                ltv: r.ltv,
                available_liquidity_usd: r.available_liquidity_usd,
            })
            .collect();
        options.sort_by(|a, b| a.variable_borrow_apy.total_cmp(&b.variable_borrow_apy));
        options
    }

    // ---- cross-source ----

    async fn load_index(&self) -> SourceIndex {
        let ledger_tokens = self.ledger.tokens(TokenType::Fungible, MAX_PAGE_SIZE).await;
        let hbar_usd = self.hbar_price_usd().await;
        let dex_stats = self.dex.stats().await;
        let dex_tokens = self.dex.tokens().await;
        let pools = self.dex.pools().await;
        let market = self.lending.market().await;
        let index = SourceIndex::build(SourceSnapshot {
            ledger_tokens,
            hbar_usd,
            dex_stats,
            dex_tokens,
            pools,
            market,
        });
        debug!("source index built from {:?}", index.contributing_sources());
        index
    }

    /// Every token the DEX or the lending market lists, merged by symbol.
    pub async fn discover_all_active_tokens(&self) -> TokenDiscovery {
        let index = self.load_index().await;
        let tokens = index.discover();
        info!("discovered {} tokens", tokens.len());
        TokenDiscovery {
            tokens,
            contributing_sources: index.contributing_sources(),
        }
    }

    /// Presence of one token id across sources. Ids no source can name get
    /// an empty presence with score 0.
    pub async fn token_ecosystem_presence(&self, token_id: &str) -> Result<EcosystemPresence> {
        let token: EntityId = token_id.parse()?;
        let wanted = token.to_string();
        let detail = self.ledger.token_info(&token).await;
        let index = self.load_index().await;
        Ok(presence_for(&index, &wanted, detail.as_ref()))
    }

    /// Tokens in at least `min_pairs` DEX pools, most pairs first.
    pub async fn tokens_by_trading_activity(&self, min_pairs: usize) -> Result<Vec<EcosystemPresence>> {
        ensure_positive("min_pairs", min_pairs as f64)?;
        let index = self.load_index().await;
        let mut tokens: Vec<EcosystemPresence> = index
            .discover()
            .into_iter()
            .filter(|t| t.pair_count >= min_pairs)
            .collect();
        tokens.sort_by(|a, b| b.pair_count.cmp(&a.pair_count).then_with(|| a.symbol.cmp(&b.symbol)));
        Ok(tokens)
    }

    pub async fn multi_protocol_token_data(&self, token_id: &str) -> Result<MultiProtocolTokenData> {
        let token: EntityId = token_id.parse()?;
        let wanted = token.to_string();
        let ledger_detail = self.ledger.token_info(&token).await;
        let index = self.load_index().await;

        let symbol = index
            .symbol_for_id(&wanted)
            .or_else(|| ledger_detail.as_ref().and_then(|t| symbol_key(&t.symbol)));
        let presence = match &symbol {
            Some(symbol) => index
                .presence(symbol, ledger_detail.as_ref())
                .unwrap_or_else(|| EcosystemPresence::absent(&wanted)),
            None => EcosystemPresence::absent(&wanted),
        };
        let dex = symbol.as_deref().and_then(|s| index.dex_token(s)).cloned();
        let lending = symbol.as_deref().and_then(|s| index.reserve(s)).cloned();

        Ok(MultiProtocolTokenData {
            pairs: index.token_pairs(&wanted),
            price: presence.price.clone(),
            token_id: wanted,
            symbol,
            ledger: ledger_detail,
            dex,
            lending,
            presence,
        })
    }

    /// Price of each id from every source that quotes it.
    pub async fn compare_token_prices(&self, token_ids: &[&str]) -> Result<Vec<TokenPriceComparison>> {
        let ids = token_ids
            .iter()
            .map(|raw| raw.parse::<EntityId>().map(|id| id.to_string()))
            .collect::<Result<Vec<String>>>()?;
        let index = self.load_index().await;
        Ok(ids
            .into_iter()
            .map(|token_id| {
                let symbol = index.symbol_for_id(&token_id);
                let quotes = symbol.as_deref().map(|s| index.price_quotes(s)).unwrap_or_default();
                TokenPriceComparison {
                    aggregated: aggregate_price(&quotes),
                    token_id,
                    symbol,
                    quotes,
                }
            })
            .collect())
    }

    pub async fn arbitrage_candidates(&self) -> Vec<ArbitrageCandidate> {
        self.load_index().await.arbitrage_candidates()
    }

    /// Combined TVL across the three sources with a per-source breakdown.
    pub async fn cross_protocol_liquidity_summary(&self) -> LiquiditySummary {
        let protocols = self.valued_protocols(None).await;
        let index = self.load_index().await;
        liquidity_summary(&protocols, &index)
    }

    pub async fn combined_overview(&self) -> DefiOverview {
        let network_supply = self.ledger.network_supply().await;
        let protocols = self.valued_protocols(None).await;
        let index = self.load_index().await;
        let snapshot = index.snapshot();

        let mut top_tokens = index.discover();
        top_tokens.truncate(OVERVIEW_TOP_N);
        let mut best_yields = yield_opportunities(snapshot.reserves(), 0.0);
        best_yields.truncate(OVERVIEW_TOP_N);

        DefiOverview {
            timestamp: Utc::now(),
            hbar_price_usd: snapshot.hbar_usd,
            network_supply,
            dex_stats: snapshot.dex_stats.clone(),
            lending: snapshot.market.as_ref().map(|m| LendingTotals {
                total_supplied_usd: m.total_supplied_usd,
                total_borrowed_usd: m.total_borrowed_usd,
                total_liquidity_usd: m.total_liquidity_usd,
                reserve_count: m.reserves.len(),
            }),
            liquidity: liquidity_summary(&protocols, &index),
            protocol_count: protocols.len(),
            top_pools: rank_pools(&snapshot.pools, index.prices(), OVERVIEW_TOP_N),
            top_tokens,
            best_yields,
        }
    }
}

/// Listed tokens join by their listing symbol. Anything else is joined by
/// the symbol from the ledger token detail, if there is one.
fn presence_for(index: &SourceIndex, token_id: &str, detail: Option<&Token>) -> EcosystemPresence {
    if let Some(presence) = index.symbol_for_id(token_id).and_then(|symbol| index.presence(&symbol, None)) {
        return presence;
    }
    detail
        .and_then(|t| index.presence(&t.symbol, Some(t)))
        .unwrap_or_else(|| EcosystemPresence::absent(token_id))
}

fn protocol_matches(protocol: &Protocol, needle: &str, by: SearchBy) -> bool {
    let hit = |field: &str| field.to_lowercase().contains(needle);
    match by {
        SearchBy::Name => hit(&protocol.name),
        SearchBy::Address => hit(&protocol.contract_id) || protocol.contracts.iter().any(|c| hit(c)),
        SearchBy::Token => protocol.tokens.iter().any(|t| hit(t)),
    }
}

/// Start of a lookback window, floored to the minute so repeated calls
/// within a minute share one cache entry.
fn window_start(now: DateTime<Utc>, window_minutes: u32) -> DateTime<Utc> {
    let start = now - ChronoDuration::minutes(i64::from(window_minutes));
    let floored = start.timestamp() - start.timestamp().rem_euclid(60);
    DateTime::from_timestamp(floored, 0).unwrap_or(start)
}

fn rank_pools(pools: &[Pool], prices: &PriceBook, limit: usize) -> Vec<PoolSummary> {
    let mut ranked: Vec<PoolSummary> = pools
        .iter()
        .map(|pool| PoolSummary {
            pair: format!("{}/{}", pool.token_a.symbol, pool.token_b.symbol),
            tvl_usd: pool_tvl(pool, prices),
            spot_price: spot_price(pool),
            pool: pool.clone(),
        })
        .collect();
    ranked.sort_by(|a, b| b.tvl_usd.total_cmp(&a.tvl_usd));
    ranked.truncate(limit);
    ranked
}

fn yield_opportunities(reserves: &[Reserve], min_apy: f64) -> Vec<YieldOpportunity> {
    let mut opportunities: Vec<YieldOpportunity> = reserves
        .iter()
        .filter(|r| r.active && !r.symbol.trim().is_empty() && r.supply_apy >= min_apy)
        .map(|r| YieldOpportunity {
            symbol: r.symbol.clone(),
            supply_apy: r.supply_apy,
            variable_borrow_apy: r.variable_borrow_apy,
            utilization_rate: r.utilization_rate,
            ltv: r.ltv,
            available_liquidity_usd: r.available_liquidity_usd,
            risk: assess_reserve_risk(r),
        })
        .collect();
    opportunities.sort_by(|a, b| b.supply_apy.total_cmp(&a.supply_apy));
    opportunities
}

fn liquidity_summary(protocols: &[Protocol], index: &SourceIndex) -> LiquiditySummary {
    let snapshot = index.snapshot();
    let ledger_protocol_tvl_hbar: f64 = protocols.iter().map(|p| p.tvl_hbar).sum();

    let mut contributing_sources = Vec::new();
    let ledger_usd = match snapshot.hbar_usd {
        Some(price) if ledger_protocol_tvl_hbar > 0.0 => {
            contributing_sources.push(Source::Ledger);
            ledger_protocol_tvl_hbar * price
        }
        _ => 0.0,
    };
    let dex_usd = match &snapshot.dex_stats {
        Some(stats) => {
            contributing_sources.push(Source::Dex);
            stats.tvl_usd
        }
        None => 0.0,
    };
    let lending_usd = match &snapshot.market {
        Some(market) => {
            contributing_sources.push(Source::Lending);
            market.total_supplied_usd
        }
        None => 0.0,
    };

    let discovered = index.discover();
    let reserves = snapshot.reserves();
    LiquiditySummary {
        tvl: TvlBreakdown {
            ledger_usd,
            dex_usd,
            lending_usd,
            total_usd: ledger_usd + dex_usd + lending_usd,
            contributing_sources,
        },
        ledger_protocol_tvl_hbar,
        dex_pools: snapshot.pools.len(),
        active_dex_pools: snapshot.pools.iter().filter(|p| is_active(p)).count(),
        lending_reserves: reserves.len(),
        active_lending_reserves: reserves.iter().filter(|r| r.active).count(),
        cross_protocol_tokens: discovered.iter().filter(|t| t.in_dex && t.in_lending).count(),
        multi_source_tokens: discovered.iter().filter(|t| t.sources.len() >= 2).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::mock::{MockReply, MockTransport, DEX_BASE, LEDGER_BASE, LENDING_BASE};
    use crate::types::ProtocolKind;
    use serde_json::{json, Value};
    use std::time::Duration;
    use views::RiskLevel;

    const USDC: &str = "0.0.456858";
    const SAUCE: &str = "0.0.731861";
    const WHBAR: &str = "0.0.1456986";

    fn url(base: &str, path: &str) -> String {
        format!("{base}{path}")
    }

    fn client(transport: &Arc<MockTransport>) -> Aggregator {
        let config = MockTransport::config(Duration::from_secs(60));
        Aggregator::with_transport(config, Arc::clone(transport) as Arc<dyn Transport>)
    }

    fn dex_token(id: &str, symbol: &str, price: f64, top: bool) -> Value {
        json!({
            "id": id, "symbol": symbol, "name": symbol, "decimals": 6,
            "priceUsd": price, "inTopPools": top, "icon": format!("/images/{symbol}.png")
        })
    }

    fn dex_pool(id: u64, a: (&str, &str), b: (&str, &str)) -> Value {
        json!({
            "id": id, "contractId": format!("0.0.{}", 9000 + id),
            "tokenA": {"id": a.0, "symbol": a.1, "decimals": 6},
            "tokenB": {"id": b.0, "symbol": b.1, "decimals": 6},
            "tokenReserveA": "1000000000", "tokenReserveB": "2000000000", "fee": 3000
        })
    }

    fn reserve(symbol: &str, supply_apy: f64, ltv: f64, liquidation_threshold: f64) -> Value {
        json!({
            "symbol": symbol, "name": symbol, "supply_apy": supply_apy,
            "variable_borrow_apy": supply_apy + 2.0, "utilization_rate": 50.0,
            "ltv": ltv, "liquidation_threshold": liquidation_threshold,
            "active": true, "variable_borrowing_enabled": true
        })
    }

    /// USDC on the DEX in three pools and on the lending market, SAUCE on
    /// the DEX only, HBARX on the lending market only.
    fn seed_ecosystem(transport: &MockTransport) {
        transport.reply(
            &url(LEDGER_BASE, "/network/exchangerate"),
            MockReply::Json(json!({"current_rate": {"cent_equivalent": 6, "hbar_equivalent": 1}})),
        );
        transport.reply(
            &url(LEDGER_BASE, "/tokens"),
            MockReply::Json(json!({"tokens": [{"token_id": USDC, "symbol": "USDC", "name": "USD Coin"}]})),
        );
        transport.reply(&url(DEX_BASE, "/stats"), MockReply::Json(json!({"tvlUsd": 1_000_000.0})));
        transport.reply(
            &url(DEX_BASE, "/tokens"),
            MockReply::Json(json!([
                dex_token(USDC, "USDC", 1.0, true),
                dex_token(SAUCE, "SAUCE", 0.02, false),
                dex_token(WHBAR, "WHBAR", 0.05, true),
            ])),
        );
        transport.reply(
            &url(DEX_BASE, "/pools"),
            MockReply::Json(json!([
                dex_pool(1, (USDC, "USDC"), (SAUCE, "SAUCE")),
                dex_pool(2, (WHBAR, "WHBAR"), (USDC, "USDC")),
                dex_pool(3, (USDC, "USDC"), ("0.0.1055472", "HBARX")),
            ])),
        );
        transport.reply(
            &url(LENDING_BASE, "/Market"),
            MockReply::Json(json!({
                "total_market_supplied": {"usd_display": "5,000,000"},
                "reserves": [reserve("USDC", 4.5, 0.8, 0.85), reserve("HBARX", 7.5, 0.6, 0.7)]
            })),
        );
    }

    #[tokio::test]
    async fn test_usdc_is_confirmed_everywhere() {
        let transport = MockTransport::new();
        seed_ecosystem(&transport);
        let client = client(&transport);

        let usdc = client.token_ecosystem_presence(USDC).await.unwrap();
        assert_eq!(usdc.score, 3);
        assert_eq!(usdc.pair_count, 3);
        assert_eq!(usdc.price.average, 1.0);
        assert_eq!(usdc.price.source_count, 1);
        assert_eq!(usdc.sources, vec![Source::Ledger, Source::Dex, Source::Lending]);

        let data = client.multi_protocol_token_data(USDC).await.unwrap();
        let reserve = data.lending.unwrap();
        // ltv 0.8 is not above the 0.8 breakpoint: 20 points, Low
        assert_eq!(assess_reserve_risk(&reserve).level, RiskLevel::Low);
        assert_eq!(data.pairs.len(), 3);
    }

    #[tokio::test]
    async fn test_discovery_fetches_each_listing_once() {
        let transport = MockTransport::new();
        seed_ecosystem(&transport);
        let client = client(&transport);

        let discovery = client.discover_all_active_tokens().await;
        let _ = client.discover_all_active_tokens().await;
        let _ = client.arbitrage_candidates().await;

        let symbols: Vec<&str> = discovery.tokens.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["USDC", "WHBAR", "HBARX", "SAUCE"]);
        assert_eq!(discovery.contributing_sources, Source::ORDER.to_vec());
        for path in ["/tokens", "/pools", "/stats"] {
            assert_eq!(transport.hits(&url(DEX_BASE, path)), 1, "{path}");
        }
        assert_eq!(transport.hits(&url(LENDING_BASE, "/Market")), 1);

        let stats = client.call_statistics();
        assert_eq!(stats.call_counts.get("dex:/tokens"), Some(&1));
        assert!(stats.excessive_operations.is_empty());
    }

    #[tokio::test]
    async fn test_score_grows_with_each_signal() {
        let transport = MockTransport::new();
        seed_ecosystem(&transport);
        let client = client(&transport);

        let scores: Vec<(String, u8)> = client
            .discover_all_active_tokens()
            .await
            .tokens
            .into_iter()
            .map(|t| (t.symbol, t.score))
            .collect();
        // SAUCE: DEX only. HBARX: plus a reserve. USDC: plus top pools.
        assert!(scores.contains(&("SAUCE".to_string(), 1)));
        assert!(scores.contains(&("HBARX".to_string(), 2)));
        assert!(scores.contains(&("USDC".to_string(), 3)));
    }

    #[tokio::test]
    async fn test_everything_down_degrades_to_empty() {
        let transport = MockTransport::new();
        let client = client(&transport);

        let discovery = client.discover_all_active_tokens().await;
        assert!(discovery.tokens.is_empty());
        assert!(discovery.contributing_sources.is_empty());
        assert!(client.arbitrage_candidates().await.is_empty());

        let summary = client.cross_protocol_liquidity_summary().await;
        assert_eq!(summary.tvl.total_usd, 0.0);
        assert!(summary.tvl.contributing_sources.is_empty());

        let presence = client.token_ecosystem_presence(USDC).await.unwrap();
        assert_eq!(presence.score, 0);
        assert_eq!(presence.token_id.as_deref(), Some(USDC));

        let overview = client.combined_overview().await;
        assert!(overview.top_tokens.is_empty() && overview.top_pools.is_empty());
        assert!(overview.hbar_price_usd.is_none());
    }

    #[tokio::test]
    async fn test_one_source_down_keeps_the_others() {
        let transport = MockTransport::new();
        seed_ecosystem(&transport);
        transport.reply(&url(LENDING_BASE, "/Market"), MockReply::Status(503));
        let client = client(&transport);

        let discovery = client.discover_all_active_tokens().await;
        assert_eq!(discovery.contributing_sources, vec![Source::Ledger, Source::Dex]);
        assert!(discovery.tokens.iter().all(|t| !t.in_lending));
        assert!(discovery.tokens.iter().any(|t| t.symbol == "USDC"));
    }

    #[tokio::test]
    async fn test_symbol_collision_merges_tokens() {
        let transport = MockTransport::new();
        transport.reply(
            &url(DEX_BASE, "/tokens"),
            MockReply::Json(json!([dex_token("0.0.1", "USDC", 1.0, true), dex_token("0.0.2", "usdc", 0.9, false)])),
        );
        let client = client(&transport);

        let first = client.token_ecosystem_presence("0.0.1").await.unwrap();
        let second = client.token_ecosystem_presence("0.0.2").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(client.discover_all_active_tokens().await.tokens.len(), 1);
    }

    #[tokio::test]
    async fn test_arbitrage_and_combined_tvl() {
        let transport = MockTransport::new();
        seed_ecosystem(&transport);
        let client = client(&transport);

        let candidates = client.arbitrage_candidates().await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].symbol, "USDC");
        assert_eq!(candidates[0].potential_yield, 4.5);

        // registry contracts are unrouted: no ledger TVL
        let summary = client.cross_protocol_liquidity_summary().await;
        assert_eq!(summary.tvl.dex_usd, 1_000_000.0);
        assert_eq!(summary.tvl.lending_usd, 5_000_000.0);
        assert_eq!(summary.tvl.total_usd, 6_000_000.0);
        assert_eq!(summary.tvl.contributing_sources, vec![Source::Dex, Source::Lending]);
        assert_eq!(summary.cross_protocol_tokens, 1);
    }

    #[tokio::test]
    async fn test_price_comparison_joins_hbar_rate() {
        let transport = MockTransport::new();
        seed_ecosystem(&transport);
        let client = client(&transport);

        let comparison = client.compare_token_prices(&[WHBAR, USDC, "0.0.42"]).await.unwrap();
        assert_eq!(comparison[0].aggregated.source_count, 2);
        assert!((comparison[0].aggregated.average - 0.055).abs() < 1e-12);
        assert_eq!(comparison[1].aggregated.average, 1.0);
        assert_eq!(comparison[2].symbol, None);
        assert_eq!(comparison[2].aggregated.source_count, 0);
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected_before_fetching() {
        let transport = MockTransport::new();
        let client = client(&transport);

        assert_eq!(
            client.token_ecosystem_presence("not-an-id").await,
            Err(Error::InvalidEntityId("not-an-id".to_string()))
        );
        assert!(matches!(client.top_tokens(0).await, Err(Error::NonPositive { name: "limit", .. })));
        assert!(client.whale_transactions(0.0, 60).await.is_err());
        assert!(client.whale_transactions(1000.0, 0).await.is_err());
        assert!(matches!(client.protocols(-1.0, None).await, Err(Error::Negative { .. })));
        assert!(client.best_lending_rates(-0.5).await.is_err());
        assert_eq!(client.lending_reserve("  ").await, Err(Error::EmptySymbol));
        assert!(client.compare_token_prices(&[USDC, "0.0"]).await.is_err());
        assert!(client.tokens_by_trading_activity(0).await.is_err());
        assert_eq!(transport.total_hits(), 0);
    }

    #[tokio::test]
    async fn test_whale_transactions_window_and_value() {
        let transport = MockTransport::new();
        transport.reply(
            &url(LEDGER_BASE, "/network/exchangerate"),
            MockReply::Json(json!({"current_rate": {"cent_equivalent": 5, "hbar_equivalent": 1}})),
        );
        transport.reply(
            &url(LEDGER_BASE, "/transactions"),
            MockReply::Json(json!({"transactions": [
                {"transaction_id": "a", "result": "SUCCESS", "transfers": [
                    {"account": "0.0.1", "amount": -200_000_000_000i64},
                    {"account": "0.0.2", "amount": 200_000_000_000i64}
                ]},
                {"transaction_id": "b", "result": "SUCCESS", "transfers": [
                    {"account": "0.0.3", "amount": -100_000_000i64},
                    {"account": "0.0.4", "amount": 100_000_000i64}
                ]}
            ]})),
        );
        let client = client(&transport);

        let alerts = client.whale_transactions(1000.0, 60).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].amount_hbar, 2000.0);
        assert_eq!(alerts[0].value_usd, Some(100.0));
        assert_eq!(alerts[0].from_account, "0.0.1");

        let query = transport.last_query(&url(LEDGER_BASE, "/transactions"));
        assert!(query.iter().any(|(k, v)| k == "timestamp" && v.starts_with("gt:")));
        assert!(query.contains(&("transactiontype".to_string(), "CRYPTOTRANSFER".to_string())));
    }

    fn transfer(id: &str, at: DateTime<Utc>, tinybars: i64) -> Value {
        json!({
            "transaction_id": id,
            "consensus_timestamp": crate::types::format_consensus_timestamp(at),
            "result": "SUCCESS",
            "transfers": [
                {"account": "0.0.10", "amount": -tinybars},
                {"account": "0.0.11", "amount": tinybars}
            ]
        })
    }

    #[tokio::test]
    async fn test_whale_found_on_a_later_page() {
        let transport = MockTransport::new();
        let now = Utc::now();
        let older = crate::types::format_consensus_timestamp(now - ChronoDuration::minutes(2));
        let next = format!("/api/v1/transactions?limit=100&order=desc&transactiontype=CRYPTOTRANSFER&timestamp=lt:{older}");
        transport.reply(
            &url(LEDGER_BASE, "/transactions"),
            MockReply::Json(json!({
                "transactions": [transfer("small", now - ChronoDuration::minutes(1), 100_000_000)],
                "links": {"next": next}
            })),
        );
        let before = format!("lt:{older}");
        transport.reply_with_query(
            &url(LEDGER_BASE, "/transactions"),
            &[
                ("limit", "100"),
                ("order", "desc"),
                ("transactiontype", "CRYPTOTRANSFER"),
                ("timestamp", before.as_str()),
            ],
            MockReply::Json(json!({
                "transactions": [
                    transfer("whale", now - ChronoDuration::minutes(3), 500_000_000_000),
                    // inside the minute-floored query window, outside the exact one
                    transfer("stale", now - ChronoDuration::seconds(60 * 60 + 30), 900_000_000_000)
                ],
                "links": {"next": null}
            })),
        );
        let client = client(&transport);

        let alerts = client.whale_transactions(1000.0, 60).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].amount_hbar, 5000.0);
        assert_eq!(transport.hits(&url(LEDGER_BASE, "/transactions")), 2);
    }

    #[tokio::test]
    async fn test_presence_fetches_in_source_order() {
        let transport = MockTransport::new();
        seed_ecosystem(&transport);
        transport.reply(
            &url(LEDGER_BASE, "/tokens/0.0.777"),
            MockReply::Json(json!({"token_id": "0.0.777", "symbol": "HBARX", "name": "HBARX"})),
        );
        let client = client(&transport);

        let presence = client.token_ecosystem_presence("0.0.777").await.unwrap();
        assert!(presence.in_lending);

        let rank = |request: &String| {
            if request.starts_with(LEDGER_BASE) {
                0
            } else if request.starts_with(DEX_BASE) {
                1
            } else {
                2
            }
        };
        let ranks: Vec<u8> = transport.requests().iter().map(rank).collect();
        assert!(!ranks.is_empty());
        assert!(ranks.windows(2).all(|w| w[0] <= w[1]), "{:?}", transport.requests());
    }

    #[tokio::test]
    async fn test_search_protocols() {
        let transport = MockTransport::new();
        transport.reply(
            &url(LEDGER_BASE, "/balances"),
            MockReply::Json(json!({"balances": [{
                "account": "0.0.1062784",
                "balance": 100_000_000,
                "tokens": [{"token_id": SAUCE, "balance": 5}]
            }]})),
        );
        let client = client(&transport);

        let by_name = client.search_protocols("saucerSWAP", SearchBy::Name).await;
        let names: Vec<&str> = by_name.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| n.starts_with("SaucerSwap")));

        // secondary registry contracts match too
        let by_address = client.search_protocols("3949434", SearchBy::Address).await;
        assert_eq!(by_address.len(), 1);
        assert_eq!(by_address[0].name, "SaucerSwap V2");

        let by_token = client.search_protocols("731861", SearchBy::Token).await;
        assert_eq!(by_token.len(), client.protocol_contracts().len());
        assert!(client.search_protocols("0.0.404", SearchBy::Token).await.is_empty());
        assert!(client.search_protocols("uniswap", SearchBy::Name).await.is_empty());
    }

    #[tokio::test]
    async fn test_protocols_filtered_and_sorted() {
        let transport = MockTransport::new();
        let balances = url(LEDGER_BASE, "/balances");
        transport.reply(
            &balances,
            MockReply::Json(json!({"balances": [{"account": "0.0.1062784", "balance": 500_000_000_000i64}]})),
        );
        let client = client(&transport);

        let dexes = client.protocols(0.0, Some(ProtocolKind::Dex)).await.unwrap();
        assert!(!dexes.is_empty());
        assert!(dexes.iter().all(|p| p.kind == ProtocolKind::Dex));
        assert!(dexes.iter().all(|p| p.tvl_hbar == 5000.0));

        let none = client.protocols(10_000.0, None).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_lending_rate_views() {
        let transport = MockTransport::new();
        seed_ecosystem(&transport);
        let client = client(&transport);

        let best = client.best_lending_rates(5.0).await.unwrap();
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].symbol, "HBARX");
        // ltv 0.6 is 10 points, liquidation threshold 0.7 is 0
        assert_eq!(best[0].risk.score, 10);

        let borrow = client.borrowing_rates().await;
        assert_eq!(borrow[0].symbol, "USDC");
        assert_eq!(borrow[1].variable_borrow_apy, 9.5);
    }

    #[tokio::test]
    async fn test_dex_views() {
        let transport = MockTransport::new();
        seed_ecosystem(&transport);
        let client = client(&transport);

        let analytics = client.dex_analytics().await;
        assert_eq!(analytics.total_pools, 3);
        assert_eq!(analytics.active_pools, 3);
        assert_eq!(analytics.tokens_with_prices, 3);
        assert_eq!(analytics.reported_tvl_usd, Some(1_000_000.0));

        let top = client.top_pools(2).await.unwrap();
        assert_eq!(top.len(), 2);
        // WHBAR/USDC: 1000 WHBAR at 0.05 + 2000 USDC
        assert_eq!(top[0].pool.pool_id, "2");
        assert!((top[0].tvl_usd - 2050.0).abs() < 1e-9);
        // USDC/SAUCE: 1000 USDC + 2000 SAUCE at 0.02
        assert!((top[1].tvl_usd - 1040.0).abs() < 1e-9);
        assert_eq!(top[1].spot_price, 2.0);

        let icons = client.token_icons().await;
        assert_eq!(icons.png.len(), 3);
        assert!(icons.other.is_empty());

        assert_eq!(client.dex_token_price(SAUCE).await.unwrap(), 0.02);
        assert_eq!(client.dex_token_price("0.0.404").await.unwrap(), 0.0);
        assert_eq!(client.token_pairs(SAUCE).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_contract_validation() {
        let transport = MockTransport::new();
        transport.reply(
            &url(LEDGER_BASE, "/contracts/0.0.1062784"),
            MockReply::Json(json!({"contract_id": "0.0.1062784", "evm_address": "0xabc", "deleted": false})),
        );
        let client = client(&transport);

        let valid = client.validate_pool_contract("0.0.1062784").await.unwrap();
        assert!(valid.exists && valid.is_valid);
        assert_eq!(valid.evm_address.as_deref(), Some("0xabc"));

        let missing = client.validate_pool_contract("0.0.5").await.unwrap();
        assert!(!missing.exists && !missing.is_valid);
    }

    #[test]
    fn test_window_start_is_floored_to_minute() {
        let now = DateTime::from_timestamp(1_700_000_125, 500).unwrap();
        let start = window_start(now, 2);
        assert_eq!(start.timestamp(), 1_699_999_980);
    }
}
