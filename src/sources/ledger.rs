use super::fields::{array, flag, int, list, opt_i64, opt_str, small_int, text, uint};
use crate::fetcher::Fetcher;
use crate::types::{
    format_consensus_timestamp, parse_consensus_timestamp, AccountBalance, ContractInfo,
    ContractSlot, EntityId, ExchangeRate, LedgerTransaction, NetworkSupply, NodeInfo, Protocol,
    ProtocolEntry, Source, Token, TokenBalance, Transfer, WhaleAlert, TINYBARS_PER_HBAR,
};
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Largest page the mirror node serves.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Upper bound on pages followed by one windowed transaction scan.
pub const MAX_SCAN_PAGES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Fungible,
    NonFungible,
}

impl TokenType {
    fn as_param(&self) -> &'static str {
        match self {
            TokenType::Fungible => "FUNGIBLE_COMMON",
            TokenType::NonFungible => "NON_FUNGIBLE_UNIQUE",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub account: Option<EntityId>,
    pub since: Option<DateTime<Utc>>,
    pub transaction_type: Option<&'static str>,
    pub limit: u32,
}

/// Hedera mirror node REST adapter.
pub struct LedgerSource {
    fetcher: Arc<Fetcher>,
}

impl LedgerSource {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn network_supply(&self) -> Option<NetworkSupply> {
        let payload = self.fetcher.request(Source::Ledger, "/network/supply", &[]).await;
        if !payload.is_object() {
            return None;
        }
        Some(NetworkSupply {
            released_supply: int(&payload, "released_supply"),
            total_supply: int(&payload, "total_supply"),
        })
    }

    pub async fn network_nodes(&self) -> Vec<NodeInfo> {
        let payload = self.fetcher.request(Source::Ledger, "/network/nodes", &[]).await;
        array(&payload, "nodes")
            .iter()
            .map(|node| NodeInfo {
                node_id: uint(node, "node_id"),
                node_account_id: text(node, "node_account_id"),
                description: text(node, "description"),
            })
            .collect()
    }

    pub async fn exchange_rate(&self) -> Option<ExchangeRate> {
        let payload = self
            .fetcher
            .request(Source::Ledger, "/network/exchangerate", &[])
            .await;
        let current = payload.get("current_rate")?;
        Some(ExchangeRate {
            cent_equivalent: uint(current, "cent_equivalent"),
            hbar_equivalent: uint(current, "hbar_equivalent"),
            expiration_time: opt_i64(current, "expiration_time").unwrap_or(0),
        })
    }

    pub async fn account_balance(&self, account: &EntityId) -> Option<AccountBalance> {
        let payload = self
            .fetcher
            .request(Source::Ledger, "/balances", &[("account.id", account.to_string())])
            .await;
        let entry = array(&payload, "balances").first()?;
        Some(AccountBalance {
            account: text(entry, "account"),
            balance_tinybars: uint(entry, "balance"),
            tokens: array(entry, "tokens").iter().map(parse_token_balance).collect(),
        })
    }

    pub async fn account_tokens(&self, account: &EntityId) -> Vec<TokenBalance> {
        let path = format!("/accounts/{account}/tokens");
        let payload = self.fetcher.request(Source::Ledger, &path, &[]).await;
        array(&payload, "tokens").iter().map(parse_token_balance).collect()
    }

    /// One page of transactions, newest first.
    pub async fn transactions(&self, filter: &TransactionFilter) -> Vec<LedgerTransaction> {
        self.transaction_page(&transaction_params(filter)).await.0
    }

    /// Newest-first transactions following `links.next` until a page reaches
    /// back past `filter.since`, the listing ends, or `max_pages` pages have
    /// been read. Each page is its own cached request.
    pub async fn transactions_paged(&self, filter: &TransactionFilter, max_pages: usize) -> Vec<LedgerTransaction> {
        let mut params = transaction_params(filter);
        let mut transactions = Vec::new();
        let mut pages = 0;
        loop {
            let (page, next) = self.transaction_page(&params).await;
            pages += 1;
            let oldest = page.iter().filter_map(|tx| tx.consensus_timestamp).min();
            let reached_start = matches!((filter.since, oldest), (Some(since), Some(oldest)) if oldest <= since);
            transactions.extend(page);

            let Some(next) = next else { break };
            if reached_start {
                break;
            }
            if pages >= max_pages {
                warn!("transaction scan stopped after {} pages", pages);
                break;
            }
            params = next;
        }
        transactions
    }

    async fn transaction_page(
        &self,
        params: &[(String, String)],
    ) -> (Vec<LedgerTransaction>, Option<Vec<(String, String)>>) {
        let params: Vec<(&str, String)> = params.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        let payload = self.fetcher.request(Source::Ledger, "/transactions", &params).await;
        let page = array(&payload, "transactions").iter().map(parse_transaction).collect();
        let next = payload
            .get("links")
            .and_then(|links| opt_str(links, "next"))
            .and_then(next_page_params);
        (page, next)
    }

    pub async fn tokens(&self, token_type: TokenType, limit: u32) -> Vec<Token> {
        let params = [
            ("type", token_type.as_param().to_string()),
            ("limit", limit.clamp(1, MAX_PAGE_SIZE).to_string()),
            ("order", "desc".to_string()),
        ];
        let payload = self.fetcher.request(Source::Ledger, "/tokens", &params).await;
        list(&payload, "tokens").iter().map(parse_token).collect()
    }

    pub async fn token_info(&self, token: &EntityId) -> Option<Token> {
        let path = format!("/tokens/{token}");
        let payload = self.fetcher.request(Source::Ledger, &path, &[]).await;
        payload.is_object().then(|| parse_token(&payload))
    }

    pub async fn contract_info(&self, contract: &EntityId) -> Option<ContractInfo> {
        let path = format!("/contracts/{contract}");
        let payload = self.fetcher.request(Source::Ledger, &path, &[]).await;
        let contract_id = opt_str(&payload, "contract_id")?;
        Some(ContractInfo {
            contract_id: contract_id.to_string(),
            evm_address: text(&payload, "evm_address"),
            deleted: flag(&payload, "deleted"),
            created_timestamp: opt_str(&payload, "created_timestamp").and_then(parse_consensus_timestamp),
            memo: text(&payload, "memo"),
        })
    }

    pub async fn contract_state(&self, contract: &EntityId, limit: u32) -> Vec<ContractSlot> {
        let path = format!("/contracts/{contract}/state");
        let params = [("limit", limit.clamp(1, MAX_PAGE_SIZE).to_string())];
        let payload = self.fetcher.request(Source::Ledger, &path, &params).await;
        array(&payload, "state")
            .iter()
            .map(|slot| ContractSlot {
                slot: text(slot, "slot"),
                value: text(slot, "value"),
            })
            .collect()
    }

    /// Value a registry protocol by the HBAR balance of its primary contract.
    pub async fn protocol(&self, entry: &ProtocolEntry) -> Option<Protocol> {
        let primary: EntityId = match entry.primary_contract()?.parse() {
            Ok(id) => id,
            Err(e) => {
                warn!("protocol {}: {}", entry.name, e);
                return None;
            }
        };
        let balance = self.account_balance(&primary).await;
        let (tvl_hbar, tokens) = match balance {
            Some(b) => (
                b.balance_tinybars as f64 / TINYBARS_PER_HBAR,
                b.tokens.into_iter().map(|t| t.token_id).collect(),
            ),
            None => (0.0, Vec::new()),
        };
        Some(Protocol {
            name: entry.name.clone(),
            kind: entry.kind,
            contract_id: primary.to_string(),
            contracts: entry.contracts.clone(),
            tvl_hbar,
            tokens,
        })
    }
}

fn transaction_params(filter: &TransactionFilter) -> Vec<(String, String)> {
    let mut params = vec![
        ("limit".to_string(), filter.limit.clamp(1, MAX_PAGE_SIZE).to_string()),
        ("order".to_string(), "desc".to_string()),
    ];
    if let Some(account) = &filter.account {
        params.push(("account.id".to_string(), account.to_string()));
    }
    if let Some(since) = filter.since {
        params.push(("timestamp".to_string(), format!("gt:{}", format_consensus_timestamp(since))));
    }
    if let Some(kind) = filter.transaction_type {
        params.push(("transactiontype".to_string(), kind.to_string()));
    }
    params
}

/// Query of a mirror node `links.next` path such as
/// `/api/v1/transactions?limit=100&timestamp=lt:1700000000.000000001`.
fn next_page_params(link: &str) -> Option<Vec<(String, String)>> {
    let url = Url::parse("http://mirror.invalid").ok()?.join(link).ok()?;
    let params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    (!params.is_empty()).then_some(params)
}

fn parse_token_balance(v: &Value) -> TokenBalance {
    TokenBalance {
        token_id: text(v, "token_id"),
        balance: int(v, "balance"),
    }
}

fn parse_token(v: &Value) -> Token {
    Token {
        token_id: text(v, "token_id"),
        symbol: text(v, "symbol"),
        name: text(v, "name"),
        // mirror list entries omit decimals for NFTs
        decimals: small_int(v, "decimals"),
        total_supply: int(v, "total_supply"),
        price_usd: None,
        in_top_pools: false,
        due_diligence_complete: false,
        icon: None,
        source: Source::Ledger,
    }
}

fn parse_transaction(v: &Value) -> LedgerTransaction {
    LedgerTransaction {
        transaction_id: text(v, "transaction_id"),
        transaction_hash: text(v, "transaction_hash"),
        consensus_timestamp: opt_str(v, "consensus_timestamp").and_then(parse_consensus_timestamp),
        name: text(v, "name"),
        result: text(v, "result"),
        transfers: array(v, "transfers")
            .iter()
            .filter_map(|t| {
                Some(Transfer {
                    account: opt_str(t, "account")?.to_string(),
                    amount: opt_i64(t, "amount").unwrap_or(0),
                })
            })
            .collect(),
    }
}

/// HBAR transfers whose largest credit is at least `threshold_tinybars`,
/// largest first. The sender is the most-debited account.
pub fn detect_whales(
    transactions: &[LedgerTransaction],
    threshold_tinybars: u64,
    hbar_usd: Option<f64>,
) -> Vec<WhaleAlert> {
    let mut alerts: Vec<WhaleAlert> = transactions
        .iter()
        .filter(|tx| tx.result.is_empty() || tx.result == "SUCCESS")
        .filter_map(|tx| {
            let credit = tx.transfers.iter().filter(|t| t.amount > 0).max_by_key(|t| t.amount)?;
            let amount = credit.amount.unsigned_abs();
            if amount < threshold_tinybars {
                return None;
            }
            let debit = tx.transfers.iter().filter(|t| t.amount < 0).min_by_key(|t| t.amount);
            let amount_hbar = amount as f64 / TINYBARS_PER_HBAR;
            Some(WhaleAlert {
                timestamp: tx.consensus_timestamp,
                token: "HBAR".to_string(),
                amount,
                amount_hbar,
                value_usd: hbar_usd.map(|price| amount_hbar * price),
                from_account: debit.map(|t| t.account.clone()).unwrap_or_default(),
                to_account: credit.account.clone(),
                transaction_hash: if tx.transaction_hash.is_empty() {
                    tx.transaction_id.clone()
                } else {
                    tx.transaction_hash.clone()
                },
            })
        })
        .collect();
    alerts.sort_by(|a, b| b.amount.cmp(&a.amount));
    alerts
}
