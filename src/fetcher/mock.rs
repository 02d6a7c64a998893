use super::{HttpResponse, Transport};
use crate::cache::cache_key;
use crate::config::{ClientConfig, SourceEndpoint, SourceEndpoints};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) const LEDGER_BASE: &str = "http://ledger.test";
pub(crate) const DEX_BASE: &str = "http://dex.test";
pub(crate) const LENDING_BASE: &str = "http://lending.test";

#[derive(Clone)]
pub(crate) enum MockReply {
    Json(Value),
    Status(u16),
    Body(String),
    Fail,
}

#[derive(Default)]
struct MockState {
    routes: HashMap<String, MockReply>,
    query_routes: HashMap<String, MockReply>,
    requests: Vec<String>,
    hits: HashMap<String, usize>,
    queries: HashMap<String, Vec<(String, String)>>,
    headers: HashMap<String, Vec<(String, String)>>,
    delay: Option<Duration>,
}

/// Scripted transport keyed by URL without query string. Unrouted URLs fail
/// like a refused connection.
#[derive(Default)]
pub(crate) struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn config(ttl: Duration) -> ClientConfig {
        ClientConfig {
            endpoints: SourceEndpoints {
                ledger: SourceEndpoint::new(LEDGER_BASE),
                dex: SourceEndpoint::new(DEX_BASE)
                    .with_header("Origin", "https://www.saucerswap.finance"),
                lending: SourceEndpoint::new(LENDING_BASE),
            },
            cache_ttl: ttl,
            ..ClientConfig::default()
        }
    }

    pub(crate) fn reply(&self, url: &str, reply: MockReply) {
        self.state.lock().unwrap().routes.insert(url.to_string(), reply);
    }

    /// Reply used only when the request carries exactly `query`.
    pub(crate) fn reply_with_query(&self, url: &str, query: &[(&str, &str)], reply: MockReply) {
        let query: Vec<(String, String)> = query.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        self.state.lock().unwrap().query_routes.insert(cache_key(url, &query), reply);
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    pub(crate) fn hits(&self, url: &str) -> usize {
        self.state.lock().unwrap().hits.get(url).copied().unwrap_or(0)
    }

    pub(crate) fn total_hits(&self) -> usize {
        self.state.lock().unwrap().hits.values().sum()
    }

    pub(crate) fn last_query(&self, url: &str) -> Vec<(String, String)> {
        self.state.lock().unwrap().queries.get(url).cloned().unwrap_or_default()
    }

    /// Every requested URL, in request order.
    pub(crate) fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    pub(crate) fn last_headers(&self, url: &str) -> Vec<(String, String)> {
        self.state.lock().unwrap().headers.get(url).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        headers: &[(String, String)],
    ) -> eyre::Result<HttpResponse> {
        let (reply, delay) = {
            let mut state = self.state.lock().unwrap();
            *state.hits.entry(url.to_string()).or_insert(0) += 1;
            state.requests.push(url.to_string());
            state.queries.insert(url.to_string(), query.to_vec());
            state.headers.insert(url.to_string(), headers.to_vec());
            let reply = state
                .query_routes
                .get(&cache_key(url, query))
                .or_else(|| state.routes.get(url))
                .cloned();
            (reply, state.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Some(MockReply::Json(value)) => Ok(HttpResponse {
                status: 200,
                body: value.to_string(),
            }),
            Some(MockReply::Status(status)) => Ok(HttpResponse {
                status,
                body: String::new(),
            }),
            Some(MockReply::Body(body)) => Ok(HttpResponse { status: 200, body }),
            Some(MockReply::Fail) | None => Err(eyre::eyre!("connection refused: {}", url)),
        }
    }
}
