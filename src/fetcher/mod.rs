#[cfg(test)]
pub(crate) mod mock;

use crate::accountant::CallAccountant;
use crate::cache::{cache_key, Payload, ResponseCache};
use crate::config::{ClientConfig, SourceEndpoints};
use crate::types::Source;
use async_trait::async_trait;
use eyre::Result;
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Raw GET transport. Errors are transport failures only; HTTP error statuses
/// come back as a response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        headers: &[(String, String)],
    ) -> Result<HttpResponse>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        headers: &[(String, String)],
    ) -> Result<HttpResponse> {
        let mut request = self
            .client
            .get(url)
            .query(query)
            .header("Accept", "application/json");
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

#[derive(Clone)]
enum FetchOutcome {
    Fetched(Payload),
    Empty,
}

type PendingFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// Cached, failure-absorbing request layer shared by all source adapters.
///
/// At most one network request is issued per (endpoint, parameters) key per
/// TTL window: hits are served from the cache and concurrent misses on the
/// same key await a single shared request.
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    endpoints: SourceEndpoints,
    cache: Arc<Mutex<ResponseCache>>,
    inflight: Arc<Mutex<HashMap<String, PendingFetch>>>,
    accountant: CallAccountant,
}

impl Fetcher {
    pub fn new(config: &ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            endpoints: config.endpoints.clone(),
            cache: Arc::new(Mutex::new(ResponseCache::new(config.cache_ttl, config.cache_capacity))),
            inflight: Arc::new(Mutex::new(HashMap::new())),
            accountant: CallAccountant::new(),
        }
    }

    pub fn accountant(&self) -> &CallAccountant {
        &self.accountant
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    pub async fn cached_entries(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// Fetch `path` from `source`. Never fails: any transport, status or
    /// decoding failure yields `Value::Null`, which is not cached.
    pub async fn request(&self, source: Source, path: &str, params: &[(&str, String)]) -> Payload {
        let endpoint = self.endpoints.get(source);
        let url = endpoint.url(path);
        let query: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        let key = cache_key(&url, &query);

        if let Some(hit) = self.cache.lock().await.get(&key) {
            debug!("cache hit {}", key);
            return hit;
        }

        let pending = {
            let mut inflight = self.inflight.lock().await;
            match inflight.get(&key) {
                Some(pending) => {
                    debug!("joining in-flight request {}", key);
                    pending.clone()
                }
                None => {
                    // a request may have completed between the two locks
                    if let Some(hit) = self.cache.lock().await.get(&key) {
                        return hit;
                    }
                    self.accountant.record(&format!("{}:{}", source, path));
                    let request = fetch(Arc::clone(&self.transport), url, query, endpoint.headers.clone());
                    let pending = settle(Arc::clone(&self.cache), Arc::clone(&self.inflight), key.clone(), request)
                        .boxed()
                        .shared();
                    inflight.insert(key.clone(), pending.clone());
                    pending
                }
            }
        };

        match pending.await {
            FetchOutcome::Fetched(payload) => payload,
            FetchOutcome::Empty => Arc::new(Value::Null),
        }
    }
}

/// Runs `fetch`, caches a payload, then clears the in-flight entry. Lives
/// inside the shared future, so whichever caller polls it to completion
/// settles it; a cancelled caller leaves it pending for the next one.
async fn settle(
    cache: Arc<Mutex<ResponseCache>>,
    inflight: Arc<Mutex<HashMap<String, PendingFetch>>>,
    key: String,
    fetch: impl Future<Output = FetchOutcome>,
) -> FetchOutcome {
    let outcome = fetch.await;
    if let FetchOutcome::Fetched(payload) = &outcome {
        cache.lock().await.put(key.clone(), Arc::clone(payload));
    }
    inflight.lock().await.remove(&key);
    outcome
}

async fn fetch(
    transport: Arc<dyn Transport>,
    url: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
) -> FetchOutcome {
    info!("GET {} {:?}", url, query);
    let response = match transport.get(&url, &query, &headers).await {
        Ok(response) => response,
        Err(e) => {
            warn!("transport failure for {}: {}", url, e);
            return FetchOutcome::Empty;
        }
    };

    match response.status {
        200..=299 => {}
        429 => {
            warn!("rate limited by {}", url);
            return FetchOutcome::Empty;
        }
        status => {
            warn!("HTTP {} from {}", status, url);
            return FetchOutcome::Empty;
        }
    }

    match serde_json::from_str::<Value>(&response.body) {
        Ok(value) => FetchOutcome::Fetched(Arc::new(value)),
        Err(e) => {
            warn!("malformed JSON from {}: {}", url, e);
            FetchOutcome::Empty
        }
    }
}
