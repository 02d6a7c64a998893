use crate::types::{EntityId, ProtocolEntry, ProtocolKind, Source};
use eyre::{Result, WrapErr};
use std::collections::BTreeMap;
use std::fs;
use std::num::NonZeroUsize;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_LEDGER_URL: &str = "https://mainnet-public.mirrornode.hedera.com/api/v1";
pub const DEFAULT_DEX_URL: &str = "https://server.saucerswap.finance/api/public";
pub const DEFAULT_LENDING_URL: &str = "https://mainnet-data.bonzo.finance";
const DEX_ORIGIN: &str = "https://www.saucerswap.finance";

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_CACHE_CAPACITY: usize = 512;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Base URL and fixed headers of one upstream API.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceEndpoint {
    pub base_url: String,
    pub headers: Vec<(String, String)>,
}

impl SourceEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceEndpoints {
    pub ledger: SourceEndpoint,
    pub dex: SourceEndpoint,
    pub lending: SourceEndpoint,
}

impl SourceEndpoints {
    pub fn get(&self, source: Source) -> &SourceEndpoint {
        match source {
            Source::Ledger => &self.ledger,
            Source::Dex => &self.dex,
            Source::Lending => &self.lending,
        }
    }
}

impl Default for SourceEndpoints {
    fn default() -> Self {
        Self {
            ledger: SourceEndpoint::new(DEFAULT_LEDGER_URL),
            dex: dex_endpoint(DEFAULT_DEX_URL),
            lending: SourceEndpoint::new(DEFAULT_LENDING_URL),
        }
    }
}

/// The DEX upstream rejects requests without browser-style origin headers.
fn dex_endpoint(base_url: &str) -> SourceEndpoint {
    SourceEndpoint::new(base_url)
        .with_header("Origin", DEX_ORIGIN)
        .with_header("Referer", &format!("{DEX_ORIGIN}/"))
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoints: SourceEndpoints,
    pub cache_ttl: Duration,
    pub cache_capacity: NonZeroUsize,
    pub request_timeout: Duration,
    pub protocols: Vec<ProtocolEntry>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: SourceEndpoints::default(),
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_capacity: NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            protocols: default_protocols(),
        }
    }
}

impl ClientConfig {
    /// Build a config from environment variables, falling back to mainnet defaults.
    ///
    /// Reads `LEDGER_API_URL`, `DEX_API_URL`, `LENDING_API_URL`, `CACHE_TTL_SECS`,
    /// `CACHE_CAPACITY`, `REQUEST_TIMEOUT_SECS` and `PROTOCOLS_JSON` (path to a
    /// protocol registry file).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup("LEDGER_API_URL") {
            config.endpoints.ledger = SourceEndpoint::new(url);
        }
        if let Some(url) = lookup("DEX_API_URL") {
            config.endpoints.dex = dex_endpoint(&url);
        }
        if let Some(url) = lookup("LENDING_API_URL") {
            config.endpoints.lending = SourceEndpoint::new(url);
        }
        if let Some(raw) = lookup("CACHE_TTL_SECS") {
            let secs: u64 = raw
                .parse()
                .wrap_err_with(|| format!("CACHE_TTL_SECS is not a number: {raw}"))?;
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup("CACHE_CAPACITY") {
            config.cache_capacity = raw
                .parse()
                .wrap_err_with(|| format!("CACHE_CAPACITY must be a positive integer: {raw}"))?;
        }
        if let Some(raw) = lookup("REQUEST_TIMEOUT_SECS") {
            let secs: u64 = raw
                .parse()
                .wrap_err_with(|| format!("REQUEST_TIMEOUT_SECS is not a number: {raw}"))?;
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = lookup("PROTOCOLS_JSON") {
            config.protocols = load_protocols_file(&path)?;
        }

        Ok(config)
    }
}

/// Format of each protocol entry in protocols.json.
#[derive(serde::Deserialize)]
struct RegistryEntry {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    contracts: Vec<String>,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

/// Root format of protocols.json: { "protocols": { "id": {...} } }
#[derive(serde::Deserialize)]
struct RegistryFile {
    protocols: BTreeMap<String, RegistryEntry>,
}

/// Load the protocol registry. Returns only enabled protocols with at least one
/// well-formed contract id.
pub fn load_protocols_file(path: &str) -> Result<Vec<ProtocolEntry>> {
    let content =
        fs::read_to_string(path).wrap_err_with(|| format!("cannot read protocol registry {path}"))?;
    parse_protocols(&content)
}

pub fn parse_protocols(content: &str) -> Result<Vec<ProtocolEntry>> {
    let file: RegistryFile = serde_json::from_str(content)?;

    let mut protocols = Vec::new();
    for (id, entry) in file.protocols {
        if !entry.enabled {
            continue;
        }
        let contracts: Vec<String> = entry
            .contracts
            .into_iter()
            .filter(|c| match c.parse::<EntityId>() {
                Ok(_) => true,
                Err(e) => {
                    warn!("protocol {}: skipping contract: {}", id, e);
                    false
                }
            })
            .collect();
        // Skip protocols we can't value (no primary contract)
        if contracts.is_empty() {
            warn!("protocol {} has no usable contract ids, skipping", id);
            continue;
        }
        protocols.push(ProtocolEntry {
            id,
            name: entry.name,
            kind: ProtocolKind::from(entry.kind.as_str()),
            contracts,
        });
    }

    Ok(protocols)
}

/// Well-known Hedera DeFi protocols. The first contract is the one valued for TVL.
pub fn default_protocols() -> Vec<ProtocolEntry> {
    let entry = |id: &str, name: &str, kind: ProtocolKind, contracts: &[&str]| ProtocolEntry {
        id: id.to_string(),
        name: name.to_string(),
        kind,
        contracts: contracts.iter().map(|c| c.to_string()).collect(),
    };
    vec![
        entry("saucerswap_v1", "SaucerSwap V1", ProtocolKind::Dex, &["0.0.1062784", "0.0.3045981"]),
        entry("saucerswap_v2", "SaucerSwap V2", ProtocolKind::Dex, &["0.0.3946833", "0.0.3949434"]),
        entry("heliswap", "HeliSwap", ProtocolKind::Dex, &["0.0.1237181"]),
        entry("pangolin", "Pangolin", ProtocolKind::Dex, &["0.0.1242116"]),
        entry("bonzo", "Bonzo Finance", ProtocolKind::Lending, &["0.0.7308459"]),
        entry("stader", "Stader Labs", ProtocolKind::Staking, &["0.0.1027588"]),
    ]
}
