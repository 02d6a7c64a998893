pub mod accountant;
pub mod aggregator;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod liquidity_pools;
pub mod sources;
pub mod types;

pub use aggregator::Aggregator;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use fetcher::{HttpTransport, Transport};
