use dotenvy::dotenv;
use hedera_defi::{Aggregator, ClientConfig};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    dotenv().ok();

    let config = ClientConfig::from_env()?;
    info!("Ledger: {}", config.endpoints.ledger.base_url);
    info!("DEX: {}", config.endpoints.dex.base_url);
    info!("Lending: {}", config.endpoints.lending.base_url);

    let client = Aggregator::new(config)?;
    let overview = client.combined_overview().await;
    println!("{}", serde_json::to_string_pretty(&overview)?);

    let stats = client.call_statistics();
    info!("{} upstream calls", stats.total_calls);
    for (operation, count) in &stats.call_counts {
        info!("  {operation}: {count}");
    }
    if !stats.excessive_operations.is_empty() {
        warn!("excessive calls: {:?}", stats.excessive_operations);
    }

    Ok(())
}
