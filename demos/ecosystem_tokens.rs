//! Lists the best-confirmed tokens and the DEX/lending cross-listings.
//!
//! cargo run --example ecosystem_tokens

use hedera_defi::{Aggregator, ClientConfig};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    dotenvy::dotenv().ok();

    let client = Aggregator::new(ClientConfig::from_env()?)?;

    let discovery = client.discover_all_active_tokens().await;
    println!("sources: {:?}", discovery.contributing_sources);
    for token in discovery.tokens.iter().take(15) {
        println!(
            "{:<10} score {} pairs {:>3} price ${:.6} ({} sources)",
            token.symbol, token.score, token.pair_count, token.price.average, token.price.source_count
        );
    }

    println!("\ncross-listed:");
    for candidate in client.arbitrage_candidates().await {
        println!(
            "{:<10} ${:.4} supply {:.2}% borrow {:.2}% risk {}",
            candidate.symbol,
            candidate.dex_price_usd,
            candidate.supply_apy,
            candidate.borrow_apy,
            candidate.risk_level
        );
    }

    let stats = client.call_statistics();
    println!("\n{} upstream calls", stats.total_calls);
    Ok(())
}
