use guestbook::{
    services::{GuestbookFeed, RpcGuestbookSource, WatcherSettings, run_watcher},
    utils::{config::Config, display::{format_timestamp, short_address}, init_logging},
};
use alloy::providers::ProviderBuilder;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

/// Follows the guestbook and logs every new signature as it lands.
#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("🎯 Starting Guestbook Watcher...");

    let config = Config::from_env()?;
    let provider = ProviderBuilder::new().connect_http(config.rpc_url.parse()?);
    let source = Arc::new(RpcGuestbookSource::new(provider, config.contract_address));
    let feed = Arc::new(GuestbookFeed::new(config.start_block));

    info!(
        "📊 Watching {} on {} from block {}",
        config.contract_address, config.chain.name, config.start_block
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut new_entries = feed.subscribe();
    let watcher = tokio::spawn(run_watcher(
        feed.clone(),
        source,
        WatcherSettings::default(),
        shutdown_rx,
    ));

    loop {
        tokio::select! {
            received = new_entries.recv() => match received {
                Ok(entry) => info!(
                    "✅ Guest #{} {} signed at {}: \"{}\"{} ({}/tx/{})",
                    entry.guest_id,
                    short_address(&entry.guest),
                    format_timestamp(entry.timestamp),
                    entry.display_message(),
                    if entry.is_minted() { format!(" [minted #{}]", entry.token_id) } else { String::new() },
                    config.chain.explorer_url,
                    entry.transaction_hash
                ),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("⚠️ Fell behind, {} new entries not logged", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down watcher, {} entries known", feed.len().await);
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    watcher.await?;
    Ok(())
}
