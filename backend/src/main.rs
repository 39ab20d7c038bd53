use alloy::providers::ProviderBuilder;
use guestbook::{
    AppState, Config, create_router,
    services::{
        GuestbookFeed, RpcGuestbookSource, WatcherSettings, run_watcher,
        ens::{EnsResolver, NameResolver},
    },
    utils,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{self, MissedTickBehavior};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    utils::init_logging();

    let config = Config::from_env()?;
    tracing::info!(
        "Serving guestbook {} on {} (chain id {}) from block {}",
        config.contract_address,
        config.chain.name,
        config.chain.chain_id,
        config.start_block
    );

    let provider = ProviderBuilder::new().connect_http(config.rpc_url.parse()?);
    let source = Arc::new(RpcGuestbookSource::new(provider, config.contract_address));
    let feed = Arc::new(GuestbookFeed::new(config.start_block));

    let mainnet = ProviderBuilder::new().connect_http(config.mainnet_rpc_url.parse()?);
    let names: Arc<dyn NameResolver> = Arc::new(EnsResolver::new(mainnet));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let watcher = tokio::spawn(run_watcher(
        feed.clone(),
        source.clone(),
        WatcherSettings::default(),
        shutdown_rx.clone(),
    ));
    let warmer = tokio::spawn(warm_names(feed.clone(), names.clone(), shutdown_rx.clone()));

    let port = config.port;
    let app = create_router(AppState {
        config,
        feed,
        source,
        names: Some(names),
    });

    let listener = tokio::net::TcpListener::bind(&format!("0.0.0.0:{}", port)).await?;
    tracing::info!("Server running on port {}", port);

    let mut server_shutdown = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown signal received"),
                _ = server_shutdown.changed() => {}
            }
        })
        .await?;

    let _ = shutdown_tx.send(true);
    let (watcher, warmer) = tokio::join!(watcher, warmer);
    if let Err(e) = watcher {
        tracing::error!("Watcher task ended abnormally: {}", e);
    }
    if let Err(e) = warmer {
        tracing::error!("ENS warmer task ended abnormally: {}", e);
    }
    tracing::info!("Server stopped");

    Ok(())
}

/// Resolves ENS names for guests in the background so request handlers
/// only ever read the cache.
async fn warm_names(feed: Arc<GuestbookFeed>, names: Arc<dyn NameResolver>, mut shutdown: watch::Receiver<bool>) {
    let mut new_entries = feed.subscribe();
    let mut sweep = time::interval(Duration::from_secs(60));
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = sweep.tick() => {
                let guests: HashSet<_> = feed.entries().await.into_iter().map(|e| e.guest).collect();
                let mut resolved = 0;
                for guest in guests {
                    if names.lookup(guest).await.is_some() {
                        resolved += 1;
                    }
                }
                tracing::debug!("ENS sweep done, {} guests have names", resolved);
            }
            received = new_entries.recv() => match received {
                Ok(entry) => {
                    if let Some(name) = names.lookup(entry.guest).await {
                        tracing::info!("Guest {} is {}", entry.guest, name);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("ENS warmer skipped {} new entries", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.changed() => break,
        }
    }
}
