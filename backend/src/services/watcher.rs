use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::{
    constants::{REFETCH_INTERVAL_SECS, WATCH_POLL_INTERVAL_SECS},
    services::{feed::GuestbookFeed, source::GuestbookSource},
};

#[derive(Debug, Clone, Copy)]
pub struct WatcherSettings {
    /// Full refresh cadence.
    pub refetch_interval: Duration,
    /// Cadence of the cheap "any new GuestbookSigned logs?" check.
    pub poll_interval: Duration,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            refetch_interval: Duration::from_secs(REFETCH_INTERVAL_SECS),
            poll_interval: Duration::from_secs(WATCH_POLL_INTERVAL_SECS),
        }
    }
}

/// Keeps `feed` in sync with the chain until `shutdown` flips to true.
/// Failed cycles are logged; the next tick tries again.
pub async fn run_watcher<S>(
    feed: Arc<GuestbookFeed>,
    source: Arc<S>,
    settings: WatcherSettings,
    mut shutdown: watch::Receiver<bool>,
) where
    S: GuestbookSource + ?Sized,
{
    let mut refetch = time::interval(settings.refetch_interval);
    refetch.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut poll = time::interval(settings.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut iter_count: usize = 0;

    info!(
        "Starting guestbook watcher (refetch every {}s, poll every {}s)",
        settings.refetch_interval.as_secs(),
        settings.poll_interval.as_secs()
    );

    loop {
        tokio::select! {
            _ = refetch.tick() => {
                iter_count += 1;
                match feed.refresh(source.as_ref()).await {
                    Ok(update) => info!(
                        "Watcher iteration {} | entries: {} | new: {} | scanned to: {:?}",
                        iter_count,
                        update.total_entries,
                        update.new_entries.len(),
                        update.scanned_to
                    ),
                    Err(e) => error!("Watcher iteration {} failed: {}", iter_count, e),
                }
            }
            _ = poll.tick() => {
                match feed.has_unseen_logs(source.as_ref()).await {
                    Ok(true) => {
                        debug!("New logs detected, refreshing");
                        if let Err(e) = feed.refresh(source.as_ref()).await {
                            error!("Refresh after new logs failed: {}", e);
                        }
                        refetch.reset();
                    }
                    Ok(false) => {}
                    Err(e) => debug!("Log poll failed: {}", e),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Guestbook watcher shutting down after {} iterations", iter_count);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::models::entries::fixtures::entry;
    use crate::services::source::stub::MemorySource;

    #[tokio::test(start_paused = true)]
    async fn test_watcher_picks_up_new_entries_and_stops() {
        let source = Arc::new(MemorySource::with_latest(1100));
        source.push_entry(entry(1, 100));
        let feed = Arc::new(GuestbookFeed::new(1000));
        let mut rx = feed.subscribe();
        let (tx, shutdown) = watch::channel(false);

        let handle = tokio::spawn(run_watcher(
            feed.clone(),
            source.clone(),
            WatcherSettings::default(),
            shutdown,
        ));

        // First tick fires immediately and loads the backlog
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(feed.len().await, 1);

        let mut fresh = entry(2, 200);
        fresh.block_number = 1105;
        source.push_entry(fresh);

        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("entry within one poll interval")
            .unwrap();
        assert_eq!(received.guest_id, alloy::primitives::U256::from(2));

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watcher stops")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_recovers_after_failed_cycle() {
        let source = Arc::new(MemorySource::with_latest(1100));
        source.push_entry(entry(1, 100));
        let feed = Arc::new(GuestbookFeed::new(1000));
        let mut rx = feed.subscribe();
        let (tx, shutdown) = watch::channel(false);

        // Only full refreshes after the initial load
        let settings = WatcherSettings {
            refetch_interval: Duration::from_secs(10),
            poll_interval: Duration::from_secs(3600),
        };
        let handle = tokio::spawn(run_watcher(feed.clone(), source.clone(), settings, shutdown));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(feed.len().await, 1);

        source.fail_next(FetchError::Rpc("upstream down".into()));
        let mut fresh = entry(2, 200);
        fresh.block_number = 1105;
        source.push_entry(fresh);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(feed.len().await, 1);
        assert!(feed.status().await.last_error.unwrap().contains("upstream down"));

        let received = tokio::time::timeout(Duration::from_secs(15), rx.recv())
            .await
            .expect("entry on the next refresh")
            .unwrap();
        assert_eq!(received.guest_id, alloy::primitives::U256::from(2));
        assert_eq!(feed.len().await, 2);
        assert!(feed.status().await.last_error.is_none());

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
