//! Cached, newest-first projection of the guestbook's event log.
//!
//! The chain is the source of truth; the feed only ever appends what the
//! scanner returns, keyed by transaction hash. New entries are detected by
//! diffing transaction hashes against everything seen before, and pushed to
//! subscribers on a broadcast channel.

use alloy::primitives::{B256, U256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    constants::{MAX_CHUNK_SIZE, NEW_ENTRY_CHANNEL_CAPACITY, STALE_TIME_SECS},
    error::FetchError,
    models::{GuestbookEntry, Sponsorship, newest_first},
    services::{
        retry::fetch_with_retry,
        scanner::{LogScanner, ScanOutcome},
        source::GuestbookSource,
        sponsorship::{latest_sponsorship, merge_sponsorship, required_bid},
    },
};

/// What one refresh changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedUpdate {
    /// Entries not seen before, newest first. Empty on the initial load.
    pub new_entries: Vec<GuestbookEntry>,
    pub total_entries: usize,
    pub initial_load: bool,
    pub scanned_to: Option<u64>,
}

/// The entry currently pinned by sponsorship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinnedEntry {
    pub entry: GuestbookEntry,
    pub sponsorship: Sponsorship,
}

/// Entries as they should be listed: the pinned entry (if any) on top,
/// then everything else newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedView {
    pub pinned: Option<PinnedEntry>,
    pub entries: Vec<GuestbookEntry>,
}

/// Point-in-time summary for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct FeedStatus {
    pub initialized: bool,
    pub total_entries: usize,
    pub scanned_to: Option<u64>,
    pub paused: Option<bool>,
    pub guest_count: Option<U256>,
    /// `getCurrentMinPrice()` as last read.
    pub min_sponsor_price: Option<U256>,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct FeedState {
    entries: HashMap<B256, GuestbookEntry>,
    known_hashes: HashSet<B256>,
    sponsorships: HashMap<U256, Sponsorship>,
    /// Highest block fully scanned.
    scanned_to: Option<u64>,
    paused: Option<bool>,
    guest_count: Option<U256>,
    min_sponsor_price: Option<U256>,
    initialized: bool,
    last_refreshed: Option<Instant>,
    last_refreshed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    latest_hash: Option<B256>,
    /// When the newest entry last changed after the initial load.
    latest_changed_at: Option<Instant>,
}

impl FeedState {
    fn sorted_entries(&self) -> Vec<GuestbookEntry> {
        let mut entries: Vec<GuestbookEntry> = self.entries.values().cloned().collect();
        entries.sort_by(newest_first);
        entries
    }

    fn newest(&self) -> Option<&GuestbookEntry> {
        self.entries.values().min_by(|a, b| newest_first(a, b))
    }
}

pub struct GuestbookFeed {
    start_block: u64,
    stale_time: Duration,
    state: RwLock<FeedState>,
    scanner: Mutex<LogScanner>,
    new_entries: broadcast::Sender<GuestbookEntry>,
}

impl GuestbookFeed {
    pub fn new(start_block: u64) -> Self {
        Self::with_scanner(start_block, LogScanner::default())
    }

    pub fn with_scanner(start_block: u64, scanner: LogScanner) -> Self {
        let (new_entries, _) = broadcast::channel(NEW_ENTRY_CHANNEL_CAPACITY);
        Self {
            start_block,
            stale_time: Duration::from_secs(STALE_TIME_SECS),
            state: RwLock::new(FeedState::default()),
            scanner: Mutex::new(scanner),
            new_entries,
        }
    }

    /// Receives every entry reported as new by a refresh.
    pub fn subscribe(&self) -> broadcast::Receiver<GuestbookEntry> {
        self.new_entries.subscribe()
    }

    /// Skips the refresh when the last successful one is younger than the stale time.
    pub async fn refresh_if_stale<S>(&self, source: &S) -> Result<Option<FeedUpdate>, FetchError>
    where
        S: GuestbookSource + ?Sized,
    {
        if let Some(last) = self.state.read().await.last_refreshed {
            if last.elapsed() < self.stale_time {
                debug!("Feed is fresh ({} ms old), skipping refresh", last.elapsed().as_millis());
                return Ok(None);
            }
        }
        self.refresh(source).await.map(Some)
    }

    /// Scans from the last scanned block to the chain head and merges the
    /// result. Refreshes are serialized.
    pub async fn refresh<S>(&self, source: &S) -> Result<FeedUpdate, FetchError>
    where
        S: GuestbookSource + ?Sized,
    {
        let mut scanner = self.scanner.lock().await;
        let policy = *scanner.policy();

        let latest = match fetch_with_retry(&policy, "latest block", || source.latest_block()).await {
            Ok(latest) => latest,
            Err(e) => {
                self.record_error(&e).await;
                return Err(e);
            }
        };

        // The last scanned block is scanned again; hash dedupe absorbs the overlap.
        let from = self.state.read().await.scanned_to.unwrap_or(self.start_block);
        let outcome = if from <= latest {
            scanner.scan(source, from, latest).await
        } else {
            ScanOutcome::default()
        };

        self.refresh_contract_status(source).await;

        let error = outcome.error.clone();
        let update = self.apply(outcome).await;

        if let Some(e) = error {
            self.record_error(&e).await;
            return Err(e);
        }
        Ok(update)
    }

    /// Cheap check used by the watcher's fast poll: are there signed logs
    /// past the scanned range that the feed has not seen?
    pub async fn has_unseen_logs<S>(&self, source: &S) -> Result<bool, FetchError>
    where
        S: GuestbookSource + ?Sized,
    {
        let Some(scanned_to) = self.state.read().await.scanned_to else {
            // Nothing scanned yet, only a full refresh can help
            return Ok(true);
        };

        let latest = source.latest_block().await?;
        if latest <= scanned_to {
            return Ok(false);
        }
        if latest - scanned_to > MAX_CHUNK_SIZE {
            debug!("Feed is {} blocks behind, leaving catch-up to the full refresh", latest - scanned_to);
            return Ok(true);
        }

        let logs = source.fetch_signed(scanned_to + 1, latest).await?;
        let state = self.state.read().await;
        Ok(logs.iter().any(|e| !state.known_hashes.contains(&e.transaction_hash)))
    }

    async fn refresh_contract_status<S>(&self, source: &S)
    where
        S: GuestbookSource + ?Sized,
    {
        let paused = source.is_paused().await;
        let guest_count = source.guest_count().await;
        let min_price = source.current_min_price().await;

        let mut state = self.state.write().await;
        match paused {
            Ok(paused) => state.paused = Some(paused),
            Err(e) => warn!("Failed to read paused(): {}", e),
        }
        match guest_count {
            Ok(count) => state.guest_count = Some(count),
            Err(e) => warn!("Failed to read getGuestCount(): {}", e),
        }
        match min_price {
            Ok(price) => state.min_sponsor_price = Some(price),
            Err(e) => debug!("Failed to read getCurrentMinPrice(): {}", e),
        }
    }

    async fn record_error(&self, error: &FetchError) {
        warn!("Guestbook refresh failed: {}", error);
        self.state.write().await.last_error = Some(error.to_string());
    }

    async fn apply(&self, outcome: ScanOutcome) -> FeedUpdate {
        let mut state = self.state.write().await;
        let initial_load = !state.initialized;

        let mut new_entries = Vec::new();
        for entry in outcome.entries {
            let hash = entry.transaction_hash;
            if state.known_hashes.insert(hash) {
                if !initial_load {
                    new_entries.push(entry.clone());
                }
                state.entries.insert(hash, entry);
            }
        }
        new_entries.sort_by(newest_first);

        for sponsorship in outcome.sponsorships {
            merge_sponsorship(&mut state.sponsorships, sponsorship);
        }

        if let Some(scanned_to) = outcome.scanned_to {
            state.scanned_to = Some(state.scanned_to.map_or(scanned_to, |s| s.max(scanned_to)));
        }

        let newest_hash = state.newest().map(|e| e.transaction_hash);
        if newest_hash != state.latest_hash {
            if !initial_load {
                state.latest_changed_at = Some(Instant::now());
            }
            state.latest_hash = newest_hash;
        }

        if outcome.error.is_none() {
            if initial_load {
                info!("Initialized guestbook feed with {} known transactions", state.known_hashes.len());
            }
            state.initialized = true;
            state.last_refreshed = Some(Instant::now());
            state.last_refreshed_at = Some(Utc::now());
            state.last_error = None;
        }

        for entry in &new_entries {
            info!(
                "New guestbook entry #{} from {} in tx {}",
                entry.guest_id, entry.guest, entry.transaction_hash
            );
            // Err only means nobody is subscribed
            let _ = self.new_entries.send(entry.clone());
        }

        FeedUpdate {
            new_entries,
            total_entries: state.entries.len(),
            initial_load: initial_load && outcome.error.is_none(),
            scanned_to: state.scanned_to,
        }
    }

    /// All entries, newest first, ignoring sponsorship.
    pub async fn entries(&self) -> Vec<GuestbookEntry> {
        self.state.read().await.sorted_entries()
    }

    pub async fn latest_entry(&self) -> Option<GuestbookEntry> {
        self.state.read().await.newest().cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn is_paused(&self) -> Option<bool> {
        self.state.read().await.paused
    }

    /// When the newest entry last changed, excluding the initial load.
    pub async fn latest_changed_at(&self) -> Option<Instant> {
        self.state.read().await.latest_changed_at
    }

    pub async fn find_by_guest_id(&self, guest_id: U256) -> Option<GuestbookEntry> {
        self.state
            .read()
            .await
            .entries
            .values()
            .find(|e| e.guest_id == guest_id)
            .cloned()
    }

    /// Listing order: the most recently sponsored entry on top, then the
    /// rest newest first.
    pub async fn view(&self) -> FeedView {
        let state = self.state.read().await;
        let mut entries = state.sorted_entries();

        let listed: HashSet<U256> = entries.iter().map(|e| e.guest_id).collect();
        let pinned = latest_sponsorship(state.sponsorships.values().filter(|s| listed.contains(&s.guest_id)))
            .and_then(|sponsorship| {
                let position = entries.iter().position(|e| e.guest_id == sponsorship.guest_id)?;
                Some(PinnedEntry {
                    entry: entries.remove(position),
                    sponsorship: sponsorship.clone(),
                })
            });

        FeedView { pinned, entries }
    }

    /// Price a new sponsored message must pay at `now` (unix seconds).
    pub async fn required_bid(&self, now: u64) -> U256 {
        let state = self.state.read().await;
        required_bid(state.min_sponsor_price, latest_sponsorship(state.sponsorships.values()), now)
    }

    pub async fn status(&self) -> FeedStatus {
        let state = self.state.read().await;
        FeedStatus {
            initialized: state.initialized,
            total_entries: state.entries.len(),
            scanned_to: state.scanned_to,
            paused: state.paused,
            guest_count: state.guest_count,
            min_sponsor_price: state.min_sponsor_price,
            last_refreshed_at: state.last_refreshed_at,
            last_error: state.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SPONSOR_PRICE_STEP_WEI;
    use crate::models::entries::fixtures::{entry, sponsorship};
    use crate::services::source::stub::MemorySource;

    const START: u64 = 1000;

    #[tokio::test]
    async fn test_initial_load_reports_nothing_new() {
        let source = MemorySource::with_latest(1100);
        source.push_entry(entry(1, 100));
        source.push_entry(entry(2, 200));
        let feed = GuestbookFeed::new(START);

        let update = feed.refresh(&source).await.unwrap();
        assert!(update.initial_load);
        assert!(update.new_entries.is_empty());
        assert_eq!(update.total_entries, 2);

        let entries = feed.entries().await;
        assert_eq!(entries[0].guest_id, U256::from(2));
        assert_eq!(feed.latest_entry().await.unwrap().guest_id, U256::from(2));
        assert!(feed.latest_changed_at().await.is_none());
    }

    #[tokio::test]
    async fn test_new_entries_detected_by_hash() {
        let source = MemorySource::with_latest(1100);
        source.push_entry(entry(1, 100));
        let feed = GuestbookFeed::new(START);
        let mut rx = feed.subscribe();
        feed.refresh(&source).await.unwrap();

        let mut fresh = entry(3, 300);
        fresh.block_number = 1105;
        source.push_entry(fresh);
        let update = feed.refresh(&source).await.unwrap();
        assert!(!update.initial_load);
        assert_eq!(update.new_entries.len(), 1);
        assert_eq!(update.new_entries[0].guest_id, U256::from(3));
        assert_eq!(rx.recv().await.unwrap().guest_id, U256::from(3));
        assert!(feed.latest_changed_at().await.is_some());

        // Nothing changed on chain: nothing new, no duplicates from the rescanned block
        let update = feed.refresh(&source).await.unwrap();
        assert!(update.new_entries.is_empty());
        assert_eq!(feed.len().await, 2);
    }

    #[tokio::test]
    async fn test_rescans_from_last_scanned_block() {
        let source = MemorySource::with_latest(1100);
        let feed = GuestbookFeed::new(START);
        feed.refresh(&source).await.unwrap();
        *source.latest.lock().unwrap() = 1200;
        feed.refresh(&source).await.unwrap();

        let calls = source.signed_calls.lock().unwrap().clone();
        assert_eq!(calls, vec![(1000, 1100), (1100, 1200)]);
    }

    #[tokio::test]
    async fn test_error_keeps_previous_entries() {
        let source = MemorySource::with_latest(1100);
        source.push_entry(entry(1, 100));
        let feed = GuestbookFeed::new(START);
        feed.refresh(&source).await.unwrap();

        source.fail_next(FetchError::Rpc("upstream down".into()));
        let err = feed.refresh(&source).await.unwrap_err();
        assert_eq!(err, FetchError::Rpc("upstream down".into()));
        assert_eq!(feed.len().await, 1);
        assert!(feed.status().await.last_error.unwrap().contains("upstream down"));

        feed.refresh(&source).await.unwrap();
        assert!(feed.status().await.last_error.is_none());
    }

    #[tokio::test]
    async fn test_failed_first_load_stays_uninitialized() {
        let source = MemorySource::with_latest(1100);
        source.push_entry(entry(1, 100));
        source.fail_next(FetchError::Rpc("boom".into()));
        let feed = GuestbookFeed::new(START);
        assert!(feed.refresh(&source).await.is_err());
        assert!(!feed.status().await.initialized);

        let update = feed.refresh(&source).await.unwrap();
        assert!(update.initial_load);
        assert!(update.new_entries.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_if_stale() {
        let source = MemorySource::with_latest(1100);
        let feed = GuestbookFeed::new(START);
        assert!(feed.refresh_if_stale(&source).await.unwrap().is_some());
        assert!(feed.refresh_if_stale(&source).await.unwrap().is_none());
        tokio::time::advance(Duration::from_secs(STALE_TIME_SECS + 1)).await;
        assert!(feed.refresh_if_stale(&source).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_view_pins_sponsored_entry() {
        let source = MemorySource::with_latest(1100);
        source.push_entry(entry(1, 100));
        source.push_entry(entry(2, 200));
        source.push_entry(entry(3, 300));
        let mut sponsored = sponsorship(1, 5_000, 400);
        sponsored.block_number = 1050;
        source.push_sponsorship(sponsored);
        // Sponsorship of an entry the feed does not know is ignored
        let mut unknown = sponsorship(99, 1_000_000, 450);
        unknown.block_number = 1060;
        source.push_sponsorship(unknown);
        let feed = GuestbookFeed::new(START);
        feed.refresh(&source).await.unwrap();

        let view = feed.view().await;
        let pinned = view.pinned.unwrap();
        assert_eq!(pinned.entry.guest_id, U256::from(1));
        assert_eq!(pinned.sponsorship.amount, U256::from(5_000));
        let rest: Vec<u64> = view.entries.iter().map(|e| e.guest_id.to::<u64>()).collect();
        assert_eq!(rest, vec![3, 2]);
        assert!(feed.find_by_guest_id(U256::from(2)).await.is_some());
    }

    #[tokio::test]
    async fn test_newer_sponsorship_takes_the_pin() {
        let source = MemorySource::with_latest(1100);
        source.push_entry(entry(1, 100));
        source.push_entry(entry(2, 200));
        let mut big = sponsorship(1, 5_000, 400);
        big.block_number = 1050;
        source.push_sponsorship(big);
        let feed = GuestbookFeed::new(START);
        feed.refresh(&source).await.unwrap();
        assert_eq!(feed.view().await.pinned.unwrap().entry.guest_id, U256::from(1));

        // A smaller but more recent sponsorship replaces it
        let mut small = sponsorship(2, 100, 500);
        small.block_number = 1150;
        source.push_sponsorship(small);
        feed.refresh(&source).await.unwrap();
        let view = feed.view().await;
        assert_eq!(view.pinned.unwrap().entry.guest_id, U256::from(2));
        assert_eq!(view.entries[0].guest_id, U256::from(1));
    }

    #[tokio::test]
    async fn test_required_bid_uses_contract_quote_then_local_schedule() {
        let source = MemorySource::with_latest(1100);
        source.push_entry(entry(1, 100));
        let mut last = sponsorship(1, 1_000, 400);
        last.block_number = 1050;
        source.push_sponsorship(last);
        let feed = GuestbookFeed::new(START);

        // getCurrentMinPrice() unavailable: last price plus one step
        feed.refresh(&source).await.unwrap();
        assert_eq!(
            feed.required_bid(400).await,
            U256::from(1_000 + SPONSOR_PRICE_STEP_WEI)
        );

        *source.min_price.lock().unwrap() = Some(U256::from(42));
        feed.refresh(&source).await.unwrap();
        assert_eq!(feed.required_bid(400).await, U256::from(42));
        assert_eq!(feed.status().await.min_sponsor_price, Some(U256::from(42)));
    }

    #[tokio::test]
    async fn test_has_unseen_logs() {
        let source = MemorySource::with_latest(1100);
        source.push_entry(entry(1, 100));
        let feed = GuestbookFeed::new(START);
        feed.refresh(&source).await.unwrap();
        assert!(!feed.has_unseen_logs(&source).await.unwrap());

        let mut late = entry(5, 500);
        late.block_number = 1150;
        source.push_entry(late);
        assert!(feed.has_unseen_logs(&source).await.unwrap());
    }

    #[tokio::test]
    async fn test_far_behind_leaves_catch_up_to_refresh() {
        let source = MemorySource::with_latest(1100);
        let feed = GuestbookFeed::new(START);
        assert!(feed.has_unseen_logs(&source).await.unwrap());

        feed.refresh(&source).await.unwrap();
        let calls_after_refresh = source.signed_calls.lock().unwrap().len();
        *source.latest.lock().unwrap() = 1100 + MAX_CHUNK_SIZE + 1;

        assert!(feed.has_unseen_logs(&source).await.unwrap());
        // No log query for the gap itself
        assert_eq!(source.signed_calls.lock().unwrap().len(), calls_after_refresh);
    }

    #[tokio::test]
    async fn test_status_reads_contract() {
        let source = MemorySource::with_latest(1100);
        source.push_entry(entry(1, 100));
        *source.paused.lock().unwrap() = true;
        let feed = GuestbookFeed::new(START);
        feed.refresh(&source).await.unwrap();

        let status = feed.status().await;
        assert!(status.initialized);
        assert_eq!(status.paused, Some(true));
        assert_eq!(status.guest_count, Some(U256::from(1)));
        assert_eq!(status.scanned_to, Some(1100));
        assert!(status.last_refreshed_at.is_some());
    }
}
