use tracing::{error, info};
use crate::{
    constants::{INITIAL_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE},
    error::FetchError,
    models::{GuestbookEntry, Sponsorship},
    services::{
        retry::{RetryPolicy, fetch_with_retry},
        source::GuestbookSource,
    },
};

/// Result of one scan over a block range.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub entries: Vec<GuestbookEntry>,
    pub sponsorships: Vec<Sponsorship>,
    /// Last block of the last chunk that fully succeeded.
    pub scanned_to: Option<u64>,
    /// The error that ended the scan early, if any.
    pub error: Option<FetchError>,
}

/// Walks a block range in chunks, growing the chunk after each success and
/// shrinking it after a failure.
#[derive(Debug, Clone)]
pub struct LogScanner {
    chunk_size: u64,
    policy: RetryPolicy,
}

impl Default for LogScanner {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl LogScanner {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            chunk_size: INITIAL_CHUNK_SIZE,
            policy,
        }
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn scan<S>(&mut self, source: &S, from_block: u64, to_block: u64) -> ScanOutcome
    where
        S: GuestbookSource + ?Sized,
    {
        let mut outcome = ScanOutcome::default();
        let mut from = from_block;

        while from <= to_block {
            let chunk_end = to_block.min(from.saturating_add(self.chunk_size - 1));

            match self.scan_chunk(source, from, chunk_end).await {
                Ok((entries, sponsorships)) => {
                    if !entries.is_empty() || !sponsorships.is_empty() {
                        info!(
                            "Found {} entries and {} sponsorships in blocks {} to {}",
                            entries.len(),
                            sponsorships.len(),
                            from,
                            chunk_end
                        );
                    }
                    outcome.entries.extend(entries);
                    outcome.sponsorships.extend(sponsorships);
                    outcome.scanned_to = Some(chunk_end);

                    if self.chunk_size < MAX_CHUNK_SIZE {
                        self.chunk_size = (self.chunk_size * 2).min(MAX_CHUNK_SIZE);
                    }
                    from = chunk_end + 1;
                }
                Err(e) => {
                    error!("Error scanning blocks {} to {}: {}", from, chunk_end, e);
                    if self.chunk_size > MIN_CHUNK_SIZE {
                        self.chunk_size = (self.chunk_size / 2).max(MIN_CHUNK_SIZE);
                        info!("Decreased chunk size to {}", self.chunk_size);
                    }
                    outcome.error = Some(e);
                    break;
                }
            }
        }

        outcome
    }

    async fn scan_chunk<S>(
        &self,
        source: &S,
        from: u64,
        to: u64,
    ) -> Result<(Vec<GuestbookEntry>, Vec<Sponsorship>), FetchError>
    where
        S: GuestbookSource + ?Sized,
    {
        let entries = fetch_with_retry(&self.policy, "GuestbookSigned logs", || source.fetch_signed(from, to)).await?;
        let sponsorships =
            fetch_with_retry(&self.policy, "MessageSponsored logs", || source.fetch_sponsored(from, to)).await?;
        Ok((entries, sponsorships))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entries::fixtures::entry;
    use crate::services::source::stub::MemorySource;

    #[tokio::test]
    async fn test_scans_range_in_growing_chunks() {
        let source = MemorySource::with_latest(10_000);
        source.push_entry(entry(1, 100));
        let mut scanner = LogScanner::default();

        let outcome = scanner.scan(&source, 1, 10_000).await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.scanned_to, Some(10_000));
        assert_eq!(outcome.entries.len(), 1);

        let calls = source.signed_calls.lock().unwrap().clone();
        assert_eq!(calls, vec![(1, 2000), (2001, 6000), (6001, 10_000)]);
        assert_eq!(scanner.chunk_size(), MAX_CHUNK_SIZE);
    }

    #[tokio::test]
    async fn test_failure_stops_scan_and_shrinks_chunk() {
        let source = MemorySource::with_latest(10_000);
        source.push_entry(entry(1, 100));
        let mut scanner = LogScanner::default();
        // First chunk fails with a non-retryable error
        source.fail_next(FetchError::Rpc("block range too large".into()));

        let outcome = scanner.scan(&source, 1, 10_000).await;
        assert_eq!(outcome.scanned_to, None);
        assert!(outcome.entries.is_empty());
        assert_eq!(outcome.error, Some(FetchError::Rpc("block range too large".into())));
        assert_eq!(scanner.chunk_size(), INITIAL_CHUNK_SIZE / 2);
        assert_eq!(source.signed_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_progress_is_reported() {
        let source = MemorySource::with_latest(5_000);
        source.push_entry(entry(1, 100));
        let mut scanner = LogScanner::default();

        // Let the first chunk through, then fail
        let first = scanner.scan(&source, 1, 2_000).await;
        assert_eq!(first.scanned_to, Some(2_000));
        source.fail_next(FetchError::Rpc("boom".into()));
        let second = scanner.scan(&source, 2_001, 5_000).await;
        assert_eq!(second.scanned_to, None);
        assert!(second.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_chunk_is_retried() {
        let source = MemorySource::with_latest(100);
        source.push_entry(entry(1, 100));
        source.fail_next(FetchError::RateLimited("429".into()));
        source.fail_next(FetchError::RateLimited("429".into()));
        let mut scanner = LogScanner::default();

        let outcome = scanner.scan(&source, 1, 1_100).await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(source.signed_calls.lock().unwrap().len(), 3);
    }
}
