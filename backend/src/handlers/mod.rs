pub mod guestbook;
pub mod rpc;

use std::sync::Arc;
use crate::{
    Config,
    services::{GuestbookFeed, GuestbookSource, ens::NameResolver},
};

pub use guestbook::{feed_status, latest_entry, list_entries, marquee, quote, refresh_entries};
pub use rpc::proxy_rpc;

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub feed: Arc<GuestbookFeed>,
    pub source: Arc<dyn GuestbookSource>,
    pub names: Option<Arc<dyn NameResolver>>,
}

impl AppState {
    /// Cached ENS name for `address`, if a resolver is configured.
    pub async fn cached_name(&self, address: alloy::primitives::Address) -> Option<String> {
        match &self.names {
            Some(names) => names.cached(address).await,
            None => None,
        }
    }
}
