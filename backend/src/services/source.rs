use alloy::{
    primitives::{Address, U256},
    providers::Provider,
    rpc::types::{Filter, Log},
    sol_types::SolEvent,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    error::FetchError,
    models::{GuestbookEntry, Sponsorship},
    services::contract::{IGuestbook, decode_signed_log, decode_sponsored_log},
};

/// Read access to the guestbook contract and its event log.
#[async_trait]
pub trait GuestbookSource: Send + Sync {
    async fn latest_block(&self) -> Result<u64, FetchError>;

    /// `GuestbookSigned` events in `[from_block, to_block]`.
    async fn fetch_signed(&self, from_block: u64, to_block: u64) -> Result<Vec<GuestbookEntry>, FetchError>;

    /// `MessageSponsored` events in `[from_block, to_block]`.
    async fn fetch_sponsored(&self, from_block: u64, to_block: u64) -> Result<Vec<Sponsorship>, FetchError>;

    async fn is_paused(&self) -> Result<bool, FetchError>;

    async fn guest_count(&self) -> Result<U256, FetchError>;

    /// `getCurrentMinPrice()`: what a sponsored message must pay right now.
    async fn current_min_price(&self) -> Result<U256, FetchError>;
}

fn contract_error(err: alloy::contract::Error) -> FetchError {
    match err {
        alloy::contract::Error::TransportError(e) => FetchError::from(e),
        other => FetchError::Rpc(other.to_string()),
    }
}

/// Decodes every log it can. A malformed log is skipped so it cannot stall
/// the scan cursor.
fn decode_logs<T>(logs: &[Log], event: &str, decode: fn(&Log) -> Result<T, FetchError>) -> Vec<T> {
    logs.iter()
        .filter_map(|log| match decode(log) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(
                    "Skipping undecodable {} log (block {:?}, tx {:?}): {}",
                    event, log.block_number, log.transaction_hash, e
                );
                None
            }
        })
        .collect()
}

/// `GuestbookSource` backed by a JSON-RPC provider.
#[derive(Debug, Clone)]
pub struct RpcGuestbookSource<P> {
    provider: P,
    contract_address: Address,
}

impl<P: Provider + Clone> RpcGuestbookSource<P> {
    pub fn new(provider: P, contract_address: Address) -> Self {
        Self {
            provider,
            contract_address,
        }
    }

    fn filter<E: SolEvent>(&self, from_block: u64, to_block: u64) -> Filter {
        Filter::new()
            .address(self.contract_address)
            .event_signature(E::SIGNATURE_HASH)
            .from_block(from_block)
            .to_block(to_block)
    }
}

#[async_trait]
impl<P> GuestbookSource for RpcGuestbookSource<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    async fn latest_block(&self) -> Result<u64, FetchError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn fetch_signed(&self, from_block: u64, to_block: u64) -> Result<Vec<GuestbookEntry>, FetchError> {
        let filter = self.filter::<IGuestbook::GuestbookSigned>(from_block, to_block);
        let logs = self.provider.get_logs(&filter).await?;
        debug!("Found {} GuestbookSigned logs in blocks {} to {}", logs.len(), from_block, to_block);
        Ok(decode_logs(&logs, "GuestbookSigned", decode_signed_log))
    }

    async fn fetch_sponsored(&self, from_block: u64, to_block: u64) -> Result<Vec<Sponsorship>, FetchError> {
        let filter = self.filter::<IGuestbook::MessageSponsored>(from_block, to_block);
        let logs = self.provider.get_logs(&filter).await?;
        debug!("Found {} MessageSponsored logs in blocks {} to {}", logs.len(), from_block, to_block);
        Ok(decode_logs(&logs, "MessageSponsored", decode_sponsored_log))
    }

    async fn is_paused(&self) -> Result<bool, FetchError> {
        let contract = IGuestbook::new(self.contract_address, self.provider.clone());
        contract.paused().call().await.map_err(contract_error)
    }

    async fn guest_count(&self) -> Result<U256, FetchError> {
        let contract = IGuestbook::new(self.contract_address, self.provider.clone());
        contract.getGuestCount().call().await.map_err(contract_error)
    }

    async fn current_min_price(&self) -> Result<U256, FetchError> {
        let contract = IGuestbook::new(self.contract_address, self.provider.clone());
        contract.getCurrentMinPrice().call().await.map_err(contract_error)
    }
}
