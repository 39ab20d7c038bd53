use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One `GuestbookSigned` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestbookEntry {
    pub guest_id: U256,
    pub guest: Address,
    pub message: String,
    /// Unix seconds, as emitted by the contract.
    pub timestamp: u64,
    /// Zero when the message was not minted.
    pub token_id: U256,
    pub block_number: u64,
    pub transaction_hash: B256,
}

impl GuestbookEntry {
    pub fn is_minted(&self) -> bool {
        !self.token_id.is_zero()
    }

    /// The stored message, or "gm" for entries signed through the gm path.
    pub fn display_message(&self) -> &str {
        if self.message.is_empty() { "gm" } else { &self.message }
    }
}

/// Newest first: timestamp, then block, then transaction hash.
pub fn newest_first(a: &GuestbookEntry, b: &GuestbookEntry) -> Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then_with(|| b.block_number.cmp(&a.block_number))
        .then_with(|| b.transaction_hash.cmp(&a.transaction_hash))
}

/// One `MessageSponsored` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sponsorship {
    pub guest_id: U256,
    pub sponsor: Address,
    /// Wei paid.
    pub amount: U256,
    pub timestamp: u64,
    pub block_number: u64,
    pub transaction_hash: B256,
}
