use alloy::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::{
    chains::ChainProfile,
    constants::{MARQUEE_HIGHLIGHT_SECS, MARQUEE_MESSAGE_CHARS},
    models::GuestbookEntry,
};

/// `0x1234...abcd`
pub fn short_address(address: &Address) -> String {
    let full = address.to_checksum(None);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

pub fn block_url(chain: &ChainProfile, block_number: u64) -> String {
    format!("{}/block/{}", chain.explorer_url, block_number)
}

pub fn tx_url(chain: &ChainProfile, tx_hash: &B256) -> String {
    format!("{}/tx/{}", chain.explorer_url, tx_hash)
}

pub fn address_url(chain: &ChainProfile, address: &Address) -> String {
    format!("{}/address/{}", chain.explorer_url, address)
}

/// Marketplace link for a minted entry; None when not minted or not listed.
pub fn opensea_url(chain: &ChainProfile, contract: &Address, entry: &GuestbookEntry) -> Option<String> {
    if !entry.is_minted() {
        return None;
    }
    chain
        .opensea_assets_url
        .map(|root| format!("{}/{}/{}", root, contract, entry.token_id))
}

pub fn format_timestamp(timestamp: u64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// First `max_chars` characters, with "..." when cut.
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    if message.chars().count() > max_chars {
        let head: String = message.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        message.to_string()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryLinks {
    pub block: String,
    pub transaction: String,
    pub guest: String,
    pub opensea: Option<String>,
}

/// An entry as served to clients.
#[derive(Debug, Clone, Serialize)]
pub struct EntryView {
    pub guest_id: String,
    pub guest: Address,
    pub guest_name: String,
    pub message: String,
    pub timestamp: u64,
    pub time: String,
    pub token_id: String,
    pub minted: bool,
    pub block_number: u64,
    pub transaction_hash: B256,
    pub links: EntryLinks,
}

impl EntryView {
    pub fn new(entry: &GuestbookEntry, chain: &ChainProfile, contract: &Address, ens_name: Option<String>) -> Self {
        Self {
            guest_id: entry.guest_id.to_string(),
            guest: entry.guest,
            guest_name: ens_name.unwrap_or_else(|| short_address(&entry.guest)),
            message: entry.display_message().to_string(),
            timestamp: entry.timestamp,
            time: format_timestamp(entry.timestamp),
            token_id: entry.token_id.to_string(),
            minted: entry.is_minted(),
            block_number: entry.block_number,
            transaction_hash: entry.transaction_hash,
            links: EntryLinks {
                block: block_url(chain, entry.block_number),
                transaction: tx_url(chain, &entry.transaction_hash),
                guest: address_url(chain, &entry.guest),
                opensea: opensea_url(chain, contract, entry),
            },
        }
    }
}

/// Whether the marquee should still flag the newest message as new.
pub fn is_highlighted(latest_changed_at: Option<Instant>, now: Instant) -> bool {
    latest_changed_at
        .is_some_and(|changed| now.saturating_duration_since(changed) < Duration::from_secs(MARQUEE_HIGHLIGHT_SECS))
}

/// Ticker line shown above and below the guestbook.
pub fn marquee_text(total_signers: usize, latest: Option<(&GuestbookEntry, &str)>, highlighted: bool) -> String {
    let (message, name, time) = match latest {
        Some((entry, name)) => (
            truncate_message(entry.display_message(), MARQUEE_MESSAGE_CHARS),
            name.to_string(),
            format_timestamp(entry.timestamp),
        ),
        None => ("No messages yet".to_string(), "Anonymous".to_string(), "Never".to_string()),
    };
    let new_flag = if highlighted { "NEW MESSAGE! " } else { "" };

    format!(
        "★ BUILT ON BASE WITH ONCHAIN TECHNOLOGY ★ {} VISITORS HAVE SIGNED ★ COLLECT YOUR MESSAGE ONCHAIN ★ POWERED BY ETHEREUM ★ {}LAST MESSAGE POSTED: \"{}\" BY {} AT {} ★",
        total_signers, new_flag, message, name, time
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::{BASE_SEPOLIA, ZORA_GOERLI};
    use crate::models::entries::fixtures::entry;
    use alloy::primitives::U256;

    #[test]
    fn test_short_address() {
        let address: Address = "0x7327468bf87Bed17Ffb2946d460810051eF43C35".parse().unwrap();
        let short = short_address(&address);
        assert!(short.starts_with("0x7327"));
        assert!(short.ends_with("3C35"));
        assert_eq!(short.len(), 13);
    }

    #[test]
    fn test_links() {
        let e = entry(1, 1_700_000_000);
        let contract = Address::with_last_byte(0xcc);
        assert_eq!(block_url(&BASE_SEPOLIA, 22_080_000), "https://sepolia.basescan.org/block/22080000");
        assert!(tx_url(&BASE_SEPOLIA, &e.transaction_hash).starts_with("https://sepolia.basescan.org/tx/0x"));
        assert!(opensea_url(&BASE_SEPOLIA, &contract, &e).is_none());

        let mut minted = e.clone();
        minted.token_id = U256::from(12);
        let url = opensea_url(&BASE_SEPOLIA, &contract, &minted).unwrap();
        assert!(url.starts_with("https://testnets.opensea.io/assets/base_sepolia/0x"));
        assert!(url.ends_with("/12"));
        assert!(opensea_url(&ZORA_GOERLI, &contract, &minted).is_none());
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_timestamp(1_700_000_000), "2023-11-14 22:13:20 UTC");
    }

    #[test]
    fn test_truncate_message() {
        assert_eq!(truncate_message("gm", 20), "gm");
        assert_eq!(truncate_message(&"a".repeat(25), 20), format!("{}...", "a".repeat(20)));
    }

    #[test]
    fn test_marquee_text() {
        let e = entry(1, 0);
        let text = marquee_text(12, Some((&e, "alice.eth")), true);
        assert!(text.contains("12 VISITORS HAVE SIGNED"));
        assert!(text.contains("NEW MESSAGE! LAST MESSAGE POSTED: \"message 1\" BY alice.eth AT 1970-01-01 00:00:00 UTC"));

        let empty = marquee_text(0, None, false);
        assert!(empty.contains("\"No messages yet\" BY Anonymous AT Never"));
        assert!(!empty.contains("NEW MESSAGE!"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_highlight_window() {
        let changed = Instant::now();
        assert!(is_highlighted(Some(changed), Instant::now()));
        tokio::time::advance(Duration::from_secs(MARQUEE_HIGHLIGHT_SECS)).await;
        assert!(!is_highlighted(Some(changed), Instant::now()));
        assert!(!is_highlighted(None, Instant::now()));
    }

    #[test]
    fn test_entry_view() {
        let e = entry(3, 1_700_000_000);
        let view = EntryView::new(&e, &BASE_SEPOLIA, &Address::ZERO, None);
        assert_eq!(view.guest_id, "3");
        assert_eq!(view.guest_name, short_address(&e.guest));
        assert!(!view.minted);
        assert!(view.links.guest.contains("/address/"));
    }
}
