//! Sponsored (pinned) messages. The most recent sponsorship stays pinned
//! until another message is sponsored; it never expires.
//!
//! Pricing: each sponsorship must pay at least the last price plus
//! [`SPONSOR_PRICE_STEP_WEI`]. After [`SPONSOR_PRICE_HOLD_SECS`] without a
//! sponsorship the price falls linearly back to [`SPONSOR_BASE_PRICE_WEI`].

use alloy::primitives::U256;
use std::collections::HashMap;
use crate::{
    constants::{SPONSOR_BASE_PRICE_WEI, SPONSOR_PRICE_DECAY_SECS, SPONSOR_PRICE_HOLD_SECS, SPONSOR_PRICE_STEP_WEI},
    models::Sponsorship,
};

/// Records `sponsorship`, keeping only the newest one per guest id.
/// Rescanned duplicates are absorbed.
pub fn merge_sponsorship(by_guest: &mut HashMap<U256, Sponsorship>, sponsorship: Sponsorship) {
    match by_guest.get(&sponsorship.guest_id) {
        Some(existing)
            if (existing.timestamp, existing.block_number) >= (sponsorship.timestamp, sponsorship.block_number) => {}
        _ => {
            by_guest.insert(sponsorship.guest_id, sponsorship);
        }
    }
}

/// The most recent sponsorship by (timestamp, block, tx hash).
pub fn latest_sponsorship<'a, I>(sponsorships: I) -> Option<&'a Sponsorship>
where
    I: IntoIterator<Item = &'a Sponsorship>,
{
    sponsorships
        .into_iter()
        .max_by_key(|s| (s.timestamp, s.block_number, s.transaction_hash))
}

/// Minimum price to sponsor at `now` (unix seconds), given the last
/// sponsorship seen on chain.
pub fn current_min_price(last: Option<&Sponsorship>, now: u64) -> U256 {
    let base = U256::from(SPONSOR_BASE_PRICE_WEI);
    let Some(last) = last else {
        return base;
    };

    let target = last.amount.saturating_add(U256::from(SPONSOR_PRICE_STEP_WEI)).max(base);
    let idle = now.saturating_sub(last.timestamp);
    if idle <= SPONSOR_PRICE_HOLD_SECS {
        return target;
    }

    let decaying = idle - SPONSOR_PRICE_HOLD_SECS;
    if decaying >= SPONSOR_PRICE_DECAY_SECS {
        return base;
    }
    let span = target - base;
    target - span.saturating_mul(U256::from(decaying)) / U256::from(SPONSOR_PRICE_DECAY_SECS)
}

/// Price a new sponsorship must pay. The contract's own quote wins when it
/// could be read.
pub fn required_bid(contract_min: Option<U256>, last: Option<&Sponsorship>, now: u64) -> U256 {
    contract_min.unwrap_or_else(|| current_min_price(last, now))
}
