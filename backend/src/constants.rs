// =============================================================================
// Guestbook Backend Constants
// =============================================================================
// This file contains all constants used throughout the backend to enable
// easy tuning and configuration from a single location.

// =============================================================================
// CONTRACT ADDRESSES
// =============================================================================

/// Guestbook contract address on Base Sepolia
pub const GUESTBOOK_CONTRACT_ADDRESS: &str = "0x7327468bf87Bed17Ffb2946d460810051eF43C35";

/// Project donation address (mainnet)
pub const DONATION_ADDRESS: &str = "0x429f42fB5247e3a34D88D978b7491d4b2BEe6105";

/// ENS registry, same address on every network that runs ENS
pub const ENS_REGISTRY_ADDRESS: &str = "0x00000000000C2E074eC69A0dFb2997BA6C7d2e1e";

// =============================================================================
// BLOCKCHAIN CONFIGURATION
// =============================================================================

/// First block of the Base Sepolia deployment
pub const GUESTBOOK_START_BLOCK: u64 = 22079841;

/// Chain profile used when GUESTBOOK_CHAIN is unset
pub const DEFAULT_CHAIN: &str = "base-sepolia";

/// Public mainnet RPC used for ENS and donations
pub const DEFAULT_MAINNET_RPC_URL: &str = "https://eth.llamarpc.com";

// =============================================================================
// FEES (wei)
// =============================================================================

/// Listed fee for a custom message (0.00111 ETH). Shown to users, not sent with the call
pub const MESSAGE_FEE_WEI: u128 = 1_110_000_000_000_000;

/// Contract fee for minting the message onchain (0.00111 ETH)
pub const MINT_FEE_WEI: u128 = 1_110_000_000_000_000;

/// Donation amount (0.05 ETH)
pub const DONATION_AMOUNT_WEI: u128 = 50_000_000_000_000_000;

// =============================================================================
// MESSAGE RULES
// =============================================================================

/// Maximum message length in characters
pub const MAX_MESSAGE_LENGTH: usize = 140;

/// Message sent through the free `signGuestbookGm` path
pub const GM_MESSAGE: &str = "gm";

// =============================================================================
// FETCH / RETRY
// =============================================================================

/// Retries after a rate-limited RPC call
pub const MAX_RETRIES: u32 = 3;

/// Delay before the first retry, doubled per attempt
pub const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Refreshes younger than this are served from the cache
pub const STALE_TIME_SECS: u64 = 5;

/// Full refresh interval
pub const REFETCH_INTERVAL_SECS: u64 = 10;

/// Interval for the fast poll that looks for new GuestbookSigned logs
pub const WATCH_POLL_INTERVAL_SECS: u64 = 2;

/// Initial chunk size for log scanning
pub const INITIAL_CHUNK_SIZE: u64 = 2000;

/// Minimum chunk size for log scanning
pub const MIN_CHUNK_SIZE: u64 = 500;

/// Maximum chunk size for log scanning
pub const MAX_CHUNK_SIZE: u64 = 10000;

/// Capacity of the new-entry broadcast channel
pub const NEW_ENTRY_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// SPONSORSHIP
// =============================================================================

/// Starting sponsorship price, and the floor it decays back to (0.0001 ETH)
pub const SPONSOR_BASE_PRICE_WEI: u128 = 100_000_000_000_000;

/// Each sponsorship must pay at least the last price plus this (0.0001 ETH)
pub const SPONSOR_PRICE_STEP_WEI: u128 = 100_000_000_000_000;

/// The price holds this long after the last sponsorship (21 days)
pub const SPONSOR_PRICE_HOLD_SECS: u64 = 21 * 24 * 60 * 60;

/// After the hold, the price falls linearly to the floor over this long (21 days)
pub const SPONSOR_PRICE_DECAY_SECS: u64 = 21 * 24 * 60 * 60;

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// Attempts for sending a transaction (nonce conflicts, estimation failures)
pub const TX_MAX_ATTEMPTS: u32 = 3;

/// Attempts for reading the account nonce
pub const NONCE_RETRY_ATTEMPTS: u32 = 3;

/// Seconds to wait for gas estimation
pub const GAS_ESTIMATE_TIMEOUT_SECS: u64 = 15;

/// Seconds to wait for a receipt
pub const RECEIPT_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// DISPLAY
// =============================================================================

/// Characters of the newest message shown in the marquee
pub const MARQUEE_MESSAGE_CHARS: usize = 20;

/// How long the marquee highlights a new message
pub const MARQUEE_HIGHLIGHT_SECS: u64 = 15;

// =============================================================================
// RATE LIMITING
// =============================================================================

/// Maximum proxied RPC requests per minute per client
pub const RPC_PROXY_RATE_LIMIT_PER_MINUTE: u32 = 300;

/// Rate limit window duration in seconds
pub const RATE_LIMIT_WINDOW_SECONDS: u64 = 60;

// =============================================================================
// SERVER CONFIGURATION
// =============================================================================

/// Default server port if not specified in environment
pub const DEFAULT_SERVER_PORT: u16 = 3000;
