use alloy::transports::{RpcError, TransportError, TransportErrorKind};
use thiserror::Error;

/// Failure of a single read against the chain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("RPC provider is rate limiting requests: {0}")]
    RateLimited(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Failed to decode log: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited(_))
    }
}

/// JSON-RPC error code some providers use for "limit exceeded".
const LIMIT_EXCEEDED_CODE: i64 = -32005;

impl From<TransportError> for FetchError {
    fn from(err: TransportError) -> Self {
        let text = err.to_string();
        let rate_limited = match &err {
            RpcError::Transport(TransportErrorKind::HttpError(http)) => http.status == 429,
            RpcError::ErrorResp(payload) => payload.code == 429 || payload.code == LIMIT_EXCEEDED_CODE,
            _ => false,
        };

        if rate_limited || mentions_rate_limit(&text) {
            FetchError::RateLimited(text)
        } else {
            FetchError::Rpc(text)
        }
    }
}

fn mentions_rate_limit(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("rate limit") || lower.contains("too many requests")
}

/// Reasons a sign/sponsor request is refused before or during submission.
#[derive(Error, Debug)]
pub enum SignError {
    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("Message exceeds {max} characters ({actual})")]
    MessageTooLong { max: usize, actual: usize },

    #[error("The guestbook is currently paused")]
    Paused,

    #[error("Bid of {offered} wei is below the required {required} wei")]
    BidTooLow { offered: String, required: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Maps a raw wallet, RPC or contract error to text suitable for an end user.
pub fn friendly_error_message(raw: &str) -> &'static str {
    if raw.contains("insufficient funds") {
        return "You don't have enough ETH for this transaction";
    }
    if raw.contains("user rejected transaction") {
        return "Transaction was cancelled";
    }
    if raw.contains("user rejected request") {
        return "Network switch was cancelled";
    }
    if raw.contains("InsufficientFee") {
        return "Insufficient fee provided for this operation";
    }
    if raw.contains("EmptyMessage") || raw.contains("Message cannot be empty") {
        return "Message cannot be empty";
    }
    if raw.contains("MessageTooLong") || raw.contains("Message exceeds") {
        return "Message exceeds 140 characters";
    }
    if raw.contains("ContractPaused") || raw.contains("currently paused") {
        return "The guestbook is currently paused";
    }
    "Failed to sign guestbook. Please try again."
}
