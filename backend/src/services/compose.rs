use alloy::primitives::U256;
use serde::Serialize;
use crate::{
    constants::{GM_MESSAGE, MAX_MESSAGE_LENGTH, MESSAGE_FEE_WEI, MINT_FEE_WEI},
    error::SignError,
    utils::sanitize::normalize_message,
};

/// Which contract entry point a message goes through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum MessageKind {
    /// `signGuestbookGm`, no message fee.
    Gm,
    /// `signGuestbookCustom` with the sanitized text.
    Custom(String),
}

/// Contract fees for one signature, in wei. Gas is paid on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeQuote {
    pub message_fee: U256,
    pub mint_fee: U256,
    /// Listed total, as shown in the fee breakdown.
    pub total: U256,
    /// Value actually attached to the transaction: the mint fee only.
    pub value: U256,
}

/// A validated message ready to be submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageDraft {
    pub kind: MessageKind,
    pub mint_nft: bool,
}

impl MessageDraft {
    pub fn compose(text: &str, mint_nft: bool) -> Result<Self, SignError> {
        let normalized = normalize_message(text);
        if normalized.eq_ignore_ascii_case(GM_MESSAGE) {
            return Ok(Self { kind: MessageKind::Gm, mint_nft });
        }
        if normalized.is_empty() {
            return Err(SignError::EmptyMessage);
        }
        let length = normalized.chars().count();
        if length > MAX_MESSAGE_LENGTH {
            return Err(SignError::MessageTooLong {
                max: MAX_MESSAGE_LENGTH,
                actual: length,
            });
        }
        Ok(Self {
            kind: MessageKind::Custom(normalized),
            mint_nft,
        })
    }

    pub fn quote(&self) -> FeeQuote {
        let message_fee = match self.kind {
            MessageKind::Gm => U256::ZERO,
            MessageKind::Custom(_) => U256::from(MESSAGE_FEE_WEI),
        };
        let mint_fee = if self.mint_nft { U256::from(MINT_FEE_WEI) } else { U256::ZERO };
        FeeQuote {
            message_fee,
            mint_fee,
            total: message_fee + mint_fee,
            value: mint_fee,
        }
    }

    /// The text that will appear in the guestbook.
    pub fn text(&self) -> &str {
        match &self.kind {
            MessageKind::Gm => GM_MESSAGE,
            MessageKind::Custom(text) => text,
        }
    }
}
