use anyhow::Result;
use alloy::{
    network::TransactionBuilder,
    primitives::{Address, B256, Bytes, U256},
    providers::{Provider, ProviderBuilder},
    rpc::types::{Log, TransactionInput, TransactionRequest},
    signers::local::PrivateKeySigner,
    sol_types::SolCall,
};
use serde::Serialize;
use std::time::Duration;

use crate::{
    constants::*,
    error::{FetchError, SignError},
    models::{GuestbookEntry, Sponsorship},
    services::compose::{MessageDraft, MessageKind},
};

alloy::sol! {
    #[sol(rpc)]
    #[derive(Debug)]
    interface IGuestbook {
        function getGuestCount() external view returns (uint256);
        function paused() external view returns (bool);
        function getCurrentMinPrice() external view returns (uint256);

        function signGuestbookGm(bool mintNFT) external payable returns (uint256 guestId, uint256 tokenId);
        function signGuestbookCustom(string message, bool mintNFT) external payable returns (uint256 guestId, uint256 tokenId);
        function sponsorMessage(string message) external payable;

        event GuestbookSigned(uint256 indexed guestId, address indexed guest, string message, uint256 timestamp, uint256 tokenId);
        event MessageSponsored(uint256 indexed guestId, address indexed sponsor, uint256 amount, uint256 timestamp);

        error InsufficientFee();
        error EmptyMessage();
        error MessageTooLong();
        error ContractPaused();
    }
}

pub fn decode_signed_log(log: &Log) -> Result<GuestbookEntry, FetchError> {
    let decoded = log
        .log_decode::<IGuestbook::GuestbookSigned>()
        .map_err(|e| FetchError::Decode(e.to_string()))?;
    let event = decoded.inner.data;

    Ok(GuestbookEntry {
        guest_id: event.guestId,
        guest: event.guest,
        message: event.message,
        timestamp: event.timestamp.saturating_to::<u64>(),
        token_id: event.tokenId,
        block_number: log
            .block_number
            .ok_or_else(|| FetchError::Decode("Missing block number".to_string()))?,
        transaction_hash: log
            .transaction_hash
            .ok_or_else(|| FetchError::Decode("Missing transaction hash".to_string()))?,
    })
}

pub fn decode_sponsored_log(log: &Log) -> Result<Sponsorship, FetchError> {
    let decoded = log
        .log_decode::<IGuestbook::MessageSponsored>()
        .map_err(|e| FetchError::Decode(e.to_string()))?;
    let event = decoded.inner.data;

    Ok(Sponsorship {
        guest_id: event.guestId,
        sponsor: event.sponsor,
        amount: event.amount,
        timestamp: event.timestamp.saturating_to::<u64>(),
        block_number: log
            .block_number
            .ok_or_else(|| FetchError::Decode("Missing block number".to_string()))?,
        transaction_hash: log
            .transaction_hash
            .ok_or_else(|| FetchError::Decode("Missing transaction hash".to_string()))?,
    })
}

/// ABI-encoded call for a composed message.
pub fn encode_sign_call(draft: &MessageDraft) -> Vec<u8> {
    match &draft.kind {
        MessageKind::Gm => IGuestbook::signGuestbookGmCall { mintNFT: draft.mint_nft }.abi_encode(),
        MessageKind::Custom(message) => IGuestbook::signGuestbookCustomCall {
            message: message.clone(),
            mintNFT: draft.mint_nft,
        }
        .abi_encode(),
    }
}

/// ABI-encoded `sponsorMessage` call. Sponsoring always posts a new message.
pub fn encode_sponsor_call(draft: &MessageDraft) -> Vec<u8> {
    IGuestbook::sponsorMessageCall {
        message: draft.text().to_string(),
    }
    .abi_encode()
}

/// Outcome of a submitted transaction.
#[derive(Debug, Clone, Serialize)]
pub struct SubmittedTx {
    pub transaction_hash: B256,
    /// None when the receipt did not arrive in time.
    pub confirmed: Option<bool>,
    pub block_number: Option<u64>,
    /// Set when the receipt carried a GuestbookSigned log.
    pub entry: Option<GuestbookEntry>,
}

/// Sends guestbook transactions from a local private key.
#[derive(Debug, Clone)]
pub struct GuestbookWriter {
    rpc_url: String,
    contract_address: Address,
    signer: PrivateKeySigner,
}

impl GuestbookWriter {
    pub fn new(rpc_url: String, contract_address: Address, private_key: &str) -> Result<Self> {
        let signer: PrivateKeySigner = private_key
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid PRIVATE_KEY_SIGNER: {}", e))?;
        Ok(Self {
            rpc_url,
            contract_address,
            signer,
        })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Signs the guestbook with a composed message, paying the mint fee when minting.
    pub async fn sign(&self, draft: &MessageDraft, paused: bool) -> Result<SubmittedTx, SignError> {
        if paused {
            return Err(SignError::Paused);
        }
        // The listed message fee is informational; only minting is paid in the call
        let value = draft.quote().value;
        tracing::info!(
            "Signing guestbook as {} ({:?}, mint: {}, value: {} wei)",
            self.address(),
            draft.kind,
            draft.mint_nft,
            value
        );
        let call_data = encode_sign_call(draft);
        let submitted = self
            .send_call(&self.rpc_url, self.contract_address, value, call_data)
            .await?;
        Ok(submitted)
    }

    /// Posts `draft` as the new sponsored message, paying `bid`. `required`
    /// is the current minimum price.
    pub async fn sponsor(
        &self,
        draft: &MessageDraft,
        bid: U256,
        required: U256,
        paused: bool,
    ) -> Result<SubmittedTx, SignError> {
        if paused {
            return Err(SignError::Paused);
        }
        if bid < required {
            return Err(SignError::BidTooLow {
                offered: bid.to_string(),
                required: required.to_string(),
            });
        }
        tracing::info!("Sponsoring message {:?} with {} wei", draft.text(), bid);
        let call_data = encode_sponsor_call(draft);
        let submitted = self
            .send_call(&self.rpc_url, self.contract_address, bid, call_data)
            .await?;
        Ok(submitted)
    }

    /// Sends the fixed donation to the project address on mainnet.
    pub async fn donate(&self, mainnet_rpc_url: &str) -> Result<SubmittedTx> {
        let to: Address = DONATION_ADDRESS.parse()?;
        tracing::info!("Donating {} wei to {} on mainnet", DONATION_AMOUNT_WEI, to);
        self.send_call(mainnet_rpc_url, to, U256::from(DONATION_AMOUNT_WEI), Vec::new())
            .await
    }

    /// Get nonce with retry logic for race conditions
    async fn get_nonce_with_retry<P: Provider>(&self, provider: &P, max_retries: u32) -> Result<u64> {
        let mut last_error = None;
        for attempt in 0..max_retries {
            match provider.get_transaction_count(self.address()).await {
                Ok(nonce) => {
                    if attempt > 0 {
                        tracing::info!("Got nonce {} on attempt {}", nonce, attempt + 1);
                    }
                    return Ok(nonce);
                }
                Err(e) => {
                    tracing::warn!("Failed to get nonce on attempt {}: {}, retrying...", attempt + 1, e);
                    last_error = Some(e);
                    tokio::time::sleep(Duration::from_millis(100 * (attempt + 1) as u64)).await;
                }
            }
        }
        Err(anyhow::anyhow!(
            "Failed to get nonce after {} attempts: {}",
            max_retries,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        ))
    }

    async fn send_call(&self, rpc_url: &str, to: Address, value: U256, call_data: Vec<u8>) -> Result<SubmittedTx> {
        let provider = ProviderBuilder::new()
            .wallet(self.signer.clone())
            .connect_http(rpc_url.parse()?);

        if !call_data.is_empty() {
            tracing::debug!("Call data: 0x{}", hex::encode(&call_data));
        }

        // 10% over the network price for faster inclusion
        let gas_price = provider.get_gas_price().await? * 11 / 10;

        for attempt in 0..TX_MAX_ATTEMPTS {
            let tx_nonce = self.get_nonce_with_retry(&provider, NONCE_RETRY_ATTEMPTS).await?;

            let mut tx_base = TransactionRequest::default()
                .to(to)
                .nonce(tx_nonce)
                .value(value)
                .input(TransactionInput::new(Bytes::from(call_data.clone())));
            tx_base.set_gas_price(gas_price);

            let estimated_gas = match tokio::time::timeout(
                Duration::from_secs(GAS_ESTIMATE_TIMEOUT_SECS),
                provider.estimate_gas(tx_base.clone()),
            )
            .await
            {
                Ok(Ok(gas)) => gas,
                Ok(Err(e)) => {
                    // Reverts (paused, insufficient fee) will not fix themselves
                    let message = e.to_string();
                    tracing::error!("Gas estimation failed on attempt {}: {}", attempt + 1, message);
                    if message.contains("revert") || attempt == TX_MAX_ATTEMPTS - 1 {
                        return Err(anyhow::anyhow!("Gas estimation failed: {}", message));
                    }
                    continue;
                }
                Err(_) => {
                    tracing::error!("Gas estimation timed out on attempt {}", attempt + 1);
                    if attempt == TX_MAX_ATTEMPTS - 1 {
                        return Err(anyhow::anyhow!("Gas estimation timed out after {} attempts", TX_MAX_ATTEMPTS));
                    }
                    continue;
                }
            };

            let gas_with_buffer = estimated_gas * 12 / 10;
            let final_tx = tx_base.gas_limit(gas_with_buffer);

            tracing::info!(
                "Attempt {} - nonce {}, gas limit {}, gas price {} gwei",
                attempt + 1,
                tx_nonce,
                gas_with_buffer,
                gas_price / 1_000_000_000
            );

            match provider.send_transaction(final_tx).await {
                Ok(pending_tx) => {
                    let tx_hash = *pending_tx.tx_hash();
                    tracing::info!("Transaction sent with hash: {}", tx_hash);

                    let receipt = pending_tx
                        .with_required_confirmations(1)
                        .with_timeout(Some(Duration::from_secs(RECEIPT_TIMEOUT_SECS)))
                        .get_receipt()
                        .await;

                    return Ok(match receipt {
                        Ok(receipt) => {
                            if receipt.status() {
                                tracing::info!("Transaction confirmed: {}", receipt.transaction_hash);
                            } else {
                                tracing::error!("Transaction reverted: {}", receipt.transaction_hash);
                            }
                            let entry = receipt
                                .inner
                                .logs()
                                .iter()
                                .find_map(|log| decode_signed_log(log).ok());
                            SubmittedTx {
                                transaction_hash: tx_hash,
                                confirmed: Some(receipt.status()),
                                block_number: receipt.block_number,
                                entry,
                            }
                        }
                        Err(e) => {
                            tracing::warn!("No receipt for {} yet: {}", tx_hash, e);
                            SubmittedTx {
                                transaction_hash: tx_hash,
                                confirmed: None,
                                block_number: None,
                                entry: None,
                            }
                        }
                    });
                }
                Err(e) => {
                    let error_str = e.to_string().to_lowercase();
                    if error_str.contains("replacement transaction underpriced")
                        || error_str.contains("nonce too low")
                        || error_str.contains("already known")
                    {
                        tracing::warn!(
                            "Nonce conflict on attempt {}: {}. Retrying with fresh nonce...",
                            attempt + 1,
                            e
                        );
                        tokio::time::sleep(Duration::from_millis(200 * (attempt + 1) as u64)).await;
                        continue;
                    }
                    tracing::error!("Failed to send transaction on attempt {}: {}", attempt + 1, e);
                    if attempt == TX_MAX_ATTEMPTS - 1 {
                        return Err(anyhow::anyhow!(
                            "Failed to send transaction after {} attempts: {}",
                            TX_MAX_ATTEMPTS,
                            e
                        ));
                    }
                }
            }
        }

        Err(anyhow::anyhow!("Transaction failed after {} attempts", TX_MAX_ATTEMPTS))
    }
}
