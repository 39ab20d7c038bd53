use anyhow::Result;
use alloy::primitives::Address;
use std::env;
use crate::chains::{self, ChainProfile};
use crate::constants::{
    DEFAULT_CHAIN, DEFAULT_MAINNET_RPC_URL, DEFAULT_SERVER_PORT, GUESTBOOK_CONTRACT_ADDRESS,
    GUESTBOOK_START_BLOCK,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub chain: ChainProfile,
    pub port: u16,
    pub rpc_url: String,
    pub mainnet_rpc_url: String,
    pub contract_address: Address,
    pub start_block: u64,
    pub private_key_signer: Option<String>,
    pub allowed_origins: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let chain_name = env::var("GUESTBOOK_CHAIN").unwrap_or_else(|_| DEFAULT_CHAIN.to_string());
        let chain = *chains::find(&chain_name)
            .ok_or_else(|| anyhow::anyhow!("Unknown GUESTBOOK_CHAIN '{}'", chain_name))?;

        let contract_address = env::var("GUESTBOOK_CONTRACT_ADDRESS")
            .unwrap_or_else(|_| GUESTBOOK_CONTRACT_ADDRESS.to_string())
            .parse()
            .map_err(|e| anyhow::anyhow!("GUESTBOOK_CONTRACT_ADDRESS is not an address: {}", e))?;

        let start_block = match env::var("GUESTBOOK_START_BLOCK") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| anyhow::anyhow!("GUESTBOOK_START_BLOCK must be a block number: {}", e))?,
            Err(_) => GUESTBOOK_START_BLOCK,
        };

        Ok(Self {
            chain,
            port: env::var("PORT")
                .unwrap_or_else(|_| DEFAULT_SERVER_PORT.to_string())
                .parse()
                .unwrap_or(DEFAULT_SERVER_PORT),
            rpc_url: env::var("RPC_URL").unwrap_or_else(|_| chain.default_rpc.to_string()),
            mainnet_rpc_url: env::var("MAINNET_RPC_URL")
                .unwrap_or_else(|_| DEFAULT_MAINNET_RPC_URL.to_string()),
            contract_address,
            start_block,
            private_key_signer: env::var("PRIVATE_KEY_SIGNER").ok().filter(|k| !k.trim().is_empty()),
            allowed_origins: env::var("ALLOWED_ORIGINS").ok(),
        })
    }

    /// Configuration for the default deployment, without reading the environment.
    pub fn for_chain(chain: ChainProfile) -> Self {
        Self {
            chain,
            port: DEFAULT_SERVER_PORT,
            rpc_url: chain.default_rpc.to_string(),
            mainnet_rpc_url: DEFAULT_MAINNET_RPC_URL.to_string(),
            contract_address: GUESTBOOK_CONTRACT_ADDRESS
                .parse()
                .unwrap_or(Address::ZERO),
            start_block: GUESTBOOK_START_BLOCK,
            private_key_signer: None,
            allowed_origins: None,
        }
    }

    pub fn require_signer(&self) -> Result<&str> {
        self.private_key_signer
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("PRIVATE_KEY_SIGNER must be set for write operations"))
    }
}
