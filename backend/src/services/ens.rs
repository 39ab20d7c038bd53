//! Reverse ENS lookups (address -> primary name) against mainnet.

use alloy::{
    primitives::{Address, B256, keccak256},
    providers::Provider,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{constants::ENS_REGISTRY_ADDRESS, utils::display::short_address};

alloy::sol! {
    #[sol(rpc)]
    interface IEnsRegistry {
        function resolver(bytes32 node) external view returns (address);
    }

    #[sol(rpc)]
    interface IEnsResolver {
        function name(bytes32 node) external view returns (string);
        function addr(bytes32 node) external view returns (address);
    }
}

/// EIP-137 namehash.
pub fn namehash(name: &str) -> B256 {
    let mut node = B256::ZERO;
    if name.is_empty() {
        return node;
    }
    for label in name.rsplit('.') {
        let label_hash = keccak256(label.as_bytes());
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(node.as_slice());
        buf[32..].copy_from_slice(label_hash.as_slice());
        node = keccak256(buf);
    }
    node
}

/// Node of `<address>.addr.reverse`.
pub fn reverse_node(address: Address) -> B256 {
    let hex_address = hex::encode(address.as_slice());
    namehash(&format!("{}.addr.reverse", hex_address))
}

/// Address-to-name lookups as seen by request handlers.
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Resolves (and caches) the name, hitting the network on a miss.
    async fn lookup(&self, address: Address) -> Option<String>;

    /// Only what is already cached; never touches the network.
    async fn cached(&self, address: Address) -> Option<String>;
}

pub struct EnsResolver<P> {
    provider: P,
    registry: Address,
    cache: RwLock<HashMap<Address, Option<String>>>,
}

impl<P: Provider + Clone> EnsResolver<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            registry: ENS_REGISTRY_ADDRESS.parse().unwrap_or(Address::ZERO),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Primary name for `address`, verified by forward resolution.
    /// Lookup failures are not cached so they can be retried.
    pub async fn lookup_name(&self, address: Address) -> Option<String> {
        if let Some(cached) = self.cache.read().await.get(&address) {
            return cached.clone();
        }

        match self.resolve(address).await {
            Ok(name) => {
                self.cache.write().await.insert(address, name.clone());
                name
            }
            Err(e) => {
                debug!("ENS lookup for {} failed: {}", address, e);
                None
            }
        }
    }

    /// The ENS name if there is one, otherwise `0x1234...abcd`.
    pub async fn display_name(&self, address: Address) -> String {
        match self.lookup_name(address).await {
            Some(name) => name,
            None => short_address(&address),
        }
    }

    async fn resolve(&self, address: Address) -> anyhow::Result<Option<String>> {
        let registry = IEnsRegistry::new(self.registry, self.provider.clone());

        let node = reverse_node(address);
        let resolver = registry.resolver(node).call().await?;
        if resolver.is_zero() {
            return Ok(None);
        }
        let name = IEnsResolver::new(resolver, self.provider.clone()).name(node).call().await?;
        if name.is_empty() {
            return Ok(None);
        }

        // A reverse record is only trusted if the name resolves back
        let forward_node = namehash(&name);
        let forward_resolver = registry.resolver(forward_node).call().await?;
        if forward_resolver.is_zero() {
            return Ok(None);
        }
        let resolved = IEnsResolver::new(forward_resolver, self.provider.clone())
            .addr(forward_node)
            .call()
            .await?;
        Ok((resolved == address).then_some(name))
    }
}

#[async_trait]
impl<P> NameResolver for EnsResolver<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    async fn lookup(&self, address: Address) -> Option<String> {
        self.lookup_name(address).await
    }

    async fn cached(&self, address: Address) -> Option<String> {
        self.cache.read().await.get(&address).cloned().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namehash_known_values() {
        assert_eq!(namehash(""), B256::ZERO);
        assert_eq!(
            namehash("eth"),
            "0x93cdeb708b7545dc668eb9280176169d1c33cfd8ed6f04690a0bcc88a93fc4ae"
                .parse::<B256>()
                .unwrap()
        );
        assert_eq!(
            namehash("foo.eth"),
            "0xde9b09fd7c5f901e23a3f19fecc54828e9c848539801e86591bd9801b019f84f"
                .parse::<B256>()
                .unwrap()
        );
        assert_eq!(
            namehash("addr.reverse"),
            "0x91d1777781884d03a6757a803996e38de2a42967fb37eeaca72729271025a9e2"
                .parse::<B256>()
                .unwrap()
        );
    }

    #[test]
    fn test_reverse_node_uses_lowercase_hex() {
        let address: Address = "0xAefC770D8515C552C952a30e597d9fbEa99aA756".parse().unwrap();
        assert_eq!(
            reverse_node(address),
            namehash("aefc770d8515c552c952a30e597d9fbea99aa756.addr.reverse")
        );
    }
}
