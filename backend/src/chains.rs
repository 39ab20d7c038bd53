//! Networks the guestbook has been deployed to, with the explorer and
//! marketplace URLs used when rendering entries.

/// Static metadata for one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainProfile {
    /// Name accepted by `GUESTBOOK_CHAIN`.
    pub name: &'static str,
    pub chain_id: u64,
    /// Block explorer root, without trailing slash.
    pub explorer_url: &'static str,
    /// OpenSea asset root for this network, if OpenSea lists it.
    pub opensea_assets_url: Option<&'static str>,
    /// Suggested public RPC endpoint.
    pub default_rpc: &'static str,
    pub is_testnet: bool,
}

pub const BASE_SEPOLIA: ChainProfile = ChainProfile {
    name: "base-sepolia",
    chain_id: 84532,
    explorer_url: "https://sepolia.basescan.org",
    opensea_assets_url: Some("https://testnets.opensea.io/assets/base_sepolia"),
    default_rpc: "https://rpc.ankr.com/base_sepolia",
    is_testnet: true,
};

pub const BASE_GOERLI: ChainProfile = ChainProfile {
    name: "base-goerli",
    chain_id: 84531,
    explorer_url: "https://goerli.basescan.org",
    opensea_assets_url: Some("https://testnets.opensea.io/assets/base-goerli"),
    default_rpc: "https://goerli.base.org",
    is_testnet: true,
};

pub const BASE: ChainProfile = ChainProfile {
    name: "base",
    chain_id: 8453,
    explorer_url: "https://basescan.org",
    opensea_assets_url: Some("https://opensea.io/assets/base"),
    default_rpc: "https://mainnet.base.org",
    is_testnet: false,
};

pub const ZORA_GOERLI: ChainProfile = ChainProfile {
    name: "zora-goerli",
    chain_id: 999,
    explorer_url: "https://testnet.explorer.zora.energy",
    opensea_assets_url: None,
    default_rpc: "https://testnet.rpc.zora.energy",
    is_testnet: true,
};

pub const MAINNET: ChainProfile = ChainProfile {
    name: "mainnet",
    chain_id: 1,
    explorer_url: "https://etherscan.io",
    opensea_assets_url: Some("https://opensea.io/assets/ethereum"),
    default_rpc: "https://eth.llamarpc.com",
    is_testnet: false,
};

/// All known profiles.
pub const ALL: &[ChainProfile] = &[BASE_SEPOLIA, BASE_GOERLI, BASE, ZORA_GOERLI, MAINNET];

/// Looks a profile up by name (case-insensitive) or by decimal chain id.
pub fn find(name_or_id: &str) -> Option<&'static ChainProfile> {
    let needle = name_or_id.trim();
    if let Ok(id) = needle.parse::<u64>() {
        return ALL.iter().find(|c| c.chain_id == id);
    }
    ALL.iter().find(|c| c.name.eq_ignore_ascii_case(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_name_and_id() {
        assert_eq!(find("base-sepolia"), Some(&BASE_SEPOLIA));
        assert_eq!(find("Base-Sepolia"), Some(&BASE_SEPOLIA));
        assert_eq!(find("84532"), Some(&BASE_SEPOLIA));
        assert_eq!(find("1"), Some(&MAINNET));
        assert!(find("solana").is_none());
    }

    #[test]
    fn test_chain_ids_are_unique() {
        for (i, a) in ALL.iter().enumerate() {
            for b in &ALL[i + 1..] {
                assert_ne!(a.chain_id, b.chain_id, "{} and {}", a.name, b.name);
            }
        }
    }
}
