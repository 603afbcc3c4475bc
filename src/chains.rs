//! Static chain registry (chain id -> name -> Blockscout instance)

use crate::models::Chain;

/// A chain and the Blockscout instance that indexes it
#[derive(Debug, Clone, Copy)]
pub struct ChainEndpoint {
    pub id: &'static str,
    pub name: &'static str,
    pub base_url: &'static str,
}

pub const SUPPORTED_CHAINS: &[ChainEndpoint] = &[
    ChainEndpoint {
        id: "1",
        name: "Ethereum",
        base_url: "https://eth.blockscout.com",
    },
    ChainEndpoint {
        id: "8453",
        name: "Base",
        base_url: "https://base.blockscout.com",
    },
    ChainEndpoint {
        id: "42161",
        name: "Arbitrum One",
        base_url: "https://arbitrum.blockscout.com",
    },
    ChainEndpoint {
        id: "10",
        name: "Optimism",
        base_url: "https://optimism.blockscout.com",
    },
    ChainEndpoint {
        id: "137",
        name: "Polygon",
        base_url: "https://polygon.blockscout.com",
    },
];

pub fn find_chain(id: &str) -> Option<&'static ChainEndpoint> {
    SUPPORTED_CHAINS.iter().find(|c| c.id == id)
}

pub fn chain_name(id: &str) -> Option<&'static str> {
    find_chain(id).map(|c| c.name)
}

/// Fallback chain list when no upstream can answer
pub fn default_chains() -> Vec<Chain> {
    SUPPORTED_CHAINS
        .iter()
        .map(|c| Chain::new(c.id, c.name))
        .collect()
}
