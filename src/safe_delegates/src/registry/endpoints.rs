//! Public Safe Transaction Service deployments
//!
//! Chains missing from this table need an explicit endpoint in the
//! configuration.

use super::ChainId;

/// Transaction service base URL for a chain, if Safe hosts one
pub fn transaction_service_url(chain_id: ChainId) -> Option<&'static str> {
    TRANSACTION_SERVICE_URLS.get(&chain_id).copied()
}

/// Chains with a hosted transaction service
pub fn supported_chains() -> Vec<ChainId> {
    let mut chains: Vec<ChainId> = TRANSACTION_SERVICE_URLS.keys().copied().collect();
    chains.sort_unstable();
    chains
}

// Transaction service URLs by chain ID
pub static TRANSACTION_SERVICE_URLS: phf::Map<u64, &str> = phf::phf_map! {
    1u64 => "https://safe-transaction-mainnet.safe.global",            // Ethereum Mainnet
    10u64 => "https://safe-transaction-optimism.safe.global",          // Optimism
    56u64 => "https://safe-transaction-bsc.safe.global",               // BNB Smart Chain
    100u64 => "https://safe-transaction-gnosis-chain.safe.global",     // Gnosis Chain
    137u64 => "https://safe-transaction-polygon.safe.global",          // Polygon
    324u64 => "https://safe-transaction-zksync.safe.global",           // zkSync Era
    1101u64 => "https://safe-transaction-zkevm.safe.global",           // Polygon zkEVM
    8453u64 => "https://safe-transaction-base.safe.global",            // Base
    42161u64 => "https://safe-transaction-arbitrum.safe.global",       // Arbitrum
    42220u64 => "https://safe-transaction-celo.safe.global",           // Celo
    43114u64 => "https://safe-transaction-avalanche.safe.global",      // Avalanche
    59144u64 => "https://safe-transaction-linea.safe.global",          // Linea
    84532u64 => "https://safe-transaction-base-sepolia.safe.global",   // Base Sepolia
    534352u64 => "https://safe-transaction-scroll.safe.global",        // Scroll
    11155111u64 => "https://safe-transaction-sepolia.safe.global",     // Sepolia
    1313161554u64 => "https://safe-transaction-aurora.safe.global",    // Aurora
};
