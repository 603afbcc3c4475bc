//! Configuration module for ChainWhale

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::chains::SUPPORTED_CHAINS;

/// Large exchange and treasury wallets monitored by default
const DEFAULT_WHALE_ADDRESSES: &[&str] = &[
    "0x28C6c06298d514Db089934071355E5743bf21d60", // Binance 14
    "0x21a31Ee1afC51d94C2eFcCAa2092aD1028285549", // Binance 15
    "0xDFd5293D8e347dFe59E90eFd55b2956a1343963d", // Binance 16
    "0xF977814e90dA44bFA03b6295A0616a897441aceC", // Binance 8
    "0xBE0eB53F46cd790Cd13851d5EFf43D12404d33E8", // Binance 7
    "0x2910543Af39abA0Cd09dBb2D50200b3E800A63D2", // Kraken 13
    "0x71660c4005BA85c37ccec55d0C4493E66Fe775d3", // Coinbase 1
    "0x503828976D22510aad0201ac7EC88293211D23Da", // Coinbase 2
];

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Blockscout MCP (protocol source)
    pub mcp_server_url: String,
    pub use_mcp: bool,

    // Blockscout REST (fallback source), chain id -> base URL
    pub chain_urls: HashMap<String, String>,

    // Whale detection
    pub min_whale_value_usd: f64,
    pub whale_addresses: Vec<String>,
    pub default_time_range: String,
    pub default_chains: Vec<String>,

    // Fan-out
    pub fetch_concurrency: usize,
    pub max_chains: usize,
    pub max_transfers_per_address: usize,
    pub feed_deadline: Duration,

    // Request layer
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,

    // API
    pub api_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut chain_urls: HashMap<String, String> = SUPPORTED_CHAINS
            .iter()
            .map(|c| (c.id.to_string(), c.base_url.to_string()))
            .collect();
        for chain in SUPPORTED_CHAINS {
            if let Ok(url) = env::var(format!("BLOCKSCOUT_URL_{}", chain.id)) {
                chain_urls.insert(chain.id.to_string(), url.trim_end_matches('/').to_string());
            }
        }

        Self {
            mcp_server_url: env::var("MCP_SERVER_URL")
                .unwrap_or_else(|_| "https://mcp.blockscout.com/mcp".to_string()),
            use_mcp: env::var("USE_MCP").map(|v| v != "false").unwrap_or(true),

            chain_urls,

            min_whale_value_usd: parse_env("MIN_WHALE_VALUE_USD", 100_000.0),
            whale_addresses: env::var("WHALE_ADDRESSES")
                .ok()
                .map(|v| split_list(&v))
                .filter(|list| !list.is_empty())
                .unwrap_or_else(|| {
                    DEFAULT_WHALE_ADDRESSES.iter().map(|a| a.to_string()).collect()
                }),
            default_time_range: env::var("DEFAULT_TIME_RANGE").unwrap_or_else(|_| "24h".to_string()),
            default_chains: env::var("DEFAULT_CHAINS")
                .ok()
                .map(|v| split_list(&v))
                .filter(|list| !list.is_empty())
                .unwrap_or_else(|| SUPPORTED_CHAINS.iter().map(|c| c.id.to_string()).collect()),

            fetch_concurrency: parse_env::<usize>("FETCH_CONCURRENCY", 3).max(1),
            max_chains: parse_env::<usize>("MAX_CHAINS", 5).max(1),
            max_transfers_per_address: parse_env::<usize>("MAX_TRANSFERS_PER_ADDRESS", 20).max(1),
            feed_deadline: Duration::from_secs(parse_env("FEED_DEADLINE_SECS", 60)),

            request_timeout: Duration::from_secs(parse_env("REQUEST_TIMEOUT_SECS", 10)),
            max_retries: parse_env("MAX_RETRIES", 2),
            retry_base_delay: Duration::from_millis(parse_env("RETRY_BASE_DELAY_MS", 1000)),

            api_port: parse_env("API_PORT", 3000),
        }
    }

    /// Base URL of the Blockscout instance for a chain
    pub fn base_url(&self, chain_id: &str) -> Option<&str> {
        self.chain_urls.get(chain_id).map(String::as_str)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" 0xa, ,0xb ,"), vec!["0xa".to_string(), "0xb".to_string()]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_defaults_cover_every_supported_chain() {
        let config = Config::from_env();
        for chain in SUPPORTED_CHAINS {
            assert!(config.base_url(chain.id).is_some());
        }
        assert!(config.base_url("56").is_none());
        assert!(config.fetch_concurrency >= 1);
        assert!(!config.whale_addresses.is_empty());
    }
}
