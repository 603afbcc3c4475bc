//! Data model shared by the clients, the whale service and the API

use serde::{Deserialize, Serialize};

/// Supported EVM chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    pub id: String,
    pub name: String,
}

impl Chain {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}

/// Upstream a record was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Blockscout MCP session
    Mcp,
    /// Blockscout REST API
    Rest,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Mcp => "mcp",
            DataSource::Rest => "rest",
        }
    }
}

/// Token metadata attached to a transfer or balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDescriptor {
    pub symbol: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Base-unit exponent, kept as the decimal string the explorer reports
    pub decimals: String,
    /// USD price per whole token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_rate: Option<String>,
}

/// A single token transfer normalized from either source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    /// Transaction hash; empty when the MCP session could not supply one
    pub hash: String,
    pub from: String,
    pub to: String,
    /// Raw base-unit amount as a base-10 integer string
    pub value: String,
    pub token: TokenDescriptor,
    /// Epoch milliseconds
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_index: Option<u64>,
    pub data_source: DataSource,
}

impl TokenTransfer {
    pub fn has_hash(&self) -> bool {
        !self.hash.is_empty()
    }

    /// USD value with unknown treated as zero, for ranking
    pub fn usd_or_zero(&self) -> f64 {
        self.value_usd.unwrap_or(0.0)
    }
}

/// A transfer tagged with the chain it was found on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhaleTransfer {
    #[serde(flatten)]
    pub transfer: TokenTransfer,
    pub chain_id: String,
    pub chain_name: String,
}

impl WhaleTransfer {
    pub fn new(transfer: TokenTransfer, chain_id: &str, chain_name: &str) -> Self {
        Self {
            transfer,
            chain_id: chain_id.to_string(),
            chain_name: chain_name.to_string(),
        }
    }

    pub fn usd_or_zero(&self) -> f64 {
        self.transfer.usd_or_zero()
    }
}

/// Aggregate statistics over a transfer set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhaleStats {
    pub total_transfers: usize,
    pub total_volume: f64,
    pub largest_transfer: f64,
    pub unique_whales: usize,
}

/// Leaderboard entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopWhale {
    pub address: String,
    pub volume: f64,
    pub transfer_count: usize,
}

/// Snapshot of an address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressInfo {
    pub address: String,
    /// Native coin balance in whole units
    pub balance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_usd: Option<f64>,
    pub is_contract: bool,
    pub is_verified: bool,
    pub is_scam: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenDescriptor>,
    pub data_source: DataSource,
}

/// Token balance held by an address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub token: TokenDescriptor,
    /// Raw base-unit amount
    pub value: String,
    /// Converted amount in whole tokens
    pub balance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_usd: Option<f64>,
}

/// Parameters of a token transfer query
#[derive(Debug, Clone, PartialEq)]
pub struct TransferQuery {
    pub chain_id: String,
    pub address: Option<String>,
    pub age_from: String,
    pub age_to: String,
    pub token: Option<String>,
    pub cursor: Option<String>,
}

impl TransferQuery {
    pub fn for_address(chain_id: &str, address: &str, age_from: &str, age_to: &str) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            address: Some(address.to_string()),
            age_from: age_from.to_string(),
            age_to: age_to.to_string(),
            token: None,
            cursor: None,
        }
    }

    pub fn with_cursor(&self, cursor: Option<String>) -> Self {
        Self {
            cursor,
            ..self.clone()
        }
    }
}

/// One page of transfers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferPage {
    pub items: Vec<TokenTransfer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl TransferPage {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Why part of a feed is missing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FeedFailure {
    #[serde(rename_all = "camelCase")]
    Address {
        chain_id: String,
        address: String,
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    Chain { chain_id: String, reason: String },
    #[serde(rename_all = "camelCase")]
    Configuration { chain_id: String, reason: String },
    #[serde(rename_all = "camelCase")]
    Deadline { chain_id: String },
}

impl FeedFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            FeedFailure::Address { .. } => "address",
            FeedFailure::Chain { .. } => "chain",
            FeedFailure::Configuration { .. } => "configuration",
            FeedFailure::Deadline { .. } => "deadline",
        }
    }
}

/// A ranked feed plus the failures that shaped it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedReport {
    pub transfers: Vec<WhaleTransfer>,
    pub failures: Vec<FeedFailure>,
}

impl FeedReport {
    /// True when every address and chain answered
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn has_configuration_error(&self) -> bool {
        self.failures
            .iter()
            .any(|f| matches!(f, FeedFailure::Configuration { .. }))
    }
}
