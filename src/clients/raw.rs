//! Typed shapes of raw Blockscout payloads and their normalization.
//!
//! Both sources speak Blockscout's vocabulary, but the MCP server flattens
//! some objects (addresses as plain strings, tokens inlined) and drops
//! fields the REST API always carries. Every field is optional here and
//! the `into_*` conversions apply the defaults.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::models::{AddressInfo, Chain, DataSource, TokenBalance, TokenDescriptor, TokenTransfer};
use crate::utils::convert::{convert_token_value, parse_decimals, usd_value};
use crate::utils::time::to_millis;

/// Native coins on every supported chain use 18 decimals
const NATIVE_DECIMALS: &str = "18";

/// Address as a bare string or as a Blockscout address object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AddressRef {
    Plain(String),
    Object { hash: String },
}

impl AddressRef {
    pub fn into_hash(self) -> String {
        match self {
            AddressRef::Plain(s) => s,
            AddressRef::Object { hash } => hash,
        }
    }
}

/// Numeric field that may arrive as a JSON string or number
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Str(String),
    Int(u64),
    Float(f64),
}

impl NumberOrString {
    pub fn into_string(self) -> String {
        match self {
            NumberOrString::Str(s) => s.trim().to_string(),
            NumberOrString::Int(i) => i.to_string(),
            NumberOrString::Float(f) => f.to_string(),
        }
    }

    /// The value as a base-10 integer string, or `None` when it is anything else
    pub fn into_integer_string(self) -> Option<String> {
        match self {
            NumberOrString::Str(s) => {
                let s = s.trim();
                (!s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())).then(|| s.to_string())
            }
            NumberOrString::Int(i) => Some(i.to_string()),
            NumberOrString::Float(_) => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            NumberOrString::Str(s) => s.trim().parse().ok(),
            NumberOrString::Int(i) => Some(*i),
            NumberOrString::Float(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawToken {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default, alias = "address_hash")]
    pub address: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub decimals: Option<NumberOrString>,
    #[serde(default)]
    pub exchange_rate: Option<NumberOrString>,
}

impl RawToken {
    pub fn into_descriptor(self, fallback_decimals: Option<String>) -> TokenDescriptor {
        TokenDescriptor {
            symbol: self.symbol.unwrap_or_else(|| "UNKNOWN".to_string()),
            address: self.address.unwrap_or_default(),
            name: self.name,
            decimals: self
                .decimals
                .map(NumberOrString::into_string)
                .or(fallback_decimals)
                .unwrap_or_default(),
            exchange_rate: self
                .exchange_rate
                .map(NumberOrString::into_string)
                .filter(|r| !r.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTotal {
    #[serde(default)]
    pub value: Option<NumberOrString>,
    #[serde(default)]
    pub decimals: Option<NumberOrString>,
}

/// Base-10 integer amount, `"0"` when absent.
///
/// A malformed amount also maps to `"0"` and reports `false` so callers can
/// leave the USD value unknown.
fn integer_amount(raw: Option<NumberOrString>) -> (String, bool) {
    match raw {
        None => ("0".to_string(), true),
        Some(NumberOrString::Str(s)) if s.trim().is_empty() => ("0".to_string(), true),
        Some(raw) => {
            let shown = format!("{:?}", raw);
            match raw.into_integer_string() {
                Some(value) => (value, true),
                None => {
                    debug!(target: "RAW", "Ignoring non-integer token amount: {}", shown);
                    ("0".to_string(), false)
                }
            }
        }
    }
}

/// A token transfer item as served by either source
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTransfer {
    #[serde(default, alias = "transaction_hash", alias = "tx_hash")]
    pub hash: Option<String>,
    #[serde(default)]
    pub from: Option<AddressRef>,
    #[serde(default)]
    pub to: Option<AddressRef>,
    #[serde(default)]
    pub total: Option<RawTotal>,
    #[serde(default)]
    pub value: Option<NumberOrString>,
    #[serde(default)]
    pub token: Option<RawToken>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub log_index: Option<NumberOrString>,
}

impl RawTransfer {
    /// Normalize into a `TokenTransfer`, deriving the USD value when possible
    pub fn into_transfer(self, source: DataSource) -> TokenTransfer {
        let total = self.total.unwrap_or_default();
        let (value, well_formed) = integer_amount(total.value.or(self.value));

        let token = self
            .token
            .unwrap_or_default()
            .into_descriptor(total.decimals.map(NumberOrString::into_string));
        let value_usd = well_formed
            .then(|| usd_value(&value, Some(&token.decimals), token.exchange_rate.as_deref()))
            .flatten();

        TokenTransfer {
            hash: self.hash.unwrap_or_default(),
            from: self.from.map(AddressRef::into_hash).unwrap_or_default(),
            to: self.to.map(AddressRef::into_hash).unwrap_or_default(),
            value,
            token,
            timestamp: self.timestamp.as_deref().and_then(to_millis).unwrap_or(0),
            value_usd,
            log_index: self.log_index.as_ref().and_then(NumberOrString::as_u64),
            data_source: source,
        }
    }
}

/// Address lookup payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAddressInfo {
    #[serde(default, alias = "address")]
    pub hash: Option<String>,
    #[serde(default)]
    pub coin_balance: Option<NumberOrString>,
    #[serde(default)]
    pub exchange_rate: Option<NumberOrString>,
    #[serde(default)]
    pub is_contract: Option<bool>,
    #[serde(default)]
    pub is_verified: Option<bool>,
    #[serde(default)]
    pub is_scam: Option<bool>,
    #[serde(default)]
    pub token: Option<RawToken>,
}

impl RawAddressInfo {
    /// Parse either the bare address object or the MCP `{basic_info: ..}` wrapper
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        match value {
            Value::Object(mut map) if map.contains_key("basic_info") => {
                serde_json::from_value(map.remove("basic_info").unwrap_or(Value::Null))
            }
            other => serde_json::from_value(other),
        }
    }

    pub fn into_address_info(self, requested: &str, source: DataSource) -> AddressInfo {
        let raw_balance = self
            .coin_balance
            .map(NumberOrString::into_string)
            .unwrap_or_else(|| "0".to_string());
        let rate = self.exchange_rate.map(NumberOrString::into_string);

        AddressInfo {
            address: self
                .hash
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| requested.to_string()),
            balance: convert_token_value(&raw_balance, 18),
            balance_usd: usd_value(&raw_balance, Some(NATIVE_DECIMALS), rate.as_deref()),
            is_contract: self.is_contract.unwrap_or(false),
            is_verified: self.is_verified.unwrap_or(false),
            is_scam: self.is_scam.unwrap_or(false),
            token: self.token.map(|t| t.into_descriptor(None)),
            data_source: source,
        }
    }
}

/// Token balance item; MCP inlines the token fields next to the value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTokenBalance {
    #[serde(default)]
    pub token: Option<RawToken>,
    #[serde(default, alias = "balance")]
    pub value: Option<NumberOrString>,
    #[serde(flatten)]
    pub inline: RawToken,
}

impl RawTokenBalance {
    pub fn into_balance(self) -> TokenBalance {
        let (value, well_formed) = integer_amount(self.value);
        let token = self.token.unwrap_or(self.inline).into_descriptor(None);
        let balance = parse_decimals(&token.decimals)
            .map(|d| convert_token_value(&value, d))
            .unwrap_or(0.0);
        let value_usd = well_formed
            .then(|| usd_value(&value, Some(&token.decimals), token.exchange_rate.as_deref()))
            .flatten();

        TokenBalance {
            token,
            value,
            balance,
            value_usd,
        }
    }
}

/// Chain list entry from the MCP server
#[derive(Debug, Clone, Deserialize)]
pub struct RawChain {
    #[serde(alias = "chain_id")]
    pub id: NumberOrString,
    pub name: String,
}

impl RawChain {
    pub fn into_chain(self) -> Chain {
        Chain {
            id: self.id.into_string(),
            name: self.name,
        }
    }
}
