//! Blockscout v2 REST client

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures_util::future::join_all;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::raw::{NumberOrString, RawAddressInfo, RawTokenBalance, RawTransfer};
use super::{RequestLayer, TransferSource};
use crate::error::{ClientError, Result};
use crate::models::{AddressInfo, Chain, DataSource, TokenBalance, TokenTransfer, TransferPage, TransferQuery};
use crate::utils::convert::usd_value;
use crate::utils::time::{normalize, to_millis};

#[derive(Debug, Deserialize)]
struct RestPage {
    #[serde(default)]
    items: Vec<RawTransfer>,
    #[serde(default)]
    next_page_params: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RestToken {
    #[serde(default)]
    exchange_rate: Option<NumberOrString>,
    #[serde(default)]
    decimals: Option<NumberOrString>,
}

/// Stateless client over the per-chain Blockscout REST API
pub struct BlockscoutClient {
    requests: Arc<RequestLayer>,
}

impl BlockscoutClient {
    pub fn new(requests: Arc<RequestLayer>) -> Self {
        Self { requests }
    }

    /// Fill in exchange rates the transfer list left out.
    ///
    /// One lookup per distinct token address, run concurrently. Lookup
    /// failures leave the affected records without a USD value.
    async fn recover_exchange_rates(&self, chain_id: &str, items: &mut [TokenTransfer]) {
        let mut missing: Vec<String> = items
            .iter()
            .filter(|t| t.token.exchange_rate.is_none() && !t.token.address.is_empty())
            .map(|t| t.token.address.to_lowercase())
            .collect();
        missing.sort();
        missing.dedup();
        if missing.is_empty() {
            return;
        }

        debug!(target: "BLOCKSCOUT", "Looking up {} token prices on chain {}", missing.len(), chain_id);

        let lookups = missing.iter().map(|address| async move {
            let path = format!("/api/v2/tokens/{}", address);
            match self.requests.get_json::<RestToken>(chain_id, &path, &[]).await {
                Ok(token) => (address.clone(), Some(token)),
                Err(e) => {
                    debug!(target: "BLOCKSCOUT", "Price lookup for {} failed: {}", address, e);
                    (address.clone(), None)
                }
            }
        });
        let tokens: HashMap<String, RestToken> = join_all(lookups)
            .await
            .into_iter()
            .filter_map(|(address, token)| token.map(|t| (address, t)))
            .collect();

        for transfer in items.iter_mut().filter(|t| t.token.exchange_rate.is_none()) {
            let Some(token) = tokens.get(&transfer.token.address.to_lowercase()) else {
                continue;
            };
            if transfer.token.decimals.is_empty() {
                if let Some(decimals) = &token.decimals {
                    transfer.token.decimals = decimals.clone().into_string();
                }
            }
            let rate = token
                .exchange_rate
                .clone()
                .map(NumberOrString::into_string)
                .filter(|r| !r.is_empty());
            if let Some(rate) = rate {
                transfer.value_usd =
                    usd_value(&transfer.value, Some(&transfer.token.decimals), Some(&rate));
                transfer.token.exchange_rate = Some(rate);
            }
        }
    }
}

/// Opaque cursor wrapping Blockscout's `next_page_params`
fn encode_cursor(params: Map<String, Value>) -> String {
    STANDARD.encode(Value::Object(params).to_string())
}

fn decode_cursor(cursor: &str) -> Result<Vec<(String, String)>> {
    let bytes = STANDARD
        .decode(cursor)
        .map_err(|e| ClientError::InvalidResponse(format!("malformed cursor: {}", e)))?;
    let params: Map<String, Value> = serde_json::from_slice(&bytes)?;

    Ok(params
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| match v {
            Value::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect())
}

#[async_trait]
impl TransferSource for BlockscoutClient {
    fn kind(&self) -> DataSource {
        DataSource::Rest
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn get_address_info(&self, chain_id: &str, address: &str) -> Result<AddressInfo> {
        let path = format!("/api/v2/addresses/{}", address);
        let value: Value = self.requests.get_json(chain_id, &path, &[]).await?;
        let raw = RawAddressInfo::from_value(value)?;
        Ok(raw.into_address_info(address, DataSource::Rest))
    }

    async fn get_token_transfers(&self, query: &TransferQuery) -> Result<TransferPage> {
        let address = query.address.as_deref().ok_or(ClientError::AddressRequired)?;
        let window_start = to_millis(&normalize(&query.age_from));
        let window_end = to_millis(&normalize(&query.age_to));

        let mut params = vec![("type".to_string(), "ERC-20".to_string())];
        if let Some(token) = &query.token {
            params.push(("token".to_string(), token.clone()));
        }
        if let Some(cursor) = &query.cursor {
            params.extend(decode_cursor(cursor)?);
        }

        let path = format!("/api/v2/addresses/{}/token-transfers", address);
        let page: RestPage = self.requests.get_json(&query.chain_id, &path, &params).await?;

        // Newest first: once an item predates the window, later pages are older still
        let mut past_window = false;
        let mut items = Vec::with_capacity(page.items.len());
        for raw in page.items {
            let transfer = raw.into_transfer(DataSource::Rest);
            if window_start.is_some_and(|start| transfer.timestamp < start) {
                past_window = true;
                continue;
            }
            if window_end.is_some_and(|end| transfer.timestamp > end) {
                continue;
            }
            items.push(transfer);
        }

        self.recover_exchange_rates(&query.chain_id, &mut items).await;

        let next_cursor = if past_window {
            None
        } else {
            page.next_page_params
                .filter(|p| !p.is_empty())
                .map(encode_cursor)
        };

        debug!(
            target: "BLOCKSCOUT",
            "{} transfers for {} on chain {} (more: {})",
            items.len(),
            address,
            query.chain_id,
            next_cursor.is_some()
        );

        Ok(TransferPage { items, next_cursor })
    }

    async fn get_tokens_by_address(&self, chain_id: &str, address: &str) -> Result<Vec<TokenBalance>> {
        let path = format!("/api/v2/addresses/{}/token-balances", address);
        let balances: Vec<RawTokenBalance> = self.requests.get_json(chain_id, &path, &[]).await?;
        Ok(balances.into_iter().map(RawTokenBalance::into_balance).collect())
    }

    async fn get_chains_list(&self) -> Result<Vec<Chain>> {
        Ok(self.requests.chains())
    }
}
