//! Resilient HTTP layer for the Blockscout REST API

use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::chains;
use crate::config::Config;
use crate::error::{ClientError, Result};
use crate::models::Chain;
use crate::utils::MetricsService;

/// Chain-aware GET requests with bounded retries.
///
/// Only HTTP 429, HTTP 524 and client-side timeouts are retried, waiting
/// `retry_base_delay * 2^attempt` between attempts. Any other failure is
/// returned to the caller on the first occurrence.
pub struct RequestLayer {
    client: reqwest::Client,
    chain_urls: HashMap<String, String>,
    max_retries: u32,
    retry_base_delay: Duration,
    metrics: Arc<MetricsService>,
}

impl RequestLayer {
    /// Create a request layer from configuration
    pub fn new(config: &Config, metrics: Arc<MetricsService>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("chainwhale/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            chain_urls: config.chain_urls.clone(),
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay,
            metrics,
        })
    }

    /// Base URL for a chain, or a configuration error
    pub fn base_url(&self, chain_id: &str) -> Result<&str> {
        self.chain_urls
            .get(chain_id)
            .map(String::as_str)
            .ok_or_else(|| ClientError::UnsupportedChain(chain_id.to_string()))
    }

    /// Chains this layer can reach
    pub fn chains(&self) -> Vec<Chain> {
        let mut chains: Vec<Chain> = self
            .chain_urls
            .keys()
            .map(|id| Chain::new(id, chains::chain_name(id).unwrap_or(id.as_str())))
            .collect();
        chains.sort_by(|a, b| {
            let rank = |c: &Chain| {
                chains::SUPPORTED_CHAINS
                    .iter()
                    .position(|s| s.id == c.id)
                    .unwrap_or(usize::MAX)
            };
            rank(a).cmp(&rank(b)).then_with(|| a.id.cmp(&b.id))
        });
        chains
    }

    /// GET `path` on the chain's Blockscout instance and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        chain_id: &str,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url(chain_id)?, path);
        let mut attempt: u32 = 0;

        loop {
            let started = Instant::now();
            let error = match self.client.get(&url).query(params).send().await {
                Ok(response) => {
                    let status = response.status();
                    self.metrics
                        .record_request("rest", status.as_str(), started.elapsed());

                    if status.is_success() {
                        let body = response.bytes().await?;
                        debug!(target: "REQUEST", "GET {} -> {} ({} bytes)", url, status, body.len());
                        return serde_json::from_slice(&body).map_err(|e| {
                            ClientError::InvalidResponse(format!("{}: {}", url, e))
                        });
                    }

                    ClientError::Status {
                        status: status.as_u16(),
                        url: url.clone(),
                    }
                }
                Err(e) => {
                    let label = if e.is_timeout() { "timeout" } else { "error" };
                    self.metrics.record_request("rest", label, started.elapsed());
                    ClientError::Http(e)
                }
            };

            if !error.is_transient() {
                return Err(error);
            }

            if attempt >= self.max_retries {
                return Err(ClientError::RetriesExhausted {
                    attempts: attempt + 1,
                    reason: error.to_string(),
                });
            }

            let delay = self.retry_base_delay * 2u32.saturating_pow(attempt);
            attempt += 1;
            warn!(
                target: "REQUEST",
                "{} - retrying in {:?} (attempt {}/{})",
                error,
                delay,
                attempt,
                self.max_retries
            );
            self.metrics.record_retry(chain_id);
            tokio::time::sleep(delay).await;
        }
    }
}
