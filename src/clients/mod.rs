//! Upstream data sources and the hybrid client that reconciles them

pub mod blockscout;
pub mod hybrid;
pub mod mcp;
pub mod raw;
pub mod request;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::models::{AddressInfo, Chain, DataSource, TokenBalance, TransferPage, TransferQuery};
use crate::utils::MetricsService;

pub use blockscout::BlockscoutClient;
pub use hybrid::{HybridClient, HybridState};
pub use mcp::McpClient;
pub use request::RequestLayer;

/// Common contract of the MCP and REST sources
#[async_trait]
pub trait TransferSource: Send + Sync {
    /// Which upstream this source reads
    fn kind(&self) -> DataSource;

    /// Open the session (no-op for stateless sources)
    async fn connect(&self) -> Result<()>;

    /// Release the session (no-op for stateless sources)
    async fn disconnect(&self) -> Result<()>;

    async fn get_address_info(&self, chain_id: &str, address: &str) -> Result<AddressInfo>;

    /// One page of token transfers for the query's time window
    async fn get_token_transfers(&self, query: &TransferQuery) -> Result<TransferPage>;

    async fn get_tokens_by_address(&self, chain_id: &str, address: &str) -> Result<Vec<TokenBalance>>;

    async fn get_chains_list(&self) -> Result<Vec<Chain>>;
}

/// Builds the sources for one request.
///
/// The MCP session is per request, so every hybrid client owns its own.
pub trait SourceFactory: Send + Sync {
    fn primary(&self) -> Option<Box<dyn TransferSource>>;

    fn fallback(&self) -> Box<dyn TransferSource>;

    fn metrics(&self) -> Arc<MetricsService>;

    fn hybrid(&self) -> HybridClient {
        HybridClient::new(self.primary(), self.fallback(), self.metrics())
    }
}

/// Production factory: Blockscout MCP first, Blockscout REST as fallback
pub struct BlockscoutSources {
    config: Config,
    http: reqwest::Client,
    requests: Arc<RequestLayer>,
    metrics: Arc<MetricsService>,
}

impl BlockscoutSources {
    pub fn new(config: Config, metrics: Arc<MetricsService>) -> Result<Self> {
        let requests = Arc::new(RequestLayer::new(&config, Arc::clone(&metrics))?);
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("chainwhale/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            config,
            http,
            requests,
            metrics,
        })
    }
}

impl SourceFactory for BlockscoutSources {
    fn primary(&self) -> Option<Box<dyn TransferSource>> {
        if !self.config.use_mcp {
            return None;
        }
        Some(Box::new(McpClient::new(
            self.http.clone(),
            &self.config.mcp_server_url,
            Arc::clone(&self.metrics),
        )))
    }

    fn fallback(&self) -> Box<dyn TransferSource> {
        Box::new(BlockscoutClient::new(Arc::clone(&self.requests)))
    }

    fn metrics(&self) -> Arc<MetricsService> {
        Arc::clone(&self.metrics)
    }
}
