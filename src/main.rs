//! ChainWhale - Multi-chain Whale Transfer Feed
//!
//! Aggregates large ERC-20 transfers from monitored wallets across
//! Ethereum, Base, Arbitrum, Optimism and Polygon:
//! - Blockscout MCP as the primary source
//! - Blockscout REST as fallback and hash enrichment
//! - Ranked feeds, statistics and leaderboards over HTTP

use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use chainwhale::api::ApiServer;
use chainwhale::clients::{BlockscoutSources, SourceFactory};
use chainwhale::config::Config;
use chainwhale::modules::WhaleService;
use chainwhale::utils::{init_logger, MetricsService};

const BANNER: &str = r#"
    ╔══════════════════════════════════════════════════╗
    ║                                                  ║
    ║   🐋  ChainWhale                                 ║
    ║   Multi-chain whale transfers via Blockscout     ║
    ║   MCP first | REST fallback | Ranked feeds       ║
    ║                                                  ║
    ╚══════════════════════════════════════════════════╝
"#;

/// ChainWhale application
pub struct ChainWhale {
    config: Config,
    metrics: Arc<MetricsService>,
    sources: Arc<dyn SourceFactory>,
    whale_service: Arc<WhaleService>,
}

impl ChainWhale {
    /// Create a new ChainWhale instance
    pub fn new() -> Result<Self> {
        let config = Config::from_env();

        // Initialize services
        let metrics = Arc::new(MetricsService::new()?);
        let sources: Arc<dyn SourceFactory> =
            Arc::new(BlockscoutSources::new(config.clone(), Arc::clone(&metrics))?);
        let whale_service = Arc::new(WhaleService::new(
            config.clone(),
            Arc::clone(&sources),
            Arc::clone(&metrics),
        ));

        Ok(Self {
            config,
            metrics,
            sources,
            whale_service,
        })
    }

    /// Start ChainWhale
    pub async fn start(&self) -> Result<()> {
        println!("{}", BANNER);

        info!(target: "CHAINWHALE", "Initializing ChainWhale...");
        info!(
            target: "CHAINWHALE",
            "Tracking {} addresses on chains [{}], threshold ${}",
            self.config.whale_addresses.len(),
            self.config.default_chains.join(", "),
            self.config.min_whale_value_usd
        );
        if self.config.use_mcp {
            info!(target: "CHAINWHALE", "MCP source: {}", self.config.mcp_server_url);
        } else {
            info!(target: "CHAINWHALE", "MCP source disabled, serving from REST only");
        }

        let api = ApiServer::new(
            self.config.clone(),
            Arc::clone(&self.whale_service),
            Arc::clone(&self.sources),
            Arc::clone(&self.metrics),
        );

        api.start().await?;

        Ok(())
    }

    /// Graceful shutdown
    pub async fn shutdown(&self) {
        info!(target: "CHAINWHALE", "Shutting down...");

        let stats = self.whale_service.get_stats();
        info!(
            target: "CHAINWHALE",
            "✅ Shutdown complete ({} feeds, {} whale transfers served)",
            stats.feeds_built,
            stats.transfers_emitted
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logger();

    let app = match ChainWhale::new() {
        Ok(app) => app,
        Err(e) => {
            error!(target: "CHAINWHALE", "Failed to initialize: {}", e);
            return Err(e);
        }
    };

    // Setup shutdown signal handler
    let shutdown_signal = async {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!(target: "CHAINWHALE", "Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!(target: "CHAINWHALE", "Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    };

    // Run the application
    tokio::select! {
        result = app.start() => {
            if let Err(e) = result {
                error!(target: "CHAINWHALE", "Fatal error: {}", e);
                return Err(e);
            }
        }
        _ = shutdown_signal => {
            app.shutdown().await;
        }
    }

    Ok(())
}
