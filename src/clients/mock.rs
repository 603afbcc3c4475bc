//! In-process test doubles: local HTTP servers and scripted sources

use async_trait::async_trait;
use axum::Router;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{SourceFactory, TransferSource};
use crate::config::Config;
use crate::error::{ClientError, Result};
use crate::models::{
    AddressInfo, Chain, DataSource, TokenBalance, TokenDescriptor, TokenTransfer, TransferPage,
    TransferQuery,
};
use crate::utils::MetricsService;

/// Serve `app` on an ephemeral local port and return its base URL
pub async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Configuration pointing chain 1 at `base_url` with fast retries
pub fn test_config(base_url: &str) -> Config {
    let mut config = Config::from_env();
    config
        .chain_urls
        .insert("1".to_string(), base_url.trim_end_matches('/').to_string());
    config.use_mcp = true;
    config.min_whale_value_usd = 100_000.0;
    config.default_time_range = "24h".to_string();
    config.fetch_concurrency = 3;
    config.max_chains = 5;
    config.max_transfers_per_address = 20;
    config.feed_deadline = Duration::from_secs(10);
    config.request_timeout = Duration::from_secs(5);
    config.max_retries = 2;
    config.retry_base_delay = Duration::from_millis(10);
    config
}

/// USDC-denominated transfer worth `usd` dollars
pub fn transfer(hash: &str, from: &str, to: &str, usd: f64, timestamp: i64) -> TokenTransfer {
    TokenTransfer {
        hash: hash.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        value: format!("{}", (usd * 1_000_000.0).round() as u128),
        token: TokenDescriptor {
            symbol: "USDC".to_string(),
            address: "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".to_string(),
            name: Some("USD Coin".to_string()),
            decimals: "6".to_string(),
            exchange_rate: Some("1.0".to_string()),
        },
        timestamp,
        value_usd: Some(usd),
        log_index: None,
        data_source: DataSource::Rest,
    }
}

#[derive(Default)]
pub struct MockState {
    transfers: Mutex<HashMap<String, Vec<TokenTransfer>>>,
    failing_addresses: Mutex<HashSet<String>>,
    failing_chains: Mutex<HashSet<String>>,
    unsupported_chains: Mutex<HashSet<String>>,
    slow_addresses: Mutex<HashMap<String, Duration>>,
    fail_all: AtomicBool,
    fail_connect: AtomicBool,
    fail_disconnect: AtomicBool,
    page_size: AtomicUsize,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub transfer_calls: AtomicUsize,
    pub queries: Mutex<Vec<TransferQuery>>,
}

/// Scripted `TransferSource`; clones share their state
#[derive(Clone)]
pub struct MockSource {
    kind: DataSource,
    pub state: Arc<MockState>,
}

impl MockSource {
    pub fn new(kind: DataSource) -> Self {
        Self {
            kind,
            state: Arc::new(MockState::default()),
        }
    }

    pub fn with_transfers(self, address: &str, transfers: Vec<TokenTransfer>) -> Self {
        self.state
            .transfers
            .lock()
            .insert(address.to_lowercase(), transfers);
        self
    }

    pub fn failing_address(self, address: &str) -> Self {
        self.state
            .failing_addresses
            .lock()
            .insert(address.to_lowercase());
        self
    }

    pub fn failing_chain(self, chain_id: &str) -> Self {
        self.state.failing_chains.lock().insert(chain_id.to_string());
        self
    }

    pub fn unsupported_chain(self, chain_id: &str) -> Self {
        self.state
            .unsupported_chains
            .lock()
            .insert(chain_id.to_string());
        self
    }

    pub fn slow_address(self, address: &str, delay: Duration) -> Self {
        self.state
            .slow_addresses
            .lock()
            .insert(address.to_lowercase(), delay);
        self
    }

    pub fn failing_all(self) -> Self {
        self.state.fail_all.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_connect(self) -> Self {
        self.state.fail_connect.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_disconnect(self) -> Self {
        self.state.fail_disconnect.store(true, Ordering::SeqCst);
        self
    }

    pub fn page_size(self, size: usize) -> Self {
        self.state.page_size.store(size, Ordering::SeqCst);
        self
    }

    pub fn transfer_calls(&self) -> usize {
        self.state.transfer_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self, chain_id: &str) -> Result<()> {
        if self.state.unsupported_chains.lock().contains(chain_id) {
            return Err(ClientError::UnsupportedChain(chain_id.to_string()));
        }
        if self.state.fail_all.load(Ordering::SeqCst) {
            return Err(ClientError::Mcp(format!("{} source unavailable", self.kind.as_str())));
        }
        if self.state.failing_chains.lock().contains(chain_id) {
            return Err(ClientError::Status {
                status: 502,
                url: format!("mock://{}", chain_id),
            });
        }
        Ok(())
    }

    fn tagged(&self, mut items: Vec<TokenTransfer>) -> Vec<TokenTransfer> {
        for item in &mut items {
            item.data_source = self.kind;
        }
        items
    }
}

#[async_trait]
impl TransferSource for MockSource {
    fn kind(&self) -> DataSource {
        self.kind
    }

    async fn connect(&self) -> Result<()> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(ClientError::Mcp("handshake refused".to_string()));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_disconnect.load(Ordering::SeqCst) {
            return Err(ClientError::Mcp("session already closed".to_string()));
        }
        Ok(())
    }

    async fn get_address_info(&self, chain_id: &str, address: &str) -> Result<AddressInfo> {
        self.check_available(chain_id)?;
        Ok(AddressInfo {
            address: address.to_string(),
            balance: 1.0,
            balance_usd: None,
            is_contract: false,
            is_verified: false,
            is_scam: false,
            token: None,
            data_source: self.kind,
        })
    }

    async fn get_token_transfers(&self, query: &TransferQuery) -> Result<TransferPage> {
        self.state.transfer_calls.fetch_add(1, Ordering::SeqCst);
        self.state.queries.lock().push(query.clone());
        self.check_available(&query.chain_id)?;

        let items = match &query.address {
            Some(address) => {
                let key = address.to_lowercase();
                if self.state.failing_addresses.lock().contains(&key) {
                    return Err(ClientError::Status {
                        status: 500,
                        url: format!("mock://{}", key),
                    });
                }
                let delay = self.state.slow_addresses.lock().get(&key).copied();
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                self.state
                    .transfers
                    .lock()
                    .get(&key)
                    .cloned()
                    .unwrap_or_default()
            }
            None if self.kind == DataSource::Rest => return Err(ClientError::AddressRequired),
            None => {
                let transfers = self.state.transfers.lock();
                let mut keys: Vec<&String> = transfers.keys().collect();
                keys.sort();
                keys.into_iter()
                    .flat_map(|k| transfers[k].iter().cloned())
                    .collect()
            }
        };
        let items = self.tagged(items);

        let page_size = self.state.page_size.load(Ordering::SeqCst);
        if page_size == 0 {
            return Ok(TransferPage {
                items,
                next_cursor: None,
            });
        }

        let offset: usize = query
            .cursor
            .as_deref()
            .and_then(|c| c.parse().ok())
            .unwrap_or(0)
            .min(items.len());
        let end = (offset + page_size).min(items.len());
        Ok(TransferPage {
            items: items[offset..end].to_vec(),
            next_cursor: (end < items.len()).then(|| end.to_string()),
        })
    }

    async fn get_tokens_by_address(&self, chain_id: &str, _address: &str) -> Result<Vec<TokenBalance>> {
        self.check_available(chain_id)?;
        Ok(Vec::new())
    }

    async fn get_chains_list(&self) -> Result<Vec<Chain>> {
        self.check_available("")?;
        Ok(vec![Chain::new("1", "Ethereum")])
    }
}

/// Factory handing out clones of fixed mock sources
pub struct MockFactory {
    pub primary: Option<MockSource>,
    pub fallback: MockSource,
    metrics: Arc<MetricsService>,
}

impl MockFactory {
    pub fn new(primary: Option<MockSource>, fallback: MockSource) -> Self {
        Self {
            primary,
            fallback,
            metrics: Arc::new(MetricsService::new().unwrap()),
        }
    }
}

impl SourceFactory for MockFactory {
    fn primary(&self) -> Option<Box<dyn TransferSource>> {
        self.primary
            .clone()
            .map(|source| Box::new(source) as Box<dyn TransferSource>)
    }

    fn fallback(&self) -> Box<dyn TransferSource> {
        Box::new(self.fallback.clone())
    }

    fn metrics(&self) -> Arc<MetricsService> {
        Arc::clone(&self.metrics)
    }
}
