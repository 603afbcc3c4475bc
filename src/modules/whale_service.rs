//! Whale Service - per-chain and multi-chain whale transfer feeds

use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::pin::pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::clients::{HybridClient, SourceFactory, TransferSource};
use crate::config::Config;
use crate::error::{ClientError, Result};
use crate::log_whale;
use crate::models::{Chain, FeedFailure, FeedReport, TransferQuery, WhaleTransfer};
use crate::utils::convert::{format_usd, shorten_address};
use crate::utils::MetricsService;

/// Whale service statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhaleServiceStats {
    pub feeds_built: u64,
    pub transfers_emitted: u64,
    pub failures_recorded: u64,
    pub tracked_addresses: usize,
    pub min_whale_value_usd: f64,
}

/// Builds ranked whale feeds over the configured address roster
pub struct WhaleService {
    config: Config,
    sources: Arc<dyn SourceFactory>,
    metrics: Arc<MetricsService>,

    feeds_built: Arc<AtomicU64>,
    transfers_emitted: Arc<AtomicU64>,
    failures_recorded: Arc<AtomicU64>,
}

impl WhaleService {
    /// Create a new whale service
    pub fn new(config: Config, sources: Arc<dyn SourceFactory>, metrics: Arc<MetricsService>) -> Self {
        Self {
            config,
            sources,
            metrics,
            feeds_built: Arc::new(AtomicU64::new(0)),
            transfers_emitted: Arc::new(AtomicU64::new(0)),
            failures_recorded: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whale transfers for one chain, largest first
    pub async fn get_whale_feed(&self, chain_id: &str, chain_name: &str, time_range: &str) -> Vec<WhaleTransfer> {
        self.get_whale_feed_report(chain_id, chain_name, time_range)
            .await
            .transfers
    }

    /// Whale transfers for one chain plus the failures that shaped the result.
    ///
    /// Never fails: an unsupported chain, an unreachable fallback source or a
    /// missed deadline are reported in `failures` next to whatever was
    /// collected.
    pub async fn get_whale_feed_report(&self, chain_id: &str, chain_name: &str, time_range: &str) -> FeedReport {
        if self.config.base_url(chain_id).is_none() {
            error!(target: "WHALE_SERVICE", "No Blockscout instance configured for chain {}", chain_id);
            return self.finish_chain(
                chain_id,
                FeedReport {
                    transfers: Vec::new(),
                    failures: vec![FeedFailure::Configuration {
                        chain_id: chain_id.to_string(),
                        reason: ClientError::UnsupportedChain(chain_id.to_string()).to_string(),
                    }],
                },
            );
        }

        let client = self.sources.hybrid();
        if let Err(e) = client.connect().await {
            warn!(target: "WHALE_SERVICE", "Cannot reach any source for {}: {}", chain_name, e);
            return self.finish_chain(
                chain_id,
                FeedReport {
                    transfers: Vec::new(),
                    failures: vec![FeedFailure::Chain {
                        chain_id: chain_id.to_string(),
                        reason: e.to_string(),
                    }],
                },
            );
        }

        info!(
            target: "WHALE_SERVICE",
            "Scanning {} addresses on {} ({} via {})",
            self.config.whale_addresses.len(),
            chain_name,
            time_range,
            client.kind().as_str()
        );

        let deadline = Instant::now() + self.config.feed_deadline;
        let mut collected = Vec::new();
        let mut failures = Vec::new();

        {
            let client = &client;
            let mut fetches = pin!(stream::iter(self.config.whale_addresses.iter().cloned())
                .map(|address: String| async move {
                    let result = self
                        .fetch_address(client, chain_id, chain_name, &address, time_range)
                        .await;
                    (address, result)
                })
                .buffer_unordered(self.config.fetch_concurrency));

            loop {
                match timeout_at(deadline, fetches.next()).await {
                    Ok(Some((_, Ok(transfers)))) => collected.extend(transfers),
                    Ok(Some((address, Err(e)))) => failures.push(address_failure(chain_id, &address, e)),
                    Ok(None) => break,
                    Err(_) => {
                        warn!(
                            target: "WHALE_SERVICE",
                            "Feed deadline of {:?} hit on {}, returning partial results",
                            self.config.feed_deadline,
                            chain_name
                        );
                        failures.push(FeedFailure::Deadline {
                            chain_id: chain_id.to_string(),
                        });
                        break;
                    }
                }
            }
        }

        if let Err(e) = client.disconnect().await {
            debug!(target: "WHALE_SERVICE", "Disconnect failed on {}: {}", chain_name, e);
        }

        let mut transfers = dedupe(collected);
        sort_feed(&mut transfers);
        self.finish_chain(chain_id, FeedReport { transfers, failures })
    }

    /// Page through one address's history, keeping transfers above the threshold
    async fn fetch_address(
        &self,
        client: &HybridClient,
        chain_id: &str,
        chain_name: &str,
        address: &str,
        time_range: &str,
    ) -> Result<Vec<WhaleTransfer>> {
        let limit = self.config.max_transfers_per_address;
        let query = TransferQuery::for_address(chain_id, address, time_range, "now");
        let mut transfers = Vec::new();
        let mut cursor = None;

        loop {
            let page = match client.get_token_transfers(&query.with_cursor(cursor.take())).await {
                Ok(page) => page,
                Err(e) if transfers.is_empty() || e.is_configuration() => return Err(e),
                Err(e) => {
                    warn!(target: "WHALE_SERVICE", "Stopped paging {} after {} transfers: {}", address, transfers.len(), e);
                    break;
                }
            };
            let page_was_empty = page.items.is_empty();
            transfers.extend(page.items);

            match page.next_cursor {
                Some(next) if !page_was_empty && transfers.len() < limit => cursor = Some(next),
                _ => break,
            }
        }
        transfers.truncate(limit);

        let min = self.config.min_whale_value_usd;
        let whales: Vec<WhaleTransfer> = transfers
            .into_iter()
            .filter(|t| t.value_usd.is_some_and(|usd| usd >= min))
            .map(|t| WhaleTransfer::new(t, chain_id, chain_name))
            .collect();

        debug!(
            target: "WHALE_SERVICE",
            "{} whale transfers for {} on {}",
            whales.len(),
            shorten_address(address, 4),
            chain_name
        );
        Ok(whales)
    }

    fn finish_chain(&self, chain_id: &str, report: FeedReport) -> FeedReport {
        self.feeds_built.fetch_add(1, Ordering::Relaxed);
        self.transfers_emitted
            .fetch_add(report.transfers.len() as u64, Ordering::Relaxed);
        self.failures_recorded
            .fetch_add(report.failures.len() as u64, Ordering::Relaxed);

        self.metrics.feeds_built.inc();
        self.metrics
            .record_whale_transfers(chain_id, report.transfers.len());
        for failure in &report.failures {
            self.metrics.record_feed_failure(failure.kind());
        }

        if let Some(top) = report.transfers.first() {
            log_whale!(
                "Chain {}: {} whale transfers, largest {} {} ({} failures)",
                chain_id,
                report.transfers.len(),
                format_usd(top.usd_or_zero()),
                top.transfer.token.symbol,
                report.failures.len()
            );
        } else {
            info!(
                target: "WHALE_SERVICE",
                "Chain {}: no whale transfers ({} failures)",
                chain_id,
                report.failures.len()
            );
        }
        report
    }

    /// Whale transfers across chains, largest first
    pub async fn get_multi_chain_whale_feed(&self, chains: &[Chain], time_range: &str) -> Vec<WhaleTransfer> {
        self.get_multi_chain_whale_feed_report(chains, time_range)
            .await
            .transfers
    }

    /// Run every chain's feed in parallel and merge the reports.
    ///
    /// At most `max_chains` chains are queried; a failing chain only adds to
    /// `failures`.
    pub async fn get_multi_chain_whale_feed_report(&self, chains: &[Chain], time_range: &str) -> FeedReport {
        let selected = &chains[..chains.len().min(self.config.max_chains)];
        if selected.len() < chains.len() {
            warn!(
                target: "WHALE_SERVICE",
                "Limiting feed to {} of {} requested chains",
                selected.len(),
                chains.len()
            );
        }

        let reports = join_all(
            selected
                .iter()
                .map(|chain| self.get_whale_feed_report(&chain.id, &chain.name, time_range)),
        )
        .await;

        let mut transfers = Vec::new();
        let mut failures = Vec::new();
        for report in reports {
            transfers.extend(report.transfers);
            failures.extend(report.failures);
        }

        let mut transfers = dedupe(transfers);
        sort_feed(&mut transfers);

        let volume: f64 = transfers.iter().map(WhaleTransfer::usd_or_zero).sum();
        log_whale!(
            "{} whale transfers across {} chains, {} total",
            transfers.len(),
            selected.len(),
            format_usd(volume)
        );

        let report = FeedReport { transfers, failures };
        if !report.is_complete() {
            warn!(
                target: "WHALE_SERVICE",
                "Multi-chain feed is partial: {} failures",
                report.failures.len()
            );
        }
        report
    }

    /// Get service statistics
    pub fn get_stats(&self) -> WhaleServiceStats {
        WhaleServiceStats {
            feeds_built: self.feeds_built.load(Ordering::Relaxed),
            transfers_emitted: self.transfers_emitted.load(Ordering::Relaxed),
            failures_recorded: self.failures_recorded.load(Ordering::Relaxed),
            tracked_addresses: self.config.whale_addresses.len(),
            min_whale_value_usd: self.config.min_whale_value_usd,
        }
    }
}

fn address_failure(chain_id: &str, address: &str, error: ClientError) -> FeedFailure {
    if error.is_configuration() {
        error!(target: "WHALE_SERVICE", "Configuration error for {} on chain {}: {}", address, chain_id, error);
        return FeedFailure::Configuration {
            chain_id: chain_id.to_string(),
            reason: error.to_string(),
        };
    }
    warn!(
        target: "WHALE_SERVICE",
        "Skipping {} on chain {}: {}",
        shorten_address(address, 4),
        chain_id,
        error
    );
    FeedFailure::Address {
        chain_id: chain_id.to_string(),
        address: address.to_string(),
        reason: error.to_string(),
    }
}

/// Identity of a transfer record; hashless records fall back to their timestamp
fn dedupe_key(t: &WhaleTransfer) -> (String, String, String, String, String, String, Option<u64>) {
    let transfer = &t.transfer;
    let id = if transfer.has_hash() {
        transfer.hash.to_lowercase()
    } else {
        format!("@{}", transfer.timestamp)
    };
    (
        t.chain_id.clone(),
        id,
        transfer.from.to_lowercase(),
        transfer.to.to_lowercase(),
        transfer.value.clone(),
        transfer.token.address.to_lowercase(),
        transfer.log_index,
    )
}

/// Drop repeated records, keeping the first occurrence
pub fn dedupe(transfers: Vec<WhaleTransfer>) -> Vec<WhaleTransfer> {
    let mut seen = HashSet::with_capacity(transfers.len());
    transfers
        .into_iter()
        .filter(|t| seen.insert(dedupe_key(t)))
        .collect()
}

/// USD value descending, then newest first, then lowercase hash
pub fn sort_feed(transfers: &mut [WhaleTransfer]) {
    transfers.sort_by(|a, b| {
        b.usd_or_zero()
            .total_cmp(&a.usd_or_zero())
            .then_with(|| b.transfer.timestamp.cmp(&a.transfer.timestamp))
            .then_with(|| {
                a.transfer
                    .hash
                    .to_lowercase()
                    .cmp(&b.transfer.hash.to_lowercase())
            })
    });
}
