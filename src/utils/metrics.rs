//! Prometheus metrics service for ChainWhale

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics service for Prometheus
#[derive(Clone)]
pub struct MetricsService {
    registry: Registry,
    start_time: Instant,

    // Upstream access
    pub upstream_requests: CounterVec,
    pub upstream_latency: HistogramVec,
    pub upstream_retries: CounterVec,

    // Source reconciliation
    pub source_fallbacks: CounterVec,
    pub hash_enrichment: CounterVec,

    // Aggregation
    pub whale_transfers: CounterVec,
    pub feed_failures: CounterVec,
    pub feeds_built: Counter,
    pub uptime: Gauge,
}

impl MetricsService {
    /// Create a new metrics service with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let upstream_requests = CounterVec::new(
            Opts::new("chainwhale_upstream_requests_total", "Upstream requests"),
            &["source", "status"],
        )?;
        let upstream_latency = HistogramVec::new(
            HistogramOpts::new("chainwhale_upstream_latency_seconds", "Upstream latency")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["source"],
        )?;
        let upstream_retries = CounterVec::new(
            Opts::new("chainwhale_upstream_retries_total", "Retried upstream requests"),
            &["chain"],
        )?;
        let source_fallbacks = CounterVec::new(
            Opts::new("chainwhale_source_fallbacks_total", "Fallbacks from MCP to REST"),
            &["reason"],
        )?;
        let hash_enrichment = CounterVec::new(
            Opts::new("chainwhale_hash_enrichment_total", "Hash enrichment outcomes"),
            &["outcome"],
        )?;
        let whale_transfers = CounterVec::new(
            Opts::new("chainwhale_whale_transfers_total", "Whale transfers emitted"),
            &["chain"],
        )?;
        let feed_failures = CounterVec::new(
            Opts::new("chainwhale_feed_failures_total", "Partial feed failures"),
            &["kind"],
        )?;
        let feeds_built = Counter::new("chainwhale_feeds_built_total", "Whale feeds built")?;
        let uptime = Gauge::new("chainwhale_uptime_seconds", "Application uptime")?;

        registry.register(Box::new(upstream_requests.clone()))?;
        registry.register(Box::new(upstream_latency.clone()))?;
        registry.register(Box::new(upstream_retries.clone()))?;
        registry.register(Box::new(source_fallbacks.clone()))?;
        registry.register(Box::new(hash_enrichment.clone()))?;
        registry.register(Box::new(whale_transfers.clone()))?;
        registry.register(Box::new(feed_failures.clone()))?;
        registry.register(Box::new(feeds_built.clone()))?;
        registry.register(Box::new(uptime.clone()))?;

        info!(target: "METRICS", "Prometheus metrics initialized");

        Ok(Self {
            registry,
            start_time: Instant::now(),
            upstream_requests,
            upstream_latency,
            upstream_retries,
            source_fallbacks,
            hash_enrichment,
            whale_transfers,
            feed_failures,
            feeds_built,
            uptime,
        })
    }

    /// Record one upstream call
    pub fn record_request(&self, source: &str, status: &str, elapsed: Duration) {
        self.upstream_requests
            .with_label_values(&[source, status])
            .inc();
        self.upstream_latency
            .with_label_values(&[source])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_retry(&self, chain_id: &str) {
        self.upstream_retries.with_label_values(&[chain_id]).inc();
    }

    pub fn record_fallback(&self, reason: &str) {
        self.source_fallbacks.with_label_values(&[reason]).inc();
    }

    pub fn record_enrichment(&self, outcome: &str, count: usize) {
        self.hash_enrichment
            .with_label_values(&[outcome])
            .inc_by(count as f64);
    }

    pub fn record_whale_transfers(&self, chain_id: &str, count: usize) {
        self.whale_transfers
            .with_label_values(&[chain_id])
            .inc_by(count as f64);
    }

    pub fn record_feed_failure(&self, kind: &str) {
        self.feed_failures.with_label_values(&[kind]).inc();
    }

    /// Get metrics as Prometheus text format
    pub fn get_metrics(&self) -> String {
        self.uptime.set(self.start_time.elapsed().as_secs_f64());

        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
