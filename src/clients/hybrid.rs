//! MCP-first client with REST fallback and hash enrichment

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

use super::TransferSource;
use crate::error::{ClientError, Result};
use crate::log_fallback;
use crate::models::{AddressInfo, Chain, DataSource, TokenBalance, TokenTransfer, TransferPage, TransferQuery};
use crate::utils::MetricsService;

/// Maximum timestamp distance for pairing a hashless MCP record with a REST record
const MATCH_WINDOW_MS: i64 = 5_000;

/// Connection lifecycle of a hybrid client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HybridState {
    Uninitialized,
    Connecting,
    Ready { primary_available: bool },
}

/// Which source a pagination cursor belongs to.
///
/// Cursors handed out by the hybrid client carry a `mcp:` or `rest:` prefix
/// so the next page is requested from the source that started the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PageCursor {
    Start,
    Mcp(String),
    Rest(String),
}

impl PageCursor {
    fn parse(cursor: Option<&str>) -> Self {
        let Some(cursor) = cursor else {
            return PageCursor::Start;
        };
        if let Some(inner) = cursor.strip_prefix("mcp:") {
            PageCursor::Mcp(inner.to_string())
        } else if let Some(inner) = cursor.strip_prefix("rest:") {
            PageCursor::Rest(inner.to_string())
        } else {
            debug!(target: "HYBRID", "Dropping foreign cursor {}", cursor);
            PageCursor::Start
        }
    }

    fn tag(source: DataSource, cursor: Option<String>) -> Option<String> {
        cursor.map(|c| format!("{}:{}", source.as_str(), c))
    }
}

/// Reads Source A (MCP) when it is reachable and Source B (REST) otherwise.
///
/// A failed primary handshake downgrades the client to REST for the rest of
/// its lifetime. Unsupported chains are never masked by a fallback.
pub struct HybridClient {
    primary: Option<Box<dyn TransferSource>>,
    fallback: Box<dyn TransferSource>,
    state: RwLock<HybridState>,
    metrics: Arc<MetricsService>,
}

impl HybridClient {
    pub fn new(
        primary: Option<Box<dyn TransferSource>>,
        fallback: Box<dyn TransferSource>,
        metrics: Arc<MetricsService>,
    ) -> Self {
        Self {
            primary,
            fallback,
            state: RwLock::new(HybridState::Uninitialized),
            metrics,
        }
    }

    pub fn state(&self) -> HybridState {
        *self.state.read()
    }

    fn set_state(&self, state: HybridState) {
        *self.state.write() = state;
    }

    fn available_primary(&self) -> Option<&dyn TransferSource> {
        match self.state() {
            HybridState::Ready {
                primary_available: true,
            } => self.primary.as_deref(),
            _ => None,
        }
    }

    /// Log a primary failure, or return it when it must not be masked
    fn primary_failed(&self, operation: &str, error: ClientError) -> Result<()> {
        if error.is_configuration() {
            return Err(error);
        }
        log_fallback!("MCP {} failed, using REST: {}", operation, error);
        self.metrics.record_fallback("mcp_error");
        Ok(())
    }

    /// Tag a non-empty MCP page, borrowing hashes from REST where missing
    async fn reconcile(&self, query: &TransferQuery, page: TransferPage) -> TransferPage {
        let mut items = page.items;
        let hashless = items.iter().filter(|t| !t.has_hash()).count();

        if hashless > 0 {
            match self.fallback.get_token_transfers(&query.with_cursor(None)).await {
                Ok(reference) => {
                    let matched = enrich_hashes(&mut items, &reference.items);
                    debug!(
                        target: "HYBRID",
                        "Enriched {}/{} hashless transfers on chain {}",
                        matched,
                        hashless,
                        query.chain_id
                    );
                    self.metrics.record_enrichment("matched", matched);
                    self.metrics.record_enrichment("unmatched", hashless - matched);
                }
                Err(e) => {
                    debug!(target: "HYBRID", "Hash enrichment skipped: {}", e);
                    self.metrics.record_enrichment("failed", hashless);
                }
            }
        }

        TransferPage {
            items: tag_source(items, DataSource::Mcp),
            next_cursor: PageCursor::tag(DataSource::Mcp, page.next_cursor),
        }
    }

    async fn fallback_transfers(&self, query: &TransferQuery, cursor: Option<String>) -> Result<TransferPage> {
        if query.address.is_none() {
            return Ok(TransferPage::empty());
        }
        let page = self
            .fallback
            .get_token_transfers(&query.with_cursor(cursor))
            .await?;
        Ok(TransferPage {
            items: tag_source(page.items, DataSource::Rest),
            next_cursor: PageCursor::tag(DataSource::Rest, page.next_cursor),
        })
    }
}

fn tag_source(mut items: Vec<TokenTransfer>, source: DataSource) -> Vec<TokenTransfer> {
    for item in &mut items {
        item.data_source = source;
    }
    items
}

/// Copy hashes from `reference` onto hashless `items`.
///
/// A reference record pairs with an item when both endpoints match
/// case-insensitively and the timestamps are less than five seconds apart;
/// the nearest unused candidate wins. Only the hash is copied.
fn enrich_hashes(items: &mut [TokenTransfer], reference: &[TokenTransfer]) -> usize {
    let mut used = vec![false; reference.len()];
    let mut matched = 0;

    for item in items.iter_mut().filter(|t| !t.has_hash()) {
        let best = reference
            .iter()
            .enumerate()
            .filter(|(i, r)| {
                !used[*i]
                    && r.has_hash()
                    && r.from.eq_ignore_ascii_case(&item.from)
                    && r.to.eq_ignore_ascii_case(&item.to)
                    && (r.timestamp - item.timestamp).abs() < MATCH_WINDOW_MS
            })
            .min_by_key(|(_, r)| (r.timestamp - item.timestamp).abs());

        if let Some((i, r)) = best {
            item.hash = r.hash.clone();
            used[i] = true;
            matched += 1;
        }
    }
    matched
}

#[async_trait]
impl TransferSource for HybridClient {
    fn kind(&self) -> DataSource {
        if self.available_primary().is_some() {
            DataSource::Mcp
        } else {
            DataSource::Rest
        }
    }

    async fn connect(&self) -> Result<()> {
        if matches!(self.state(), HybridState::Ready { .. }) {
            return Ok(());
        }
        self.set_state(HybridState::Connecting);

        let primary_available = match &self.primary {
            Some(primary) => match primary.connect().await {
                Ok(()) => {
                    info!(target: "HYBRID", "MCP source connected");
                    true
                }
                Err(e) => {
                    log_fallback!("MCP unavailable, serving from REST only: {}", e);
                    self.metrics.record_fallback("connect_failed");
                    false
                }
            },
            None => false,
        };

        if let Err(e) = self.fallback.connect().await {
            if let (true, Some(primary)) = (primary_available, &self.primary) {
                if let Err(e) = primary.disconnect().await {
                    debug!(target: "HYBRID", "MCP disconnect after failed connect: {}", e);
                }
            }
            self.set_state(HybridState::Uninitialized);
            return Err(e);
        }

        self.set_state(HybridState::Ready { primary_available });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(primary) = self.available_primary() {
            if let Err(e) = primary.disconnect().await {
                debug!(target: "HYBRID", "MCP disconnect failed: {}", e);
            }
        }
        self.set_state(HybridState::Uninitialized);
        self.fallback.disconnect().await
    }

    async fn get_address_info(&self, chain_id: &str, address: &str) -> Result<AddressInfo> {
        if let Some(primary) = self.available_primary() {
            match primary.get_address_info(chain_id, address).await {
                Ok(info) => return Ok(info),
                Err(e) => self.primary_failed("address info", e)?,
            }
        }
        self.fallback.get_address_info(chain_id, address).await
    }

    async fn get_token_transfers(&self, query: &TransferQuery) -> Result<TransferPage> {
        let cursor = PageCursor::parse(query.cursor.as_deref());

        match (cursor, self.available_primary()) {
            (PageCursor::Rest(inner), _) => self.fallback_transfers(query, Some(inner)).await,

            // a walk that began on MCP ends with it
            (PageCursor::Mcp(inner), Some(primary)) => {
                match primary.get_token_transfers(&query.with_cursor(Some(inner))).await {
                    Ok(page) => Ok(self.reconcile(query, page).await),
                    Err(e) if e.is_configuration() => Err(e),
                    Err(e) => {
                        log_fallback!("MCP pagination failed, ending page walk: {}", e);
                        self.metrics.record_fallback("mcp_error");
                        Ok(TransferPage::empty())
                    }
                }
            }
            (PageCursor::Mcp(_), None) => Ok(TransferPage::empty()),

            (PageCursor::Start, Some(primary)) => {
                match primary.get_token_transfers(&query.with_cursor(None)).await {
                    Ok(page) if !page.items.is_empty() => {
                        return Ok(self.reconcile(query, page).await);
                    }
                    Ok(_) => {
                        debug!(
                            target: "HYBRID",
                            "MCP returned no transfers for {:?} on chain {}",
                            query.address,
                            query.chain_id
                        );
                        self.metrics.record_fallback("mcp_empty");
                    }
                    Err(e) => self.primary_failed("transfers", e)?,
                }
                self.fallback_transfers(query, None).await
            }
            (PageCursor::Start, None) => self.fallback_transfers(query, None).await,
        }
    }

    async fn get_tokens_by_address(&self, chain_id: &str, address: &str) -> Result<Vec<TokenBalance>> {
        if let Some(primary) = self.available_primary() {
            match primary.get_tokens_by_address(chain_id, address).await {
                Ok(tokens) => return Ok(tokens),
                Err(e) => self.primary_failed("token balances", e)?,
            }
        }
        self.fallback.get_tokens_by_address(chain_id, address).await
    }

    async fn get_chains_list(&self) -> Result<Vec<Chain>> {
        if let Some(primary) = self.available_primary() {
            match primary.get_chains_list().await {
                Ok(chains) if !chains.is_empty() => return Ok(chains),
                Ok(_) => {}
                Err(e) => self.primary_failed("chains list", e)?,
            }
        }
        self.fallback.get_chains_list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::mock::{transfer, MockSource};
    use std::sync::atomic::Ordering;

    fn hybrid(primary: Option<&MockSource>, fallback: &MockSource) -> HybridClient {
        HybridClient::new(
            primary.map(|p| Box::new(p.clone()) as Box<dyn TransferSource>),
            Box::new(fallback.clone()),
            Arc::new(MetricsService::new().unwrap()),
        )
    }

    fn query(address: Option<&str>) -> TransferQuery {
        TransferQuery {
            chain_id: "1".to_string(),
            address: address.map(String::from),
            age_from: "24h".to_string(),
            age_to: "now".to_string(),
            token: None,
            cursor: None,
        }
    }

    #[tokio::test]
    async fn test_healthy_primary_serves_everything() {
        let mcp = MockSource::new(DataSource::Mcp)
            .with_transfers("0xA", vec![transfer("0x1", "0xA", "0xB", 250_000.0, 1_000)]);
        let rest = MockSource::new(DataSource::Rest);
        let client = hybrid(Some(&mcp), &rest);

        client.connect().await.unwrap();
        assert_eq!(client.state(), HybridState::Ready { primary_available: true });

        let page = client.get_token_transfers(&query(Some("0xA"))).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].data_source, DataSource::Mcp);
        assert_eq!(rest.transfer_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_handshake_downgrades_permanently() {
        let mcp = MockSource::new(DataSource::Mcp)
            .failing_connect()
            .with_transfers("0xA", vec![transfer("0x1", "0xA", "0xB", 1.0, 1_000)]);
        let rest = MockSource::new(DataSource::Rest)
            .with_transfers("0xA", vec![transfer("0x2", "0xA", "0xB", 2.0, 1_000)]);
        let client = hybrid(Some(&mcp), &rest);

        client.connect().await.unwrap();
        assert_eq!(client.state(), HybridState::Ready { primary_available: false });
        assert_eq!(client.kind(), DataSource::Rest);

        for _ in 0..2 {
            let page = client.get_token_transfers(&query(Some("0xA"))).await.unwrap();
            assert_eq!(page.items[0].hash, "0x2");
            assert_eq!(page.items[0].data_source, DataSource::Rest);
        }
        assert_eq!(mcp.transfer_calls(), 0);
    }

    #[tokio::test]
    async fn test_primary_error_falls_back() {
        let mcp = MockSource::new(DataSource::Mcp).failing_all();
        let rest = MockSource::new(DataSource::Rest)
            .with_transfers("0xA", vec![transfer("0x2", "0xA", "0xB", 2.0, 1_000)]);
        let client = hybrid(Some(&mcp), &rest);
        client.connect().await.unwrap();

        let page = client.get_token_transfers(&query(Some("0xA"))).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].data_source, DataSource::Rest);
        assert_eq!(mcp.transfer_calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_primary_falls_back() {
        let mcp = MockSource::new(DataSource::Mcp);
        let rest = MockSource::new(DataSource::Rest)
            .with_transfers("0xA", vec![transfer("0x2", "0xA", "0xB", 2.0, 1_000)]);
        let client = hybrid(Some(&mcp), &rest);
        client.connect().await.unwrap();

        let page = client.get_token_transfers(&query(Some("0xA"))).await.unwrap();
        assert_eq!(page.items[0].data_source, DataSource::Rest);
        assert_eq!(page.items[0].hash, "0x2");
    }

    #[tokio::test]
    async fn test_hashless_records_borrow_rest_hash() {
        let mcp = MockSource::new(DataSource::Mcp).with_transfers(
            "0xA",
            vec![
                transfer("", "0xAbC", "0xDeF", 300_000.0, 10_000),
                transfer("", "0xabc", "0x999", 150_000.0, 50_000),
            ],
        );
        let rest = MockSource::new(DataSource::Rest).with_transfers(
            "0xA",
            vec![
                transfer("0xfar", "0xabc", "0xdef", 1.0, 16_000),
                transfer("0xnear", "0xabc", "0xdef", 1.0, 12_000),
                transfer("0xother", "0xabc", "0x999", 1.0, 56_000),
            ],
        );
        let client = hybrid(Some(&mcp), &rest);
        client.connect().await.unwrap();

        let page = client.get_token_transfers(&query(Some("0xA"))).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].hash, "0xnear");
        // only the hash is borrowed
        assert_eq!(page.items[0].value_usd, Some(300_000.0));
        assert_eq!(page.items[0].from, "0xAbC");
        assert_eq!(page.items[0].data_source, DataSource::Mcp);
        // six seconds apart is outside the window
        assert_eq!(page.items[1].hash, "");
        assert_eq!(page.items[1].data_source, DataSource::Mcp);
    }

    #[tokio::test]
    async fn test_enrichment_failure_keeps_primary_records() {
        let mcp = MockSource::new(DataSource::Mcp)
            .with_transfers("0xA", vec![transfer("", "0xA", "0xB", 300_000.0, 10_000)]);
        let rest = MockSource::new(DataSource::Rest).failing_all();
        let client = hybrid(Some(&mcp), &rest);
        client.connect().await.unwrap();

        let page = client.get_token_transfers(&query(Some("0xA"))).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].hash, "");
        assert_eq!(page.items[0].data_source, DataSource::Mcp);
    }

    #[tokio::test]
    async fn test_global_scan_without_primary_is_empty() {
        let mcp = MockSource::new(DataSource::Mcp).failing_all();
        let rest = MockSource::new(DataSource::Rest)
            .with_transfers("0xA", vec![transfer("0x2", "0xA", "0xB", 2.0, 1_000)]);
        let client = hybrid(Some(&mcp), &rest);
        client.connect().await.unwrap();

        let page = client.get_token_transfers(&query(None)).await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.next_cursor, None);
        assert_eq!(rest.transfer_calls(), 0);
    }

    #[tokio::test]
    async fn test_global_scan_uses_primary() {
        let mcp = MockSource::new(DataSource::Mcp)
            .with_transfers("0xA", vec![transfer("0x1", "0xA", "0xB", 2.0, 1_000)])
            .with_transfers("0xC", vec![transfer("0x3", "0xC", "0xD", 3.0, 2_000)]);
        let rest = MockSource::new(DataSource::Rest);
        let client = hybrid(Some(&mcp), &rest);
        client.connect().await.unwrap();

        let page = client.get_token_transfers(&query(None)).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(mcp.state.queries.lock()[0].address, None);
    }

    #[tokio::test]
    async fn test_unsupported_chain_is_not_masked() {
        let mcp = MockSource::new(DataSource::Mcp).unsupported_chain("1");
        let rest = MockSource::new(DataSource::Rest)
            .with_transfers("0xA", vec![transfer("0x2", "0xA", "0xB", 2.0, 1_000)]);
        let client = hybrid(Some(&mcp), &rest);
        client.connect().await.unwrap();

        let err = client.get_token_transfers(&query(Some("0xA"))).await.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(rest.transfer_calls(), 0);

        let err = client.get_address_info("1", "0xA").await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_fallback_connect_failure_is_fatal() {
        let mcp = MockSource::new(DataSource::Mcp);
        let rest = MockSource::new(DataSource::Rest).failing_connect();
        let client = hybrid(Some(&mcp), &rest);

        assert!(client.connect().await.is_err());
        assert_eq!(client.state(), HybridState::Uninitialized);
        assert_eq!(mcp.state.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_primary_disconnect_keeps_fallback_error() {
        let mcp = MockSource::new(DataSource::Mcp).failing_disconnect();
        let rest = MockSource::new(DataSource::Rest).failing_connect();
        let client = hybrid(Some(&mcp), &rest);

        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, ClientError::Mcp(ref msg) if msg == "handshake refused"));
        assert_eq!(client.state(), HybridState::Uninitialized);
        assert_eq!(mcp.state.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cursor_stays_with_originating_source() {
        let mcp = MockSource::new(DataSource::Mcp)
            .page_size(1)
            .with_transfers(
                "0xA",
                vec![
                    transfer("0x1", "0xA", "0xB", 2.0, 2_000),
                    transfer("0x2", "0xA", "0xB", 1.0, 1_000),
                ],
            );
        let rest = MockSource::new(DataSource::Rest)
            .page_size(1)
            .with_transfers(
                "0xC",
                vec![
                    transfer("0x3", "0xC", "0xD", 2.0, 2_000),
                    transfer("0x4", "0xC", "0xD", 1.0, 1_000),
                ],
            );
        let client = hybrid(Some(&mcp), &rest);
        client.connect().await.unwrap();

        let first = client.get_token_transfers(&query(Some("0xA"))).await.unwrap();
        assert_eq!(first.next_cursor.as_deref(), Some("mcp:1"));
        let second = client
            .get_token_transfers(&query(Some("0xA")).with_cursor(first.next_cursor))
            .await
            .unwrap();
        assert_eq!(second.items[0].hash, "0x2");
        assert_eq!(second.next_cursor, None);

        // MCP has nothing for 0xC, so the walk starts and stays on REST
        let first = client.get_token_transfers(&query(Some("0xC"))).await.unwrap();
        assert_eq!(first.next_cursor.as_deref(), Some("rest:1"));
        let mcp_calls = mcp.transfer_calls();
        let second = client
            .get_token_transfers(&query(Some("0xC")).with_cursor(first.next_cursor))
            .await
            .unwrap();
        assert_eq!(second.items[0].hash, "0x4");
        assert_eq!(second.items[0].data_source, DataSource::Rest);
        assert_eq!(mcp.transfer_calls(), mcp_calls);
    }

    #[tokio::test]
    async fn test_lookups_fall_back() {
        let mcp = MockSource::new(DataSource::Mcp).failing_all();
        let rest = MockSource::new(DataSource::Rest);
        let client = hybrid(Some(&mcp), &rest);
        client.connect().await.unwrap();

        let info = client.get_address_info("1", "0xA").await.unwrap();
        assert_eq!(info.data_source, DataSource::Rest);
        assert!(client.get_tokens_by_address("1", "0xA").await.unwrap().is_empty());
        assert_eq!(client.get_chains_list().await.unwrap().len(), 1);
    }

    #[test]
    fn test_cursor_prefixes() {
        assert_eq!(PageCursor::parse(None), PageCursor::Start);
        assert_eq!(PageCursor::parse(Some("mcp:abc")), PageCursor::Mcp("abc".into()));
        assert_eq!(PageCursor::parse(Some("rest:e30=")), PageCursor::Rest("e30=".into()));
        assert_eq!(PageCursor::parse(Some("abc")), PageCursor::Start);
        assert_eq!(PageCursor::tag(DataSource::Rest, Some("x".into())).as_deref(), Some("rest:x"));
    }
}
