//! HTTP API server

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::chains;
use crate::clients::{HybridClient, SourceFactory, TransferSource};
use crate::config::Config;
use crate::error::ClientError;
use crate::models::{AddressInfo, Chain, FeedReport, TokenBalance, TopWhale, WhaleStats};
use crate::modules::stats;
use crate::modules::whale_service::WhaleServiceStats;
use crate::modules::WhaleService;
use crate::utils::MetricsService;

/// Query params for feed endpoints
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedParams {
    /// Comma-separated chain ids
    chains: Option<String>,
    range: Option<String>,
    token: Option<String>,
    min_value: Option<f64>,
    limit: Option<usize>,
}

/// Health check response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: String,
    uptime: f64,
    mcp_enabled: bool,
    whale_service: WhaleServiceStats,
}

/// Error body returned by every endpoint
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Upstream(String),
}

impl From<ClientError> for ApiError {
    fn from(error: ClientError) -> Self {
        if error.is_configuration() {
            ApiError::BadRequest(error.to_string())
        } else {
            ApiError::Upstream(error.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Upstream(m) => (StatusCode::BAD_GATEWAY, m),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub whale_service: Arc<WhaleService>,
    pub sources: Arc<dyn SourceFactory>,
    pub metrics: Arc<MetricsService>,
    pub start_time: std::time::Instant,
}

/// API server
pub struct ApiServer {
    config: Config,
    state: AppState,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(
        config: Config,
        whale_service: Arc<WhaleService>,
        sources: Arc<dyn SourceFactory>,
        metrics: Arc<MetricsService>,
    ) -> Self {
        let state = AppState {
            config: config.clone(),
            whale_service,
            sources,
            metrics,
            start_time: std::time::Instant::now(),
        };

        Self { config, state }
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            // Whale feeds
            .route("/api/whales", get(get_whales))
            .route("/api/whales/stats", get(get_whale_stats))
            .route("/api/whales/top", get(get_top_whales))
            // Lookups
            .route("/api/chains", get(get_chains))
            .route("/api/address/:chain_id/:address", get(get_address))
            .route("/api/address/:chain_id/:address/tokens", get(get_address_tokens))
            // Prometheus metrics
            .route("/metrics", get(get_metrics))
            // Health check
            .route("/health", get(health_check))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the API server
    pub async fn start(&self) -> anyhow::Result<()> {
        let app = self.router();

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.api_port));
        info!(target: "API", "✅ API running at http://localhost:{}", self.config.api_port);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// Chains named in `requested`, or the configured defaults
fn resolve_chains(config: &Config, requested: Option<&str>) -> Result<Vec<Chain>, ApiError> {
    let ids: Vec<String> = match requested.map(str::trim).filter(|s| !s.is_empty()) {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        None => config.default_chains.clone(),
    };

    ids.iter()
        .map(|id| match config.base_url(id) {
            Some(_) => Ok(Chain::new(id, chains::chain_name(id).unwrap_or(id.as_str()))),
            None => Err(ApiError::BadRequest(format!("unsupported chain id: {}", id))),
        })
        .collect()
}

async fn build_feed(state: &AppState, params: &FeedParams) -> Result<FeedReport, ApiError> {
    let chains = resolve_chains(&state.config, params.chains.as_deref())?;
    let range = params
        .range
        .clone()
        .unwrap_or_else(|| state.config.default_time_range.clone());

    let mut report = state
        .whale_service
        .get_multi_chain_whale_feed_report(&chains, &range)
        .await;

    if let Some(token) = &params.token {
        report.transfers = stats::filter_by_token(&report.transfers, token);
    }
    if let Some(min) = params.min_value {
        report.transfers = stats::filter_by_min_value(&report.transfers, min);
    }
    Ok(report)
}

/// Hybrid client for a single lookup on a configured chain
async fn lookup_client(state: &AppState, chain_id: &str) -> Result<HybridClient, ApiError> {
    if state.config.base_url(chain_id).is_none() {
        return Err(ClientError::UnsupportedChain(chain_id.to_string()).into());
    }
    let client = state.sources.hybrid();
    client.connect().await?;
    Ok(client)
}

async fn release(client: HybridClient) {
    if let Err(e) = client.disconnect().await {
        debug!(target: "API", "Disconnect failed: {}", e);
    }
}

// ============================================
// HANDLERS
// ============================================

async fn get_whales(
    State(state): State<AppState>,
    Query(params): Query<FeedParams>,
) -> Result<Json<FeedReport>, ApiError> {
    let mut report = build_feed(&state, &params).await?;
    if let Some(limit) = params.limit {
        report.transfers.truncate(limit);
    }
    Ok(Json(report))
}

async fn get_whale_stats(
    State(state): State<AppState>,
    Query(params): Query<FeedParams>,
) -> Result<Json<WhaleStats>, ApiError> {
    let report = build_feed(&state, &params).await?;
    Ok(Json(stats::get_whale_stats(&report.transfers)))
}

async fn get_top_whales(
    State(state): State<AppState>,
    Query(params): Query<FeedParams>,
) -> Result<Json<Vec<TopWhale>>, ApiError> {
    let report = build_feed(&state, &params).await?;
    let limit = params.limit.unwrap_or(10);
    Ok(Json(stats::get_top_whales(&report.transfers, limit)))
}

async fn get_chains(State(state): State<AppState>) -> Json<Vec<Chain>> {
    let client = state.sources.hybrid();
    let listed = match client.connect().await {
        Ok(()) => {
            let listed = client.get_chains_list().await.unwrap_or_default();
            release(client).await;
            listed
        }
        Err(_) => Vec::new(),
    };

    // only chains the REST fallback can serve
    let served: Vec<Chain> = listed
        .into_iter()
        .filter(|c| state.config.base_url(&c.id).is_some())
        .collect();
    if served.is_empty() {
        return Json(
            chains::default_chains()
                .into_iter()
                .filter(|c| state.config.base_url(&c.id).is_some())
                .collect(),
        );
    }
    Json(served)
}

async fn get_address(
    State(state): State<AppState>,
    Path((chain_id, address)): Path<(String, String)>,
) -> Result<Json<AddressInfo>, ApiError> {
    let client = lookup_client(&state, &chain_id).await?;
    let result = client.get_address_info(&chain_id, &address).await;
    release(client).await;
    Ok(Json(result?))
}

async fn get_address_tokens(
    State(state): State<AppState>,
    Path((chain_id, address)): Path<(String, String)>,
) -> Result<Json<Vec<TokenBalance>>, ApiError> {
    let client = lookup_client(&state, &chain_id).await?;
    let result = client.get_tokens_by_address(&chain_id, &address).await;
    release(client).await;
    Ok(Json(result?))
}

async fn get_metrics(State(state): State<AppState>) -> Response {
    let metrics = state.metrics.get_metrics();
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        metrics,
    )
        .into_response()
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime: state.start_time.elapsed().as_secs_f64(),
        mcp_enabled: state.config.use_mcp,
        whale_service: state.whale_service.get_stats(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::mock::{spawn_server, test_config, transfer, MockFactory, MockSource};
    use crate::models::DataSource;
    use serde_json::Value;

    async fn spawn_api(rest: MockSource) -> String {
        let mut config = test_config("http://127.0.0.1:9");
        config.whale_addresses = vec!["0xA".to_string()];
        config.default_chains = vec!["1".to_string()];

        let factory = MockFactory::new(None, rest);
        let metrics = factory.metrics();
        let sources: Arc<dyn SourceFactory> = Arc::new(factory);
        let whale_service = Arc::new(WhaleService::new(
            config.clone(),
            Arc::clone(&sources),
            Arc::clone(&metrics),
        ));
        let server = ApiServer::new(config, whale_service, sources, metrics);
        spawn_server(server.router()).await
    }

    fn roster() -> MockSource {
        MockSource::new(DataSource::Rest).with_transfers(
            "0xA",
            vec![
                transfer("0x1", "0xA", "0xB", 300_000.0, 2_000),
                transfer("0x2", "0xB", "0xC", 100_000.0, 1_000),
            ],
        )
    }

    #[tokio::test]
    async fn test_feed_endpoints() {
        let base = spawn_api(roster()).await;
        let http = reqwest::Client::new();

        let report: Value = http
            .get(format!("{}/api/whales?minValue=200000", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(report["transfers"].as_array().unwrap().len(), 1);
        assert_eq!(report["transfers"][0]["valueUsd"], 300_000.0);
        assert_eq!(report["failures"], serde_json::json!([]));

        let stats: Value = http
            .get(format!("{}/api/whales/stats?chains=1", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["totalTransfers"], 2);
        assert_eq!(stats["uniqueWhales"], 3);

        let top: Value = http
            .get(format!("{}/api/whales/top?limit=1", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(top[0]["address"], "0xB");
        assert_eq!(top[0]["volume"], 400_000.0);
    }

    #[tokio::test]
    async fn test_unsupported_chain_is_bad_request() {
        let base = spawn_api(roster()).await;

        let whales = reqwest::get(format!("{}/api/whales?chains=1,56", base)).await.unwrap();
        assert_eq!(whales.status(), reqwest::StatusCode::BAD_REQUEST);

        let address = reqwest::get(format!("{}/api/address/56/0xA", base)).await.unwrap();
        assert_eq!(address.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_address_lookups() {
        let base = spawn_api(roster()).await;

        let info: Value = reqwest::get(format!("{}/api/address/1/0xA", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(info["address"], "0xA");
        assert_eq!(info["dataSource"], "rest");

        let failing = spawn_api(roster().failing_all()).await;
        let response = reqwest::get(format!("{}/api/address/1/0xA/tokens", failing)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_health_chains_and_metrics() {
        let base = spawn_api(roster()).await;

        let health: Value = reqwest::get(format!("{}/health", base)).await.unwrap().json().await.unwrap();
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["whaleService"]["trackedAddresses"], 1);

        let chains: Value = reqwest::get(format!("{}/api/chains", base)).await.unwrap().json().await.unwrap();
        assert_eq!(chains[0]["id"], "1");

        reqwest::get(format!("{}/api/whales", base)).await.unwrap();
        let metrics = reqwest::get(format!("{}/metrics", base)).await.unwrap().text().await.unwrap();
        assert!(metrics.contains("chainwhale_feeds_built_total 1"));
    }

    #[test]
    fn test_resolve_chains() {
        let config = test_config("http://127.0.0.1:9");
        let chains = resolve_chains(&config, Some(" 8453, 1 ")).unwrap();
        assert_eq!(chains, vec![Chain::new("8453", "Base"), Chain::new("1", "Ethereum")]);
        assert!(resolve_chains(&config, Some("1,999")).is_err());
        assert_eq!(resolve_chains(&config, None).unwrap().len(), config.default_chains.len());
    }
}
