//! Status API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<StatusState>`.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::error;

use crate::storage::{StoreStats, TokenStore};
use crate::tracker::{CallTracker, EndpointStats};
use crate::types::{ScannerError, TokenRecord};

/// Shared state accessible by all route handlers.
pub struct StatusState {
    pub tracker: Arc<CallTracker>,
    pub store: TokenStore,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl StatusState {
    pub fn new(tracker: Arc<CallTracker>, store: TokenStore) -> Self {
        Self {
            tracker,
            store,
            started_at: chrono::Utc::now(),
        }
    }
}

pub type AppState = Arc<StatusState>;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

fn internal(e: ScannerError) -> (StatusCode, String) {
    error!(error = %e, "Status query failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct CallsResponse {
    pub total_calls: u64,
    pub endpoints: BTreeMap<String, EndpointStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryResponse {
    #[serde(flatten)]
    pub stats: StoreStats,
    pub total_calls: u64,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenSummary {
    pub address: String,
    pub pair_address: String,
    pub symbol: Option<String>,
    pub total_scans: i64,
    pub honeypot_failures: i64,
    pub age_hours: Option<f64>,
    pub liquidity: Option<f64>,
    pub is_honeypot: bool,
    pub last_scan_at: String,
}

impl From<&TokenRecord> for TokenSummary {
    fn from(r: &TokenRecord) -> Self {
        Self {
            address: r.address.clone(),
            pair_address: r.pair_address.clone(),
            symbol: r.symbol.clone(),
            total_scans: r.total_scans,
            honeypot_failures: r.honeypot_failures,
            age_hours: r.age_hours,
            liquidity: r.current_liquidity(),
            is_honeypot: r.is_honeypot(),
            last_scan_at: r.last_scan_at.to_rfc3339(),
        }
    }
}

/// GET /api/calls
pub async fn get_calls(State(state): State<AppState>) -> Json<CallsResponse> {
    Json(CallsResponse {
        total_calls: state.tracker.total_calls(),
        endpoints: state.tracker.snapshot(),
    })
}

/// GET /api/summary
pub async fn get_summary(State(state): State<AppState>) -> ApiResult<SummaryResponse> {
    let stats = state.store.stats().await.map_err(internal)?;
    Ok(Json(SummaryResponse {
        stats,
        total_calls: state.tracker.total_calls(),
        uptime_secs: (chrono::Utc::now() - state.started_at).num_seconds(),
    }))
}

/// GET /api/tokens
pub async fn get_tokens(State(state): State<AppState>) -> ApiResult<Vec<TokenSummary>> {
    let records = state.store.list_active().await.map_err(internal)?;
    Ok(Json(records.iter().map(TokenSummary::from).collect()))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}
