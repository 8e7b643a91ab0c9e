//! Status API: read-only Axum server for monitoring a running scanner.
//!
//! Serves JSON only: provider call counters, store summary and the active
//! token list. CORS allows GET from anywhere.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;

pub use routes::{AppState, StatusState};

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/calls", get(routes::get_calls))
        .route("/api/summary", get(routes::get_summary))
        .route("/api/tokens", get(routes::get_tokens))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

/// Serve the status API on `port` until shutdown is signalled.
pub async fn serve(state: AppState, port: u16, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind status port {port}"))?;
    info!(port, "Status API listening on http://localhost:{port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .context("Status server error")?;
    info!("Status API stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TokenStore;
    use crate::tracker::CallTracker;
    use crate::types::{CallOutcome, PairEvent, TokenRecord, TokenStatus};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let store = TokenStore::in_memory().await.unwrap();
        Arc::new(StatusState::new(Arc::new(CallTracker::new()), store))
    }

    async fn get_json(app: Router, uri: &str) -> serde_json::Value {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = build_router(test_state().await);
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_calls_endpoint() {
        let state = test_state().await;
        state.tracker.record("honeypot", CallOutcome::Success);
        state.tracker.record("honeypot", CallOutcome::RateLimited);

        let json = get_json(build_router(state), "/api/calls").await;
        assert_eq!(json["total_calls"], 2);
        assert_eq!(json["endpoints"]["honeypot"]["rate_limited"], 1);
    }

    #[tokio::test]
    async fn test_tokens_and_summary_endpoints() {
        let state = test_state().await;
        let mut record = TokenRecord::new(&PairEvent::new("0xabc", "0xpair"), chrono::Utc::now());
        record.status = TokenStatus::Active;
        record.total_scans = 2;
        state.store.upsert(&record).await.unwrap();

        let tokens = get_json(build_router(state.clone()), "/api/tokens").await;
        assert_eq!(tokens.as_array().unwrap().len(), 1);
        assert_eq!(tokens[0]["address"], "0xabc");
        assert_eq!(tokens[0]["total_scans"], 2);

        let summary = get_json(build_router(state), "/api/summary").await;
        assert_eq!(summary["active"], 1);
        assert_eq!(summary["removed"], 0);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = build_router(test_state().await);
        let resp = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
