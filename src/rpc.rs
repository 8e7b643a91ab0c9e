//! JSON-RPC client for the upstream Ethereum node.
//!
//! Every call goes through the shared `CredentialRotator`: the rotation
//! timer is checked first, and an upstream rate limit (HTTP 429, JSON-RPC
//! code -32005, or "rate limit" in the error message) triggers one forced
//! rotation and exactly one retry before the error is surfaced.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::credentials::CredentialRotator;
use crate::types::ScannerError;

const RPC_SOURCE: &str = "rpc";

/// JSON-RPC error object.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn is_rate_limit(&self) -> bool {
        self.code == -32005 || self.message.to_lowercase().contains("rate limit")
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// One entry from `eth_getLogs`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub block_number: Option<String>,
}

/// Failure of a single attempt, before retry handling.
#[derive(Debug)]
enum Attempt {
    RateLimited(String),
    Failed(String),
}

impl From<Attempt> for ScannerError {
    fn from(a: Attempt) -> Self {
        match a {
            Attempt::RateLimited(_) => ScannerError::RateLimited {
                source_name: RPC_SOURCE.into(),
            },
            Attempt::Failed(message) => ScannerError::Rpc(message),
        }
    }
}

pub struct RpcClient {
    http: Client,
    rotator: Arc<CredentialRotator>,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(rotator: Arc<CredentialRotator>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("PAIRWATCH/0.1.0 (token-risk-tracker)")
            .build()
            .context("Failed to build HTTP client for RPC")?;

        Ok(Self {
            http,
            rotator,
            next_id: AtomicU64::new(1),
        })
    }

    /// Issue one JSON-RPC call with rotation and a single rate-limit retry.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ScannerError> {
        self.rotator.rotate_if_due().await;

        match self.execute(method, &params).await {
            Err(Attempt::RateLimited(reason)) => {
                warn!(method, reason = %reason, "RPC rate limited, rotating credential and retrying");
                self.rotator.rotate().await;
                self.execute(method, &params).await.map_err(Into::into)
            }
            other => other.map_err(Into::into),
        }
    }

    async fn execute(&self, method: &str, params: &Value) -> Result<Value, Attempt> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let resp = self
            .http
            .post(self.rotator.current_endpoint())
            .json(&request)
            .send()
            .await
            // reqwest errors embed the URL, which carries the key.
            .map_err(|e| Attempt::Failed(format!("request failed: {}", e.without_url())))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(Attempt::RateLimited("HTTP 429".into()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if body.to_lowercase().contains("rate limit") {
                return Err(Attempt::RateLimited(format!("HTTP {status}")));
            }
            return Err(Attempt::Failed(format!("HTTP {status}")));
        }

        let parsed: RpcResponse = resp
            .json()
            .await
            .map_err(|e| Attempt::Failed(format!("invalid response: {}", e.without_url())))?;

        if let Some(error) = parsed.error {
            if error.is_rate_limit() {
                return Err(Attempt::RateLimited(error.message));
            }
            return Err(Attempt::Failed(format!("{} ({})", error.message, error.code)));
        }

        debug!(method, "RPC call succeeded");
        parsed
            .result
            .ok_or_else(|| Attempt::Failed("response had neither result nor error".into()))
    }

    /// `eth_blockNumber`
    pub async fn block_number(&self) -> Result<u64, ScannerError> {
        let value = self.call("eth_blockNumber", json!([])).await?;
        let hex = value
            .as_str()
            .ok_or_else(|| ScannerError::Rpc("eth_blockNumber result is not a string".into()))?;
        parse_hex_u64(hex)
    }

    /// `eth_getLogs` for one address and topic over an inclusive block range.
    pub async fn get_logs(
        &self,
        address: &str,
        topic: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RpcLog>, ScannerError> {
        let params = json!([{
            "address": address,
            "topics": [topic],
            "fromBlock": format!("{from_block:#x}"),
            "toBlock": format!("{to_block:#x}"),
        }]);
        let value = self.call("eth_getLogs", params).await?;
        serde_json::from_value(value).map_err(|e| ScannerError::Rpc(format!("invalid logs: {e}")))
    }
}

pub fn parse_hex_u64(hex: &str) -> Result<u64, ScannerError> {
    let digits = hex.trim().trim_start_matches("0x");
    u64::from_str_radix(digits, 16)
        .map_err(|e| ScannerError::Rpc(format!("invalid hex quantity {hex}: {e}")))
}
