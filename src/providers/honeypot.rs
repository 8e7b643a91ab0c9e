//! Honeypot simulation provider.
//!
//! Simulates a buy and a sell against the token's main pair and reports
//! taxes, gas, pair liquidity, pair creation time and a honeypot verdict.
//!
//! Endpoint: `GET {base_url}/v2/IsHoneypot?address={token}`
//! Expected top-level field: `token`

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{fetch_json, lenient_bool, lenient_f64, lenient_i64, lenient_string, RiskProvider};
use crate::config::HoneypotProviderConfig;
use crate::tracker::CallTracker;
use crate::types::{Fetched, HoneypotReport, TokenInfo};

pub const PROVIDER_NAME: &str = "honeypot";
const EXPECTED_FIELD: &str = "token";

/// HTTP client for the honeypot simulation API.
pub struct HoneypotClient {
    http: Client,
    base_url: String,
    pre_delay: Duration,
    tracker: Arc<CallTracker>,
}

impl HoneypotClient {
    pub fn new(config: &HoneypotProviderConfig, tracker: Arc<CallTracker>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent("PAIRWATCH/0.1.0 (token-risk-tracker)")
            .build()
            .context("Failed to build HTTP client for honeypot provider")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            pre_delay: Duration::from_secs(config.pre_delay_secs),
            tracker,
        })
    }

    fn url(&self, address: &str) -> String {
        format!(
            "{}/v2/IsHoneypot?address={}",
            self.base_url,
            urlencoding::encode(address)
        )
    }
}

#[async_trait]
impl RiskProvider<HoneypotReport> for HoneypotClient {
    async fn fetch(&self, address: &str) -> Fetched<HoneypotReport> {
        if !self.pre_delay.is_zero() {
            tokio::time::sleep(self.pre_delay).await;
        }

        let result = fetch_json(&self.http, &self.url(address), EXPECTED_FIELD)
            .await
            .map(|body| parse_report(&body));
        let call_id = self.tracker.record(PROVIDER_NAME, result.outcome());

        match &result {
            Fetched::Success(report) => debug!(
                call_id,
                address,
                is_honeypot = report.is_honeypot,
                liquidity = report.pair_liquidity,
                "Honeypot report received"
            ),
            Fetched::Empty => info!(call_id, address, "Honeypot provider returned no data"),
            Fetched::RateLimited => warn!(call_id, address, "Honeypot provider rate limited"),
            Fetched::Error(e) => warn!(call_id, address, error = %e, "Honeypot provider error"),
        }
        result
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Build a report from a successful response body.
///
/// A missing `honeypotResult.isHoneypot` is read as a honeypot.
pub fn parse_report(body: &Value) -> HoneypotReport {
    let empty = Value::Null;
    let token = body.get("token").unwrap_or(&empty);
    let pair = body.get("pair").unwrap_or(&empty);
    let simulation = body.get("simulationResult").unwrap_or(&empty);
    let contract = body.get("contractCode").unwrap_or(&empty);
    let verdict = body.get("honeypotResult").unwrap_or(&empty);
    let summary = body.get("summary").unwrap_or(&empty);

    let total_holders = lenient_i64(token.get("totalHolders"));

    HoneypotReport {
        token: TokenInfo {
            name: lenient_string(token.get("name")),
            symbol: lenient_string(token.get("symbol")),
            decimals: lenient_i64(token.get("decimals")),
            total_supply: lenient_string(token.get("totalSupply")),
            total_holders,
        },
        simulation_success: lenient_bool(body.get("simulationSuccess")).unwrap_or(false),
        buy_tax: lenient_f64(simulation.get("buyTax")).unwrap_or(0.0),
        sell_tax: lenient_f64(simulation.get("sellTax")).unwrap_or(0.0),
        transfer_tax: lenient_f64(simulation.get("transferTax")).unwrap_or(0.0),
        buy_gas_used: lenient_i64(simulation.get("buyGas")),
        sell_gas_used: lenient_i64(simulation.get("sellGas")),
        pair_liquidity: lenient_f64(pair.get("liquidity")).unwrap_or(0.0),
        pair_liquidity_token0: lenient_f64(pair.get("liquidityToken0")).unwrap_or(0.0),
        pair_liquidity_token1: lenient_f64(pair.get("liquidityToken1")).unwrap_or(0.0),
        pair_reserves0: lenient_string(pair.get("reserves0")),
        pair_reserves1: lenient_string(pair.get("reserves1")),
        pair_created_at: pair.get("createdAtTimestamp").and_then(parse_creation_time),
        holder_count: total_holders,
        is_honeypot: lenient_bool(verdict.get("isHoneypot")).unwrap_or(true),
        honeypot_reason: lenient_string(verdict.get("honeypotReason")),
        is_open_source: lenient_bool(contract.get("openSource")).unwrap_or(false),
        is_proxy: lenient_bool(contract.get("isProxy")).unwrap_or(false),
        has_proxy_calls: lenient_bool(contract.get("hasProxyCalls")).unwrap_or(false),
        is_mintable: lenient_bool(contract.get("isMintable")).unwrap_or(false),
        owner_address: lenient_string(token.get("owner")),
        creator_address: lenient_string(token.get("creator")),
        deployer_address: lenient_string(token.get("deployer")),
        risk: lenient_string(summary.get("risk")),
        risk_level: lenient_i64(summary.get("riskLevel")),
    }
}

/// Parse `pair.createdAtTimestamp`: unix seconds (number or digit string),
/// or `YYYY-MM-DD HH:MM:SS` taken as UTC.
pub fn parse_creation_time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|s| Utc.timestamp_opt(s, 0).single()),
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
                let secs: i64 = s.parse().ok()?;
                Utc.timestamp_opt(secs, 0).single()
            } else {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|naive| naive.and_utc())
            }
        }
        _ => None,
    }
}
