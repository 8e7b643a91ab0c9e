//! Risk-assessment provider integrations.
//!
//! Defines the `RiskProvider` trait and provides implementations for:
//! - Honeypot simulation (buy/sell simulation, taxes, pair liquidity, age)
//! - Token security (contract flags, ownership, holder and DEX breakdowns)
//!
//! Both clients apply an unconditional pre-call pacing delay, classify every
//! response into a `Fetched` outcome, report it to the shared `CallTracker`
//! and never retry.

pub mod honeypot;
pub mod security;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::types::{Fetched, HoneypotReport, SecurityReport};

/// Abstraction over a risk-assessment HTTP provider.
#[async_trait]
pub trait RiskProvider<R>: Send + Sync {
    /// Fetch the provider's report for one token address.
    /// API-level failures are returned as `Fetched` variants, never as errors.
    async fn fetch(&self, address: &str) -> Fetched<R>;

    /// Provider name for logging and call accounting.
    fn name(&self) -> &str;
}

pub type HoneypotProvider = dyn RiskProvider<HoneypotReport>;
pub type SecurityProvider = dyn RiskProvider<SecurityReport>;

/// Body substring marking a rate-limit response (compared lower-case).
const RATE_LIMIT_MARKER: &str = "rate limit";

/// Longest body excerpt kept in an error message.
const ERROR_BODY_LIMIT: usize = 200;

// ---------------------------------------------------------------------------
// Response classification
// ---------------------------------------------------------------------------

/// Issue a GET and classify the response against `expected_field`.
pub(crate) async fn fetch_json(http: &Client, url: &str, expected_field: &str) -> Fetched<Value> {
    let resp = match http.get(url).send().await {
        Ok(resp) => resp,
        Err(e) => return Fetched::Error(format!("request failed: {e}")),
    };
    let status = resp.status().as_u16();
    let body = match resp.text().await {
        Ok(body) => body,
        Err(e) => return Fetched::Error(format!("failed to read response body: {e}")),
    };
    classify_response(status, &body, expected_field)
}

/// Classify one HTTP response.
///
/// - `RateLimited`: HTTP 429, or a non-successful response whose body carries
///   the rate-limit marker.
/// - `Error`: any other non-200 status, or a body that is not JSON.
/// - `Empty`: 200 with an empty body or a missing/empty `expected_field`.
/// - `Success`: 200 with `expected_field` present; carries the whole body.
pub fn classify_response(status: u16, body: &str, expected_field: &str) -> Fetched<Value> {
    let rate_limit_marked = body.to_lowercase().contains(RATE_LIMIT_MARKER);

    if status == 429 {
        return Fetched::RateLimited;
    }
    if status != 200 {
        if rate_limit_marked {
            return Fetched::RateLimited;
        }
        return Fetched::Error(format!("HTTP {status}: {}", excerpt(body)));
    }
    if body.trim().is_empty() {
        return Fetched::Empty;
    }

    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => return Fetched::Error(format!("invalid JSON: {e}")),
    };

    match value.get(expected_field) {
        Some(field) if !is_blank(field) => Fetched::Success(value),
        _ if rate_limit_marked => Fetched::RateLimited,
        _ => Fetched::Empty,
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn excerpt(body: &str) -> String {
    if body.len() <= ERROR_BODY_LIMIT {
        return body.to_string();
    }
    let mut end = ERROR_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}

// ---------------------------------------------------------------------------
// Lenient field readers
// ---------------------------------------------------------------------------
//
// Provider payloads mix numbers, numeric strings ("0.05", "12%") and "0"/"1"
// booleans freely. Non-finite numbers ("NaN", "inf") read as absent: they
// do not survive a JSON round trip through the store.

pub(crate) fn lenient_f64(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

pub(crate) fn lenient_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f as i64)
                })
        }
        _ => None,
    }
}

pub(crate) fn lenient_bool(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" => Some(true),
            "0" | "false" | "no" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Non-empty string form of a scalar field.
pub(crate) fn lenient_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
