//! Token security provider.
//!
//! Static contract analysis: ownership, mint/proxy flags, trading
//! restrictions, holder and LP-holder breakdowns, DEX liquidity.
//!
//! Endpoint: `GET {base_url}/api/v1/token_security/{chain_id}?contract_addresses={token}`
//! Expected top-level field: `result`, keyed by lower-case token address.
//! Most scalar fields arrive as strings ("1", "0.05").

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{fetch_json, lenient_bool, lenient_f64, lenient_i64, lenient_string, RiskProvider};
use crate::config::SecurityProviderConfig;
use crate::tracker::CallTracker;
use crate::types::{Fetched, SecurityReport};

pub const PROVIDER_NAME: &str = "security";
const EXPECTED_FIELD: &str = "result";

/// HTTP client for the token security API.
pub struct SecurityClient {
    http: Client,
    base_url: String,
    chain_id: String,
    pre_delay: Duration,
    tracker: Arc<CallTracker>,
}

impl SecurityClient {
    pub fn new(config: &SecurityProviderConfig, tracker: Arc<CallTracker>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent("PAIRWATCH/0.1.0 (token-risk-tracker)")
            .build()
            .context("Failed to build HTTP client for security provider")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chain_id: config.chain_id.clone(),
            pre_delay: Duration::from_secs(config.pre_delay_secs),
            tracker,
        })
    }

    fn url(&self, address: &str) -> String {
        format!(
            "{}/api/v1/token_security/{}?contract_addresses={}",
            self.base_url,
            urlencoding::encode(&self.chain_id),
            urlencoding::encode(address)
        )
    }
}

#[async_trait]
impl RiskProvider<SecurityReport> for SecurityClient {
    async fn fetch(&self, address: &str) -> Fetched<SecurityReport> {
        if !self.pre_delay.is_zero() {
            tokio::time::sleep(self.pre_delay).await;
        }

        let result = match fetch_json(&self.http, &self.url(address), EXPECTED_FIELD).await {
            Fetched::Success(body) => match token_entry(&body, address) {
                Some(entry) => Fetched::Success(parse_report(entry)),
                None => Fetched::Empty,
            },
            other => other.map(|_| SecurityReport::default()),
        };
        let call_id = self.tracker.record(PROVIDER_NAME, result.outcome());

        match &result {
            Fetched::Success(report) => debug!(
                call_id,
                address,
                holders = report.holder_count,
                is_honeypot = report.is_honeypot,
                "Security report received"
            ),
            Fetched::Empty => info!(call_id, address, "Security provider returned no data"),
            Fetched::RateLimited => warn!(call_id, address, "Security provider rate limited"),
            Fetched::Error(e) => warn!(call_id, address, error = %e, "Security provider error"),
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

/// The per-token object inside `result`, keyed by lower-case or as-given
/// address. `None` when the provider has nothing for this token yet.
fn token_entry<'a>(body: &'a Value, address: &str) -> Option<&'a Value> {
    let result = body.get(EXPECTED_FIELD)?;
    result
        .get(address.to_lowercase())
        .or_else(|| result.get(address))
        .filter(|entry| entry.as_object().map(|o| !o.is_empty()).unwrap_or(false))
}

pub fn parse_report(entry: &Value) -> SecurityReport {
    let flag = |key: &str| lenient_bool(entry.get(key)).unwrap_or(false);
    let number = |key: &str| lenient_f64(entry.get(key)).unwrap_or(0.0);
    let text = |key: &str| lenient_string(entry.get(key));
    let blob = |key: &str| entry.get(key).cloned().unwrap_or(Value::Null);

    SecurityReport {
        token_name: text("token_name"),
        token_symbol: text("token_symbol"),
        total_supply: text("total_supply"),

        is_open_source: flag("is_open_source"),
        is_proxy: flag("is_proxy"),
        is_mintable: flag("is_mintable"),
        can_take_back_ownership: flag("can_take_back_ownership"),
        owner_change_balance: flag("owner_change_balance"),
        hidden_owner: flag("hidden_owner"),
        selfdestruct: flag("selfdestruct"),
        external_call: flag("external_call"),

        buy_tax: number("buy_tax"),
        sell_tax: number("sell_tax"),
        is_honeypot: flag("is_honeypot"),
        cannot_buy: flag("cannot_buy"),
        cannot_sell_all: flag("cannot_sell_all"),
        is_anti_whale: flag("is_anti_whale"),
        anti_whale_modifiable: flag("anti_whale_modifiable"),
        slippage_modifiable: flag("slippage_modifiable"),
        personal_slippage_modifiable: flag("personal_slippage_modifiable"),
        trading_cooldown: flag("trading_cooldown"),
        transfer_pausable: flag("transfer_pausable"),
        is_blacklisted: flag("is_blacklisted"),
        is_whitelisted: flag("is_whitelisted"),
        is_in_dex: flag("is_in_dex"),

        owner_address: text("owner_address"),
        creator_address: text("creator_address"),
        owner_percent: number("owner_percent"),
        owner_balance: text("owner_balance"),
        creator_percent: number("creator_percent"),
        creator_balance: text("creator_balance"),

        holder_count: lenient_i64(entry.get("holder_count")).unwrap_or(0),
        lp_holder_count: lenient_i64(entry.get("lp_holder_count")).unwrap_or(0),
        lp_total_supply: text("lp_total_supply"),
        holders: blob("holders"),
        lp_holders: blob("lp_holders"),
        dex: blob("dex"),

        is_true_token: flag("is_true_token"),
        is_airdrop_scam: flag("is_airdrop_scam"),
        fake_token: flag("fake_token"),
        honeypot_with_same_creator: flag("honeypot_with_same_creator"),
        trust_list: blob("trust_list"),
        other_potential_risks: blob("other_potential_risks"),
        note: text("note"),
    }
}
