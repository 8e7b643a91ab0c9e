//! Shared types for the PAIRWATCH tracker.
//!
//! These types form the data model used across all modules: the persisted
//! `TokenRecord`, the two provider reports, the liquidity ladder, provider
//! call outcomes and the domain error taxonomy. They carry no I/O so that
//! providers, the store and the engine can depend on them freely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// A newly observed (token, pair) couple, or a rescan request for one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairEvent {
    pub token_address: String,
    pub pair_address: String,
}

impl PairEvent {
    pub fn new(token_address: impl Into<String>, pair_address: impl Into<String>) -> Self {
        Self {
            token_address: token_address.into(),
            pair_address: pair_address.into(),
        }
    }
}

impl fmt::Display for PairEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (pair {})", self.token_address, self.pair_address)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a token.
///
/// `New` only exists in memory between discovery and the first persist;
/// rows in the active table are always `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenStatus {
    New,
    Active,
    RemovedHoneypot,
    RemovedStale,
    RemovedFailureLimit,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::New => "new",
            TokenStatus::Active => "active",
            TokenStatus::RemovedHoneypot => "removed_honeypot",
            TokenStatus::RemovedStale => "removed_stale",
            TokenStatus::RemovedFailureLimit => "removed_failure_limit",
        }
    }

    /// Whether this status takes the token out of future rescans.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TokenStatus::RemovedHoneypot
                | TokenStatus::RemovedStale
                | TokenStatus::RemovedFailureLimit
        )
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TokenStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "new" => Ok(TokenStatus::New),
            "active" => Ok(TokenStatus::Active),
            "removed_honeypot" => Ok(TokenStatus::RemovedHoneypot),
            "removed_stale" => Ok(TokenStatus::RemovedStale),
            "removed_failure_limit" => Ok(TokenStatus::RemovedFailureLimit),
            other => anyhow::bail!("Unknown token status: {other}"),
        }
    }
}

/// The three terminal transitions and the removal table each one lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Removal {
    /// Old enough and confirmed honeypot by the simulation provider.
    Honeypot,
    /// Too many failed classification passes on a token flagged honeypot.
    FailureLimit,
    /// Past the maximum age with liquidity under the minimum.
    Stale,
}

impl Removal {
    pub const ALL: &'static [Removal] = &[Removal::Honeypot, Removal::FailureLimit, Removal::Stale];

    /// Name of the removal table holding rows of this kind.
    pub fn table(&self) -> &'static str {
        match self {
            Removal::Honeypot => "honeypots",
            Removal::FailureLimit | Removal::Stale => "removed_tokens",
        }
    }

    pub fn status(&self) -> TokenStatus {
        match self {
            Removal::Honeypot => TokenStatus::RemovedHoneypot,
            Removal::FailureLimit => TokenStatus::RemovedFailureLimit,
            Removal::Stale => TokenStatus::RemovedStale,
        }
    }
}

impl fmt::Display for Removal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status().as_str())
    }
}

// ---------------------------------------------------------------------------
// Provider reports
// ---------------------------------------------------------------------------

/// Token identity as reported by the honeypot simulation provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<i64>,
    pub total_supply: Option<String>,
    pub total_holders: Option<i64>,
}

/// Buy/sell simulation report from the honeypot provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HoneypotReport {
    pub token: TokenInfo,
    pub simulation_success: bool,
    /// Taxes in percent as reported (0.0–100.0).
    pub buy_tax: f64,
    pub sell_tax: f64,
    pub transfer_tax: f64,
    pub buy_gas_used: Option<i64>,
    pub sell_gas_used: Option<i64>,
    /// Pair liquidity in USD.
    pub pair_liquidity: f64,
    pub pair_liquidity_token0: f64,
    pub pair_liquidity_token1: f64,
    pub pair_reserves0: Option<String>,
    pub pair_reserves1: Option<String>,
    /// Pair creation time; the only source of a token's age.
    pub pair_created_at: Option<DateTime<Utc>>,
    pub holder_count: Option<i64>,
    pub is_honeypot: bool,
    pub honeypot_reason: Option<String>,
    pub is_open_source: bool,
    pub is_proxy: bool,
    pub has_proxy_calls: bool,
    pub is_mintable: bool,
    pub owner_address: Option<String>,
    pub creator_address: Option<String>,
    pub deployer_address: Option<String>,
    pub risk: Option<String>,
    pub risk_level: Option<i64>,
}

impl HoneypotReport {
    /// Hours since the pair was created, if the provider reported it.
    pub fn age_hours(&self, now: DateTime<Utc>) -> Option<f64> {
        self.pair_created_at
            .map(|created| ((now - created).num_seconds() as f64 / 3600.0).max(0.0))
    }
}

/// Contract security report from the token-security provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityReport {
    pub token_name: Option<String>,
    pub token_symbol: Option<String>,
    pub total_supply: Option<String>,

    // Contract
    pub is_open_source: bool,
    pub is_proxy: bool,
    pub is_mintable: bool,
    pub can_take_back_ownership: bool,
    pub owner_change_balance: bool,
    pub hidden_owner: bool,
    pub selfdestruct: bool,
    pub external_call: bool,

    // Trading
    /// Taxes as fractions (0.05 = 5%).
    pub buy_tax: f64,
    pub sell_tax: f64,
    pub is_honeypot: bool,
    pub cannot_buy: bool,
    pub cannot_sell_all: bool,
    pub is_anti_whale: bool,
    pub anti_whale_modifiable: bool,
    pub slippage_modifiable: bool,
    pub personal_slippage_modifiable: bool,
    pub trading_cooldown: bool,
    pub transfer_pausable: bool,
    pub is_blacklisted: bool,
    pub is_whitelisted: bool,
    pub is_in_dex: bool,

    // Ownership
    pub owner_address: Option<String>,
    pub creator_address: Option<String>,
    pub owner_percent: f64,
    pub owner_balance: Option<String>,
    pub creator_percent: f64,
    pub creator_balance: Option<String>,

    // Holders
    pub holder_count: i64,
    pub lp_holder_count: i64,
    pub lp_total_supply: Option<String>,
    pub holders: serde_json::Value,
    pub lp_holders: serde_json::Value,
    pub dex: serde_json::Value,

    // Trust annotations
    pub is_true_token: bool,
    pub is_airdrop_scam: bool,
    pub fake_token: bool,
    pub honeypot_with_same_creator: bool,
    pub trust_list: serde_json::Value,
    pub other_potential_risks: serde_json::Value,
    pub note: Option<String>,
}

impl SecurityReport {
    /// Total liquidity across the DEX breakdown, in USD.
    pub fn dex_liquidity(&self) -> f64 {
        self.dex
            .as_array()
            .map(|pools| {
                pools
                    .iter()
                    .filter_map(|p| p.get("liquidity"))
                    .filter_map(|v| match v {
                        serde_json::Value::Number(n) => n.as_f64(),
                        serde_json::Value::String(s) => s.trim().parse().ok(),
                        _ => None,
                    })
                    .sum()
            })
            .unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Provider call outcomes
// ---------------------------------------------------------------------------

/// Classification of a single provider call, as counted by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallOutcome {
    Success,
    Empty,
    RateLimited,
    Error,
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallOutcome::Success => write!(f, "success"),
            CallOutcome::Empty => write!(f, "empty"),
            CallOutcome::RateLimited => write!(f, "rate_limited"),
            CallOutcome::Error => write!(f, "error"),
        }
    }
}

/// Result of one provider fetch. Providers never propagate API-level
/// failures as `Err`; they return one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Success(T),
    Empty,
    RateLimited,
    Error(String),
}

impl<T> Fetched<T> {
    pub fn outcome(&self) -> CallOutcome {
        match self {
            Fetched::Success(_) => CallOutcome::Success,
            Fetched::Empty => CallOutcome::Empty,
            Fetched::RateLimited => CallOutcome::RateLimited,
            Fetched::Error(_) => CallOutcome::Error,
        }
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Fetched::Success(report) => Some(report),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Fetched::Error(message) => Some(message),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        match self {
            Fetched::Success(report) => Fetched::Success(f(report)),
            Fetched::Empty => Fetched::Empty,
            Fetched::RateLimited => Fetched::RateLimited,
            Fetched::Error(message) => Fetched::Error(message),
        }
    }
}

/// Both raw reports produced by one classification pass, before merge.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub honeypot: Fetched<HoneypotReport>,
    pub security: Fetched<SecurityReport>,
    pub completed_at: DateTime<Utc>,
}

impl ScanResult {
    /// The error message if this pass failed (either provider errored
    /// or timed out), joined when both did.
    pub fn failure(&self) -> Option<String> {
        let parts: Vec<String> = [
            self.honeypot.error().map(|e| format!("Honeypot API error: {e}")),
            self.security.error().map(|e| format!("Security API error: {e}")),
        ]
        .into_iter()
        .flatten()
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure().is_some()
    }

    /// Note for `last_error` when a provider was rate-limited on an
    /// otherwise successful pass.
    pub fn rate_limit_note(&self) -> Option<String> {
        let limited: Vec<&str> = [
            (self.honeypot.outcome() == CallOutcome::RateLimited).then_some("honeypot"),
            (self.security.outcome() == CallOutcome::RateLimited).then_some("security"),
        ]
        .into_iter()
        .flatten()
        .collect();

        if limited.is_empty() {
            None
        } else {
            Some(format!("Rate limited: {}", limited.join(", ")))
        }
    }
}

// ---------------------------------------------------------------------------
// Liquidity ladder
// ---------------------------------------------------------------------------

/// Number of ladder slots (milestones 10, 20, …, 200).
pub const LADDER_SLOTS: usize = 20;

/// Scan-count spacing between ladder milestones.
pub const LADDER_STEP: i64 = 10;

/// Sparse liquidity history indexed by scan-count milestones.
///
/// A slot is written once, on the pass whose `total_scans` equals its
/// milestone, and never changes afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiquidityLadder {
    slots: [Option<f64>; LADDER_SLOTS],
}

impl LiquidityLadder {
    pub fn from_slots(slots: [Option<f64>; LADDER_SLOTS]) -> Self {
        Self { slots }
    }

    pub fn slots(&self) -> &[Option<f64>; LADDER_SLOTS] {
        &self.slots
    }

    /// Scan count represented by slot `index`.
    pub fn milestone(index: usize) -> i64 {
        (index as i64 + 1) * LADDER_STEP
    }

    /// Slot index for a scan count, if it sits exactly on a milestone.
    pub fn slot_for(total_scans: i64) -> Option<usize> {
        if total_scans <= 0 || total_scans % LADDER_STEP != 0 {
            return None;
        }
        let index = (total_scans / LADDER_STEP - 1) as usize;
        (index < LADDER_SLOTS).then_some(index)
    }

    /// Liquidity snapshot taken at `milestone` scans.
    pub fn get(&self, milestone: i64) -> Option<f64> {
        Self::slot_for(milestone).and_then(|i| self.slots[i])
    }

    /// Record `liquidity` for this pass. Writes only when `total_scans` is a
    /// multiple of `multiplier` and lands on an unwritten milestone.
    /// Returns whether a slot was written.
    pub fn record(&mut self, total_scans: i64, multiplier: i64, liquidity: f64) -> bool {
        if multiplier <= 0 || total_scans % multiplier != 0 {
            return false;
        }
        let Some(index) = Self::slot_for(total_scans) else {
            return false;
        };
        if self.slots[index].is_some() {
            return false;
        }
        self.slots[index] = Some(liquidity);
        true
    }

    pub fn written(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

// ---------------------------------------------------------------------------
// Token record
// ---------------------------------------------------------------------------

/// One row per token address in the active table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub address: String,
    pub pair_address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<i64>,
    pub total_supply: Option<String>,

    pub first_scan_at: DateTime<Utc>,
    pub last_scan_at: DateTime<Utc>,
    /// Derived from the provider's pair-creation time, never from scan time.
    pub age_hours: Option<f64>,

    /// Completed classification passes, failed ones included.
    pub total_scans: i64,
    /// Passes that ended in a provider error or timeout.
    pub honeypot_failures: i64,
    pub last_error: Option<String>,

    pub status: TokenStatus,
    pub honeypot: Option<HoneypotReport>,
    pub security: Option<SecurityReport>,
    pub liquidity: LiquidityLadder,
}

impl TokenRecord {
    /// Fresh record for a first discovery.
    pub fn new(event: &PairEvent, now: DateTime<Utc>) -> Self {
        Self {
            address: event.token_address.clone(),
            pair_address: event.pair_address.clone(),
            name: None,
            symbol: None,
            decimals: None,
            total_supply: None,
            first_scan_at: now,
            last_scan_at: now,
            age_hours: None,
            total_scans: 0,
            honeypot_failures: 0,
            last_error: None,
            status: TokenStatus::New,
            honeypot: None,
            security: None,
            liquidity: LiquidityLadder::default(),
        }
    }

    /// Stored honeypot verdict; `false` until a report exists.
    pub fn is_honeypot(&self) -> bool {
        self.honeypot.as_ref().map(|r| r.is_honeypot).unwrap_or(false)
    }

    /// Latest pair liquidity from the honeypot provider.
    pub fn current_liquidity(&self) -> Option<f64> {
        self.honeypot.as_ref().map(|r| r.pair_liquidity)
    }

    pub fn as_event(&self) -> PairEvent {
        PairEvent::new(self.address.clone(), self.pair_address.clone())
    }
}

impl fmt::Display for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (scans: {} | failures: {} | liq: ${:.0} | {})",
            self.symbol.as_deref().unwrap_or("?"),
            self.address,
            self.total_scans,
            self.honeypot_failures,
            self.current_liquidity().unwrap_or(0.0),
            self.status,
        )
    }
}

/// A row from one of the removal tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemovedToken {
    pub record: TokenRecord,
    pub removal_timestamp: DateTime<Utc>,
    pub removal_reason: String,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for PAIRWATCH.
#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    #[error("Provider returned no data")]
    ProviderEmpty,

    #[error("Provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    #[error("Rate limited by {source_name}")]
    RateLimited { source_name: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Classification pass timed out")]
    Timeout,
}

impl From<sqlx::Error> for ScannerError {
    fn from(e: sqlx::Error) -> Self {
        ScannerError::Store(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
