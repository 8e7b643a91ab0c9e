//! Terminal-transition rules.

use chrono::{DateTime, Utc};

use crate::config::{RemovalConfig, ScannerConfig};
use crate::types::{Removal, TokenRecord};

/// Thresholds for the three terminal transitions.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovalRules {
    pub honeypot_min_age_hours: f64,
    pub max_age_hours: f64,
    pub min_liquidity: f64,
    pub failure_limit: i64,
}

impl Default for RemovalRules {
    fn default() -> Self {
        Self::from_config(&RemovalConfig::default(), &ScannerConfig::default())
    }
}

impl RemovalRules {
    pub fn from_config(removal: &RemovalConfig, scanner: &ScannerConfig) -> Self {
        Self {
            honeypot_min_age_hours: removal.honeypot_min_age_hours,
            max_age_hours: removal.max_age_hours,
            min_liquidity: removal.min_liquidity,
            failure_limit: scanner.honeypot_failure_limit,
        }
    }

    /// Old enough and flagged honeypot by the simulation provider.
    pub fn is_confirmed_honeypot(&self, record: &TokenRecord) -> bool {
        matches!(record.age_hours, Some(age) if age > self.honeypot_min_age_hours)
            && record.is_honeypot()
    }

    /// Failure count at the limit on a token whose stored flag is honeypot.
    pub fn hit_failure_limit(&self, record: &TokenRecord) -> bool {
        record.honeypot_failures >= self.failure_limit && record.is_honeypot()
    }

    /// Age at `now`, from the stored pair-creation time when available.
    pub fn age_at(&self, record: &TokenRecord, now: DateTime<Utc>) -> Option<f64> {
        record
            .honeypot
            .as_ref()
            .and_then(|r| r.age_hours(now))
            .or(record.age_hours)
    }

    /// Past the maximum age with liquidity under the minimum.
    pub fn is_stale(&self, record: &TokenRecord, now: DateTime<Utc>) -> bool {
        match (self.age_at(record, now), record.current_liquidity()) {
            (Some(age), Some(liquidity)) => {
                age > self.max_age_hours && liquidity < self.min_liquidity
            }
            _ => false,
        }
    }

    /// Transition due after a classification pass. Successful passes can
    /// only confirm a honeypot; failed passes can only hit the failure limit.
    pub fn evaluate_pass(&self, record: &TokenRecord, failed: bool) -> Option<(Removal, String)> {
        if failed {
            self.hit_failure_limit(record)
                .then(|| (Removal::FailureLimit, self.failure_limit_reason()))
        } else {
            self.is_confirmed_honeypot(record)
                .then(|| (Removal::Honeypot, self.honeypot_reason()))
        }
    }

    /// Transition due from the periodic condition sweep.
    pub fn evaluate_stale(
        &self,
        record: &TokenRecord,
        now: DateTime<Utc>,
    ) -> Option<(Removal, String)> {
        if !self.is_stale(record, now) {
            return None;
        }
        let age = self.age_at(record, now).unwrap_or_default();
        let liquidity = record.current_liquidity().unwrap_or_default();
        Some((Removal::Stale, self.stale_reason(age, liquidity)))
    }

    pub fn honeypot_reason(&self) -> String {
        format!(
            "Token age > {}hr and confirmed honeypot",
            self.honeypot_min_age_hours
        )
    }

    pub fn failure_limit_reason(&self) -> String {
        format!("Exceeded honeypot failure limit ({})", self.failure_limit)
    }

    pub fn stale_reason(&self, age: f64, liquidity: f64) -> String {
        format!(
            "Token age {age:.2}h > {}h and liquidity ${liquidity:.2} < ${:.2}",
            self.max_age_hours, self.min_liquidity
        )
    }
}
