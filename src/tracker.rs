//! Process-wide provider call accounting.
//!
//! One `CallTracker` is created at startup and handed to every provider
//! client as an `Arc`. It counts calls per endpoint by outcome and is read
//! once more at shutdown for the final report.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::types::CallOutcome;

/// Counters for one provider endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EndpointStats {
    pub total: u64,
    pub success: u64,
    pub empty: u64,
    pub errors: u64,
    pub rate_limited: u64,
    pub last_call_at: Option<DateTime<Utc>>,
}

impl EndpointStats {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.success as f64 / self.total as f64
        }
    }
}

/// Shared call counters. Cheap to record into from any task.
#[derive(Debug, Default)]
pub struct CallTracker {
    stats: Mutex<BTreeMap<String, EndpointStats>>,
    next_call_id: AtomicU64,
}

impl CallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call and return its call id for log correlation.
    pub fn record(&self, endpoint: &str, outcome: CallOutcome) -> u64 {
        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed) + 1;
        let now = Utc::now();

        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        let entry = stats.entry(endpoint.to_string()).or_default();
        let since_last = entry
            .last_call_at
            .map(|prev| (now - prev).num_milliseconds() as f64 / 1000.0);

        entry.total += 1;
        match outcome {
            CallOutcome::Success => entry.success += 1,
            CallOutcome::Empty => entry.empty += 1,
            CallOutcome::RateLimited => entry.rate_limited += 1,
            CallOutcome::Error => entry.errors += 1,
        }
        entry.last_call_at = Some(now);

        debug!(
            call_id,
            endpoint,
            outcome = %outcome,
            since_last_secs = since_last.unwrap_or(0.0),
            "Provider call recorded"
        );
        call_id
    }

    /// Copy of the counters for one endpoint.
    pub fn get(&self, endpoint: &str) -> EndpointStats {
        let stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        stats.get(endpoint).cloned().unwrap_or_default()
    }

    /// Copy of every endpoint's counters, keyed by endpoint name.
    pub fn snapshot(&self) -> BTreeMap<String, EndpointStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn total_calls(&self) -> u64 {
        self.next_call_id.load(Ordering::Relaxed)
    }

    /// Emit the per-endpoint report. Called once at shutdown.
    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            info!("No provider calls were made");
            return;
        }
        for (endpoint, s) in &snapshot {
            info!(
                endpoint = %endpoint,
                total = s.total,
                success = s.success,
                empty = s.empty,
                errors = s.errors,
                rate_limited = s.rate_limited,
                success_rate = %format!("{:.1}%", s.success_rate() * 100.0),
                "Provider call summary"
            );
        }
    }
}
