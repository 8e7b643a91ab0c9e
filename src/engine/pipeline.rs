//! Classification pipeline: one admitted token at a time.
//!
//! Discovery and rescans both enter through `classify`, which holds a
//! global single-permit gate for the whole pass: both provider fetches
//! (concurrently, under one shared deadline), the merge, the upsert and the
//! terminal-transition check. The periodic condition sweep takes the same
//! gate. Shutdown stops admissions, waits for the in-flight pass and then
//! closes the gate.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::merge::merge;
use super::rules::RemovalRules;
use crate::config::AppConfig;
use crate::providers::{HoneypotProvider, SecurityProvider};
use crate::storage::{HistoryEntry, TokenStore};
use crate::types::{
    Fetched, PairEvent, Removal, ScanResult, ScannerError, TokenRecord, TokenStatus,
};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Wall-clock budget for both provider fetches of one pass.
    pub pass_timeout: Duration,
    pub liquidity_multiplier: i64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            pass_timeout: Duration::from_secs(120),
            liquidity_multiplier: 1,
        }
    }
}

/// Result of one `classify` call.
#[derive(Debug, Clone)]
pub enum PassOutcome {
    Scanned(ScannedToken),
    Skipped(SkipReason),
}

#[derive(Debug, Clone)]
pub struct ScannedToken {
    pub record: TokenRecord,
    /// A provider errored or timed out.
    pub failed: bool,
    /// Terminal transition applied by this pass.
    pub removal: Option<Removal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ShuttingDown,
    AlreadyRemoved,
}

pub struct ClassificationPipeline {
    honeypot: Arc<HoneypotProvider>,
    security: Arc<SecurityProvider>,
    store: TokenStore,
    rules: RemovalRules,
    settings: PipelineSettings,
    gate: Semaphore,
    accepting: AtomicBool,
}

impl ClassificationPipeline {
    pub fn new(
        honeypot: Arc<HoneypotProvider>,
        security: Arc<SecurityProvider>,
        store: TokenStore,
        rules: RemovalRules,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            honeypot,
            security,
            store,
            rules,
            settings,
            gate: Semaphore::new(1),
            accepting: AtomicBool::new(true),
        }
    }

    pub fn from_config(
        config: &AppConfig,
        honeypot: Arc<HoneypotProvider>,
        security: Arc<SecurityProvider>,
        store: TokenStore,
    ) -> Self {
        let rules = RemovalRules::from_config(&config.removal, &config.scanner);
        let settings = PipelineSettings {
            pass_timeout: config.scanner.pass_timeout(),
            liquidity_multiplier: config.scanner.liquidity_sample_multiplier,
        };
        Self::new(honeypot, security, store, rules, settings)
    }

    pub fn rules(&self) -> &RemovalRules {
        &self.rules
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Run one classification pass for `event`.
    ///
    /// Waits for the gate. Returns `Err` only when persisting the pass
    /// fails; the token then keeps its last stored state.
    pub async fn classify(&self, event: &PairEvent) -> Result<PassOutcome, ScannerError> {
        let Ok(_permit) = self.gate.acquire().await else {
            return Ok(PassOutcome::Skipped(SkipReason::ShuttingDown));
        };
        if !self.is_accepting() {
            return Ok(PassOutcome::Skipped(SkipReason::ShuttingDown));
        }

        let span = info_span!(
            "pass",
            pass_id = %Uuid::new_v4(),
            address = %event.token_address
        );
        self.run_pass(event).instrument(span).await
    }

    /// `classify`, reduced to pass/fail for the feed and rescan loops.
    pub async fn process(&self, event: &PairEvent) -> bool {
        match self.classify(event).await {
            Ok(PassOutcome::Scanned(scanned)) => !scanned.failed,
            Ok(PassOutcome::Skipped(reason)) => {
                debug!(address = %event.token_address, ?reason, "Pass skipped");
                false
            }
            Err(e) => {
                error!(
                    address = %event.token_address,
                    error = %e,
                    "Classification pass could not be persisted"
                );
                false
            }
        }
    }

    async fn run_pass(&self, event: &PairEvent) -> Result<PassOutcome, ScannerError> {
        let address = event.token_address.as_str();

        if self.store.is_removed(address).await? {
            debug!("Token already removed, not re-admitting");
            return Ok(PassOutcome::Skipped(SkipReason::AlreadyRemoved));
        }

        let existing = self.store.get(address).await?;
        let scan = self.scan(address).await;
        let failed = scan.is_failed();

        let mut record = merge(existing, event, &scan, self.settings.liquidity_multiplier);
        record.status = TokenStatus::Active;
        self.store.upsert(&record).await?;

        let entry = HistoryEntry::from_record(&record, scan.completed_at, failed);
        if let Err(e) = self.store.record_history(&entry).await {
            warn!(error = %e, "Failed to append scan history");
        }

        let mut removal = None;
        if let Some((kind, reason)) = self.rules.evaluate_pass(&record, failed) {
            if self.store.move_to_removed(address, kind, &reason).await? {
                warn!(status = %kind.status(), reason = %reason, "Token removed");
                record.status = kind.status();
                removal = Some(kind);
            }
        }

        if failed {
            warn!(
                total_scans = record.total_scans,
                failures = record.honeypot_failures,
                error = record.last_error.as_deref().unwrap_or(""),
                "Classification pass failed"
            );
        } else {
            info!(
                symbol = record.symbol.as_deref().unwrap_or("?"),
                total_scans = record.total_scans,
                is_honeypot = record.is_honeypot(),
                liquidity = record.current_liquidity().unwrap_or(0.0),
                age_hours = record.age_hours.unwrap_or(-1.0),
                "Classification pass complete"
            );
        }

        Ok(PassOutcome::Scanned(ScannedToken {
            record,
            failed,
            removal,
        }))
    }

    /// Both provider fetches, concurrently, under one deadline. A fetch
    /// that misses the deadline counts as an error.
    async fn scan(&self, address: &str) -> ScanResult {
        let deadline = Instant::now() + self.settings.pass_timeout;
        let (honeypot, security) = tokio::join!(
            timeout_at(deadline, self.honeypot.fetch(address)),
            timeout_at(deadline, self.security.fetch(address)),
        );

        let honeypot = honeypot.unwrap_or_else(|_| {
            warn!(provider = self.honeypot.name(), "Provider fetch timed out");
            Fetched::Error(ScannerError::Timeout.to_string())
        });
        let security = security.unwrap_or_else(|_| {
            warn!(provider = self.security.name(), "Provider fetch timed out");
            Fetched::Error(ScannerError::Timeout.to_string())
        });

        ScanResult {
            honeypot,
            security,
            completed_at: Utc::now(),
        }
    }

    /// Apply the stale rule to every active token. Holds the gate for the
    /// whole sweep. Returns how many tokens were removed.
    pub async fn sweep_conditions(&self) -> Result<usize, ScannerError> {
        let Ok(_permit) = self.gate.acquire().await else {
            return Ok(0);
        };
        if !self.is_accepting() {
            return Ok(0);
        }

        let now = Utc::now();
        let active = self.store.list_active().await?;
        let mut removed = 0;

        for record in &active {
            let Some((kind, reason)) = self.rules.evaluate_stale(record, now) else {
                continue;
            };
            match self.store.move_to_removed(&record.address, kind, &reason).await {
                Ok(true) => {
                    warn!(address = %record.address, reason = %reason, "Stale token removed");
                    removed += 1;
                }
                Ok(false) => {}
                Err(e) => error!(address = %record.address, error = %e, "Stale removal failed"),
            }
        }

        info!(checked = active.len(), removed, "Condition sweep complete");
        Ok(removed)
    }

    /// Stop admissions, wait for the in-flight pass, then close the gate.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        if let Ok(permit) = self.gate.acquire().await {
            drop(permit);
        }
        self.gate.close();
        info!("Classification pipeline drained");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::RiskProvider;
    use crate::types::{HoneypotReport, SecurityReport};
    use async_trait::async_trait;

    struct Fixed<R> {
        result: Fetched<R>,
        delay: Duration,
    }

    #[async_trait]
    impl<R: Clone + Send + Sync + 'static> RiskProvider<R> for Fixed<R> {
        async fn fetch(&self, _address: &str) -> Fetched<R> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.result.clone()
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn ok_honeypot() -> Arc<HoneypotProvider> {
        Arc::new(Fixed {
            result: Fetched::Success(HoneypotReport {
                pair_liquidity: 25_000.0,
                is_honeypot: false,
                ..HoneypotReport::default()
            }),
            delay: Duration::ZERO,
        })
    }

    fn ok_security(delay: Duration) -> Arc<SecurityProvider> {
        Arc::new(Fixed {
            result: Fetched::Success(SecurityReport::default()),
            delay,
        })
    }

    async fn pipeline(security: Arc<SecurityProvider>, timeout: Duration) -> ClassificationPipeline {
        let store = TokenStore::in_memory().await.unwrap();
        ClassificationPipeline::new(
            ok_honeypot(),
            security,
            store,
            RemovalRules::default(),
            PipelineSettings {
                pass_timeout: timeout,
                liquidity_multiplier: 1,
            },
        )
    }

    #[tokio::test]
    async fn test_classify_persists_active_record() {
        let p = pipeline(ok_security(Duration::ZERO), Duration::from_secs(5)).await;
        let event = PairEvent::new("0xt", "0xp");

        let PassOutcome::Scanned(scanned) = p.classify(&event).await.unwrap() else {
            panic!("expected a scanned outcome");
        };
        assert!(!scanned.failed);
        assert_eq!(scanned.record.status, TokenStatus::Active);

        let stored = p.store.get("0xt").await.unwrap().unwrap();
        assert_eq!(stored.total_scans, 1);
        assert_eq!(stored.status, TokenStatus::Active);
        assert_eq!(stored.current_liquidity(), Some(25_000.0));
        assert_eq!(p.store.history("0xt").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let p = pipeline(ok_security(Duration::from_secs(30)), Duration::from_millis(50)).await;
        let event = PairEvent::new("0xslow", "0xp");

        assert!(!p.process(&event).await);
        let stored = p.store.get("0xslow").await.unwrap().unwrap();
        assert_eq!(stored.total_scans, 1);
        assert_eq!(stored.honeypot_failures, 1);
        assert!(stored
            .last_error
            .as_deref()
            .unwrap()
            .contains("Classification pass timed out"));
        assert_eq!(stored.status, TokenStatus::Active);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_passes() {
        let p = pipeline(ok_security(Duration::ZERO), Duration::from_secs(5)).await;
        p.shutdown().await;
        assert!(!p.is_accepting());

        let outcome = p.classify(&PairEvent::new("0xlate", "0xp")).await.unwrap();
        assert!(matches!(outcome, PassOutcome::Skipped(SkipReason::ShuttingDown)));
        assert!(p.store.get("0xlate").await.unwrap().is_none());
        assert_eq!(p.sweep_conditions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_pass() {
        let p = Arc::new(
            pipeline(ok_security(Duration::from_millis(150)), Duration::from_secs(5)).await,
        );
        let event = PairEvent::new("0xinflight", "0xp");

        let worker = {
            let p = p.clone();
            let event = event.clone();
            tokio::spawn(async move { p.process(&event).await })
        };
        // Let the pass take the gate.
        tokio::time::sleep(Duration::from_millis(30)).await;
        p.shutdown().await;

        // The pass finished and persisted before shutdown returned.
        assert!(p.store.get("0xinflight").await.unwrap().is_some());
        assert!(worker.await.unwrap());
    }

    #[tokio::test]
    async fn test_removed_token_not_readmitted() {
        let p = pipeline(ok_security(Duration::ZERO), Duration::from_secs(5)).await;
        let event = PairEvent::new("0xgone", "0xp");
        p.classify(&event).await.unwrap();
        p.store
            .move_to_removed("0xgone", Removal::Stale, "manual")
            .await
            .unwrap();

        let outcome = p.classify(&event).await.unwrap();
        assert!(matches!(outcome, PassOutcome::Skipped(SkipReason::AlreadyRemoved)));
        assert!(p.store.get("0xgone").await.unwrap().is_none());
    }
}
