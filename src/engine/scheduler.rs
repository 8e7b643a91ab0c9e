//! Periodic rescans and condition sweeps.
//!
//! Two independent timers: the rescan timer re-feeds every eligible active
//! token through the pipeline (oldest scan first, paced by a fixed
//! inter-token delay); the condition timer applies the stale rule.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

use super::pipeline::ClassificationPipeline;
use super::sleep_or_shutdown;
use crate::config::ScannerConfig;
use crate::storage::TokenStore;
use crate::types::{PairEvent, ScannerError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RescanSummary {
    pub selected: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct RescanScheduler {
    pipeline: Arc<ClassificationPipeline>,
    store: TokenStore,
    max_rescan_count: i64,
    token_delay: Duration,
    rescan_interval: Duration,
    condition_interval: Duration,
}

impl RescanScheduler {
    pub fn new(
        pipeline: Arc<ClassificationPipeline>,
        store: TokenStore,
        config: &ScannerConfig,
    ) -> Self {
        Self {
            pipeline,
            store,
            max_rescan_count: config.max_rescan_count,
            token_delay: Duration::from_secs(config.rescan_token_delay_secs),
            rescan_interval: Duration::from_secs(config.rescan_interval_secs),
            condition_interval: Duration::from_secs(config.condition_check_interval_secs),
        }
    }

    /// Override the inter-token pacing delay.
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    /// Active tokens due for a rescan, least recently scanned first.
    pub async fn sweep(&self) -> Result<Vec<PairEvent>, ScannerError> {
        let records = self.store.list_rescan_candidates(self.max_rescan_count).await?;
        Ok(records.iter().map(|r| r.as_event()).collect())
    }

    /// One rescan round. Stops early on shutdown.
    pub async fn rescan_once(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<RescanSummary, ScannerError> {
        let targets = self.sweep().await?;
        let mut summary = RescanSummary {
            selected: targets.len(),
            ..RescanSummary::default()
        };
        info!(tokens = targets.len(), "Starting rescan round");

        for (i, event) in targets.iter().enumerate() {
            if i > 0 && sleep_or_shutdown(self.token_delay, shutdown).await {
                info!("Rescan round interrupted by shutdown");
                break;
            }
            if *shutdown.borrow() {
                break;
            }
            if self.pipeline.process(event).await {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
        }

        info!(
            selected = summary.selected,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Rescan round complete"
        );
        Ok(summary)
    }

    /// Drive both timers until shutdown. The first tick of each fires one
    /// full period after start.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let start = Instant::now();
        let mut rescan = interval_at(start + self.rescan_interval, self.rescan_interval);
        let mut conditions = interval_at(start + self.condition_interval, self.condition_interval);
        rescan.set_missed_tick_behavior(MissedTickBehavior::Delay);
        conditions.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            rescan_secs = self.rescan_interval.as_secs(),
            condition_secs = self.condition_interval.as_secs(),
            max_rescans = self.max_rescan_count,
            "Rescan scheduler started"
        );

        loop {
            tokio::select! {
                _ = rescan.tick() => {
                    if let Err(e) = self.rescan_once(&mut shutdown).await {
                        error!(error = %e, "Rescan round failed");
                    }
                }
                _ = conditions.tick() => {
                    if let Err(e) = self.pipeline.sweep_conditions().await {
                        error!(error = %e, "Condition sweep failed");
                    }
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Rescan scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::pipeline::PipelineSettings;
    use crate::engine::rules::RemovalRules;
    use crate::providers::RiskProvider;
    use crate::types::{Fetched, HoneypotReport, SecurityReport, TokenRecord, TokenStatus};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    /// Records the order of fetched addresses.
    struct Recording {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl RiskProvider<HoneypotReport> for Recording {
        async fn fetch(&self, address: &str) -> Fetched<HoneypotReport> {
            self.seen.lock().unwrap().push(address.to_string());
            Fetched::Success(HoneypotReport {
                is_honeypot: false,
                pair_liquidity: 50_000.0,
                ..HoneypotReport::default()
            })
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    struct EmptySecurity;

    #[async_trait]
    impl RiskProvider<SecurityReport> for EmptySecurity {
        async fn fetch(&self, _address: &str) -> Fetched<SecurityReport> {
            Fetched::Empty
        }

        fn name(&self) -> &str {
            "empty"
        }
    }

    async fn setup() -> (RescanScheduler, TokenStore, Arc<Mutex<Vec<String>>>) {
        let store = TokenStore::in_memory().await.unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Arc::new(ClassificationPipeline::new(
            Arc::new(Recording { seen: seen.clone() }),
            Arc::new(EmptySecurity),
            store.clone(),
            RemovalRules::default(),
            PipelineSettings::default(),
        ));
        let config = ScannerConfig {
            max_rescan_count: 3,
            ..ScannerConfig::default()
        };
        let scheduler =
            RescanScheduler::new(pipeline, store.clone(), &config).with_token_delay(Duration::ZERO);
        (scheduler, store, seen)
    }

    fn active(address: &str, minutes_ago: i64, scans: i64) -> TokenRecord {
        let at = Utc::now() - chrono::Duration::minutes(minutes_ago);
        let mut r = TokenRecord::new(&PairEvent::new(address, "0xpair"), at);
        r.status = TokenStatus::Active;
        r.total_scans = scans;
        r
    }

    #[tokio::test]
    async fn test_sweep_orders_oldest_first_and_skips_capped() {
        let (scheduler, store, _) = setup().await;
        store.upsert(&active("0xb", 10, 1)).await.unwrap();
        store.upsert(&active("0xa", 20, 1)).await.unwrap();
        store.upsert(&active("0xcapped", 30, 3)).await.unwrap();

        let events = scheduler.sweep().await.unwrap();
        let order: Vec<&str> = events.iter().map(|e| e.token_address.as_str()).collect();
        assert_eq!(order, vec!["0xa", "0xb"]);
        assert_eq!(events[0].pair_address, "0xpair");
    }

    #[tokio::test]
    async fn test_rescan_once_feeds_pipeline_in_order() {
        let (scheduler, store, seen) = setup().await;
        store.upsert(&active("0xnew", 1, 1)).await.unwrap();
        store.upsert(&active("0xold", 60, 1)).await.unwrap();

        let (_tx, mut rx) = watch::channel(false);
        let summary = scheduler.rescan_once(&mut rx).await.unwrap();
        assert_eq!(summary.selected, 2);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(*seen.lock().unwrap(), vec!["0xold", "0xnew"]);
        assert_eq!(store.get("0xold").await.unwrap().unwrap().total_scans, 2);
    }

    #[tokio::test]
    async fn test_rescan_once_stops_on_shutdown() {
        let (scheduler, store, seen) = setup().await;
        store.upsert(&active("0x1", 5, 1)).await.unwrap();

        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        let summary = scheduler.rescan_once(&mut rx).await.unwrap();
        assert_eq!(summary.succeeded + summary.failed, 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown() {
        let (scheduler, _store, _) = setup().await;
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { scheduler.run(rx).await });
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }
}
