//! Mock risk providers for integration testing.
//!
//! `ScriptedProvider` replays a queue of canned responses, then repeats a
//! fallback. It counts calls and tracks how many fetches were in flight at
//! once, all in-memory with no external dependencies.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pairwatch::engine::pipeline::{ClassificationPipeline, PipelineSettings};
use pairwatch::engine::rules::RemovalRules;
use pairwatch::providers::RiskProvider;
use pairwatch::storage::TokenStore;
use pairwatch::types::{Fetched, HoneypotReport, SecurityReport, TokenInfo};

pub struct ScriptedProvider<R> {
    name: String,
    script: Mutex<VecDeque<Fetched<R>>>,
    fallback: Mutex<Fetched<R>>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl<R: Clone> ScriptedProvider<R> {
    pub fn new(name: &str, fallback: Fetched<R>) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue responses served before the fallback.
    pub fn then(self, responses: impl IntoIterator<Item = Fetched<R>>) -> Self {
        self.script.lock().unwrap().extend(responses);
        self
    }

    /// Replace the fallback for all subsequent calls.
    pub fn set_fallback(&self, fallback: Fetched<R>) {
        *self.fallback.lock().unwrap() = fallback;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next(&self) -> Fetched<R> {
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.fallback.lock().unwrap().clone())
    }
}

#[async_trait]
impl<R: Clone + Send + Sync + 'static> RiskProvider<R> for ScriptedProvider<R> {
    async fn fetch(&self, _address: &str) -> Fetched<R> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = self.next();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A simulation report for a pair created `age_minutes` ago.
pub fn honeypot_report(is_honeypot: bool, liquidity: f64, age_minutes: i64) -> HoneypotReport {
    HoneypotReport {
        token: TokenInfo {
            name: Some("Mock Token".into()),
            symbol: Some("MOCK".into()),
            decimals: Some(18),
            total_supply: Some("1000000000000000000000000".into()),
            total_holders: Some(42),
        },
        simulation_success: true,
        pair_liquidity: liquidity,
        pair_created_at: Some(Utc::now() - ChronoDuration::minutes(age_minutes)),
        is_honeypot,
        ..HoneypotReport::default()
    }
}

pub fn security_report() -> SecurityReport {
    SecurityReport {
        token_name: Some("Mock Token".into()),
        token_symbol: Some("MOCK".into()),
        is_open_source: true,
        ..SecurityReport::default()
    }
}

pub struct Harness {
    pub pipeline: Arc<ClassificationPipeline>,
    pub store: TokenStore,
    pub honeypot: Arc<ScriptedProvider<HoneypotReport>>,
    pub security: Arc<ScriptedProvider<SecurityReport>>,
}

pub async fn harness(
    honeypot: ScriptedProvider<HoneypotReport>,
    security: ScriptedProvider<SecurityReport>,
    rules: RemovalRules,
    settings: PipelineSettings,
) -> Harness {
    let store = TokenStore::in_memory().await.unwrap();
    let honeypot = Arc::new(honeypot);
    let security = Arc::new(security);
    let pipeline = Arc::new(ClassificationPipeline::new(
        honeypot.clone(),
        security.clone(),
        store.clone(),
        rules,
        settings,
    ));
    Harness {
        pipeline,
        store,
        honeypot,
        security,
    }
}
