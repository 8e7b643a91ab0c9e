//! RPC credential rotation.
//!
//! Holds an ordered pool of RPC keys and the index of the active one.
//! Rotation happens on a timer (`rotate_if_due`) or on demand after an
//! upstream rate limit (`rotate`). Constructed once at startup and shared
//! as an `Arc` with every component that talks to the RPC node.
//!
//! Keys are `SecretString`s; only the key index is ever logged.

use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::info;

use crate::config::{AppConfig, RpcConfig};
use crate::types::ScannerError;

struct RotationState {
    index: usize,
    last_rotation: Instant,
}

pub struct CredentialRotator {
    base_url: String,
    keys: Vec<SecretString>,
    state: Mutex<RotationState>,
    rotation_interval: Duration,
    swap_cooldown: Duration,
}

impl fmt::Debug for CredentialRotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRotator")
            .field("base_url", &self.base_url)
            .field("keys", &self.keys.len())
            .field("current_index", &self.current_index())
            .finish()
    }
}

impl CredentialRotator {
    pub fn new(
        base_url: impl Into<String>,
        keys: Vec<SecretString>,
        rotation_interval: Duration,
        swap_cooldown: Duration,
    ) -> Result<Self, ScannerError> {
        if keys.is_empty() {
            return Err(ScannerError::Config("no RPC keys configured".into()));
        }
        Ok(Self {
            base_url: base_url.into(),
            keys,
            state: Mutex::new(RotationState {
                index: 0,
                last_rotation: Instant::now(),
            }),
            rotation_interval,
            swap_cooldown,
        })
    }

    /// Build from `[rpc]`, reading the comma-separated key list from the
    /// env var named by `keys_env`.
    pub fn from_config(config: &RpcConfig) -> Result<Self> {
        let raw = AppConfig::resolve_env(&config.keys_env)?;
        let keys = parse_keys(&raw);
        let rotator = Self::new(
            config.base_url.clone(),
            keys,
            Duration::from_secs(config.rotation_interval_secs),
            Duration::from_secs(config.swap_cooldown_secs),
        )?;
        info!(keys = rotator.key_count(), "RPC credential pool loaded");
        Ok(rotator)
    }

    /// Full endpoint URL for the active key.
    pub fn current_endpoint(&self) -> String {
        let index = self.current_index();
        format!("{}{}", self.base_url, self.keys[index].expose_secret())
    }

    pub fn current_index(&self) -> usize {
        self.lock().index
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Advance to the next key, then wait out the swap cool-down.
    pub async fn rotate(&self) {
        let index = {
            let mut state = self.lock();
            self.advance(&mut state)
        };
        info!(key_index = index, keys = self.keys.len(), "RPC credential rotated");
        self.cool_down().await;
    }

    /// Rotate only if the active key has been in use longer than the
    /// rotation interval. Returns whether a rotation happened.
    pub async fn rotate_if_due(&self) -> bool {
        let rotated = {
            let mut state = self.lock();
            if state.last_rotation.elapsed() > self.rotation_interval {
                Some(self.advance(&mut state))
            } else {
                None
            }
        };
        match rotated {
            Some(index) => {
                info!(key_index = index, "Scheduled RPC credential rotation");
                self.cool_down().await;
                true
            }
            None => false,
        }
    }

    fn advance(&self, state: &mut RotationState) -> usize {
        state.index = (state.index + 1) % self.keys.len();
        state.last_rotation = Instant::now();
        state.index
    }

    async fn cool_down(&self) {
        if !self.swap_cooldown.is_zero() {
            tokio::time::sleep(self.swap_cooldown).await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RotationState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Split a comma-separated key list, dropping blanks.
pub fn parse_keys(raw: &str) -> Vec<SecretString> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|k| SecretString::new(k.to_string()))
        .collect()
}
