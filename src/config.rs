//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section has defaults so a partial file is valid. Secrets (RPC keys) are
//! referenced by env-var name in the config and resolved at runtime.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::ScannerError;

/// Env var overriding the config file path.
pub const CONFIG_PATH_ENV: &str = "PAIRWATCH_CONFIG";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub scanner: ScannerConfig,
    pub removal: RemovalConfig,
    pub providers: ProvidersConfig,
    pub rpc: RpcConfig,
    pub storage: StorageConfig,
    pub status: StatusConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScannerConfig {
    pub rescan_interval_secs: u64,
    pub condition_check_interval_secs: u64,
    pub max_rescan_count: i64,
    pub honeypot_failure_limit: i64,
    pub liquidity_sample_multiplier: i64,
    /// Pause between tokens within one rescan sweep.
    pub rescan_token_delay_secs: u64,
    /// Pause between admitted pairs from the discovery feed.
    pub discovery_token_delay_secs: u64,
    pub pass_timeout_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            rescan_interval_secs: 300,
            condition_check_interval_secs: 300,
            max_rescan_count: 1000,
            honeypot_failure_limit: 5,
            liquidity_sample_multiplier: 1,
            rescan_token_delay_secs: 5,
            discovery_token_delay_secs: 30,
            pass_timeout_secs: 120,
        }
    }
}

impl ScannerConfig {
    pub fn pass_timeout(&self) -> Duration {
        Duration::from_secs(self.pass_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RemovalConfig {
    /// Age above which a confirmed honeypot is removed.
    pub honeypot_min_age_hours: f64,
    /// Age above which a low-liquidity token is considered stale.
    pub max_age_hours: f64,
    pub min_liquidity: f64,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            honeypot_min_age_hours: 1.0,
            max_age_hours: 1.0,
            min_liquidity: 10_000.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub honeypot: HoneypotProviderConfig,
    pub security: SecurityProviderConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HoneypotProviderConfig {
    pub base_url: String,
    pub pre_delay_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for HoneypotProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.honeypot.is".into(),
            pre_delay_secs: 5,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SecurityProviderConfig {
    pub base_url: String,
    pub chain_id: String,
    pub pre_delay_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for SecurityProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.gopluslabs.io".into(),
            chain_id: "1".into(),
            pre_delay_secs: 5,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RpcConfig {
    pub enabled: bool,
    /// Endpoint prefix; the active key is appended.
    pub base_url: String,
    /// Env var holding a comma-separated list of RPC keys.
    pub keys_env: String,
    pub rotation_interval_secs: u64,
    pub swap_cooldown_secs: u64,
    pub poll_interval_secs: u64,
    pub backfill_hours: f64,
    pub factory_address: String,
    pub weth_address: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://mainnet.infura.io/v3/".into(),
            keys_env: "PAIRWATCH_RPC_KEYS".into(),
            rotation_interval_secs: 3600,
            swap_cooldown_secs: 2,
            poll_interval_secs: 1,
            backfill_hours: 0.0,
            factory_address: "0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f".into(),
            weth_address: "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/scan_records.db"),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StatusConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8088,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Config path from `PAIRWATCH_CONFIG`, else `config.toml`.
    pub fn default_path() -> String {
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string())
    }

    pub fn validate(&self) -> Result<(), ScannerError> {
        if self.scanner.liquidity_sample_multiplier <= 0 {
            return Err(ScannerError::Config(
                "scanner.liquidity_sample_multiplier must be positive".into(),
            ));
        }
        if self.scanner.honeypot_failure_limit <= 0 {
            return Err(ScannerError::Config(
                "scanner.honeypot_failure_limit must be positive".into(),
            ));
        }
        if self.scanner.rescan_interval_secs == 0 || self.scanner.condition_check_interval_secs == 0 {
            return Err(ScannerError::Config(
                "scanner rescan and condition intervals must be positive".into(),
            ));
        }
        if self.scanner.pass_timeout_secs == 0 {
            return Err(ScannerError::Config(
                "scanner.pass_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
