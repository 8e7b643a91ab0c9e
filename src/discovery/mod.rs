//! New-pair discovery.
//!
//! Defines the `DiscoverySource` trait the feed loop polls, and provides:
//! - `PairCreatedPoller`: Uniswap V2 factory `PairCreated` logs over JSON-RPC

pub mod pair_created;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::PairEvent;

pub use pair_created::PairCreatedPoller;

/// A source of newly created (token, pair) couples.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DiscoverySource: Send {
    /// Events observed since the previous poll. Deduplication is the
    /// source's job.
    async fn poll(&mut self) -> Result<Vec<PairEvent>>;
}
