//! Uniswap V2 `PairCreated` poller.
//!
//! Polls `eth_getLogs` on the factory for the `PairCreated(address,address,
//! address,uint256)` event, keeps pairs quoted against WETH and emits the
//! non-WETH side with its pair address. On the first poll it optionally
//! backfills a window of history.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::DiscoverySource;
use crate::config::RpcConfig;
use crate::rpc::{RpcClient, RpcLog};
use crate::types::PairEvent;

/// keccak256("PairCreated(address,address,address,uint256)")
pub const PAIR_CREATED_TOPIC: &str =
    "0x0d3648bd0f6ba80134a33ba9275ac585d9d315f0ad8355cddefde31afa28d0e9";

/// Mainnet blocks per hour at ~13 s block time.
pub const BLOCKS_PER_HOUR: u64 = 277;

/// Widest block range requested in one `eth_getLogs`.
const MAX_LOG_RANGE: u64 = 2_000;

pub struct PairCreatedPoller {
    rpc: Arc<RpcClient>,
    factory: String,
    weth: String,
    backfill_blocks: u64,
    /// First block not yet scanned. Each block range is fetched once,
    /// so no pair is emitted twice.
    next_block: Option<u64>,
}

impl PairCreatedPoller {
    pub fn new(rpc: Arc<RpcClient>, config: &RpcConfig) -> Self {
        let backfill_blocks = (config.backfill_hours.max(0.0) * BLOCKS_PER_HOUR as f64).round() as u64;
        Self {
            rpc,
            factory: config.factory_address.clone(),
            weth: config.weth_address.to_lowercase(),
            backfill_blocks,
            next_block: None,
        }
    }
}

#[async_trait]
impl DiscoverySource for PairCreatedPoller {
    async fn poll(&mut self) -> Result<Vec<PairEvent>> {
        let latest = self.rpc.block_number().await?;
        let from = match self.next_block {
            Some(next) => next,
            None => {
                let start = latest.saturating_sub(self.backfill_blocks);
                info!(
                    from_block = start,
                    latest,
                    backfill_blocks = self.backfill_blocks,
                    "Pair discovery starting"
                );
                start
            }
        };
        if from > latest {
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        let mut chunk_start = from;
        while chunk_start <= latest {
            let chunk_end = (chunk_start + MAX_LOG_RANGE - 1).min(latest);
            let logs = match self
                .rpc
                .get_logs(&self.factory, PAIR_CREATED_TOPIC, chunk_start, chunk_end)
                .await
            {
                Ok(logs) => logs,
                Err(e) if events.is_empty() => return Err(e.into()),
                Err(e) => {
                    // Hand back what earlier chunks found; the cursor still
                    // points at the failed chunk, so the next poll retries it.
                    warn!(
                        from_block = chunk_start,
                        to_block = chunk_end,
                        error = %e,
                        "Log chunk failed, returning partial batch"
                    );
                    break;
                }
            };
            events.extend(logs.iter().filter_map(|log| parse_pair_created(log, &self.weth)));
            self.next_block = Some(chunk_end + 1);
            chunk_start = chunk_end + 1;
        }

        if !events.is_empty() {
            info!(count = events.len(), to_block = ?self.next_block, "New WETH pairs discovered");
        } else {
            debug!(from_block = from, to_block = ?self.next_block, "No new pairs");
        }
        Ok(events)
    }
}

/// Decode one `PairCreated` log into the non-WETH token and the pair.
/// `None` for malformed logs and pairs not quoted in WETH.
pub fn parse_pair_created(log: &RpcLog, weth: &str) -> Option<PairEvent> {
    if log.topics.len() < 3 || !log.topics[0].eq_ignore_ascii_case(PAIR_CREATED_TOPIC) {
        return None;
    }
    let token0 = address_from_word(&log.topics[1])?;
    let token1 = address_from_word(&log.topics[2])?;

    let data = log.data.trim_start_matches("0x");
    let pair = address_from_word(data.get(..64)?)?;

    let weth = weth.to_lowercase();
    let token = if token0 == weth {
        token1
    } else if token1 == weth {
        token0
    } else {
        return None;
    };
    Some(PairEvent::new(token, pair))
}

/// Lower-case address from a 32-byte hex word (last 20 bytes).
fn address_from_word(word: &str) -> Option<String> {
    let hex = word.trim_start_matches("0x");
    if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{}", hex[24..].to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{parse_keys, CredentialRotator};
    use axum::{routing::post, Json, Router};
    use crate::rpc::parse_hex_u64;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const WETH: &str = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";
    const TOKEN: &str = "0x1111111111111111111111111111111111111111";
    const OTHER: &str = "0x2222222222222222222222222222222222222222";
    const PAIR: &str = "0x3333333333333333333333333333333333333333";

    fn word(address: &str) -> String {
        format!("0x{:0>64}", address.trim_start_matches("0x").to_lowercase())
    }

    fn log(token0: &str, token1: &str, pair: &str) -> RpcLog {
        RpcLog {
            address: "0x5c69bee701ef814a2b6a3edd4b1652cb9cc5aa6f".into(),
            topics: vec![PAIR_CREATED_TOPIC.into(), word(token0), word(token1)],
            data: format!(
                "0x{:0>64}{:0>64}",
                pair.trim_start_matches("0x"),
                "1a"
            ),
            block_number: Some("0x10".into()),
        }
    }

    #[test]
    fn test_parse_weth_as_token1() {
        let event = parse_pair_created(&log(TOKEN, WETH, PAIR), WETH).unwrap();
        assert_eq!(event.token_address, TOKEN);
        assert_eq!(event.pair_address, PAIR);
    }

    #[test]
    fn test_parse_weth_as_token0() {
        let event = parse_pair_created(&log(WETH, TOKEN, PAIR), WETH).unwrap();
        assert_eq!(event.token_address, TOKEN);
    }

    #[test]
    fn test_non_weth_pair_ignored() {
        assert!(parse_pair_created(&log(TOKEN, OTHER, PAIR), WETH).is_none());
    }

    #[test]
    fn test_malformed_logs_ignored() {
        let mut short = log(TOKEN, WETH, PAIR);
        short.topics.truncate(2);
        assert!(parse_pair_created(&short, WETH).is_none());

        let mut wrong_topic = log(TOKEN, WETH, PAIR);
        wrong_topic.topics[0] = word(OTHER);
        assert!(parse_pair_created(&wrong_topic, WETH).is_none());

        let mut no_data = log(TOKEN, WETH, PAIR);
        no_data.data = "0x".into();
        assert!(parse_pair_created(&no_data, WETH).is_none());
    }

    fn to_json(log: &RpcLog) -> Value {
        json!({
            "address": log.address,
            "topics": log.topics,
            "data": log.data,
            "blockNumber": log.block_number,
        })
    }

    type LogsFn = dyn Fn(u64) -> Option<Vec<RpcLog>> + Send + Sync;

    /// JSON-RPC node at height `latest`. `logs_for` maps an `eth_getLogs`
    /// `fromBlock` to its logs, or `None` for an RPC error.
    async fn serve_rpc(latest: u64, logs_for: Arc<LogsFn>) -> String {
        let router = Router::new().route(
            "/:key",
            post(move |Json(req): Json<Value>| {
                let logs_for = logs_for.clone();
                async move {
                    let result = match req["method"].as_str() {
                        Some("eth_blockNumber") => json!(format!("{latest:#x}")),
                        Some("eth_getLogs") => {
                            let from = req["params"][0]["fromBlock"].as_str().unwrap_or("0x0");
                            match logs_for(parse_hex_u64(from).unwrap()) {
                                Some(logs) => json!(logs.iter().map(to_json).collect::<Vec<_>>()),
                                None => {
                                    return Json(json!({
                                        "jsonrpc": "2.0",
                                        "id": req["id"],
                                        "error": {"code": -32000, "message": "header not found"}
                                    }))
                                }
                            }
                        }
                        _ => Value::Null,
                    };
                    Json(json!({"jsonrpc": "2.0", "id": req["id"], "result": result}))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/")
    }

    fn poller(base: String, backfill_hours: f64) -> PairCreatedPoller {
        let rotator = Arc::new(
            CredentialRotator::new(base, parse_keys("k"), Duration::from_secs(3600), Duration::ZERO)
                .unwrap(),
        );
        let rpc = Arc::new(RpcClient::new(rotator).unwrap());
        let config = RpcConfig {
            weth_address: WETH.into(),
            backfill_hours,
            ..RpcConfig::default()
        };
        PairCreatedPoller::new(rpc, &config)
    }

    #[tokio::test]
    async fn test_poll_emits_weth_pairs_once() {
        let logs = vec![log(TOKEN, WETH, PAIR), log(TOKEN, OTHER, OTHER)];
        let base = serve_rpc(100, Arc::new(move |_: u64| Some(logs.clone()))).await;
        let mut poller = poller(base, 1.0);
        assert_eq!(poller.backfill_blocks, BLOCKS_PER_HOUR);

        let first = poller.poll().await.unwrap();
        assert_eq!(first, vec![PairEvent::new(TOKEN, PAIR)]);
        assert_eq!(poller.next_block, Some(101));

        // Same block height: nothing new is requested.
        let second = poller.poll().await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_failed_chunk_keeps_earlier_pairs_and_retries() {
        const LATEST: u64 = 5_000;
        let first_pair = "0x4444444444444444444444444444444444444444";
        let failures = Arc::new(AtomicUsize::new(0));
        let seen_failures = failures.clone();

        // 10h of backfill spans two chunks; the second fails once.
        let backfill = (10.0 * BLOCKS_PER_HOUR as f64) as u64;
        let first_chunk = LATEST - backfill;
        let base = serve_rpc(
            LATEST,
            Arc::new(move |from: u64| {
                if from == first_chunk {
                    Some(vec![log(TOKEN, WETH, first_pair)])
                } else if failures.fetch_add(1, Ordering::SeqCst) == 0 {
                    None
                } else {
                    Some(vec![log(OTHER, WETH, PAIR)])
                }
            }),
        )
        .await;
        let mut poller = poller(base, 10.0);

        let first = poller.poll().await.unwrap();
        assert_eq!(first, vec![PairEvent::new(TOKEN, first_pair)]);
        assert_eq!(poller.next_block, Some(first_chunk + MAX_LOG_RANGE));
        assert_eq!(seen_failures.load(Ordering::SeqCst), 1);

        let second = poller.poll().await.unwrap();
        assert_eq!(second, vec![PairEvent::new(OTHER, PAIR)]);
        assert_eq!(poller.next_block, Some(LATEST + 1));
    }

    #[tokio::test]
    async fn test_failed_first_chunk_is_an_error() {
        let base = serve_rpc(100, Arc::new(|_: u64| -> Option<Vec<RpcLog>> { None })).await;
        let mut poller = poller(base, 0.0);

        assert!(poller.poll().await.is_err());
        assert_eq!(poller.next_block, None);
    }
}
