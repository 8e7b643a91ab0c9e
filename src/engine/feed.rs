//! Discovery feed loop.
//!
//! Polls a `DiscoverySource` and hands each new pair to the pipeline in
//! arrival order, pausing between pairs so the providers are not hit in
//! bursts. A failed poll is logged and retried on the next interval.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::pipeline::ClassificationPipeline;
use super::sleep_or_shutdown;
use crate::discovery::DiscoverySource;

/// Run the feed until shutdown. Returns how many pairs were processed.
pub async fn run_discovery<S>(
    source: &mut S,
    pipeline: Arc<ClassificationPipeline>,
    poll_interval: Duration,
    pair_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> usize
where
    S: DiscoverySource + ?Sized,
{
    info!(
        poll_secs = poll_interval.as_secs_f64(),
        pair_delay_secs = pair_delay.as_secs(),
        "Discovery feed started"
    );
    let mut processed = 0;

    'feed: loop {
        if *shutdown.borrow() {
            break;
        }
        match source.poll().await {
            Ok(events) => {
                if !events.is_empty() {
                    debug!(count = events.len(), "Discovery batch received");
                }
                for event in &events {
                    if !pipeline.is_accepting() {
                        break 'feed;
                    }
                    info!(token = %event.token_address, pair = %event.pair_address, "New pair admitted");
                    pipeline.process(event).await;
                    processed += 1;
                    if sleep_or_shutdown(pair_delay, &mut shutdown).await {
                        break 'feed;
                    }
                }
            }
            Err(e) => warn!(error = %e, "Discovery poll failed"),
        }
        if sleep_or_shutdown(poll_interval, &mut shutdown).await {
            break;
        }
    }

    info!(processed, "Discovery feed stopped");
    processed
}
