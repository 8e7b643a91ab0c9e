//! Core engine: the classify → persist → rescan lifecycle.

pub mod feed;
pub mod merge;
pub mod pipeline;
pub mod rules;
pub mod scheduler;

use std::time::Duration;
use tokio::sync::watch;

/// Sleep for `duration` unless shutdown is signalled first.
/// Returns `true` when the caller should stop.
pub(crate) async fn sleep_or_shutdown(
    duration: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    if duration.is_zero() {
        return false;
    }
    let changed = tokio::select! {
        _ = tokio::time::sleep(duration) => None,
        res = shutdown.changed() => Some(res.is_err()),
    };
    match changed {
        None => false,
        Some(closed) => closed || *shutdown.borrow(),
    }
}
