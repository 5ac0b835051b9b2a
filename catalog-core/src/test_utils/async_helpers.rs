//! Async test helpers

use tokio::sync::watch;
use tokio::time::{timeout, Duration};

use crate::writer_lock::LeaseState;

/// Wait until the lease state satisfies `pred`, or give up after `duration`
pub async fn wait_for_lease_state(
    rx: &mut watch::Receiver<LeaseState>,
    duration: Duration,
    pred: impl FnMut(&LeaseState) -> bool,
) -> Option<LeaseState> {
    match timeout(duration, rx.wait_for(pred)).await {
        Ok(Ok(state)) => Some(state.clone()),
        _ => None,
    }
}
