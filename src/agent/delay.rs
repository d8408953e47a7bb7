//! Cancellable fixed delays.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::AgentError;

/// Sleeps for `delay` unless `cancel` fires first.
///
/// A zero delay returns immediately without yielding, but still reports
/// an already-cancelled token.
pub async fn pause(delay: Duration, cancel: &CancellationToken) -> Result<(), AgentError> {
    if cancel.is_cancelled() {
        return Err(AgentError::Cancelled);
    }
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(AgentError::Cancelled),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}
