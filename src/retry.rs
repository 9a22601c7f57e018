use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{FleetError, Result};

/// Compute a retry budget from a caller-supplied timeout and a constant
/// delay between attempts. Always at least one attempt.
pub fn tries_for(timeout: Duration, delay: Duration) -> usize {
    let tries = (timeout.as_secs() / delay.as_secs().max(1)) as usize;
    tries.max(1)
}

/// Run `op` up to `attempts` times with a constant `delay` between attempts.
///
/// Only errors flagged retryable ([`FleetError::is_retryable`]) consume the
/// budget; a fatal error aborts immediately. The attempt budget and delay
/// are passed in by the caller, computed from its own timeout at call time,
/// so the schedule is never baked into the operation itself.
pub async fn retry<T, F, Fut>(attempts: usize, delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    debug_assert!(attempts >= 1);
    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                warn!(attempt, attempts, "Retryable failure: {}; sleeping {:?}", e, delay);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!("retry loop returns on the last attempt")
}
