use std::future::Future;
use std::time::Duration;

use crate::error::{Result, StoreError};

const BACKOFFS_MS: [u64; 3] = [50, 150, 400];

/// Retries a fallible database operation up to `BACKOFFS_MS.len()` times,
/// sleeping between attempts. Only useful for transient lock/busy errors;
/// constraint violations and logic errors should not be retried, so callers
/// that need that distinction should not wrap this helper around them.
pub async fn with_retries<T, F, Fut>(mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for (attempt, backoff_ms) in BACKOFFS_MS.iter().enumerate() {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::warn!(attempt, error = %err, "store operation failed, retrying");
                last_err = Some(err);
                tokio::time::sleep(Duration::from_millis(*backoff_ms)).await;
            }
        }
    }
    Err(last_err.expect("loop runs at least once"))
}

#[allow(dead_code)]
fn _assert_send<T: Send>() {}

pub(crate) fn not_found<T>() -> Result<T> {
    Err(StoreError::NotFound)
}
