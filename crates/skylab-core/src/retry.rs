use std::future::Future;

use skylab_model::RetryPolicy;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::{
    error::{CoreError, CoreResult},
    service::ServiceError,
};

/// HTTP statuses worth another attempt.
const TRANSIENT_HTTP_CODES: [u16; 5] = [500, 502, 503, 504, 507];

/// Error texts of dropped connections that are worth another attempt.
const TRANSIENT_MESSAGES: [&str; 2] = ["connection reset by peer", "unexpected EOF"];

/// Classifies a transport error as retryable.
pub fn is_transient(err: &ServiceError) -> bool {
    let by_shape = match err {
        ServiceError::Http { status, .. } => TRANSIENT_HTTP_CODES.contains(status),
        ServiceError::Network { temporary, .. } => *temporary,
        _ => false,
    };
    by_shape || {
        let msg = err.to_string();
        TRANSIENT_MESSAGES.iter().any(|m| msg.contains(m))
    }
}

/// Runs `f` until it succeeds, fails with a non-transient error, or the
/// policy's retries are used up.
///
/// Cancellation is observed before every attempt, while an attempt is in
/// flight (the attempt future is dropped), and during backoff sleeps.
pub async fn call_with_retries<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    op: &str,
    mut f: F,
) -> CoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut retry = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let res = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CoreError::Cancelled),
            res = f() => res,
        };

        let err = match res {
            Ok(v) => {
                trace!(op, attempts = retry + 1, "call succeeded");
                return Ok(v);
            }
            Err(e) => e,
        };
        if !is_transient(&err) {
            return Err(CoreError::Service {
                op: op.to_string(),
                source: err,
            });
        }
        if retry >= policy.retries {
            return Err(CoreError::Transient {
                op: op.to_string(),
                attempts: retry + 1,
                source: err,
            });
        }

        let delay = policy.delay_for(retry);
        retry += 1;
        warn!(
            op,
            attempt = retry,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient error; retrying"
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CoreError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
