// Copyright 2024 Orbit project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

// Retry policy for calls against the control plane, expressed as data rather than scattered
// control flow at each call site.

use std::collections::HashSet;
use std::time::Duration;

use rand::{thread_rng, Rng};
use tonic::{Code, Response, Status};

/// Maximum number of attempts for a policy with no explicit cap.
///
/// There is no literal "retry forever" in this implementation: an unbounded policy is one with a
/// very large but finite retry budget, so a genuinely wedged control plane eventually surfaces an
/// error instead of hanging a task forever.
const UNLIMITED_RETRIES: u32 = 100_000;

/// Status codes that are always safe to retry with backoff, independent of the policy in effect.
fn is_builtin_transient(code: Code) -> bool {
    matches!(
        code,
        Code::Aborted | Code::Cancelled | Code::Internal | Code::Unavailable | Code::Unknown
    )
}

/// Describes how a single RPC should be retried. Constructed per call-site and passed to
/// [`call`]; this keeps the retry behavior legible as data instead of as branches buried in the
/// call path.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub additional_status_codes: HashSet<Code>,
}

impl RetryPolicy {
    /// A small number of retries with the built-in transient set only. Appropriate for
    /// lightweight, idempotent calls like `FunctionMap`.
    pub fn default_policy() -> Self {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            additional_status_codes: HashSet::new(),
        }
    }

    /// Retries indefinitely (within [`UNLIMITED_RETRIES`]) and additionally treats
    /// `RESOURCE_EXHAUSTED` as transient. Used by input submission, which relies on the server's
    /// admission control backpressure signal rather than failing the caller.
    pub fn unlimited_with_backpressure() -> Self {
        let mut additional_status_codes = HashSet::new();
        additional_status_codes.insert(Code::ResourceExhausted);
        RetryPolicy {
            max_retries: UNLIMITED_RETRIES,
            base_delay: Duration::from_millis(100),
            additional_status_codes,
        }
    }

    /// Retries indefinitely with no inter-attempt delay floor beyond jitter. Used by the output
    /// poller, whose own long-poll timeout already rate-limits attempts.
    pub fn unlimited_no_delay() -> Self {
        RetryPolicy {
            max_retries: UNLIMITED_RETRIES,
            base_delay: Duration::ZERO,
            additional_status_codes: HashSet::new(),
        }
    }

    fn is_retryable(&self, status: &Status) -> bool {
        is_builtin_transient(status.code()) || self.additional_status_codes.contains(&status.code())
    }
}

/// Retry a gRPC client operation against `policy` using exponential backoff with jitter.
///
/// `f` is invoked once per attempt; it is expected to perform one RPC using a cloned client
/// handle. Non-transient statuses (per `policy`) are surfaced immediately. Once `max_retries` is
/// exhausted the last observed error is surfaced.
pub async fn call<T, C, F, Fut>(client: C, policy: &RetryPolicy, f: F) -> Result<Response<T>, Status>
where
    C: Clone,
    F: Fn(C) -> Fut,
    Fut: std::future::Future<Output = Result<Response<T>, Status>>,
{
    let mut last_error: Option<Status> = None;
    let mut attempt = 0;

    while attempt < policy.max_retries {
        if attempt > 0 {
            let multiplier = thread_rng().gen_range(0..2_u32.saturating_pow(attempt.min(20)) + 1);
            let sleep_time = policy.base_delay * multiplier;
            tokio::time::sleep(sleep_time).await;
        }

        match f(client.clone()).await {
            Ok(response) => return Ok(response),
            Err(status) => {
                if !policy.is_retryable(&status) {
                    return Err(status);
                }
                log::debug!(
                    "transient error on attempt {} (code={:?}): {}",
                    attempt + 1,
                    status.code(),
                    status.message()
                );
                last_error = Some(status);
            }
        }

        attempt += 1;
    }

    Err(last_error.unwrap_or_else(|| Status::internal("retry loop exited with no attempts made")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry() {
        let policy = RetryPolicy::default_policy();
        let attempts = AtomicU32::new(0);
        let result = call((), &policy, |_| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Ok(Response::new(42))
        })
        .await
        .unwrap();
        assert_eq!(*result.get_ref(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let policy = RetryPolicy::unlimited_with_backpressure();
        let attempts = AtomicU32::new(0);
        let result = call((), &policy, |_| async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(Status::resource_exhausted("backpressure"))
            } else {
                Ok(Response::new(()))
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_resource_exhausted_by_default() {
        let policy = RetryPolicy::default_policy();
        let attempts = AtomicU32::new(0);
        let result = call((), &policy, |_| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<Response<()>, _>(Status::resource_exhausted("backpressure"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn surfaces_non_transient_errors_immediately() {
        let policy = RetryPolicy::unlimited_no_delay();
        let attempts = AtomicU32::new(0);
        let result = call((), &policy, |_| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<Response<()>, _>(Status::invalid_argument("bad request"))
        })
        .await;
        assert!(matches!(result.unwrap_err().code(), Code::InvalidArgument));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
