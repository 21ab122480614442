use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{RetryPolicy, TransferError, TransportError};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// One logical request as seen by the retry loop.
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest<'a> {
    pub endpoint: &'a str,
    pub method: &'a str,
    pub timeout: Duration,
    pub policy: &'a RetryPolicy,
}

/// Progress handed to the caller before each backoff sleep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryNotice {
    pub endpoint: String,
    /// 1-based retry number; the first request is not a retry.
    pub attempt: u32,
    pub max_retries: u32,
    pub delay: Duration,
    pub last_error: TransportError,
}

impl RetryNotice {
    pub fn progress_label(&self) -> String {
        format!("Retrying… attempt {}/{}", self.attempt, self.max_retries)
    }
}

/// Shared timeout + retry executor for every network call in the capture flow.
#[derive(Debug, Clone, Default)]
pub struct TransferController;

impl TransferController {
    pub fn new() -> Self {
        Self
    }

    /// Run `op` until it succeeds, fails permanently, runs out of retries, or
    /// `cancel` fires. Each attempt is bounded by `request.timeout`; an
    /// attempt that overruns is dropped, which aborts the in-flight future.
    pub async fn execute<T, F, Fut, R>(
        &self,
        request: TransferRequest<'_>,
        cancel: &CancellationToken,
        mut op: F,
        mut on_retry: R,
    ) -> Result<T, TransferError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
        R: FnMut(&RetryNotice),
    {
        let max_attempts = request.policy.max_attempts();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let started = Instant::now();

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(TransferError::Cancelled {
                        endpoint: request.endpoint.to_string(),
                        attempts: attempt,
                    });
                }
                result = tokio::time::timeout(request.timeout, op()) => {
                    result.unwrap_or(Err(TransportError::Timeout))
                }
            };

            let err = match outcome {
                Ok(value) => {
                    log_debug!(
                        "{} {} succeeded on attempt {}/{} in {}ms",
                        request.method,
                        request.endpoint,
                        attempt,
                        max_attempts,
                        started.elapsed().as_millis()
                    );
                    return Ok(value);
                }
                Err(err) => err,
            };

            log_warn!(
                "{} {} attempt {}/{} failed after {}ms: {}",
                request.method,
                request.endpoint,
                attempt,
                max_attempts,
                started.elapsed().as_millis(),
                err
            );

            if !err.is_transient() {
                let (status, message) = match err {
                    TransportError::Status { status, message } => (status, message),
                    other => (0, other.to_string()),
                };
                return Err(TransferError::Rejected {
                    endpoint: request.endpoint.to_string(),
                    status,
                    message,
                });
            }

            if attempt >= max_attempts {
                return Err(match err {
                    TransportError::Timeout => TransferError::Timeout {
                        endpoint: request.endpoint.to_string(),
                        attempts: attempt,
                    },
                    last => TransferError::Exhausted {
                        endpoint: request.endpoint.to_string(),
                        attempts: attempt,
                        last,
                    },
                });
            }

            let delay = request.policy.next_delay(attempt, &mut rand::thread_rng());
            on_retry(&RetryNotice {
                endpoint: request.endpoint.to_string(),
                attempt,
                max_retries: request.policy.max_retries,
                delay,
                last_error: err,
            });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(TransferError::Cancelled {
                        endpoint: request.endpoint.to_string(),
                        attempts: attempt,
                    });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
