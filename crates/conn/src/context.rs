//! Caller context for dialing operations.

use std::{future::Future, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::error::{ConnError, Result};

/// Cancellation and deadline for a single registry call.
///
/// Cancellation or deadline expiry aborts waiting for the per-service lock
/// and any in-flight connect. Nothing is cached for an aborted call.
#[derive(Debug, Clone, Default)]
pub struct DialContext {
    cancellation: CancellationToken,
    timeout: Option<Duration>,
}

impl DialContext {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A context cancelled through the given token.
    #[must_use]
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self { cancellation: token, timeout: None }
    }

    /// Adds a deadline relative to the start of each call.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// The configured deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.timeout
    }

    /// Runs `future` until it completes, the token fires, or the deadline
    /// passes, whichever comes first.
    pub(crate) async fn run<F, T>(&self, service: &str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let bounded = async {
            match self.timeout {
                Some(timeout) => tokio::time::timeout(timeout, future).await.map_err(|_| {
                    ConnError::DeadlineExceeded {
                        service: service.to_owned(),
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    }
                })?,
                None => future.await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => {
                Err(ConnError::Cancelled { service: service.to_owned() })
            }
            result = bounded => result,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn background_context_passes_result_through() {
        let value = DialContext::background().run("svc", async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn cancelled_token_aborts_before_work() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = DialContext::with_cancellation(token);

        let err = ctx
            .run("auth", async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ConnError::Cancelled { ref service } if service == "auth"));
    }

    #[tokio::test]
    async fn deadline_expiry_names_the_service() {
        let ctx = DialContext::background().timeout(Duration::from_millis(20));

        let err = ctx
            .run("msg", async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConnError::DeadlineExceeded { ref service, timeout_ms: 20 } if service == "msg"
        ));
    }
}
