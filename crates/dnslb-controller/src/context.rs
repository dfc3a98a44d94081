use crate::error::{ControllerError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Deadline and cancellation shared by every platform call of one unit of work
///
/// Once the deadline passes or the token is cancelled, further calls made
/// through [`Deadline::run`] fail immediately instead of reaching the platform.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    token: CancellationToken,
}

impl Deadline {
    pub fn new(at: Instant, token: CancellationToken) -> Self {
        Self { at, token }
    }

    /// A deadline `timeout` from now
    pub fn after(timeout: Duration, token: CancellationToken) -> Self {
        Self::new(Instant::now() + timeout, token)
    }

    pub fn at(&self) -> Instant {
        self.at
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Drive one call under this deadline
    pub async fn run<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.token.is_cancelled() {
            return Err(ControllerError::cancelled(operation));
        }

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ControllerError::cancelled(operation)),
            result = tokio::time::timeout_at(self.at, fut) => match result {
                Ok(inner) => inner,
                Err(_) => Err(ControllerError::deadline_exceeded(operation)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_run_completes_before_deadline() {
        let deadline = Deadline::after(Duration::from_secs(5), CancellationToken::new());
        let value = deadline
            .run("fast call", async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(7)
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_past_deadline() {
        let deadline = Deadline::after(Duration::from_secs(1), CancellationToken::new());
        let result: Result<()> = deadline
            .run("slow call", async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ControllerError::DeadlineExceeded { .. })));
        assert!(deadline.is_expired());
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        let deadline = Deadline::after(Duration::from_secs(5), token);

        let result: Result<()> = deadline
            .run("any call", std::future::pending::<Result<()>>())
            .await;
        assert!(matches!(result, Err(ControllerError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let deadline = Deadline::after(Duration::from_secs(5), CancellationToken::new());
        let result: Result<()> = deadline
            .run("list pods", async {
                Err(ControllerError::api_error("list pods", "boom"))
            })
            .await;
        assert!(matches!(result, Err(ControllerError::ApiError { .. })));
    }
}
