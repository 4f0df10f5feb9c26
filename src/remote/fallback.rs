//! Remote-then-local fallback
//!
//! Try the remote collaborator under a bounded timeout. A timeout or a
//! `RemoteUnavailable` error substitutes the local path; any other error
//! propagates to the caller.

use crate::error::{CoordinatorError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Which path produced a value
#[derive(Debug, Clone, PartialEq)]
pub enum Route<T> {
    Remote(T),
    Fallback { reason: String, value: T },
}

impl<T> Route<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Route::Fallback { .. })
    }

    pub fn into_inner(self) -> T {
        match self {
            Route::Remote(value) => value,
            Route::Fallback { value, .. } => value,
        }
    }
}

/// Run `remote` with a timeout; on unavailability run `local` with the reason
pub async fn with_fallback<T, R, L, LF>(timeout: Duration, remote: R, local: L) -> Result<Route<T>>
where
    R: Future<Output = Result<T>>,
    L: FnOnce(String) -> LF,
    LF: Future<Output = Result<T>>,
{
    let reason = match tokio::time::timeout(timeout, remote).await {
        Ok(Ok(value)) => return Ok(Route::Remote(value)),
        Ok(Err(CoordinatorError::RemoteUnavailable(reason))) => reason,
        Ok(Err(e)) => return Err(e),
        Err(_) => format!("no response within {:?}", timeout),
    };

    warn!("Remote collaborator unavailable ({}), using local fallback", reason);
    let value = local(reason.clone()).await?;
    Ok(Route::Fallback { reason, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_remote_success() {
        let route = with_fallback(
            Duration::from_secs(1),
            async { Ok::<_, CoordinatorError>(1) },
            |_| async { Ok(2) },
        )
        .await
        .unwrap();
        assert_eq!(route, Route::Remote(1));
    }

    #[tokio::test]
    async fn test_unavailable_uses_local() {
        let route = with_fallback(
            Duration::from_secs(1),
            async { Err::<i32, _>(CoordinatorError::RemoteUnavailable("503".into())) },
            |reason| async move {
                assert_eq!(reason, "503");
                Ok(2)
            },
        )
        .await
        .unwrap();
        assert!(route.is_fallback());
        assert_eq!(route.into_inner(), 2);
    }

    #[tokio::test]
    async fn test_timeout_uses_local() {
        let route = with_fallback(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, CoordinatorError>(1)
            },
            |_| async { Ok(2) },
        )
        .await
        .unwrap();
        assert!(matches!(route, Route::Fallback { value: 2, .. }));
    }

    #[tokio::test]
    async fn test_other_errors_propagate() {
        let result = with_fallback(
            Duration::from_secs(1),
            async { Err::<i32, _>(CoordinatorError::Internal("bug".into())) },
            |_| async { Ok(2) },
        )
        .await;
        assert_eq!(result, Err(CoordinatorError::Internal("bug".into())));
    }
}
