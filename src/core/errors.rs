use std::future::Future;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("{what} timed out after {limit:?}")]
    Timeout { what: String, limit: Duration },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        PipelineError::Internal(err.to_string())
    }

    pub fn unavailable<E: std::fmt::Display>(err: E) -> Self {
        PipelineError::Unavailable(err.to_string())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PipelineError::Timeout { .. })
    }
}

/// Runs `fut` under a hard deadline. An elapsed deadline is reported as
/// `PipelineError::Timeout` and goes through the same fallback path as any
/// other failure of that call.
pub async fn with_timeout<T, F>(what: &str, limit: Duration, fut: F) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::Timeout {
            what: what.to_string(),
            limit,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn with_timeout_passes_through_results() {
        let ok = with_timeout("fast", Duration::from_secs(1), async { Ok::<_, PipelineError>(7) })
            .await
            .unwrap();
        assert_eq!(ok, 7);

        let err = with_timeout("failing", Duration::from_secs(1), async {
            Err::<u8, _>(PipelineError::unavailable("down"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::Unavailable(_)));
    }

    #[tokio::test]
    async fn with_timeout_reports_elapsed_deadline() {
        let err = with_timeout("slow call", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, PipelineError>(())
        })
        .await
        .unwrap_err();

        assert!(err.is_timeout());
        assert!(err.to_string().contains("slow call"));
        assert_eq!(err.to_string(), "slow call timed out after 10ms");
    }
}
