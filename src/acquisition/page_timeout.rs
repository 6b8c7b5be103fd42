//! Timeout wrapper for page operations
//!
//! Every browser call in the acquisition path goes through this so no wait
//! is unbounded.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;

/// Run `operation` with a timeout, naming it in the error.
pub async fn with_page_timeout<F, T>(
    operation: F,
    timeout: Duration,
    operation_name: &str,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "{operation_name} timeout after {}ms",
            timeout.as_millis()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn times_out_slow_operations() {
        let err = with_page_timeout(
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            Duration::from_millis(10),
            "slow op",
        )
        .await
        .expect_err("should time out");
        assert!(err.to_string().contains("slow op timeout"));
    }

    #[tokio::test]
    async fn passes_through_results() {
        let value = with_page_timeout(async { Ok(7) }, Duration::from_secs(1), "fast op")
            .await
            .expect("ok");
        assert_eq!(value, 7);
    }
}
