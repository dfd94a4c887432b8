use std::future::Future;
use std::time::Duration;

/// Await `fut` for at most `limit`; past that, give up and return `sentinel`.
///
/// The abandoned future is dropped, which for `tokio::process` children with
/// `kill_on_drop` also stops the child.
pub async fn with_deadline<F, T>(fut: F, limit: Duration, sentinel: T) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(limit_ms = limit.as_millis() as u64, "deadline elapsed");
            sentinel
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_value_within_deadline() {
        let fast = async { "prod-cluster".to_string() };
        let got = with_deadline(fast, Duration::from_secs(1), "unknown".to_string()).await;
        assert_eq!(got, "prod-cluster");
    }

    #[tokio::test]
    async fn returns_sentinel_after_deadline() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "late".to_string()
        };
        let started = std::time::Instant::now();
        let got = with_deadline(slow, Duration::from_millis(50), "unknown".to_string()).await;
        assert_eq!(got, "unknown");
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
