use std::time::Duration;

/// A small fixed pause inserted between successive API calls to the same
/// tracker (`sync.api_delay_ms`, §6), independent of the token-bucket
/// limiter — the limiter bounds burst rate, this smooths steady-state
/// traffic so a tight loop doesn't look like a retry storm to the upstream.
pub async fn api_delay(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_delay_returns_immediately() {
        let start = std::time::Instant::now();
        api_delay(0).await;
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn nonzero_delay_sleeps() {
        let start = std::time::Instant::now();
        api_delay(10).await;
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
