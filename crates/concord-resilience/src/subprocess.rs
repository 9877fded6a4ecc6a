use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};

/// Bounds how many `bd` CLI child processes may run concurrently
/// (`beads.max_concurrent_cli`, §6) so a large reconciliation sweep cannot
/// fork-bomb the host.
#[derive(Debug, Clone)]
pub struct SubprocessLimiter {
    semaphore: Arc<Semaphore>,
}

impl SubprocessLimiter {
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1) as usize)),
        }
    }

    pub async fn acquire(&self) -> SemaphorePermit<'_> {
        self.semaphore
            .acquire()
            .await
            .expect("semaphore never closed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn limits_concurrent_permits() {
        let limiter = SubprocessLimiter::new(1);
        let first = limiter.acquire().await;
        let second = tokio::time::timeout(std::time::Duration::from_millis(50), limiter.acquire()).await;
        assert!(second.is_err());
        drop(first);
        let third = tokio::time::timeout(std::time::Duration::from_millis(50), limiter.acquire()).await;
        assert!(third.is_ok());
    }
}
