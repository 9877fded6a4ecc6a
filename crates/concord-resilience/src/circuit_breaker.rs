use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Call guard keyed by an arbitrary identifier (§4.8): the spec's primary
/// use is one breaker per *project* (three consecutive sync failures trip
/// it), but the same machinery also guards individual tracker endpoints —
/// hence a generic key rather than a hardcoded enum.
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<K: Display> {
    #[error("circuit is open for {0} – refusing call")]
    Open(K),
    #[error("call to {0} timed out after {1:?}")]
    Timeout(K, Duration),
    #[error("inner error: {0}")]
    Inner(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub cooldown: Duration,
    pub call_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 1,
            cooldown: Duration::from_secs(5 * 60),
            call_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct InnerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
}

/// One breaker per key — a failing project (or tracker) must not trip
/// breakers belonging to any other (§4.8 invariant).
#[derive(Debug)]
pub struct CircuitBreakerRegistry<K: Eq + Hash + Clone + Display + Send + Sync + 'static> {
    config: CircuitBreakerConfig,
    breakers: DashMap<K, Arc<Mutex<InnerState>>>,
}

impl<K: Eq + Hash + Clone + Display + Send + Sync + 'static> CircuitBreakerRegistry<K> {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    fn entry(&self, key: &K) -> Arc<Mutex<InnerState>> {
        self.breakers
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(InnerState {
                    state: CircuitState::Closed,
                    failure_count: 0,
                    success_count: 0,
                    last_failure_time: None,
                }))
            })
            .clone()
    }

    pub async fn state(&self, key: &K) -> CircuitState {
        self.entry(key).lock().await.state
    }

    /// Execute `f` through `key`'s breaker.
    pub async fn call<F, Fut, T, E>(&self, key: K, f: F) -> Result<T, CircuitBreakerError<K>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let inner = self.entry(&key);
        {
            let mut guard = inner.lock().await;
            match guard.state {
                CircuitState::Open => {
                    let elapsed_ok = guard
                        .last_failure_time
                        .map(|t| t.elapsed() >= self.config.cooldown)
                        .unwrap_or(false);
                    if elapsed_ok {
                        info!(%key, "circuit breaker transitioning Open -> HalfOpen");
                        guard.state = CircuitState::HalfOpen;
                        guard.success_count = 0;
                    } else {
                        return Err(CircuitBreakerError::Open(key));
                    }
                }
                CircuitState::Closed | CircuitState::HalfOpen => {}
            }
        }

        let result = tokio::time::timeout(self.config.call_timeout, f()).await;
        match result {
            Ok(Ok(value)) => {
                self.record_success(&inner, &key).await;
                Ok(value)
            }
            Ok(Err(e)) => {
                self.record_failure(&inner, &key).await;
                Err(CircuitBreakerError::Inner(e.to_string()))
            }
            Err(_elapsed) => {
                self.record_failure(&inner, &key).await;
                Err(CircuitBreakerError::Timeout(key, self.config.call_timeout))
            }
        }
    }

    async fn record_success(&self, inner: &Arc<Mutex<InnerState>>, key: &K) {
        let mut guard = inner.lock().await;
        match guard.state {
            CircuitState::HalfOpen => {
                guard.success_count += 1;
                if guard.success_count >= self.config.success_threshold {
                    info!(%key, "circuit breaker transitioning HalfOpen -> Closed");
                    guard.state = CircuitState::Closed;
                    guard.failure_count = 0;
                    guard.success_count = 0;
                }
            }
            CircuitState::Closed => {
                guard.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    async fn record_failure(&self, inner: &Arc<Mutex<InnerState>>, key: &K) {
        let mut guard = inner.lock().await;
        guard.failure_count += 1;
        guard.last_failure_time = Some(Instant::now());
        match guard.state {
            CircuitState::Closed => {
                if guard.failure_count >= self.config.failure_threshold {
                    warn!(%key, failures = guard.failure_count, "circuit breaker transitioning Closed -> Open");
                    guard.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                warn!(%key, "circuit breaker transitioning HalfOpen -> Open (failure during probe)");
                guard.state = CircuitState::Open;
                guard.success_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub async fn reset(&self, key: &K) {
        let inner = self.entry(key);
        let mut guard = inner.lock().await;
        guard.state = CircuitState::Closed;
        guard.failure_count = 0;
        guard.success_count = 0;
        guard.last_failure_time = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let registry: CircuitBreakerRegistry<String> = CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 2,
            ..CircuitBreakerConfig::default()
        });

        for _ in 0..2 {
            let _ = registry
                .call("PROJ".to_string(), || async { Err::<(), _>("boom") })
                .await;
        }
        assert_eq!(registry.state(&"PROJ".to_string()).await, CircuitState::Open);
    }

    #[tokio::test]
    async fn open_circuit_rejects_without_calling() {
        let registry: CircuitBreakerRegistry<String> = CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..CircuitBreakerConfig::default()
        });
        let _ = registry
            .call("PROJ".to_string(), || async { Err::<(), _>("boom") })
            .await;

        let result = registry.call("PROJ".to_string(), || async { Ok::<_, &str>(1) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::Open(k)) if k == "PROJ"));
    }

    #[tokio::test]
    async fn independent_breakers_per_key() {
        let registry: CircuitBreakerRegistry<String> = CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..CircuitBreakerConfig::default()
        });
        let _ = registry
            .call("A".to_string(), || async { Err::<(), _>("boom") })
            .await;
        assert_eq!(registry.state(&"A".to_string()).await, CircuitState::Open);
        assert_eq!(registry.state(&"B".to_string()).await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn reset_closes_breaker() {
        let registry: CircuitBreakerRegistry<String> = CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..CircuitBreakerConfig::default()
        });
        let _ = registry
            .call("PROJ".to_string(), || async { Err::<(), _>("boom") })
            .await;
        registry.reset(&"PROJ".to_string()).await;
        assert_eq!(registry.state(&"PROJ".to_string()).await, CircuitState::Closed);
    }
}
