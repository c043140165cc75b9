use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub const DEFAULT_SYNC_CONCURRENCY: usize = 5;
pub const MAX_SYNC_CONCURRENCY: usize = 32;
pub const SYNC_CONCURRENCY_ENV: &str = "CONTEXT_SYNC_CONCURRENCY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConcurrencySnapshot {
    pub limit: usize,
    pub in_flight: usize,
    pub waiters: usize,
}

/// Blank or unparsable values fall back to `default_value`; the result is clamped to 1..=32.
pub fn parse_sync_concurrency(raw: Option<&str>, default_value: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default_value)
        .clamp(1, MAX_SYNC_CONCURRENCY)
}

#[derive(Default)]
struct Counters {
    waiters: AtomicUsize,
    in_flight: AtomicUsize,
}

/// Bounded worker pool gate for one dispatch stage.
#[derive(Clone)]
pub(crate) struct DispatchLimiter {
    limit: usize,
    semaphore: Arc<Semaphore>,
    counters: Arc<Counters>,
}

impl DispatchLimiter {
    pub(crate) fn new(limit: usize) -> Self {
        let limit = limit.clamp(1, MAX_SYNC_CONCURRENCY);
        Self {
            limit,
            semaphore: Arc::new(Semaphore::new(limit)),
            counters: Arc::new(Counters::default()),
        }
    }

    pub(crate) fn snapshot(&self) -> DispatchConcurrencySnapshot {
        DispatchConcurrencySnapshot {
            limit: self.limit,
            in_flight: self.counters.in_flight.load(Ordering::Relaxed),
            waiters: self.counters.waiters.load(Ordering::Relaxed),
        }
    }

    pub(crate) async fn acquire(&self) -> DispatchPermit {
        // The semaphore is never closed; acquire failures are not expected.
        let waiter = WaiterGuard::new(self.counters.clone());
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("dispatch semaphore closed"));
        drop(waiter);
        self.counters.in_flight.fetch_add(1, Ordering::Relaxed);
        DispatchPermit {
            permit,
            counters: self.counters.clone(),
        }
    }
}

pub(crate) struct DispatchPermit {
    #[allow(dead_code)]
    permit: OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl Drop for DispatchPermit {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

struct WaiterGuard(Arc<Counters>);

impl WaiterGuard {
    fn new(counters: Arc<Counters>) -> Self {
        counters.waiters.fetch_add(1, Ordering::Relaxed);
        Self(counters)
    }
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.0.waiters.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sync_concurrency_defaults_and_clamps() {
        let default_value = DEFAULT_SYNC_CONCURRENCY;
        assert_eq!(parse_sync_concurrency(None, default_value), default_value);
        assert_eq!(parse_sync_concurrency(Some(""), default_value), default_value);
        assert_eq!(parse_sync_concurrency(Some("   "), default_value), default_value);
        assert_eq!(parse_sync_concurrency(Some("2"), default_value), 2);
        assert_eq!(parse_sync_concurrency(Some("0"), default_value), 1);
        assert_eq!(
            parse_sync_concurrency(Some("999"), default_value),
            MAX_SYNC_CONCURRENCY
        );
        assert_eq!(parse_sync_concurrency(Some("abc"), default_value), default_value);
        assert_eq!(parse_sync_concurrency(Some(" 7 "), default_value), 7);
    }

    #[tokio::test]
    async fn permits_are_bounded_and_released() {
        let limiter = DispatchLimiter::new(2);
        let first = limiter.acquire().await;
        let second = limiter.acquire().await;
        assert_eq!(limiter.snapshot().in_flight, 2);
        assert_eq!(limiter.semaphore.available_permits(), 0);

        drop(first);
        assert_eq!(limiter.snapshot().in_flight, 1);
        drop(second);
        assert_eq!(
            limiter.snapshot(),
            DispatchConcurrencySnapshot {
                limit: 2,
                in_flight: 0,
                waiters: 0
            }
        );
    }
}
