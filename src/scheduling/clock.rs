//! Time sources for schedule evaluation.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("router clock unavailable: {0}")]
pub struct ClockError(pub String);

/// Time as observed by the router that owns a routing.
#[async_trait]
pub trait RouterClockProvider: Send + Sync {
    async fn now(&self, router_id: &str) -> Result<DateTime<Utc>, ClockError>;
}

/// Manually driven clock shared by every router.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }
}

#[async_trait]
impl RouterClockProvider for ManualClock {
    async fn now(&self, _router_id: &str) -> Result<DateTime<Utc>, ClockError> {
        Ok(*self.now.lock().unwrap_or_else(|p| p.into_inner()))
    }
}

/// Time on `router_id`, or the local clock when the router cannot be read.
///
/// Skew beyond `max_skew` is logged; it never blocks evaluation.
pub async fn resolve_now(
    provider: Option<&dyn RouterClockProvider>,
    router_id: &str,
    max_skew: std::time::Duration,
) -> DateTime<Utc> {
    let local = Utc::now();
    let Some(provider) = provider else {
        return local;
    };

    match provider.now(router_id).await {
        Ok(router_time) => {
            let skew = (router_time - local).abs();
            if skew.to_std().is_ok_and(|skew| skew > max_skew) {
                tracing::warn!(
                    router_id,
                    skew_secs = skew.num_seconds(),
                    max_skew_secs = max_skew.as_secs(),
                    "Router clock skew exceeds threshold"
                );
            }
            router_time
        }
        Err(e) => {
            tracing::warn!(router_id, error = %e, "Falling back to system clock");
            local
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unreachable;

    #[async_trait]
    impl RouterClockProvider for Unreachable {
        async fn now(&self, _router_id: &str) -> Result<DateTime<Utc>, ClockError> {
            Err(ClockError("timeout".into()))
        }
    }

    #[tokio::test]
    async fn test_router_time_wins_even_when_skewed() {
        let router = Utc::now() - Duration::hours(3);
        let clock = ManualClock::new(router);

        let now = resolve_now(Some(&clock), "router-1", std::time::Duration::from_secs(300)).await;
        assert_eq!(now, router);
    }

    #[tokio::test]
    async fn test_unavailable_router_falls_back() {
        let before = Utc::now();
        let now = resolve_now(Some(&Unreachable), "router-1", std::time::Duration::from_secs(300)).await;
        assert!(now >= before);
    }

    #[test]
    fn test_manual_clock_advances() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        clock.advance(Duration::minutes(5));
        let now = *clock.now.lock().unwrap();
        assert_eq!(now - start, Duration::minutes(5));
    }
}
