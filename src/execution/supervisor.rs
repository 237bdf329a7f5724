use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::error::TradingError;

/// Timestamp of the last frame received from the feed
///
/// Written by the feed task, read by the supervisor and the health endpoint.
#[derive(Clone, Debug)]
pub struct FeedHealth {
    last_message_ms: Arc<AtomicI64>,
}

impl FeedHealth {
    pub fn new() -> Self {
        Self {
            last_message_ms: Arc::new(AtomicI64::new(Utc::now().timestamp_millis())),
        }
    }

    pub fn touch(&self) {
        self.touch_at(Utc::now().timestamp_millis());
    }

    pub fn touch_at(&self, now_ms: i64) {
        self.last_message_ms.store(now_ms, Ordering::Release);
    }

    pub fn last_message_ms(&self) -> i64 {
        self.last_message_ms.load(Ordering::Acquire)
    }

    /// Milliseconds since the last frame, never negative
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        (now_ms - self.last_message_ms()).max(0)
    }

    pub fn is_stale(&self, now_ms: i64, threshold: Duration) -> bool {
        self.age_ms(now_ms) > threshold.as_millis() as i64
    }
}

impl Default for FeedHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Forces a feed reconnect when no message arrived within the threshold
///
/// Never reads or writes trading state.
pub struct ConnectionSupervisor {
    health: FeedHealth,
    force_close: Arc<Notify>,
    check_interval: Duration,
    stale_threshold: Duration,
}

impl ConnectionSupervisor {
    pub fn new(
        health: FeedHealth,
        force_close: Arc<Notify>,
        check_interval: Duration,
        stale_threshold: Duration,
    ) -> Self {
        Self {
            health,
            force_close,
            check_interval,
            stale_threshold,
        }
    }

    /// One liveness check; returns the staleness error when a reconnect was forced
    pub fn check(&self, now_ms: i64) -> Result<(), TradingError> {
        if !self.health.is_stale(now_ms, self.stale_threshold) {
            return Ok(());
        }

        let age_secs = (self.health.age_ms(now_ms) / 1000) as u64;
        self.force_close.notify_waiters();
        // Restart the clock so a reconnect in progress is not closed again
        self.health.touch_at(now_ms);

        Err(TradingError::FeedStale { age_secs })
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(e) = self.check(Utc::now().timestamp_millis()) {
                tracing::warn!("⚠️ {}, forcing reconnect", e);
            }
        }
    }
}
