use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Source of wall-clock time and sleeps for the engine. Session boundaries are stamped with
/// [Clock::now], while the tick cadence is driven by [Clock::instant] so that wall-clock jumps
/// don't bunch up or skip ticks.
#[async_trait]
pub trait Clock: Sync + Send + 'static {
    fn now(&self) -> DateTime<Utc>;

    fn instant(&self) -> Instant;

    async fn sleep(&self, duration: Duration);

    async fn sleep_until(&self, instant: Instant);
}

pub struct DefaultClock;

#[async_trait]
impl Clock for DefaultClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn sleep_until(&self, instant: Instant) {
        tokio::time::sleep_until(instant).await;
    }
}

/// Wall time derived from tokio's clock. Under `start_paused` tests the runtime auto-advances
/// time, so hours of sampling run instantly while timestamps stay consistent.
#[cfg(test)]
#[derive(Clone)]
pub struct TokioDrivenClock {
    start_time: DateTime<Utc>,
    reference: Instant,
}

#[cfg(test)]
impl TokioDrivenClock {
    pub fn starting_at(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            reference: Instant::now(),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl Clock for TokioDrivenClock {
    fn now(&self) -> DateTime<Utc> {
        self.start_time
            + chrono::Duration::from_std(self.reference.elapsed())
                .expect("Test clock elapsed time should fit into chrono")
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn sleep_until(&self, instant: Instant) {
        tokio::time::sleep_until(instant).await;
    }
}
