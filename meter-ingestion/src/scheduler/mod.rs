use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use time::{OffsetDateTime, Time};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{AccountingZone, Clock, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Every `period`, starting immediately. Missed ticks are skipped.
    Every(Duration),
    /// Once a day at the given civil time of day.
    DailyAt { at: Time, zone: AccountingZone },
}

/// A named job run on a schedule until cancelled.
///
/// The job future is awaited before the next tick is awaited, so two runs of
/// the same task never overlap. Cancellation is observed between runs.
pub struct RecurringTask {
    name: &'static str,
    schedule: Schedule,
    cancel: CancellationToken,
    clock: Arc<dyn Clock>,
}

impl RecurringTask {
    pub fn new(name: &'static str, schedule: Schedule, cancel: CancellationToken) -> Self {
        Self {
            name,
            schedule,
            cancel,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn run<F>(self, job: F)
    where
        F: FnMut() -> BoxFuture<'static, ()> + Send,
    {
        tracing::info!(task = self.name, schedule = ?self.schedule, "recurring task started");

        match self.schedule {
            Schedule::Every(period) => self.run_every(period, job).await,
            Schedule::DailyAt { at, zone } => self.run_daily(at, zone, job).await,
        }

        tracing::info!(task = self.name, "recurring task stopped");
    }

    async fn run_every<F>(&self, period: Duration, mut job: F)
    where
        F: FnMut() -> BoxFuture<'static, ()> + Send,
    {
        let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            job().await;
        }
    }

    async fn run_daily<F>(&self, at: Time, zone: AccountingZone, mut job: F)
    where
        F: FnMut() -> BoxFuture<'static, ()> + Send,
    {
        loop {
            let delay = delay_until_next(self.clock.now(), at, zone);
            tracing::debug!(task = self.name, delay_secs = delay.as_secs(), "next daily run scheduled");

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            job().await;
        }
    }
}

/// Time from `now` until the next occurrence of `at` in `zone`.
///
/// When `now` is exactly `at` the next occurrence is a day later.
pub fn delay_until_next(now: OffsetDateTime, at: Time, zone: AccountingZone) -> Duration {
    let offset = zone.offset();
    let local = now.to_offset(offset);

    let today = local.date().with_time(at).assume_offset(offset);
    let next = if today > now {
        today
    } else {
        match local.date().next_day() {
            Some(tomorrow) => tomorrow.with_time(at).assume_offset(offset),
            None => return Duration::MAX,
        }
    };

    (next - now).unsigned_abs()
}
