//! Scheduler - 注入された Clock で次回時刻を決める汎用タイマー
//!
//! # 構成
//! - `Schedule`: 「now の次はいつか」だけを答える
//! - `RecurringJob`: 実行される側。失敗は job 内で完結させる
//! - `RecurringTimer`: 起動時に 1 回、以降は Schedule どおりに実行
//!
//! 停止は watch チャネル（WorkerGroup と同じ流儀）。

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Local, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::watch;

use crate::ports::Clock;

pub trait Schedule: Send + Sync {
    /// First instant strictly after `now`.
    fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Zone {
    Fixed(FixedOffset),
    /// Host time zone, resolved on every call so DST changes are followed.
    Local,
}

/// Once a day at a wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyAt {
    zone: Zone,
    at: NaiveTime,
}

impl DailyAt {
    pub fn new(offset: FixedOffset, at: NaiveTime) -> Self {
        Self {
            zone: Zone::Fixed(offset),
            at,
        }
    }

    pub fn midnight(offset: FixedOffset) -> Self {
        Self::new(offset, NaiveTime::MIN)
    }

    /// Midnight in the host's time zone.
    pub fn local_midnight() -> Self {
        Self {
            zone: Zone::Local,
            at: NaiveTime::MIN,
        }
    }
}

/// First `at` in `tz` strictly after `now`.
///
/// A wall-clock time skipped by a DST gap fires an hour later; a repeated one
/// fires at its earlier occurrence.
fn next_wall_clock<Tz: TimeZone>(tz: &Tz, at: NaiveTime, now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.with_timezone(tz).date_naive();
    for day in 0..=2 {
        let Some(date) = today.checked_add_signed(Duration::days(day)) else {
            break;
        };
        let naive = date.and_time(at);
        let resolved = tz
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest());
        if let Some(next) = resolved
            .map(|t| t.with_timezone(&Utc))
            .filter(|next| *next > now)
        {
            return next;
        }
    }
    now + Duration::days(1)
}

impl Schedule for DailyAt {
    fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.zone {
            Zone::Fixed(offset) => next_wall_clock(&offset, self.at, now),
            Zone::Local => next_wall_clock(&Local, self.at, now),
        }
    }
}

/// Fixed interval. Non-positive periods are clamped to one second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Every(pub Duration);

impl Schedule for Every {
    fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.0.max(Duration::seconds(1))
    }
}

#[async_trait]
pub trait RecurringJob: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self);
}

pub struct RecurringTimer {
    schedule: Arc<dyn Schedule>,
    clock: Arc<dyn Clock>,
    run_at_start: bool,
}

impl RecurringTimer {
    pub fn new(schedule: Arc<dyn Schedule>, clock: Arc<dyn Clock>) -> Self {
        Self {
            schedule,
            clock,
            run_at_start: true,
        }
    }

    pub fn skip_initial_run(mut self) -> Self {
        self.run_at_start = false;
        self
    }

    /// Drive `job` until `shutdown` flips to true or its sender is dropped.
    ///
    /// A run in progress is never interrupted; shutdown is observed between runs.
    pub async fn run(&self, job: Arc<dyn RecurringJob>, mut shutdown: watch::Receiver<bool>) {
        if self.run_at_start && !*shutdown.borrow() {
            job.run().await;
        }

        loop {
            if *shutdown.borrow() {
                break;
            }

            let now = self.clock.now();
            let next = self.schedule.next_after(now);
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::info!(job = job.name(), next = %next.to_rfc3339(), "next run scheduled");

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            job.run().await;
        }
        tracing::debug!(job = job.name(), "recurring timer stopped");
    }
}
