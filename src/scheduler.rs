//! Timer scheduling - interval, daily (cron) and one-shot jobs
//!
//! Each job runs on its own tokio task. Every firing executes in a separate
//! task so a panicking iteration is logged and the timer keeps going.

use crate::error::{Error, Result};
use chrono::{DateTime, Local, TimeZone};
use cron::Schedule;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Handle to a spawned timer
pub struct JobHandle {
    name: String,
    handle: JoinHandle<()>,
}

impl JobHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the timer; a firing already in progress is left to finish
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Parse a cron expression. 5-field expressions get a leading seconds field.
pub fn parse_schedule(expr: &str) -> Result<Schedule> {
    let expr = expr.trim();
    // Cron crate needs 6 fields (sec min hour dom month dow)
    let full_cron = if expr.split_whitespace().count() == 5 {
        format!("0 {}", expr)
    } else {
        expr.to_string()
    };

    Schedule::from_str(&full_cron)
        .map_err(|e| Error::Schedule(format!("invalid cron expression '{}': {}", expr, e)))
}

/// Time from `now` until the schedule's next firing
pub fn next_fire_delay<Tz: TimeZone>(schedule: &Schedule, now: &DateTime<Tz>) -> Option<Duration> {
    let next = schedule.after(now).next()?;
    let millis = next.timestamp_millis() - now.timestamp_millis();
    Some(Duration::from_millis(millis.max(0) as u64))
}

/// Run one firing on its own task so a panic stays contained
async fn run_isolated<Fut>(name: &str, fut: Fut)
where
    Fut: Future<Output = ()> + Send + 'static,
{
    if let Err(e) = tokio::spawn(fut).await {
        if e.is_panic() {
            error!("Job '{}' panicked; timer continues", name);
        }
    }
}

/// Owns the process-wide recurring timers
#[derive(Default)]
pub struct Scheduler {
    jobs: Mutex<Vec<JobHandle>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, Vec<JobHandle>> {
        self.jobs.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn track(&self, name: &str, handle: JoinHandle<()>) {
        self.jobs().push(JobHandle {
            name: name.to_string(),
            handle,
        });
    }

    /// Fire after `first`, then every `period` for the life of the scheduler
    pub fn every<F, Fut>(&self, name: &str, first: Duration, period: Duration, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let job_name = name.to_string();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                debug!("Firing job '{}'", job_name);
                run_isolated(&job_name, job()).await;
            }
        });
        info!("Scheduled '{}' every {:?} (first in {:?})", name, period, first);
        self.track(name, handle);
    }

    /// Fire at every local time matched by `schedule`. Firings missed while
    /// the process was down are not replayed.
    pub fn daily<F, Fut>(&self, name: &str, schedule: Schedule, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_schedule(name, schedule, Local::now, job);
    }

    /// Like [`daily`](Self::daily) but reading the time from `clock`
    pub fn on_schedule<Tz, C, F, Fut>(&self, name: &str, schedule: Schedule, clock: C, job: F)
    where
        Tz: TimeZone + Send + Sync + 'static,
        Tz::Offset: Send + Sync,
        C: Fn() -> DateTime<Tz> + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let job_name = name.to_string();
        let handle = tokio::spawn(async move {
            loop {
                let Some(wait) = next_fire_delay(&schedule, &clock()) else {
                    warn!("Schedule for '{}' has no upcoming times; stopping", job_name);
                    return;
                };
                debug!("Job '{}' next fires in {:?}", job_name, wait);
                time::sleep(wait).await;
                run_isolated(&job_name, job()).await;
                // Step past the matched second so it cannot fire twice
                time::sleep(Duration::from_secs(1)).await;
            }
        });
        info!("Scheduled '{}' on cron schedule", name);
        self.track(name, handle);
    }

    /// Fire once after `delay`. Not tracked: the handle is the only way to
    /// cancel it, and dropping the handle leaves it running.
    pub fn once<Fut>(&self, name: &str, delay: Duration, job: Fut) -> JobHandle
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let job_name = name.to_string();
        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            run_isolated(&job_name, job).await;
        });
        JobHandle {
            name: name.to_string(),
            handle,
        }
    }

    /// Number of recurring timers still running
    pub fn active_jobs(&self) -> usize {
        self.jobs().iter().filter(|j| !j.is_finished()).count()
    }

    /// Cancel every recurring timer
    pub fn shutdown(&self) {
        let jobs = std::mem::take(&mut *self.jobs());
        for job in &jobs {
            job.cancel();
        }
        info!("Scheduler stopped {} jobs", jobs.len());
    }
}
