use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDateTime, NaiveTime, Timelike};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Source of the current local time
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Random offsets used by the adaptive trigger
pub trait JitterSource: Send {
    /// Added to the two hour interval, in [-5, 5]
    fn jitter_minutes(&mut self) -> i64;

    /// Added to 09:00 when the next run would fall before 09:00, in [0, 30]
    fn clamp_offset_minutes(&mut self) -> i64;

    /// Added to 09:00 when the next run rolls over midnight, in [0, 59]
    fn rollover_offset_minutes(&mut self) -> i64;
}

pub struct RandomJitter {
    rng: StdRng,
}

impl RandomJitter {
    pub fn new() -> Self {
        Self { rng: StdRng::from_entropy() }
    }
}

impl Default for RandomJitter {
    fn default() -> Self {
        Self::new()
    }
}

impl JitterSource for RandomJitter {
    fn jitter_minutes(&mut self) -> i64 {
        self.rng.gen_range(-5..=5)
    }

    fn clamp_offset_minutes(&mut self) -> i64 {
        self.rng.gen_range(0..=30)
    }

    fn rollover_offset_minutes(&mut self) -> i64 {
        self.rng.gen_range(0..=59)
    }
}

/// Next run of an adaptive task: roughly two hours out, never during the night
pub fn plan_next_run(now: NaiveDateTime, jitter: &mut dyn JitterSource) -> NaiveDateTime {
    let candidate = now + Duration::hours(2) + Duration::minutes(jitter.jitter_minutes());
    let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default();

    if candidate.hour() < 9 {
        candidate.date().and_time(nine) + Duration::minutes(jitter.clamp_offset_minutes())
    } else if candidate.date() > now.date() {
        (now.date() + Duration::days(1)).and_time(nine)
            + Duration::minutes(jitter.rollover_offset_minutes())
    } else {
        candidate
    }
}

/// First occurrence of `at` strictly after `now`
fn next_daily(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now {
        today
    } else {
        (now.date() + Duration::days(1)).and_time(at)
    }
}

#[async_trait]
pub trait ScheduledTask: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    DailyAt(NaiveTime),
    Adaptive,
}

struct Job {
    tag: String,
    trigger: Trigger,
    next_run: NaiveDateTime,
    task: Arc<dyn ScheduledTask>,
}

/// Poll-driven scheduler; due tasks run one after another on the calling task
pub struct Scheduler {
    jobs: Vec<Job>,
    clock: Arc<dyn Clock>,
    jitter: Box<dyn JitterSource>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>, jitter: Box<dyn JitterSource>) -> Self {
        Self { jobs: Vec::new(), clock, jitter }
    }

    /// Run `task` every day at `at` (local time)
    pub fn every_day_at(&mut self, tag: &str, at: NaiveTime, task: Arc<dyn ScheduledTask>) {
        let next_run = next_daily(self.clock.now(), at);
        info!("Scheduled {} daily at {}, next run {}", task.name(), at.format("%H:%M"), next_run);
        self.install(Job { tag: tag.to_string(), trigger: Trigger::DailyAt(at), next_run, task });
    }

    /// Run `task` on the adaptive jittered interval, starting from now
    pub fn adaptive(&mut self, tag: &str, task: Arc<dyn ScheduledTask>) {
        let next_run = plan_next_run(self.clock.now(), self.jitter.as_mut());
        info!("Scheduled {} adaptively, next run {}", task.name(), next_run);
        self.install(Job { tag: tag.to_string(), trigger: Trigger::Adaptive, next_run, task });
    }

    /// Drop every pending occurrence carrying `tag`
    pub fn cancel(&mut self, tag: &str) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|job| job.tag != tag);
        before - self.jobs.len()
    }

    /// Pending occurrences for `tag`
    pub fn pending(&self, tag: &str) -> Vec<NaiveDateTime> {
        self.jobs.iter().filter(|job| job.tag == tag).map(|job| job.next_run).collect()
    }

    /// Run every job that is due, then reschedule it
    pub async fn run_pending(&mut self) {
        let now = self.clock.now();

        let (mut due, waiting): (Vec<Job>, Vec<Job>) =
            std::mem::take(&mut self.jobs).into_iter().partition(|job| job.next_run <= now);
        self.jobs = waiting;
        due.sort_by_key(|job| job.next_run);

        for mut job in due {
            info!("Running scheduled task {}", job.task.name());
            if let Err(e) = job.task.run().await {
                error!("Scheduled task {} failed: {:#}", job.task.name(), e);
            }

            let finished = self.clock.now();
            job.next_run = match job.trigger {
                Trigger::DailyAt(at) => next_daily(finished, at),
                Trigger::Adaptive => plan_next_run(finished, self.jitter.as_mut()),
            };
            info!("Next {} run at {}", job.task.name(), job.next_run);
            self.install(job);
        }
    }

    /// Poll until `shutdown` resolves; a task already running is allowed to finish
    pub async fn run<F>(&mut self, poll: StdDuration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!("Scheduler running ({} jobs)", self.jobs.len());
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Scheduler stopping");
                    break;
                }
                _ = ticker.tick() => self.run_pending().await,
            }
        }
    }

    /// Replace any pending occurrence with the same tag
    fn install(&mut self, job: Job) {
        self.cancel(&job.tag);
        self.jobs.push(job);
    }
}
