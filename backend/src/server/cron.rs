//! Clock and tick source driving the time-based services.
//!
//! Minute-cadence services (planner, dispatcher, snooze release, task
//! evaluators) run on a 60 second interval; the midnight roll-over and the
//! occurrence cleanup run on cron expressions evaluated in the configured
//! zone. Each job owns a dedicated sequential loop: the next tick is not
//! awaited until the previous invocation finished, so a job can never
//! overlap itself.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::domain::{
    MidnightRollover, NotificationDispatcher, OccurrenceCleanup, SchedulePlanner, SnoozeReleaser,
    TaskEvaluator,
};

/// Daily roll-over just before local midnight.
pub const ROLLOVER_CRON: &str = "59 23 * * *";

/// Daily occurrence cleanup in the quiet hours.
pub const CLEANUP_CRON: &str = "0 3 * * *";

const MINUTE: Duration = Duration::from_secs(60);

/// The clock-driven service bundle.
pub struct ClockJobs {
    pub planner: Arc<SchedulePlanner>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub evaluator: Arc<TaskEvaluator>,
    pub snooze: Arc<SnoozeReleaser>,
    pub rollover: Arc<MidnightRollover>,
    pub cleanup: Arc<OccurrenceCleanup>,
}

/// Parse a classic five-field cron expression. The `cron` crate expects a
/// leading seconds field, which is pinned to zero here.
pub fn parse_cron(expression: &str) -> Result<CronSchedule, cron::error::Error> {
    CronSchedule::from_str(&format!("0 {expression}"))
}

/// Spawn every clock loop onto the current runtime.
pub fn spawn_all(jobs: ClockJobs, tz: Tz) {
    let ClockJobs {
        planner,
        dispatcher,
        evaluator,
        snooze,
        rollover,
        cleanup,
    } = jobs;

    spawn_minutely("planner", move |now| {
        let planner = planner.clone();
        async move {
            if let Err(err) = planner.tick(now).await {
                warn!(error = %err, "planner tick failed");
            }
        }
    });

    spawn_minutely("dispatcher", move |now| {
        let dispatcher = dispatcher.clone();
        async move {
            if let Err(err) = dispatcher.tick(now).await {
                warn!(error = %err, "dispatcher tick failed");
            }
        }
    });

    spawn_minutely("snooze_release", move |now| {
        let snooze = snooze.clone();
        async move {
            if let Err(err) = snooze.tick(now).await {
                warn!(error = %err, "snooze release tick failed");
            }
        }
    });

    spawn_minutely("task_evaluators", move |now| {
        let evaluator = evaluator.clone();
        async move {
            evaluator.tick(now).await;
        }
    });

    spawn_cron("midnight_rollover", ROLLOVER_CRON, tz, move |now| {
        let rollover = rollover.clone();
        async move {
            if let Err(err) = rollover.tick(now).await {
                warn!(error = %err, "midnight roll-over failed");
            }
        }
    });

    spawn_cron("occurrence_cleanup", CLEANUP_CRON, tz, move |now| {
        let cleanup = cleanup.clone();
        async move {
            if let Err(err) = cleanup.tick(now).await {
                warn!(error = %err, "occurrence cleanup failed");
            }
        }
    });
}

fn spawn_minutely<F, Fut>(name: &'static str, job: F)
where
    F: Fn(chrono::DateTime<Utc>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MINUTE);
        // A slow tick delays the next one instead of bursting to catch up.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(job = name, "minute job started");
        loop {
            interval.tick().await;
            job(Utc::now()).await;
        }
    });
}

fn spawn_cron<F, Fut>(name: &'static str, expression: &'static str, tz: Tz, job: F)
where
    F: Fn(chrono::DateTime<Utc>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let schedule = match parse_cron(expression) {
        Ok(schedule) => schedule,
        Err(err) => {
            error!(job = name, expression, error = %err, "invalid cron expression");
            return;
        }
    };

    tokio::spawn(async move {
        info!(job = name, expression, %tz, "cron job started");
        loop {
            let Some(next) = schedule.upcoming(tz).next() else {
                warn!(job = name, "cron schedule exhausted");
                return;
            };
            let wait = (next.with_timezone(&Utc) - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;
            job(Utc::now()).await;
        }
    });
}
