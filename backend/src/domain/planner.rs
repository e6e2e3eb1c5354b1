//! Schedule planner: materializes occurrences and plans notification jobs.
//!
//! Runs on the minute tick. For each active schedule it expands the
//! recurrence into a bounded horizon, upserts occurrences stamped with the
//! schedule revision, ensures linked tasks for task-kind schedules, and
//! plans notification jobs on the effective offsets. Materialization is
//! at-least-once: the cursor backfills two minutes behind now and every
//! write is an upsert, so replays are harmless.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::ports::{
    JobQueueError, NotificationJobQueue, SchedulePersistenceError, ScheduleRepository,
    SessionBroadcast, TaskPersistenceError, TaskRepository,
};
use crate::domain::recurrence::{
    local_to_utc, parse_timezone, Frequency, RecurrenceError, RecurrenceExpansion,
};
use crate::domain::{
    JobPayload, NewNotificationJob, NewTask, Occurrence, Schedule, ScheduleKind, TaskDuration,
};

/// Upper bound on how far any schedule is materialized ahead of now.
const GLOBAL_HORIZON_DAYS: i64 = 60;

/// Cursor backfill absorbing short planner outages.
const BACKFILL_MINUTES: i64 = 2;

/// Cap on occurrences materialized per schedule per tick; the next tick
/// continues from the recorded cursor.
const MAX_OCCURRENCES_PER_TICK: usize = 100;

/// Category given to materialized tasks when the schedule has none.
const DEFAULT_CATEGORY: &str = "Life";

/// Errors that abort processing of a single schedule. The tick itself
/// continues with the remaining schedules.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error(transparent)]
    Recurrence(#[from] RecurrenceError),
    #[error(transparent)]
    Schedule(#[from] SchedulePersistenceError),
    #[error(transparent)]
    Task(#[from] TaskPersistenceError),
    #[error(transparent)]
    Queue(#[from] JobQueueError),
}

/// The planner service (invoked once per minute by the cron runtime).
pub struct SchedulePlanner {
    schedules: Arc<dyn ScheduleRepository>,
    tasks: Arc<dyn TaskRepository>,
    jobs: Arc<dyn NotificationJobQueue>,
    broadcast: Arc<dyn SessionBroadcast>,
}

impl SchedulePlanner {
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        tasks: Arc<dyn TaskRepository>,
        jobs: Arc<dyn NotificationJobQueue>,
        broadcast: Arc<dyn SessionBroadcast>,
    ) -> Self {
        Self {
            schedules,
            tasks,
            jobs,
            broadcast,
        }
    }

    /// Materialize every active schedule. A schedule failure is logged and
    /// skipped; only failing to list schedules aborts the tick.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<(), SchedulePersistenceError> {
        let schedules = self.schedules.active().await?;
        debug!(count = schedules.len(), "planner tick started");

        for schedule in &schedules {
            if let Err(err) = self.process_schedule(schedule, now).await {
                warn!(
                    schedule_id = %schedule.id,
                    error = %err,
                    "schedule skipped for this tick"
                );
            }
        }

        Ok(())
    }

    async fn process_schedule(
        &self,
        schedule: &Schedule,
        now: DateTime<Utc>,
    ) -> Result<(), PlannerError> {
        let tz = parse_timezone(&schedule.tz)?;
        let expansion = RecurrenceExpansion::build(
            schedule.rrule.as_deref(),
            schedule.start_local,
            &schedule.tz,
            schedule.until_local,
        )?;

        let horizon = adaptive_horizon(expansion.frequency(), now);

        let mut cursor_utc = now - Duration::minutes(BACKFILL_MINUTES);
        if let Some(materialized) = schedule.last_materialized_until {
            if materialized > cursor_utc {
                cursor_utc = materialized;
            }
        }
        let mut cursor_local: NaiveDateTime = cursor_utc.with_timezone(&tz).naive_local();

        let mut materialized = 0_usize;
        while let Some(next_local) = expansion.next_after(cursor_local) {
            if materialized >= MAX_OCCURRENCES_PER_TICK {
                info!(
                    schedule_id = %schedule.id,
                    limit = MAX_OCCURRENCES_PER_TICK,
                    "occurrence cap hit; continuing next tick"
                );
                break;
            }

            cursor_local = next_local;
            let Some(occurs_at) = local_to_utc(tz, next_local) else {
                // Wall time inside a DST gap never happens; move past it.
                debug!(schedule_id = %schedule.id, %next_local, "skipped nonexistent local time");
                continue;
            };
            if occurs_at > horizon {
                break;
            }

            let occurrence = self
                .schedules
                .upsert_occurrence(schedule.id, occurs_at, schedule.rev)
                .await?;
            materialized += 1;

            if schedule.kind == ScheduleKind::Task {
                self.ensure_task(schedule, &occurrence, expansion.frequency(), now)
                    .await?;
            }
            self.plan_jobs(schedule, &occurrence, now).await?;
        }

        self.schedules
            .set_last_materialized_until(schedule.id, horizon)
            .await?;

        if let Some(reason) = deactivation_reason(schedule, tz, now) {
            self.schedules.deactivate(schedule.id).await?;
            info!(schedule_id = %schedule.id, reason, "schedule deactivated");
        }

        debug!(schedule_id = %schedule.id, materialized, "schedule processed");
        Ok(())
    }

    /// Create and link a task for the occurrence unless one already exists.
    async fn ensure_task(
        &self,
        schedule: &Schedule,
        occurrence: &Occurrence,
        frequency: Frequency,
        now: DateTime<Utc>,
    ) -> Result<(), PlannerError> {
        if self
            .schedules
            .task_id_for_occurrence(occurrence.id)
            .await?
            .is_some()
        {
            return Ok(());
        }

        // High-frequency tasks are not "due" in the user sense.
        let due_at = if frequency.is_high_frequency() {
            None
        } else {
            Some(occurrence.occurs_at)
        };

        let task = self
            .tasks
            .create(&NewTask {
                id: Uuid::new_v4(),
                user_id: schedule.user_id,
                title: schedule.title.clone(),
                description: String::new(),
                created_at: occurrence.occurs_at,
                completed_at: None,
                duration: TaskDuration::ZERO,
                category: schedule
                    .category
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CATEGORY.to_owned()),
                tags: Vec::new(),
                toggled_at: None,
                is_active: false,
                is_completed: false,
                last_modified_at: now.timestamp_millis(),
                priority: None,
                due_at,
                show_before_due_time: schedule.show_before_minutes,
            })
            .await?;

        self.schedules.link_task(occurrence.id, task.id).await?;
        self.broadcast.broadcast_to_user(
            schedule.user_id,
            "new_task_created",
            serde_json::to_value(&task).unwrap_or_default(),
        );
        Ok(())
    }

    /// Plan notification jobs for the occurrence per the kind's offset rules.
    async fn plan_jobs(
        &self,
        schedule: &Schedule,
        occurrence: &Occurrence,
        now: DateTime<Utc>,
    ) -> Result<(), PlannerError> {
        let offsets: Vec<i32> = match schedule.kind {
            // Tasks keep only advance offsets; the exact-time slot belongs
            // to the due-stage ladder.
            ScheduleKind::Task => schedule
                .effective_offsets()
                .into_iter()
                .filter(|offset| *offset != 0)
                .collect(),
            // Reminders fire exactly once, at the occurrence instant.
            ScheduleKind::Reminder => {
                if schedule.muted_offsets_min.contains(&0) {
                    Vec::new()
                } else {
                    vec![0]
                }
            }
        };

        for offset in offsets {
            let planned_send_at = occurrence.occurs_at - Duration::minutes(i64::from(offset));
            if planned_send_at < now {
                continue;
            }
            if Duration::minutes(i64::from(offset)) > occurrence.occurs_at - now {
                continue;
            }

            let payload = JobPayload {
                schedule_id: schedule.id,
                occurrence_id: occurrence.id,
                offset_minutes: offset,
                title: schedule.title.clone(),
                kind: schedule.kind,
            };
            self.jobs
                .upsert(&NewNotificationJob {
                    user_id: schedule.user_id,
                    schedule_id: Some(schedule.id),
                    occurrence_id: occurrence.id,
                    offset_minutes: offset,
                    planned_send_at,
                    payload: serde_json::to_value(&payload).unwrap_or_default(),
                })
                .await?;
        }

        Ok(())
    }
}

/// Horizon ahead of now, narrowed by the rule frequency and capped globally.
fn adaptive_horizon(frequency: Frequency, now: DateTime<Utc>) -> DateTime<Utc> {
    match frequency {
        Frequency::Minutely => now + Duration::minutes(2),
        Frequency::Hourly => now + Duration::hours(6),
        Frequency::Daily => now + Duration::days(7),
        Frequency::Weekly | Frequency::Monthly | Frequency::Other => {
            now + Duration::days(GLOBAL_HORIZON_DAYS)
        }
    }
}

/// Why a schedule should be flipped inactive after this tick, if at all.
fn deactivation_reason(schedule: &Schedule, tz: Tz, now: DateTime<Utc>) -> Option<&'static str> {
    if schedule.is_one_off() {
        return Some("one-off materialized");
    }
    let until = schedule.until_local?;
    let passed = local_to_utc(tz, until).is_some_and(|bound| bound < now);
    passed.then_some("recurrence end date passed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{
        FixtureSessionBroadcast, MockNotificationJobQueue, MockScheduleRepository,
        MockTaskRepository,
    };
    use crate::domain::Task;
    use chrono::{NaiveDate, TimeZone};
    use rstest::rstest;
    use std::sync::Mutex;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .expect("valid date")
            .and_hms_opt(h, mi, 0)
            .expect("valid time")
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s)
            .single()
            .expect("valid instant")
    }

    fn reminder_schedule() -> Schedule {
        Schedule {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            kind: ScheduleKind::Reminder,
            title: "Call the dentist".into(),
            category: None,
            tz: "Europe/Bucharest".into(),
            start_local: local(2025, 1, 2, 9, 0),
            until_local: None,
            rrule: None,
            rev: 1,
            notify_offsets_min: vec![0],
            muted_offsets_min: vec![],
            show_before_minutes: None,
            last_materialized_until: None,
            is_active: true,
        }
    }

    fn task_from(new: &NewTask) -> Task {
        Task {
            id: new.id,
            user_id: new.user_id,
            title: new.title.clone(),
            description: new.description.clone(),
            created_at: new.created_at,
            completed_at: new.completed_at,
            duration: new.duration,
            category: new.category.clone(),
            tags: new.tags.clone(),
            toggled_at: new.toggled_at,
            is_active: new.is_active,
            is_completed: new.is_completed,
            last_modified_at: new.last_modified_at,
            priority: new.priority,
            due_at: new.due_at,
            show_before_due_time: new.show_before_due_time,
        }
    }

    fn occurrence_from(schedule_id: Uuid, occurs_at: DateTime<Utc>, rev: i32) -> Occurrence {
        Occurrence {
            id: Uuid::new_v4(),
            schedule_id,
            occurs_at,
            rev,
        }
    }

    struct Captured {
        occurrences: Mutex<Vec<DateTime<Utc>>>,
        jobs: Mutex<Vec<NewNotificationJob>>,
        tasks: Mutex<Vec<NewTask>>,
    }

    impl Captured {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                occurrences: Mutex::new(Vec::new()),
                jobs: Mutex::new(Vec::new()),
                tasks: Mutex::new(Vec::new()),
            })
        }
    }

    fn planner_with(
        schedules: Vec<Schedule>,
        captured: Arc<Captured>,
    ) -> SchedulePlanner {
        let mut schedule_repo = MockScheduleRepository::new();
        let mut task_repo = MockTaskRepository::new();
        let mut job_queue = MockNotificationJobQueue::new();

        schedule_repo
            .expect_active()
            .returning(move || Ok(schedules.clone()));
        {
            let captured = captured.clone();
            schedule_repo
                .expect_upsert_occurrence()
                .returning(move |schedule_id, occurs_at, rev| {
                    captured.occurrences.lock().expect("lock").push(occurs_at);
                    Ok(occurrence_from(schedule_id, occurs_at, rev))
                });
        }
        schedule_repo
            .expect_set_last_materialized_until()
            .returning(|_, _| Ok(()));
        schedule_repo.expect_deactivate().returning(|_| Ok(()));
        schedule_repo
            .expect_task_id_for_occurrence()
            .returning(|_| Ok(None));
        schedule_repo.expect_link_task().returning(|_, _| Ok(()));

        {
            let captured = captured.clone();
            task_repo.expect_create().returning(move |new| {
                captured.tasks.lock().expect("lock").push(new.clone());
                Ok(task_from(new))
            });
        }

        {
            let captured = captured.clone();
            job_queue.expect_upsert().returning(move |job| {
                captured.jobs.lock().expect("lock").push(job.clone());
                Ok(())
            });
        }

        SchedulePlanner::new(
            Arc::new(schedule_repo),
            Arc::new(task_repo),
            Arc::new(job_queue),
            Arc::new(FixtureSessionBroadcast),
        )
    }

    #[rstest]
    #[tokio::test]
    async fn one_off_reminder_materializes_one_occurrence_and_one_job() {
        let schedule = reminder_schedule();
        let captured = Captured::new();
        let planner = planner_with(vec![schedule], captured.clone());

        // 08:59:30 local Bucharest (winter, UTC+2).
        let now = utc(2025, 1, 2, 6, 59, 30);
        planner.tick(now).await.expect("tick succeeds");

        let occurrences = captured.occurrences.lock().expect("lock");
        assert_eq!(occurrences.as_slice(), &[utc(2025, 1, 2, 7, 0, 0)]);

        let jobs = captured.jobs.lock().expect("lock");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].offset_minutes, 0);
        assert_eq!(jobs[0].planned_send_at, utc(2025, 1, 2, 7, 0, 0));
        assert_eq!(jobs[0].payload["kind"], "reminder");

        // Reminder schedules never create tasks.
        assert!(captured.tasks.lock().expect("lock").is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn one_off_schedule_is_deactivated_after_processing() {
        let schedule = reminder_schedule();
        let schedule_id = schedule.id;

        let mut schedule_repo = MockScheduleRepository::new();
        let schedules = vec![schedule];
        schedule_repo
            .expect_active()
            .returning(move || Ok(schedules.clone()));
        schedule_repo
            .expect_upsert_occurrence()
            .returning(|sid, at, rev| Ok(occurrence_from(sid, at, rev)));
        schedule_repo
            .expect_set_last_materialized_until()
            .times(1)
            .returning(|_, _| Ok(()));
        schedule_repo
            .expect_deactivate()
            .times(1)
            .withf(move |id| *id == schedule_id)
            .returning(|_| Ok(()));

        let mut job_queue = MockNotificationJobQueue::new();
        job_queue.expect_upsert().returning(|_| Ok(()));

        let planner = SchedulePlanner::new(
            Arc::new(schedule_repo),
            Arc::new(MockTaskRepository::new()),
            Arc::new(job_queue),
            Arc::new(FixtureSessionBroadcast),
        );

        planner
            .tick(utc(2025, 1, 2, 6, 59, 30))
            .await
            .expect("tick succeeds");
    }

    #[rstest]
    #[tokio::test]
    async fn daily_task_schedule_plans_advance_jobs_and_skips_stale_offsets() {
        let mut schedule = reminder_schedule();
        schedule.kind = ScheduleKind::Task;
        schedule.title = "Evening review".into();
        schedule.rrule = Some("FREQ=DAILY".into());
        schedule.start_local = local(2025, 1, 10, 18, 0);
        schedule.notify_offsets_min = vec![2880, 1440, 720, 360, 180];

        let captured = Captured::new();
        let planner = planner_with(vec![schedule], captured.clone());

        // 12:00 local on the first day; first firing is six hours out.
        let now = utc(2025, 1, 10, 10, 0, 0);
        planner.tick(now).await.expect("tick succeeds");

        let occurrences = captured.occurrences.lock().expect("lock");
        // Seven-day horizon for a daily rule: Jan 10 .. Jan 17 local firings
        // at 16:00Z, the last at Jan 17 16:00Z > horizon Jan 17 10:00Z.
        assert_eq!(occurrences.len(), 7);
        assert_eq!(occurrences[0], utc(2025, 1, 10, 16, 0, 0));

        let jobs = captured.jobs.lock().expect("lock");
        assert!(jobs.iter().all(|job| job.offset_minutes != 0));

        let jobs_for = |occurs_at: DateTime<Utc>| -> Vec<i32> {
            jobs.iter()
                .filter(|job| {
                    job.planned_send_at + Duration::minutes(i64::from(job.offset_minutes))
                        == occurs_at
                })
                .map(|job| job.offset_minutes)
                .collect()
        };

        // First occurrence is 6h away: only the 360 and 180 offsets fit.
        assert_eq!(jobs_for(utc(2025, 1, 10, 16, 0, 0)), vec![360, 180]);
        // Second is 30h away: 48h is still out of reach.
        assert_eq!(
            jobs_for(utc(2025, 1, 11, 16, 0, 0)),
            vec![1440, 720, 360, 180]
        );
        // From the third on the full advance set is planned.
        assert_eq!(
            jobs_for(utc(2025, 1, 12, 16, 0, 0)),
            vec![2880, 1440, 720, 360, 180]
        );
        assert_eq!(jobs.len(), 2 + 4 + 5 * 5);

        let tasks = captured.tasks.lock().expect("lock");
        assert_eq!(tasks.len(), 7);
        assert!(tasks.iter().all(|task| task.due_at.is_some()));
        assert_eq!(tasks[0].category, "Life");
    }

    #[rstest]
    #[tokio::test]
    async fn minutely_tasks_have_no_due_date_and_no_jobs() {
        let mut schedule = reminder_schedule();
        schedule.kind = ScheduleKind::Task;
        schedule.rrule = Some("FREQ=MINUTELY".into());
        schedule.start_local = local(2025, 1, 2, 9, 0);
        schedule.notify_offsets_min = vec![2880, 1440, 720, 360, 180];

        let captured = Captured::new();
        let planner = planner_with(vec![schedule], captured.clone());

        planner
            .tick(utc(2025, 1, 2, 7, 0, 30))
            .await
            .expect("tick succeeds");

        let tasks = captured.tasks.lock().expect("lock");
        assert!(!tasks.is_empty());
        assert!(tasks.iter().all(|task| task.due_at.is_none()));

        // Advance offsets all exceed the two-minute horizon.
        assert!(captured.jobs.lock().expect("lock").is_empty());

        // Horizon caps at +2 minutes.
        let occurrences = captured.occurrences.lock().expect("lock");
        assert!(occurrences
            .iter()
            .all(|at| *at <= utc(2025, 1, 2, 7, 2, 30)));
    }

    #[rstest]
    #[tokio::test]
    async fn replay_with_materialized_horizon_adds_nothing() {
        let mut schedule = reminder_schedule();
        schedule.rrule = Some("FREQ=DAILY".into());
        // A previous tick already covered the whole adaptive horizon.
        schedule.last_materialized_until = Some(utc(2025, 1, 9, 7, 0, 0));

        let captured = Captured::new();
        let planner = planner_with(vec![schedule], captured.clone());

        planner
            .tick(utc(2025, 1, 2, 7, 0, 0))
            .await
            .expect("tick succeeds");

        assert!(captured.occurrences.lock().expect("lock").is_empty());
        assert!(captured.jobs.lock().expect("lock").is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn broken_schedule_does_not_halt_the_tick() {
        let mut broken = reminder_schedule();
        broken.tz = "Mars/Olympus".into();
        let healthy = reminder_schedule();

        let captured = Captured::new();
        let planner = planner_with(vec![broken, healthy], captured.clone());

        planner
            .tick(utc(2025, 1, 2, 6, 59, 30))
            .await
            .expect("tick succeeds");

        // The healthy schedule still materialized.
        assert_eq!(captured.occurrences.lock().expect("lock").len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn existing_link_prevents_duplicate_tasks() {
        let mut schedule_repo = MockScheduleRepository::new();
        schedule_repo
            .expect_task_id_for_occurrence()
            .returning(|_| Ok(Some(Uuid::new_v4())));

        let mut task_repo = MockTaskRepository::new();
        task_repo.expect_create().times(0);

        let planner = SchedulePlanner::new(
            Arc::new(schedule_repo),
            Arc::new(task_repo),
            Arc::new(MockNotificationJobQueue::new()),
            Arc::new(FixtureSessionBroadcast),
        );

        let mut schedule = reminder_schedule();
        schedule.kind = ScheduleKind::Task;
        let occurrence = occurrence_from(schedule.id, utc(2025, 1, 2, 7, 0, 0), 1);

        planner
            .ensure_task(
                &schedule,
                &occurrence,
                Frequency::Daily,
                utc(2025, 1, 2, 6, 0, 0),
            )
            .await
            .expect("ensure_task succeeds");
    }

    #[rstest]
    #[case(Frequency::Minutely, 2)]
    #[case(Frequency::Hourly, 360)]
    #[case(Frequency::Daily, 7 * 24 * 60)]
    #[case(Frequency::Weekly, 60 * 24 * 60)]
    #[case(Frequency::Other, 60 * 24 * 60)]
    fn horizon_table(#[case] frequency: Frequency, #[case] minutes_ahead: i64) {
        let now = utc(2025, 6, 1, 0, 0, 0);
        assert_eq!(
            adaptive_horizon(frequency, now),
            now + Duration::minutes(minutes_ahead)
        );
    }
}
