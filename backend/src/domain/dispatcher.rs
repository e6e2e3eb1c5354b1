//! Notification dispatcher: claims due jobs and emits notifications.
//!
//! Runs on the minute tick. Claiming atomically transitions a batch of due
//! jobs to `claimed`; after that point delivery is at-most-once. A crash
//! between claim and insert loses at most that batch; duplicate
//! notifications are considered worse than the very rare loss.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::domain::ports::{
    JobQueueError, NotificationJobQueue, NotificationPersistenceError, NotificationRepository,
    SessionBroadcast,
};
use crate::domain::{
    JobPayload, NewNotification, NotificationJob, NotificationPriority, ScheduleKind,
};

/// Jobs claimed per tick.
const DEFAULT_BATCH_SIZE: i64 = 100;

/// Emitted notifications expire a day after dispatch.
const EXPIRY_HOURS: i64 = 24;

/// Errors that abort a single job. The batch continues.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("job payload could not be decoded: {0}")]
    Payload(#[from] serde_json::Error),
    #[error(transparent)]
    Notification(#[from] NotificationPersistenceError),
}

/// The dispatcher service (invoked once per minute by the cron runtime).
pub struct NotificationDispatcher {
    jobs: Arc<dyn NotificationJobQueue>,
    notifications: Arc<dyn NotificationRepository>,
    broadcast: Arc<dyn SessionBroadcast>,
    batch_size: i64,
}

impl NotificationDispatcher {
    pub fn new(
        jobs: Arc<dyn NotificationJobQueue>,
        notifications: Arc<dyn NotificationRepository>,
        broadcast: Arc<dyn SessionBroadcast>,
    ) -> Self {
        Self {
            jobs,
            notifications,
            broadcast,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[cfg(test)]
    fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Claim and process the due batch. Per-job failures are isolated.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<(), JobQueueError> {
        let claimed = self.jobs.claim_due(self.batch_size, now).await?;
        debug!(count = claimed.len(), "dispatcher claimed due jobs");

        for job in &claimed {
            if let Err(err) = self.process_job(job, now).await {
                warn!(job_id = %job.id, error = %err, "notification job failed");
            }
        }

        Ok(())
    }

    async fn process_job(&self, job: &NotificationJob, now: DateTime<Utc>) -> Result<(), DispatchError> {
        let payload: JobPayload = serde_json::from_value(job.payload.clone())?;
        let (title, description) = render(&payload, job.offset_minutes);

        let notification = self
            .notifications
            .create(&NewNotification {
                user_id: job.user_id,
                title,
                description,
                notification_type: "reminder".to_owned(),
                payload: job.payload.clone(),
                priority: NotificationPriority::for_offset_minutes(job.offset_minutes),
                expires_at: Some(now + Duration::hours(EXPIRY_HOURS)),
                last_modified_at: now.timestamp_millis(),
            })
            .await?;

        // Persist-then-push: a failed push never reverts the row.
        self.broadcast.broadcast_to_user(
            job.user_id,
            "notification_created",
            serde_json::to_value(&notification).unwrap_or_default(),
        );

        Ok(())
    }
}

/// Title and description for a claimed job.
fn render(payload: &JobPayload, offset_minutes: i32) -> (String, Option<String>) {
    match (payload.kind, offset_minutes) {
        (ScheduleKind::Reminder, 0) => (
            "Reminder".to_owned(),
            Some(format!("Reminder: {}", payload.title)),
        ),
        (ScheduleKind::Task, offset) if offset > 0 => (
            "Upcoming Task".to_owned(),
            Some(format!(
                "Your task '{}' is due in {}.",
                payload.title,
                lead_time(offset)
            )),
        ),
        // Mixed-up plans (a muted edit racing the planner) still emit a
        // generic reminder rather than dropping the claim.
        _ => ("Reminder".to_owned(), None),
    }
}

/// Human lead time for an advance offset, in whole hours or days.
fn lead_time(offset_minutes: i32) -> String {
    let hours = offset_minutes / 60;
    if hours >= 24 {
        let days = hours / 24;
        if days == 1 {
            "1 day".to_owned()
        } else {
            format!("{days} days")
        }
    } else if hours == 1 {
        "1 hour".to_owned()
    } else {
        format!("{hours} hours")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{
        MockNotificationJobQueue, MockNotificationRepository, MockSessionBroadcast,
    };
    use crate::domain::{JobState, Notification, NotificationStatus};
    use chrono::TimeZone;
    use rstest::rstest;
    use uuid::Uuid;

    fn utc_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 2, 7, 0, 30)
            .single()
            .expect("valid instant")
    }

    fn job(kind: ScheduleKind, offset_minutes: i32, title: &str) -> NotificationJob {
        let payload = JobPayload {
            schedule_id: Uuid::new_v4(),
            occurrence_id: Uuid::new_v4(),
            offset_minutes,
            title: title.to_owned(),
            kind,
        };
        NotificationJob {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            schedule_id: Some(payload.schedule_id),
            occurrence_id: payload.occurrence_id,
            offset_minutes,
            planned_send_at: utc_now(),
            payload: serde_json::to_value(&payload).expect("serializable"),
            state: JobState::Claimed,
            claimed_at: Some(utc_now()),
        }
    }

    fn notification_from(new: &NewNotification) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            title: new.title.clone(),
            description: new.description.clone(),
            status: NotificationStatus::Unseen,
            notification_type: new.notification_type.clone(),
            payload: new.payload.clone(),
            priority: new.priority,
            expires_at: new.expires_at,
            snoozed_until: None,
            last_modified_at: new.last_modified_at,
        }
    }

    fn broadcast_expecting(event_names: Vec<&'static str>) -> MockSessionBroadcast {
        let mut broadcast = MockSessionBroadcast::new();
        let mut sequence = mockall::Sequence::new();
        for event_name in event_names {
            broadcast
                .expect_broadcast_to_user()
                .times(1)
                .in_sequence(&mut sequence)
                .withf(move |_, event, _| event == event_name)
                .returning(|_, _, _| ());
        }
        broadcast
    }

    #[rstest]
    #[tokio::test]
    async fn reminder_job_emits_exact_time_notification() {
        let claimed = job(ScheduleKind::Reminder, 0, "Call the dentist");
        let now = utc_now();

        let mut queue = MockNotificationJobQueue::new();
        queue
            .expect_claim_due()
            .times(1)
            .returning(move |_, _| Ok(vec![claimed.clone()]));

        let mut repo = MockNotificationRepository::new();
        repo.expect_create()
            .times(1)
            .withf(move |new| {
                new.title == "Reminder"
                    && new.description.as_deref() == Some("Reminder: Call the dentist")
                    && new.priority == NotificationPriority::High
                    && new.notification_type == "reminder"
                    && new.expires_at == Some(now + Duration::hours(24))
            })
            .returning(|new| Ok(notification_from(new)));

        let broadcast = broadcast_expecting(vec!["notification_created"]);

        let dispatcher =
            NotificationDispatcher::new(Arc::new(queue), Arc::new(repo), Arc::new(broadcast));
        dispatcher.tick(now).await.expect("tick succeeds");
    }

    #[rstest]
    #[case(360, "Your task 'Evening review' is due in 6 hours.", NotificationPriority::Normal)]
    #[case(60, "Your task 'Evening review' is due in 1 hour.", NotificationPriority::High)]
    #[case(1440, "Your task 'Evening review' is due in 1 day.", NotificationPriority::Low)]
    #[case(2880, "Your task 'Evening review' is due in 2 days.", NotificationPriority::Low)]
    #[tokio::test]
    async fn task_job_formats_lead_time(
        #[case] offset: i32,
        #[case] expected_description: &'static str,
        #[case] expected_priority: NotificationPriority,
    ) {
        let claimed = job(ScheduleKind::Task, offset, "Evening review");

        let mut queue = MockNotificationJobQueue::new();
        queue
            .expect_claim_due()
            .returning(move |_, _| Ok(vec![claimed.clone()]));

        let mut repo = MockNotificationRepository::new();
        repo.expect_create()
            .times(1)
            .withf(move |new| {
                new.title == "Upcoming Task"
                    && new.description.as_deref() == Some(expected_description)
                    && new.priority == expected_priority
            })
            .returning(|new| Ok(notification_from(new)));

        let mut broadcast = MockSessionBroadcast::new();
        broadcast.expect_broadcast_to_user().returning(|_, _, _| ());

        let dispatcher =
            NotificationDispatcher::new(Arc::new(queue), Arc::new(repo), Arc::new(broadcast));
        dispatcher.tick(utc_now()).await.expect("tick succeeds");
    }

    #[rstest]
    #[tokio::test]
    async fn empty_claim_emits_nothing() {
        let mut queue = MockNotificationJobQueue::new();
        queue.expect_claim_due().returning(|_, _| Ok(Vec::new()));

        let mut repo = MockNotificationRepository::new();
        repo.expect_create().times(0);

        let mut broadcast = MockSessionBroadcast::new();
        broadcast.expect_broadcast_to_user().times(0);

        let dispatcher =
            NotificationDispatcher::new(Arc::new(queue), Arc::new(repo), Arc::new(broadcast));
        dispatcher.tick(utc_now()).await.expect("tick succeeds");
    }

    #[rstest]
    #[tokio::test]
    async fn malformed_payload_does_not_block_the_batch() {
        let mut bad = job(ScheduleKind::Task, 360, "ignored");
        bad.payload = serde_json::json!({"not": "a job payload"});
        let good = job(ScheduleKind::Reminder, 0, "Standup");

        let mut queue = MockNotificationJobQueue::new();
        queue
            .expect_claim_due()
            .returning(move |_, _| Ok(vec![bad.clone(), good.clone()]));

        let mut repo = MockNotificationRepository::new();
        repo.expect_create()
            .times(1)
            .withf(|new| new.description.as_deref() == Some("Reminder: Standup"))
            .returning(|new| Ok(notification_from(new)));

        let mut broadcast = MockSessionBroadcast::new();
        broadcast.expect_broadcast_to_user().returning(|_, _, _| ());

        let dispatcher =
            NotificationDispatcher::new(Arc::new(queue), Arc::new(repo), Arc::new(broadcast));
        dispatcher.tick(utc_now()).await.expect("tick succeeds");
    }

    #[rstest]
    #[tokio::test]
    async fn batch_size_is_forwarded_to_the_claim() {
        let mut queue = MockNotificationJobQueue::new();
        queue
            .expect_claim_due()
            .times(1)
            .withf(|limit, _| *limit == 25)
            .returning(|_, _| Ok(Vec::new()));

        let dispatcher = NotificationDispatcher::new(
            Arc::new(queue),
            Arc::new(MockNotificationRepository::new()),
            Arc::new(MockSessionBroadcast::new()),
        )
        .with_batch_size(25);

        dispatcher.tick(utc_now()).await.expect("tick succeeds");
    }

    #[rstest]
    #[case(60, "1 hour")]
    #[case(180, "3 hours")]
    #[case(720, "12 hours")]
    #[case(1440, "1 day")]
    #[case(4320, "3 days")]
    fn lead_time_wording(#[case] offset: i32, #[case] expected: &str) {
        assert_eq!(lead_time(offset), expected);
    }
}
