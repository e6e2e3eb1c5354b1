//! Task evaluators: the visibility sweep and the due-stage ladder.
//!
//! Both run on the minute tick, independent of the schedule planner, and
//! cover ad-hoc tasks that never went through materialization.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::ports::{
    NotificationRepository, SessionBroadcast, TaskPersistenceError, TaskRepository,
};
use crate::domain::unseen_count::broadcast_unseen_count;
use crate::domain::{NewNotification, NotificationPriority, Task};

/// One rung of the due-stage ladder.
struct DueStage {
    id: &'static str,
    lead: Duration,
    title: &'static str,
    priority: NotificationPriority,
}

impl DueStage {
    fn describe(&self, task: &Task) -> String {
        format!("Your task '{}' is due in {}.", task.title, self.id_text())
    }

    fn id_text(&self) -> &'static str {
        match self.id {
            "48h" => "48 hours",
            "24h" => "24 hours",
            "12h" => "12 hours",
            "6h" => "6 hours",
            "3h" => "3 hours",
            "1h" => "1 hour",
            other => other,
        }
    }
}

fn due_stages() -> [DueStage; 6] {
    [
        DueStage {
            id: "48h",
            lead: Duration::hours(48),
            title: "Task due in 48 hours",
            priority: NotificationPriority::Low,
        },
        DueStage {
            id: "24h",
            lead: Duration::hours(24),
            title: "Task due in 24 hours",
            priority: NotificationPriority::Low,
        },
        DueStage {
            id: "12h",
            lead: Duration::hours(12),
            title: "Task due in 12 hours",
            priority: NotificationPriority::Normal,
        },
        DueStage {
            id: "6h",
            lead: Duration::hours(6),
            title: "Task due in 6 hours",
            priority: NotificationPriority::Normal,
        },
        DueStage {
            id: "3h",
            lead: Duration::hours(3),
            title: "Task due in 3 hours",
            priority: NotificationPriority::Normal,
        },
        DueStage {
            id: "1h",
            lead: Duration::hours(1),
            title: "Task due in 1 hour",
            priority: NotificationPriority::High,
        },
    ]
}

/// The stage whose one-minute trigger window contains `remaining`, if any.
/// A stage fires when the time left is within the minute ending exactly at
/// the stage lead.
fn determine_stage(remaining: Duration) -> Option<DueStage> {
    let window = Duration::minutes(1);
    due_stages()
        .into_iter()
        .find(|stage| remaining <= stage.lead && remaining > stage.lead - window)
}

/// The evaluator service (invoked once per minute by the cron runtime).
pub struct TaskEvaluator {
    tasks: Arc<dyn TaskRepository>,
    notifications: Arc<dyn NotificationRepository>,
    broadcast: Arc<dyn SessionBroadcast>,
}

impl TaskEvaluator {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        notifications: Arc<dyn NotificationRepository>,
        broadcast: Arc<dyn SessionBroadcast>,
    ) -> Self {
        Self {
            tasks,
            notifications,
            broadcast,
        }
    }

    /// Run both sweeps. Each sweep's failure is logged independently.
    pub async fn tick(&self, now: DateTime<Utc>) {
        if let Err(err) = self.visibility_sweep(now).await {
            warn!(error = %err, "visibility sweep failed");
        }
        if let Err(err) = self.due_stage_sweep(now).await {
            warn!(error = %err, "due-stage sweep failed");
        }
    }

    /// Push tasks whose visibility window just opened, batched per user.
    async fn visibility_sweep(&self, now: DateTime<Utc>) -> Result<(), TaskPersistenceError> {
        let tasks = self.tasks.due_for_visibility(now).await?;
        if tasks.is_empty() {
            return Ok(());
        }
        debug!(count = tasks.len(), "tasks entering visibility");

        let mut buckets: HashMap<Uuid, Vec<Task>> = HashMap::new();
        for task in tasks {
            buckets.entry(task.user_id).or_default().push(task);
        }

        for (user_id, bucket) in buckets {
            self.broadcast.broadcast_to_user(
                user_id,
                "tasks_became_visible",
                serde_json::json!({ "tasks": bucket }),
            );
        }
        Ok(())
    }

    /// Walk upcoming tasks through the due-stage ladder, deduplicating per
    /// `(task, stage)` pair.
    async fn due_stage_sweep(&self, now: DateTime<Utc>) -> Result<(), TaskPersistenceError> {
        let tasks = self.tasks.upcoming_with_due(now).await?;
        let last_modified_at = now.timestamp_millis();

        for task in &tasks {
            let Some(due_at) = task.due_at else {
                continue;
            };
            let remaining = due_at - now;
            if remaining <= Duration::zero() {
                continue;
            }
            let Some(stage) = determine_stage(remaining) else {
                continue;
            };

            if let Err(err) = self
                .fire_stage(task, &stage, due_at, remaining, last_modified_at)
                .await
            {
                warn!(task_id = %task.id, stage = stage.id, error = %err, "due stage skipped");
            }
        }
        Ok(())
    }

    async fn fire_stage(
        &self,
        task: &Task,
        stage: &DueStage,
        due_at: DateTime<Utc>,
        remaining: Duration,
        last_modified_at: i64,
    ) -> Result<(), crate::domain::ports::NotificationPersistenceError> {
        if self
            .notifications
            .has_for_task_stage(task.user_id, task.id, stage.id)
            .await?
        {
            return Ok(());
        }

        let payload = serde_json::json!({
            "task_id": task.id,
            "task_title": task.title,
            "due_at": due_at,
            "stage": stage.id,
            "due_in_seconds": remaining.num_seconds(),
            "category": task.category,
        });

        let notification = self
            .notifications
            .create(&NewNotification {
                user_id: task.user_id,
                title: stage.title.to_owned(),
                description: Some(stage.describe(task)),
                notification_type: "due_task".to_owned(),
                payload,
                priority: stage.priority,
                expires_at: Some(due_at + Duration::hours(24)),
                last_modified_at,
            })
            .await?;

        self.broadcast.broadcast_to_user(
            task.user_id,
            "notification_created",
            serde_json::to_value(&notification).unwrap_or_default(),
        );
        broadcast_unseen_count(
            self.notifications.as_ref(),
            self.broadcast.as_ref(),
            task.user_id,
        )
        .await;

        debug!(task_id = %task.id, stage = stage.id, "due stage fired");
        Ok(())
    }
}
