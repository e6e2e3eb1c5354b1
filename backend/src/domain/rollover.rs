//! Midnight roll-over: closes open time-tracking tasks and reseeds them.
//!
//! Runs once daily just before local midnight. Every non-completed task
//! that carries time (accumulated duration or an open toggle) is completed
//! with its final duration, and a fresh zero-duration copy is inserted for
//! the next day, preserving the active state. Affected users with live
//! sessions get a `tasks_refresher` with their new active list.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::ports::{
    SessionBroadcast, TaskPersistenceError, TaskRepository, UserRepository,
};
use crate::domain::{NewTask, Task, TaskCompletion, TaskDuration};

/// The roll-over service (cron-triggered once per day).
pub struct MidnightRollover {
    tasks: Arc<dyn TaskRepository>,
    users: Arc<dyn UserRepository>,
    broadcast: Arc<dyn SessionBroadcast>,
}

impl MidnightRollover {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        users: Arc<dyn UserRepository>,
        broadcast: Arc<dyn SessionBroadcast>,
    ) -> Self {
        Self {
            tasks,
            users,
            broadcast,
        }
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> Result<(), TaskPersistenceError> {
        let now_ms = now.timestamp_millis();
        let tasks = self.tasks.non_completed().await?;
        let mut affected_users: HashSet<Uuid> = HashSet::new();
        let mut rolled = 0_usize;

        for task in &tasks {
            affected_users.insert(task.user_id);
            if !task.carries_time() {
                continue;
            }

            if let Err(err) = self.roll_task(task, now, now_ms).await {
                warn!(task_id = %task.id, error = %err, "task roll-over failed");
                continue;
            }
            rolled += 1;
        }
        info!(rolled, users = affected_users.len(), "midnight roll-over finished");

        for user_id in affected_users {
            if !self.broadcast.has_sessions(user_id) {
                continue;
            }
            if let Err(err) = self.refresh_user(user_id).await {
                warn!(%user_id, error = %err, "tasks refresher failed");
            }
        }
        Ok(())
    }

    /// Complete `task` with its summed duration and insert tomorrow's copy.
    async fn roll_task(
        &self,
        task: &Task,
        now: DateTime<Utc>,
        now_ms: i64,
    ) -> Result<(), TaskPersistenceError> {
        let final_duration = task
            .duration
            .plus(TaskDuration::from_millis(task.open_segment_millis(now_ms)));

        self.tasks
            .complete(&TaskCompletion {
                id: task.id,
                completed_at: now,
                duration: final_duration,
                last_modified_at: now_ms,
            })
            .await?;

        let carried_toggle = task.toggled_at.filter(|stamp| *stamp != 0).map(|_| now_ms);
        self.tasks
            .create(&NewTask {
                id: Uuid::new_v4(),
                user_id: task.user_id,
                title: task.title.clone(),
                description: task.description.clone(),
                created_at: now,
                completed_at: None,
                duration: TaskDuration::ZERO,
                category: task.category.clone(),
                tags: task.tags.clone(),
                toggled_at: carried_toggle,
                is_active: task.is_active,
                is_completed: false,
                last_modified_at: now_ms,
                priority: task.priority,
                due_at: task.due_at,
                show_before_due_time: task.show_before_due_time,
            })
            .await?;
        Ok(())
    }

    async fn refresh_user(&self, user_id: Uuid) -> Result<(), TaskPersistenceError> {
        let tasks = self.tasks.active_for_user(user_id).await?;
        let settings = self.users.settings(user_id).await.unwrap_or_default();

        self.broadcast.broadcast_to_user(
            user_id,
            "tasks_refresher",
            serde_json::json!({
                "categories": settings.categories,
                "key_commands": settings.key_commands,
                "tasks": tasks,
            }),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{
        MockSessionBroadcast, MockTaskRepository, MockUserRepository,
    };
    use crate::domain::UserSettings;
    use chrono::TimeZone;
    use rstest::rstest;
    use std::sync::Mutex;

    fn utc_now() -> DateTime<Utc> {
        // 23:59 in Bucharest, winter time.
        Utc.with_ymd_and_hms(2025, 1, 10, 21, 59, 0)
            .single()
            .expect("valid instant")
    }

    fn tracked_task(duration: &str, toggled_at: Option<i64>, is_active: bool) -> Task {
        Task {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Deep work".into(),
            description: String::new(),
            created_at: utc_now() - chrono::Duration::hours(4),
            completed_at: None,
            duration: TaskDuration::parse(duration).expect("valid duration"),
            category: "Work".into(),
            tags: vec!["focus".into()],
            toggled_at,
            is_active,
            is_completed: false,
            last_modified_at: 0,
            priority: Some(1),
            due_at: None,
            show_before_due_time: None,
        }
    }

    #[rstest]
    #[tokio::test]
    async fn active_task_is_completed_and_reseeded_with_open_toggle() {
        let now = utc_now();
        let now_ms = now.timestamp_millis();
        // Toggled on at 22:00 local (20:00 UTC), 1h59m before now.
        let toggled_at = now_ms - (119 * 60 * 1_000);
        let task = tracked_task("02:15:00", Some(toggled_at), true);
        let user_id = task.user_id;

        let mut tasks = MockTaskRepository::new();
        tasks
            .expect_non_completed()
            .returning(move || Ok(vec![task.clone()]));

        let completions = Arc::new(Mutex::new(Vec::new()));
        {
            let completions = completions.clone();
            tasks.expect_complete().times(1).returning(move |completion| {
                completions.lock().expect("lock").push(*completion);
                Ok(tracked_task("00:00:00", None, false))
            });
        }

        let inserts = Arc::new(Mutex::new(Vec::new()));
        {
            let inserts = inserts.clone();
            tasks.expect_create().times(1).returning(move |new| {
                inserts.lock().expect("lock").push(new.clone());
                Ok(tracked_task("00:00:00", new.toggled_at, new.is_active))
            });
        }
        tasks
            .expect_active_for_user()
            .returning(|_| Ok(Vec::new()));

        let mut users = MockUserRepository::new();
        users
            .expect_settings()
            .returning(|_| Ok(UserSettings::default()));

        let mut broadcast = MockSessionBroadcast::new();
        broadcast.expect_has_sessions().returning(|_| true);
        broadcast
            .expect_broadcast_to_user()
            .times(1)
            .withf(move |uid, event, _| *uid == user_id && event == "tasks_refresher")
            .returning(|_, _, _| ());

        let rollover =
            MidnightRollover::new(Arc::new(tasks), Arc::new(users), Arc::new(broadcast));
        rollover.tick(now).await.expect("tick succeeds");

        let completions = completions.lock().expect("lock");
        // 02:15:00 accumulated + 01:59:00 open segment.
        assert_eq!(completions[0].duration.to_string(), "04:14:00");
        assert_eq!(completions[0].completed_at, now);

        let inserts = inserts.lock().expect("lock");
        assert_eq!(inserts[0].duration, TaskDuration::ZERO);
        assert_eq!(inserts[0].toggled_at, Some(now_ms));
        assert!(inserts[0].is_active);
        assert!(!inserts[0].is_completed);
        assert_eq!(inserts[0].priority, Some(1));
        assert_eq!(inserts[0].tags, vec!["focus".to_owned()]);
    }

    #[rstest]
    #[tokio::test]
    async fn untracked_tasks_are_left_alone_but_user_still_refreshed() {
        let task = tracked_task("00:00:00", None, false);
        let user_id = task.user_id;

        let mut tasks = MockTaskRepository::new();
        tasks
            .expect_non_completed()
            .returning(move || Ok(vec![task.clone()]));
        tasks.expect_complete().times(0);
        tasks.expect_create().times(0);
        tasks.expect_active_for_user().returning(|_| Ok(Vec::new()));

        let mut users = MockUserRepository::new();
        users
            .expect_settings()
            .returning(|_| Ok(UserSettings::default()));

        let mut broadcast = MockSessionBroadcast::new();
        broadcast.expect_has_sessions().returning(|_| true);
        broadcast
            .expect_broadcast_to_user()
            .times(1)
            .withf(move |uid, event, _| *uid == user_id && event == "tasks_refresher")
            .returning(|_, _, _| ());

        let rollover =
            MidnightRollover::new(Arc::new(tasks), Arc::new(users), Arc::new(broadcast));
        rollover.tick(utc_now()).await.expect("tick succeeds");
    }

    #[rstest]
    #[tokio::test]
    async fn disconnected_users_get_no_refresher() {
        let task = tracked_task("01:00:00", None, false);

        let mut tasks = MockTaskRepository::new();
        tasks
            .expect_non_completed()
            .returning(move || Ok(vec![task.clone()]));
        tasks.expect_complete().returning(|_| {
            Ok(tracked_task("00:00:00", None, false))
        });
        tasks.expect_create().returning(|new| {
            Ok(tracked_task("00:00:00", new.toggled_at, new.is_active))
        });
        tasks.expect_active_for_user().times(0);

        let mut broadcast = MockSessionBroadcast::new();
        broadcast.expect_has_sessions().returning(|_| false);
        broadcast.expect_broadcast_to_user().times(0);

        let rollover = MidnightRollover::new(
            Arc::new(tasks),
            Arc::new(MockUserRepository::new()),
            Arc::new(broadcast),
        );
        rollover.tick(utc_now()).await.expect("tick succeeds");
    }

    #[rstest]
    #[tokio::test]
    async fn future_toggle_stamp_clamps_the_open_segment() {
        let now = utc_now();
        // Stamp an hour in the future; the open segment contributes nothing.
        let task = tracked_task("01:00:00", Some(now.timestamp_millis() + 3_600_000), false);

        let mut tasks = MockTaskRepository::new();
        tasks
            .expect_non_completed()
            .returning(move || Ok(vec![task.clone()]));
        tasks
            .expect_complete()
            .times(1)
            .withf(|completion| completion.duration.to_string() == "01:00:00")
            .returning(|_| Ok(tracked_task("00:00:00", None, false)));
        tasks.expect_create().returning(|new| {
            Ok(tracked_task("00:00:00", new.toggled_at, new.is_active))
        });
        tasks.expect_active_for_user().returning(|_| Ok(Vec::new()));

        let mut users = MockUserRepository::new();
        users
            .expect_settings()
            .returning(|_| Ok(UserSettings::default()));

        let mut broadcast = MockSessionBroadcast::new();
        broadcast.expect_has_sessions().returning(|_| true);
        broadcast.expect_broadcast_to_user().returning(|_, _, _| ());

        let rollover =
            MidnightRollover::new(Arc::new(tasks), Arc::new(users), Arc::new(broadcast));
        rollover.tick(now).await.expect("tick succeeds");
    }
}
