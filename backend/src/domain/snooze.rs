//! Snooze releaser: re-surfaces notifications whose snooze window elapsed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::domain::ports::{
    NotificationPersistenceError, NotificationRepository, SessionBroadcast,
};
use crate::domain::unseen_count::broadcast_unseen_count;
use crate::domain::Notification;

/// The releaser (runs on the dispatcher's minute tick).
pub struct SnoozeReleaser {
    notifications: Arc<dyn NotificationRepository>,
    broadcast: Arc<dyn SessionBroadcast>,
}

impl SnoozeReleaser {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        broadcast: Arc<dyn SessionBroadcast>,
    ) -> Self {
        Self {
            notifications,
            broadcast,
        }
    }

    /// Clear every elapsed snooze in one storage operation, then re-emit the
    /// released notifications per user and refresh unseen counts.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<(), NotificationPersistenceError> {
        let released = self
            .notifications
            .release_due_snoozes(now, now.timestamp_millis())
            .await?;
        if released.is_empty() {
            return Ok(());
        }
        debug!(count = released.len(), "snoozed notifications released");

        let mut buckets: HashMap<Uuid, Vec<Notification>> = HashMap::new();
        for notification in released {
            buckets
                .entry(notification.user_id)
                .or_default()
                .push(notification);
        }

        for (user_id, bucket) in buckets {
            self.broadcast.broadcast_to_user(
                user_id,
                "notifications_reemitted",
                serde_json::json!({ "notifications": bucket }),
            );
            broadcast_unseen_count(self.notifications.as_ref(), self.broadcast.as_ref(), user_id)
                .await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{MockNotificationRepository, MockSessionBroadcast};
    use crate::domain::{NotificationPriority, NotificationStatus};
    use chrono::TimeZone;
    use rstest::rstest;

    fn released(user_id: Uuid) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user_id,
            title: "Reminder".into(),
            description: None,
            status: NotificationStatus::Unseen,
            notification_type: "reminder".into(),
            payload: serde_json::json!({}),
            priority: NotificationPriority::Normal,
            expires_at: None,
            snoozed_until: None,
            last_modified_at: 0,
        }
    }

    #[rstest]
    #[tokio::test]
    async fn reemits_released_notifications_per_user() {
        let user = Uuid::new_v4();
        let now = Utc
            .with_ymd_and_hms(2025, 1, 2, 7, 10, 0)
            .single()
            .expect("valid instant");

        let mut repo = MockNotificationRepository::new();
        repo.expect_release_due_snoozes()
            .times(1)
            .withf(move |at, _| *at == now)
            .returning(move |_, _| Ok(vec![released(user), released(user)]));
        repo.expect_count_unseen().returning(|_| Ok(2));

        let mut broadcast = MockSessionBroadcast::new();
        broadcast
            .expect_broadcast_to_user()
            .times(1)
            .withf(move |uid, event, payload| {
                *uid == user
                    && event == "notifications_reemitted"
                    && payload["notifications"].as_array().map(Vec::len) == Some(2)
            })
            .returning(|_, _, _| ());
        broadcast
            .expect_broadcast_to_user()
            .times(1)
            .withf(|_, event, _| event == "notifications_unseen_count")
            .returning(|_, _, _| ());

        let releaser = SnoozeReleaser::new(Arc::new(repo), Arc::new(broadcast));
        releaser.tick(now).await.expect("tick succeeds");
    }

    #[rstest]
    #[tokio::test]
    async fn quiet_tick_broadcasts_nothing() {
        let mut repo = MockNotificationRepository::new();
        repo.expect_release_due_snoozes()
            .returning(|_, _| Ok(Vec::new()));

        let mut broadcast = MockSessionBroadcast::new();
        broadcast.expect_broadcast_to_user().times(0);

        let releaser = SnoozeReleaser::new(Arc::new(repo), Arc::new(broadcast));
        releaser
            .tick(Utc::now())
            .await
            .expect("tick succeeds");
    }
}
