//! Shared unseen-count refresh used by every flow that mutates
//! notification visibility.

use tracing::warn;
use uuid::Uuid;

use crate::domain::ports::{NotificationRepository, SessionBroadcast};

/// Recount a user's unseen notifications and broadcast
/// `notifications_unseen_count`. Count failures are logged; the caller's
/// flow is never interrupted by a stale badge.
pub async fn broadcast_unseen_count(
    notifications: &dyn NotificationRepository,
    broadcast: &dyn SessionBroadcast,
    user_id: Uuid,
) {
    match notifications.count_unseen(user_id).await {
        Ok(count) => broadcast.broadcast_to_user(
            user_id,
            "notifications_unseen_count",
            serde_json::json!({ "count": count }),
        ),
        Err(err) if err.is_missing_relation() => broadcast.broadcast_to_user(
            user_id,
            "notifications_unseen_count",
            serde_json::json!({ "count": 0 }),
        ),
        Err(err) => warn!(%user_id, error = %err, "unseen count refresh failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{
        MockNotificationRepository, MockSessionBroadcast, NotificationPersistenceError,
    };
    use rstest::rstest;

    #[rstest]
    #[tokio::test]
    async fn broadcasts_the_current_count() {
        let mut repo = MockNotificationRepository::new();
        repo.expect_count_unseen().returning(|_| Ok(3));

        let mut broadcast = MockSessionBroadcast::new();
        broadcast
            .expect_broadcast_to_user()
            .times(1)
            .withf(|_, event, payload| {
                event == "notifications_unseen_count" && payload["count"] == 3
            })
            .returning(|_, _, _| ());

        broadcast_unseen_count(&repo, &broadcast, Uuid::new_v4()).await;
    }

    #[rstest]
    #[tokio::test]
    async fn missing_relation_degrades_to_zero() {
        let mut repo = MockNotificationRepository::new();
        repo.expect_count_unseen()
            .returning(|_| Err(NotificationPersistenceError::missing_relation("42P01")));

        let mut broadcast = MockSessionBroadcast::new();
        broadcast
            .expect_broadcast_to_user()
            .times(1)
            .withf(|_, _, payload| payload["count"] == 0)
            .returning(|_, _, _| ());

        broadcast_unseen_count(&repo, &broadcast, Uuid::new_v4()).await;
    }

    #[rstest]
    #[tokio::test]
    async fn other_errors_are_swallowed_without_broadcast() {
        let mut repo = MockNotificationRepository::new();
        repo.expect_count_unseen()
            .returning(|_| Err(NotificationPersistenceError::query("boom")));

        let mut broadcast = MockSessionBroadcast::new();
        broadcast.expect_broadcast_to_user().times(0);

        broadcast_unseen_count(&repo, &broadcast, Uuid::new_v4()).await;
    }
}
