//! PostgreSQL-backed `NotificationRepository` implementation.
//!
//! Deployments may run without the notifications relation migrated yet;
//! undefined-relation failures are surfaced as a dedicated variant so reads
//! can degrade to empty results at the call site.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::domain::ports::{
    NotificationListFilter, NotificationPersistenceError, NotificationRepository, Telemetry,
};
use crate::domain::{NewNotification, Notification};

use super::error_mapping::{classify_diesel_error, classify_pool_error, StorageErrorClass};
use super::models::{NewNotificationRow, NotificationRow};
use super::pool::DbPool;
use super::schema::notifications;
use super::timing::observed;

const BY_TASK_AND_TYPE_SQL: &str = "\
SELECT * FROM notifications \
WHERE user_id = $1 \
  AND notification_type = $2 \
  AND payload->>'task_id' = $3 \
ORDER BY last_modified_at DESC \
LIMIT 1";

const BY_TASK_AND_STAGE_SQL: &str = "\
SELECT * FROM notifications \
WHERE user_id = $1 \
  AND notification_type = 'due_task' \
  AND payload->>'task_id' = $2 \
  AND payload->>'stage' = $3 \
LIMIT 1";

#[derive(Clone)]
pub struct DieselNotificationRepository {
    pool: DbPool,
    telemetry: Arc<dyn Telemetry>,
}

impl DieselNotificationRepository {
    pub fn new(pool: DbPool, telemetry: Arc<dyn Telemetry>) -> Self {
        Self { pool, telemetry }
    }

    async fn conn(
        &self,
    ) -> Result<
        diesel_async::pooled_connection::bb8::PooledConnection<
            '_,
            diesel_async::AsyncPgConnection,
        >,
        NotificationPersistenceError,
    > {
        self.pool
            .get()
            .await
            .map_err(|err| map_class(classify_pool_error(err)))
    }
}

fn map_class(class: StorageErrorClass) -> NotificationPersistenceError {
    match class {
        StorageErrorClass::Connection(message) => {
            NotificationPersistenceError::connection(message)
        }
        StorageErrorClass::Query(message) => NotificationPersistenceError::query(message),
        StorageErrorClass::MissingRelation(message) => {
            NotificationPersistenceError::missing_relation(message)
        }
    }
}

fn map_diesel(error: diesel::result::Error) -> NotificationPersistenceError {
    map_class(classify_diesel_error(error))
}

#[async_trait]
impl NotificationRepository for DieselNotificationRepository {
    async fn create(
        &self,
        notification: &NewNotification,
    ) -> Result<Notification, NotificationPersistenceError> {
        observed(self.telemetry.as_ref(), "create_notification", async {
            let mut conn = self.conn().await?;
            let row: NotificationRow = diesel::insert_into(notifications::table)
                .values(NewNotificationRow::from_domain(notification))
                .returning(NotificationRow::as_returning())
                .get_result(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(row.into())
        })
        .await
    }

    async fn list_for_user(
        &self,
        filter: &NotificationListFilter,
    ) -> Result<Vec<Notification>, NotificationPersistenceError> {
        observed(self.telemetry.as_ref(), "list_notifications", async {
            let mut conn = self.conn().await?;
            let now = Utc::now();

            let mut query = notifications::table
                .filter(notifications::user_id.eq(filter.user_id))
                .into_boxed();

            if !filter.statuses.is_empty() {
                let statuses: Vec<&'static str> = filter
                    .statuses
                    .iter()
                    .map(|status| status.as_str())
                    .collect();
                query = query.filter(notifications::status.eq_any(statuses));
            }
            if !filter.notification_types.is_empty() {
                query = query.filter(
                    notifications::notification_type.eq_any(filter.notification_types.clone()),
                );
            }
            if !filter.priorities.is_empty() {
                let priorities: Vec<&'static str> = filter
                    .priorities
                    .iter()
                    .map(|priority| priority.as_str())
                    .collect();
                query = query.filter(notifications::priority.eq_any(priorities));
            }
            if !filter.include_snoozed {
                query = query.filter(
                    notifications::snoozed_until
                        .is_null()
                        .or(notifications::snoozed_until.le(Some(now))),
                );
            }
            if filter.expired_only {
                query = query.filter(notifications::expires_at.le(Some(now)));
            } else {
                query = query.filter(
                    notifications::expires_at
                        .is_null()
                        .or(notifications::expires_at.gt(Some(now))),
                );
            }

            let rows: Vec<NotificationRow> = query
                .order(notifications::last_modified_at.desc())
                .offset(filter.offset)
                .limit(filter.limit)
                .select(NotificationRow::as_select())
                .load(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
        .await
    }

    async fn mark_seen(
        &self,
        user_id: Uuid,
        notification_ids: &[Uuid],
        last_modified_at: i64,
    ) -> Result<Vec<Notification>, NotificationPersistenceError> {
        observed(self.telemetry.as_ref(), "mark_notifications_seen", async {
            let mut conn = self.conn().await?;
            let rows: Vec<NotificationRow> = diesel::update(
                notifications::table
                    .filter(notifications::user_id.eq(user_id))
                    .filter(notifications::id.eq_any(notification_ids))
                    .filter(notifications::status.eq("unseen")),
            )
            .set((
                notifications::status.eq("seen"),
                notifications::last_modified_at.eq(last_modified_at),
            ))
            .returning(NotificationRow::as_returning())
            .get_results(&mut conn)
            .await
            .map_err(map_diesel)?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
        .await
    }

    async fn mark_all_seen(
        &self,
        user_id: Uuid,
        last_modified_at: i64,
    ) -> Result<Vec<Notification>, NotificationPersistenceError> {
        observed(self.telemetry.as_ref(), "mark_all_notifications_seen", async {
            let mut conn = self.conn().await?;
            let rows: Vec<NotificationRow> = diesel::update(
                notifications::table
                    .filter(notifications::user_id.eq(user_id))
                    .filter(notifications::status.eq("unseen")),
            )
            .set((
                notifications::status.eq("seen"),
                notifications::last_modified_at.eq(last_modified_at),
            ))
            .returning(NotificationRow::as_returning())
            .get_results(&mut conn)
            .await
            .map_err(map_diesel)?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
        .await
    }

    async fn archive(
        &self,
        user_id: Uuid,
        notification_id: Uuid,
        last_modified_at: i64,
    ) -> Result<Option<Notification>, NotificationPersistenceError> {
        observed(self.telemetry.as_ref(), "archive_notification", async {
            let mut conn = self.conn().await?;
            let row: Option<NotificationRow> = diesel::update(
                notifications::table
                    .filter(notifications::user_id.eq(user_id))
                    .filter(notifications::id.eq(notification_id)),
            )
            .set((
                notifications::status.eq("archived"),
                notifications::last_modified_at.eq(last_modified_at),
            ))
            .returning(NotificationRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(map_diesel)?;
            Ok(row.map(Into::into))
        })
        .await
    }

    async fn snooze(
        &self,
        user_id: Uuid,
        notification_id: Uuid,
        snoozed_until: DateTime<Utc>,
        last_modified_at: i64,
    ) -> Result<Option<Notification>, NotificationPersistenceError> {
        observed(self.telemetry.as_ref(), "snooze_notification", async {
            let mut conn = self.conn().await?;
            let row: Option<NotificationRow> = diesel::update(
                notifications::table
                    .filter(notifications::user_id.eq(user_id))
                    .filter(notifications::id.eq(notification_id)),
            )
            .set((
                notifications::snoozed_until.eq(Some(snoozed_until)),
                notifications::last_modified_at.eq(last_modified_at),
            ))
            .returning(NotificationRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(map_diesel)?;
            Ok(row.map(Into::into))
        })
        .await
    }

    async fn release_due_snoozes(
        &self,
        now: DateTime<Utc>,
        last_modified_at: i64,
    ) -> Result<Vec<Notification>, NotificationPersistenceError> {
        observed(self.telemetry.as_ref(), "release_snoozed_notifications", async {
            let mut conn = self.conn().await?;
            let rows: Vec<NotificationRow> = diesel::update(
                notifications::table
                    .filter(notifications::snoozed_until.is_not_null())
                    .filter(notifications::snoozed_until.le(Some(now))),
            )
            .set((
                notifications::snoozed_until.eq(None::<DateTime<Utc>>),
                notifications::last_modified_at.eq(last_modified_at),
            ))
            .returning(NotificationRow::as_returning())
            .get_results(&mut conn)
            .await
            .map_err(map_diesel)?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
        .await
    }

    async fn count_unseen(&self, user_id: Uuid) -> Result<i64, NotificationPersistenceError> {
        observed(self.telemetry.as_ref(), "count_unseen_notifications", async {
            let mut conn = self.conn().await?;
            let count: i64 = notifications::table
                .filter(notifications::user_id.eq(user_id))
                .filter(notifications::status.eq("unseen"))
                .filter(notifications::snoozed_until.is_null())
                .count()
                .get_result(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(count)
        })
        .await
    }

    async fn has_for_task_stage(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        stage: &str,
    ) -> Result<bool, NotificationPersistenceError> {
        observed(self.telemetry.as_ref(), "has_notification_for_stage", async {
            let mut conn = self.conn().await?;
            let rows: Vec<NotificationRow> = diesel::sql_query(BY_TASK_AND_STAGE_SQL)
                .bind::<diesel::sql_types::Uuid, _>(user_id)
                .bind::<diesel::sql_types::Text, _>(task_id.to_string())
                .bind::<diesel::sql_types::Text, _>(stage)
                .load(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(!rows.is_empty())
        })
        .await
    }

    async fn find_by_task_and_type(
        &self,
        user_id: Uuid,
        notification_type: &str,
        task_id: Uuid,
    ) -> Result<Option<Notification>, NotificationPersistenceError> {
        observed(self.telemetry.as_ref(), "get_notification_by_task", async {
            let mut conn = self.conn().await?;
            let rows: Vec<NotificationRow> = diesel::sql_query(BY_TASK_AND_TYPE_SQL)
                .bind::<diesel::sql_types::Uuid, _>(user_id)
                .bind::<diesel::sql_types::Text, _>(notification_type)
                .bind::<diesel::sql_types::Text, _>(task_id.to_string())
                .load(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(rows.into_iter().next().map(Into::into))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn undefined_relation_maps_to_missing_relation_variant() {
        let error = diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::Unknown,
            Box::new(r#"relation "notifications" does not exist"#.to_owned()),
        );
        let mapped = map_diesel(error);
        assert!(mapped.is_missing_relation());
    }

    #[rstest]
    fn stage_lookup_filters_on_payload_keys() {
        assert!(BY_TASK_AND_STAGE_SQL.contains("payload->>'task_id'"));
        assert!(BY_TASK_AND_STAGE_SQL.contains("payload->>'stage'"));
        assert!(BY_TASK_AND_STAGE_SQL.contains("'due_task'"));
    }
}
