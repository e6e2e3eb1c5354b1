//! PostgreSQL-backed notification job queue.
//!
//! Claiming is a single `UPDATE ... WHERE id IN (SELECT ... FOR UPDATE SKIP
//! LOCKED) RETURNING` statement: the rows transition to `claimed` and come
//! back in one round trip, so concurrent invocations can never hand out the
//! same pending job.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{JobQueueError, NotificationJobQueue, Telemetry};
use crate::domain::{NewNotificationJob, NotificationJob};

use super::error_mapping::{classify_diesel_error, classify_pool_error, StorageErrorClass};
use super::models::{NewNotificationJobRow, NotificationJobRow};
use super::pool::DbPool;
use super::schema::notification_jobs;
use super::timing::observed;

const CLAIM_SQL: &str = "\
UPDATE notification_jobs \
SET state = 'claimed', claimed_at = $1 \
WHERE id IN ( \
    SELECT id FROM notification_jobs \
    WHERE state = 'pending' AND planned_send_at <= $1 \
    ORDER BY planned_send_at \
    LIMIT $2 \
    FOR UPDATE SKIP LOCKED \
) \
RETURNING *";

#[derive(Clone)]
pub struct DieselNotificationJobQueue {
    pool: DbPool,
    telemetry: Arc<dyn Telemetry>,
}

impl DieselNotificationJobQueue {
    pub fn new(pool: DbPool, telemetry: Arc<dyn Telemetry>) -> Self {
        Self { pool, telemetry }
    }
}

fn map_class(class: StorageErrorClass) -> JobQueueError {
    match class {
        StorageErrorClass::Connection(message) => JobQueueError::connection(message),
        StorageErrorClass::Query(message) | StorageErrorClass::MissingRelation(message) => {
            JobQueueError::query(message)
        }
    }
}

fn map_diesel(error: diesel::result::Error) -> JobQueueError {
    map_class(classify_diesel_error(error))
}

#[async_trait]
impl NotificationJobQueue for DieselNotificationJobQueue {
    async fn upsert(&self, job: &NewNotificationJob) -> Result<(), JobQueueError> {
        observed(self.telemetry.as_ref(), "upsert_notification_job", async {
            let mut conn = self
                .pool
                .get()
                .await
                .map_err(|err| map_class(classify_pool_error(err)))?;

            // Re-planning refreshes the send time and payload; the state is
            // left untouched so claimed and done jobs stay that way.
            diesel::insert_into(notification_jobs::table)
                .values(NewNotificationJobRow::from_domain(job))
                .on_conflict((
                    notification_jobs::occurrence_id,
                    notification_jobs::offset_minutes,
                ))
                .do_update()
                .set((
                    notification_jobs::planned_send_at.eq(job.planned_send_at),
                    notification_jobs::payload.eq(&job.payload),
                ))
                .execute(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(())
        })
        .await
    }

    async fn claim_due(
        &self,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<NotificationJob>, JobQueueError> {
        observed(self.telemetry.as_ref(), "claim_due_notification_jobs", async {
            let mut conn = self
                .pool
                .get()
                .await
                .map_err(|err| map_class(classify_pool_error(err)))?;

            let rows: Vec<NotificationJobRow> = diesel::sql_query(CLAIM_SQL)
                .bind::<diesel::sql_types::Timestamptz, _>(now)
                .bind::<diesel::sql_types::BigInt, _>(limit)
                .load(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn claim_statement_is_atomic_and_skips_locked_rows() {
        assert!(CLAIM_SQL.contains("FOR UPDATE SKIP LOCKED"));
        assert!(CLAIM_SQL.contains("state = 'pending'"));
        assert!(CLAIM_SQL.contains("RETURNING"));
    }

    #[rstest]
    fn errors_map_onto_port_variants() {
        let err = map_diesel(diesel::result::Error::NotFound);
        assert!(matches!(err, JobQueueError::Query { .. }));
    }
}
