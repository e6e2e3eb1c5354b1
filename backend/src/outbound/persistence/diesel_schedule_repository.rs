//! PostgreSQL-backed `ScheduleRepository` implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::domain::ports::{SchedulePersistenceError, ScheduleRepository, Telemetry};
use crate::domain::{NewSchedule, Occurrence, Schedule, ScheduleEdit};

use super::error_mapping::{classify_diesel_error, classify_pool_error, StorageErrorClass};
use super::models::{NewScheduleRow, OccurrenceRow, OccurrenceTaskRow, ScheduleRow};
use super::pool::DbPool;
use super::schema::{occurrence_tasks, occurrences, schedules};
use super::timing::observed;

#[derive(Clone)]
pub struct DieselScheduleRepository {
    pool: DbPool,
    telemetry: Arc<dyn Telemetry>,
}

impl DieselScheduleRepository {
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
        SchedulePersistenceError,
    > {
        self.pool
            .get()
            .await
            .map_err(|err| map_class(classify_pool_error(err)))
    }
}

fn map_class(class: StorageErrorClass) -> SchedulePersistenceError {
    match class {
        StorageErrorClass::Connection(message) => SchedulePersistenceError::connection(message),
        StorageErrorClass::Query(message) | StorageErrorClass::MissingRelation(message) => {
            SchedulePersistenceError::query(message)
        }
    }
}

fn map_diesel(error: diesel::result::Error) -> SchedulePersistenceError {
    map_class(classify_diesel_error(error))
}

#[async_trait]
impl ScheduleRepository for DieselScheduleRepository {
    async fn create(&self, schedule: &NewSchedule) -> Result<Schedule, SchedulePersistenceError> {
        observed(self.telemetry.as_ref(), "create_schedule", async {
            let mut conn = self.conn().await?;
            let row: ScheduleRow = diesel::insert_into(schedules::table)
                .values(NewScheduleRow::from_domain(schedule))
                .returning(ScheduleRow::as_returning())
                .get_result(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(row.into())
        })
        .await
    }

    async fn edit(&self, edit: &ScheduleEdit) -> Result<Schedule, SchedulePersistenceError> {
        observed(self.telemetry.as_ref(), "edit_schedule", async {
            let mut conn = self.conn().await?;
            // Every user edit bumps the revision, invalidating jobs planned
            // against the previous expansion.
            let row: ScheduleRow = diesel::update(schedules::table.filter(schedules::id.eq(edit.id)))
                .set((
                    schedules::title.eq(edit.title.clone()),
                    schedules::category.eq(edit.category.clone()),
                    schedules::tz.eq(edit.tz.clone()),
                    schedules::start_local.eq(edit.start_local),
                    schedules::until_local.eq(edit.until_local),
                    schedules::rrule.eq(edit.rrule.clone()),
                    schedules::notify_offsets_min.eq(edit.notify_offsets_min.clone()),
                    schedules::muted_offsets_min.eq(edit.muted_offsets_min.clone()),
                    schedules::show_before_minutes.eq(edit.show_before_minutes),
                    schedules::is_active.eq(edit.is_active),
                    schedules::rev.eq(schedules::rev + 1),
                ))
                .returning(ScheduleRow::as_returning())
                .get_result(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(row.into())
        })
        .await
    }

    async fn delete(&self, id: Uuid) -> Result<(), SchedulePersistenceError> {
        observed(self.telemetry.as_ref(), "delete_schedule", async {
            let mut conn = self.conn().await?;
            diesel::delete(schedules::table.filter(schedules::id.eq(id)))
                .execute(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(())
        })
        .await
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Schedule>, SchedulePersistenceError> {
        observed(self.telemetry.as_ref(), "list_schedules", async {
            let mut conn = self.conn().await?;
            let rows: Vec<ScheduleRow> = schedules::table
                .filter(schedules::user_id.eq(user_id))
                .order(schedules::start_local.desc())
                .select(ScheduleRow::as_select())
                .load(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
        .await
    }

    async fn active(&self) -> Result<Vec<Schedule>, SchedulePersistenceError> {
        observed(self.telemetry.as_ref(), "get_active_schedules", async {
            let mut conn = self.conn().await?;
            let rows: Vec<ScheduleRow> = schedules::table
                .filter(schedules::is_active.eq(true))
                .select(ScheduleRow::as_select())
                .load(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
        .await
    }

    async fn upsert_occurrence(
        &self,
        schedule_id: Uuid,
        occurs_at: DateTime<Utc>,
        rev: i32,
    ) -> Result<Occurrence, SchedulePersistenceError> {
        observed(self.telemetry.as_ref(), "upsert_occurrence", async {
            let mut conn = self.conn().await?;
            let row: OccurrenceRow = diesel::insert_into(occurrences::table)
                .values((
                    occurrences::id.eq(Uuid::new_v4()),
                    occurrences::schedule_id.eq(schedule_id),
                    occurrences::occurs_at.eq(occurs_at),
                    occurrences::rev.eq(rev),
                ))
                .on_conflict((occurrences::schedule_id, occurrences::occurs_at))
                .do_update()
                .set(occurrences::rev.eq(rev))
                .returning(OccurrenceRow::as_returning())
                .get_result(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(row.into())
        })
        .await
    }

    async fn delete_occurrences_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, SchedulePersistenceError> {
        observed(self.telemetry.as_ref(), "delete_old_occurrences", async {
            let mut conn = self.conn().await?;
            let deleted = diesel::delete(occurrences::table.filter(occurrences::occurs_at.lt(cutoff)))
                .execute(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(deleted as u64)
        })
        .await
    }

    async fn set_last_materialized_until(
        &self,
        schedule_id: Uuid,
        until: DateTime<Utc>,
    ) -> Result<(), SchedulePersistenceError> {
        observed(self.telemetry.as_ref(), "set_last_materialized_until", async {
            let mut conn = self.conn().await?;
            diesel::update(schedules::table.filter(schedules::id.eq(schedule_id)))
                .set(schedules::last_materialized_until.eq(Some(until)))
                .execute(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(())
        })
        .await
    }

    async fn deactivate(&self, schedule_id: Uuid) -> Result<(), SchedulePersistenceError> {
        observed(self.telemetry.as_ref(), "deactivate_schedule", async {
            let mut conn = self.conn().await?;
            diesel::update(schedules::table.filter(schedules::id.eq(schedule_id)))
                .set(schedules::is_active.eq(false))
                .execute(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(())
        })
        .await
    }

    async fn link_task(
        &self,
        occurrence_id: Uuid,
        task_id: Uuid,
    ) -> Result<(), SchedulePersistenceError> {
        observed(self.telemetry.as_ref(), "link_task_to_occurrence", async {
            let mut conn = self.conn().await?;
            diesel::insert_into(occurrence_tasks::table)
                .values(OccurrenceTaskRow {
                    occurrence_id,
                    task_id,
                })
                .on_conflict(occurrence_tasks::occurrence_id)
                .do_nothing()
                .execute(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(())
        })
        .await
    }

    async fn task_id_for_occurrence(
        &self,
        occurrence_id: Uuid,
    ) -> Result<Option<Uuid>, SchedulePersistenceError> {
        observed(self.telemetry.as_ref(), "get_task_for_occurrence", async {
            let mut conn = self.conn().await?;
            let task_id: Option<Uuid> = occurrence_tasks::table
                .filter(occurrence_tasks::occurrence_id.eq(occurrence_id))
                .select(occurrence_tasks::task_id)
                .first(&mut conn)
                .await
                .optional()
                .map_err(map_diesel)?;
            Ok(task_id)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn errors_map_onto_port_variants() {
        let err = map_diesel(diesel::result::Error::NotFound);
        assert!(matches!(err, SchedulePersistenceError::Query { .. }));

        let err = map_class(classify_pool_error(super::super::pool::PoolError(
            "bad dsn".into(),
        )));
        assert!(matches!(err, SchedulePersistenceError::Connection { .. }));
    }
}
