//! PostgreSQL-backed `TaskRepository` implementation.
//!
//! The split operation runs in a transaction so the original row and its
//! replacements never coexist; the visibility query is raw SQL because it
//! needs interval arithmetic on `show_before_due_time`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use crate::domain::ports::{
    CompletedTasksFilter, TaskPersistenceError, TaskRepository, Telemetry,
};
use crate::domain::{NewTask, Task, TaskCompletion, TaskEdit, TaskToggle};

use super::error_mapping::{classify_diesel_error, classify_pool_error, StorageErrorClass};
use super::models::{NewTaskRow, TaskRow};
use super::pool::DbPool;
use super::schema::tasks;
use super::timing::observed;

/// Tasks whose visibility window opened within the last sweep interval.
/// The one-minute lower bound keeps already-visible tasks from being
/// re-announced on every tick.
const VISIBILITY_SQL: &str = "\
SELECT * FROM tasks \
WHERE is_completed = FALSE \
  AND due_at IS NOT NULL \
  AND show_before_due_time IS NOT NULL \
  AND $1 >= due_at - (show_before_due_time * interval '1 minute') \
  AND $1 - interval '1 minute' < due_at - (show_before_due_time * interval '1 minute')";

#[derive(Clone)]
pub struct DieselTaskRepository {
    pool: DbPool,
    telemetry: Arc<dyn Telemetry>,
}

impl DieselTaskRepository {
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
        TaskPersistenceError,
    > {
        self.pool
            .get()
            .await
            .map_err(|err| map_class(classify_pool_error(err)))
    }
}

fn map_class(class: StorageErrorClass) -> TaskPersistenceError {
    match class {
        StorageErrorClass::Connection(message) => TaskPersistenceError::connection(message),
        StorageErrorClass::Query(message) | StorageErrorClass::MissingRelation(message) => {
            TaskPersistenceError::query(message)
        }
    }
}

fn map_diesel(error: diesel::result::Error) -> TaskPersistenceError {
    map_class(classify_diesel_error(error))
}

#[async_trait]
impl TaskRepository for DieselTaskRepository {
    async fn create(&self, task: &NewTask) -> Result<Task, TaskPersistenceError> {
        observed(self.telemetry.as_ref(), "create_task", async {
            let mut conn = self.conn().await?;
            let row: TaskRow = diesel::insert_into(tasks::table)
                .values(NewTaskRow::from_domain(task))
                .returning(TaskRow::as_returning())
                .get_result(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(row.into())
        })
        .await
    }

    async fn edit(&self, edit: &TaskEdit) -> Result<Task, TaskPersistenceError> {
        observed(self.telemetry.as_ref(), "edit_task", async {
            let mut conn = self.conn().await?;
            let row: TaskRow = diesel::update(tasks::table.filter(tasks::id.eq(edit.id)))
                .set((
                    tasks::title.eq(edit.title.clone()),
                    tasks::description.eq(edit.description.clone()),
                    tasks::category.eq(edit.category.clone()),
                    tasks::tags.eq(edit.tags.clone()),
                    tasks::last_modified_at.eq(edit.last_modified_at),
                    tasks::priority.eq(edit.priority),
                    tasks::due_at.eq(edit.due_at),
                    tasks::show_before_due_time.eq(edit.show_before_due_time),
                ))
                .returning(TaskRow::as_returning())
                .get_result(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(row.into())
        })
        .await
    }

    async fn toggle(&self, toggle: &TaskToggle) -> Result<Task, TaskPersistenceError> {
        observed(self.telemetry.as_ref(), "toggle_task", async {
            let mut conn = self.conn().await?;
            let row: TaskRow = diesel::update(tasks::table.filter(tasks::id.eq(toggle.id)))
                .set((
                    tasks::toggled_at.eq(toggle.toggled_at),
                    tasks::is_active.eq(toggle.is_active),
                    tasks::duration.eq(toggle.duration.to_string()),
                    tasks::last_modified_at.eq(toggle.last_modified_at),
                ))
                .returning(TaskRow::as_returning())
                .get_result(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(row.into())
        })
        .await
    }

    async fn complete(&self, completion: &TaskCompletion) -> Result<Task, TaskPersistenceError> {
        observed(self.telemetry.as_ref(), "complete_task", async {
            let mut conn = self.conn().await?;
            let row: TaskRow = diesel::update(tasks::table.filter(tasks::id.eq(completion.id)))
                .set((
                    tasks::completed_at.eq(Some(completion.completed_at)),
                    tasks::duration.eq(completion.duration.to_string()),
                    tasks::is_completed.eq(true),
                    tasks::is_active.eq(false),
                    tasks::toggled_at.eq(None::<i64>),
                    tasks::last_modified_at.eq(completion.last_modified_at),
                ))
                .returning(TaskRow::as_returning())
                .get_result(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(row.into())
        })
        .await
    }

    async fn delete(&self, id: Uuid) -> Result<(), TaskPersistenceError> {
        observed(self.telemetry.as_ref(), "delete_task", async {
            let mut conn = self.conn().await?;
            diesel::delete(tasks::table.filter(tasks::id.eq(id)))
                .execute(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Task>, TaskPersistenceError> {
        observed(self.telemetry.as_ref(), "get_task_by_id", async {
            let mut conn = self.conn().await?;
            let row: Option<TaskRow> = tasks::table
                .filter(tasks::id.eq(id))
                .select(TaskRow::as_select())
                .first(&mut conn)
                .await
                .optional()
                .map_err(map_diesel)?;
            Ok(row.map(Into::into))
        })
        .await
    }

    async fn active_for_user(&self, user_id: Uuid) -> Result<Vec<Task>, TaskPersistenceError> {
        observed(self.telemetry.as_ref(), "get_active_tasks", async {
            let mut conn = self.conn().await?;
            let rows: Vec<TaskRow> = tasks::table
                .filter(tasks::user_id.eq(user_id))
                .filter(tasks::is_completed.eq(false))
                .order(tasks::last_modified_at.desc())
                .select(TaskRow::as_select())
                .load(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
        .await
    }

    async fn completed_for_user(
        &self,
        filter: &CompletedTasksFilter,
    ) -> Result<Vec<Task>, TaskPersistenceError> {
        observed(self.telemetry.as_ref(), "get_completed_tasks", async {
            let mut conn = self.conn().await?;

            let mut query = tasks::table
                .filter(tasks::user_id.eq(filter.user_id))
                .filter(tasks::is_completed.eq(true))
                .filter(tasks::completed_at.ge(Some(filter.start_date)))
                .filter(tasks::completed_at.le(Some(filter.end_date)))
                .into_boxed();

            if let Some(category) = &filter.category {
                query = query.filter(tasks::category.eq(category.clone()));
            }
            if let Some(search) = &filter.search {
                let pattern = format!("%{search}%");
                query = query.filter(
                    tasks::title
                        .ilike(pattern.clone())
                        .or(tasks::description.ilike(pattern)),
                );
            }
            if !filter.tags.is_empty() {
                query = query.filter(tasks::tags.overlaps_with(filter.tags.clone()));
            }

            let rows: Vec<TaskRow> = query
                .order(tasks::completed_at.desc())
                .select(TaskRow::as_select())
                .load(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
        .await
    }

    async fn non_completed(&self) -> Result<Vec<Task>, TaskPersistenceError> {
        observed(self.telemetry.as_ref(), "get_non_completed_tasks", async {
            let mut conn = self.conn().await?;
            let rows: Vec<TaskRow> = tasks::table
                .filter(tasks::is_completed.eq(false))
                .select(TaskRow::as_select())
                .load(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
        .await
    }

    async fn due_for_visibility(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Task>, TaskPersistenceError> {
        observed(self.telemetry.as_ref(), "get_tasks_due_for_visibility", async {
            let mut conn = self.conn().await?;
            let rows: Vec<TaskRow> = diesel::sql_query(VISIBILITY_SQL)
                .bind::<diesel::sql_types::Timestamptz, _>(now)
                .load(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
        .await
    }

    async fn upcoming_with_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Task>, TaskPersistenceError> {
        observed(self.telemetry.as_ref(), "get_upcoming_tasks", async {
            let mut conn = self.conn().await?;
            let rows: Vec<TaskRow> = tasks::table
                .filter(tasks::is_completed.eq(false))
                .filter(tasks::due_at.gt(Some(now)))
                .select(TaskRow::as_select())
                .load(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
        .await
    }

    async fn replace_with_splits(
        &self,
        original_id: Uuid,
        splits: &[NewTask],
    ) -> Result<Vec<Task>, TaskPersistenceError> {
        observed(self.telemetry.as_ref(), "split_task", async {
            let mut conn = self.conn().await?;
            let split_rows: Vec<NewTaskRow> =
                splits.iter().map(NewTaskRow::from_domain).collect();

            let inserted: Vec<TaskRow> = conn
                .transaction::<_, diesel::result::Error, _>(|conn| {
                    async move {
                        diesel::delete(tasks::table.filter(tasks::id.eq(original_id)))
                            .execute(conn)
                            .await?;
                        diesel::insert_into(tasks::table)
                            .values(&split_rows)
                            .returning(TaskRow::as_returning())
                            .get_results(conn)
                            .await
                    }
                    .scope_boxed()
                })
                .await
                .map_err(map_diesel)?;

            Ok(inserted.into_iter().map(Into::into).collect())
        })
        .await
    }
}
