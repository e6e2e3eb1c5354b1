//! PostgreSQL-backed `UserRepository` implementation.

use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::domain::ports::{Telemetry, UserPersistenceError, UserRepository};
use crate::domain::{NewUser, User, UserSettings};

use super::error_mapping::{classify_diesel_error, classify_pool_error, StorageErrorClass};
use super::models::{NewUserRow, UserRow};
use super::pool::DbPool;
use super::schema::users;
use super::timing::observed;

#[derive(Clone)]
pub struct DieselUserRepository {
    pool: DbPool,
    telemetry: Arc<dyn Telemetry>,
}

impl DieselUserRepository {
    pub fn new(pool: DbPool, telemetry: Arc<dyn Telemetry>) -> Self {
        Self { pool, telemetry }
    }
}

fn map_class(class: StorageErrorClass) -> UserPersistenceError {
    match class {
        StorageErrorClass::Connection(message) => UserPersistenceError::connection(message),
        StorageErrorClass::Query(message) | StorageErrorClass::MissingRelation(message) => {
            UserPersistenceError::query(message)
        }
    }
}

fn map_diesel(error: diesel::result::Error) -> UserPersistenceError {
    map_class(classify_diesel_error(error))
}

#[async_trait]
impl UserRepository for DieselUserRepository {
    async fn create(&self, user: &NewUser) -> Result<User, UserPersistenceError> {
        observed(self.telemetry.as_ref(), "create_user", async {
            let mut conn = self
                .pool
                .get()
                .await
                .map_err(|err| map_class(classify_pool_error(err)))?;

            let row: UserRow = diesel::insert_into(users::table)
                .values(NewUserRow::from_domain(user))
                .returning(UserRow::as_returning())
                .get_result(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(row.into())
        })
        .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserPersistenceError> {
        observed(self.telemetry.as_ref(), "get_user_by_email", async {
            let mut conn = self
                .pool
                .get()
                .await
                .map_err(|err| map_class(classify_pool_error(err)))?;

            let row: Option<UserRow> = users::table
                .filter(users::email.eq(email))
                .select(UserRow::as_select())
                .first(&mut conn)
                .await
                .optional()
                .map_err(map_diesel)?;
            Ok(row.map(Into::into))
        })
        .await
    }

    async fn update_categories(
        &self,
        user_id: Uuid,
        categories: &str,
    ) -> Result<User, UserPersistenceError> {
        observed(self.telemetry.as_ref(), "update_user_categories", async {
            let mut conn = self
                .pool
                .get()
                .await
                .map_err(|err| map_class(classify_pool_error(err)))?;

            let row: UserRow = diesel::update(users::table.filter(users::id.eq(user_id)))
                .set(users::categories.eq(Some(categories)))
                .returning(UserRow::as_returning())
                .get_result(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(row.into())
        })
        .await
    }

    async fn update_commands(
        &self,
        user_id: Uuid,
        key_commands: &str,
    ) -> Result<User, UserPersistenceError> {
        observed(self.telemetry.as_ref(), "update_user_commands", async {
            let mut conn = self
                .pool
                .get()
                .await
                .map_err(|err| map_class(classify_pool_error(err)))?;

            let row: UserRow = diesel::update(users::table.filter(users::id.eq(user_id)))
                .set(users::key_commands.eq(Some(key_commands)))
                .returning(UserRow::as_returning())
                .get_result(&mut conn)
                .await
                .map_err(map_diesel)?;
            Ok(row.into())
        })
        .await
    }

    async fn settings(&self, user_id: Uuid) -> Result<UserSettings, UserPersistenceError> {
        observed(self.telemetry.as_ref(), "get_user_settings", async {
            let mut conn = self
                .pool
                .get()
                .await
                .map_err(|err| map_class(classify_pool_error(err)))?;

            let row: Option<(Option<String>, Option<String>)> = users::table
                .filter(users::id.eq(user_id))
                .select((users::categories, users::key_commands))
                .first(&mut conn)
                .await
                .optional()
                .map_err(map_diesel)?;

            let (categories, key_commands) = row.unwrap_or((None, None));
            Ok(UserSettings::from_user(categories, key_commands))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn pool_errors_map_to_connection_variant() {
        let err = map_class(classify_pool_error(super::super::pool::PoolError(
            "refused".into(),
        )));
        assert!(matches!(err, UserPersistenceError::Connection { .. }));
        assert!(err.to_string().contains("refused"));
    }

    #[rstest]
    fn diesel_errors_map_to_query_variant() {
        let err = map_diesel(diesel::result::Error::NotFound);
        assert!(matches!(err, UserPersistenceError::Query { .. }));
    }
}
