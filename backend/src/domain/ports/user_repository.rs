//! Port for user persistence adapters.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{NewUser, User, UserSettings};

use super::define_port_error;

define_port_error! {
    /// Persistence errors raised by user repository adapters.
    pub enum UserPersistenceError {
        /// Repository connection could not be established.
        Connection { message: String } => "user repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "user repository query failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user record.
    async fn create(&self, user: &NewUser) -> Result<User, UserPersistenceError>;

    /// Fetch a user by email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserPersistenceError>;

    /// Replace the user's category list blob.
    async fn update_categories(
        &self,
        user_id: Uuid,
        categories: &str,
    ) -> Result<User, UserPersistenceError>;

    /// Replace the user's key command blob.
    async fn update_commands(
        &self,
        user_id: Uuid,
        key_commands: &str,
    ) -> Result<User, UserPersistenceError>;

    /// Read the settings slice sent on refresh events.
    async fn settings(&self, user_id: Uuid) -> Result<UserSettings, UserPersistenceError>;
}
