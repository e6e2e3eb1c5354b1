//! User identity and per-user settings.
//!
//! Users are keyed internally by UUID and externally by an opaque identifier
//! presented at handshake time. Email collisions are resolved against the
//! stored external identifier: a present-and-different identifier rejects
//! the connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered user.
///
/// `categories` and `key_commands` are comma-separated settings blobs owned
/// by the client; the server stores and fans them out without interpreting
/// their contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub external_id: Option<String>,
    pub categories: Option<String>,
    pub key_commands: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Decide whether a handshake presenting `incoming` may attach to this
    /// stored user. A stored external id that is present and different is a
    /// mismatch; an absent stored id adopts the incoming one.
    pub fn accepts_external_id(&self, incoming: &str) -> bool {
        match self.external_id.as_deref() {
            Some(stored) => stored == incoming,
            None => true,
        }
    }
}

/// Fields required to insert a user row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub external_id: String,
}

/// Settings slice returned to clients on refresh events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserSettings {
    pub categories: String,
    pub key_commands: String,
}

impl UserSettings {
    /// Flatten optional settings blobs into the wire representation.
    pub fn from_user(categories: Option<String>, key_commands: Option<String>) -> Self {
        Self {
            categories: categories.unwrap_or_default(),
            key_commands: key_commands.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn user_with_external_id(external_id: Option<&str>) -> User {
        User {
            id: Uuid::new_v4(),
            email: "ada@example.com".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            external_id: external_id.map(str::to_owned),
            categories: None,
            key_commands: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[rstest]
    #[case(Some("ext-1"), "ext-1", true)]
    #[case(Some("ext-1"), "ext-2", false)]
    #[case(None, "ext-1", true)]
    fn external_id_check(
        #[case] stored: Option<&str>,
        #[case] incoming: &str,
        #[case] expected: bool,
    ) {
        let user = user_with_external_id(stored);
        assert_eq!(user.accepts_external_id(incoming), expected);
    }

    #[rstest]
    fn settings_default_to_empty_strings() {
        let settings = UserSettings::from_user(None, Some("ctrl+k".into()));
        assert_eq!(settings.categories, "");
        assert_eq!(settings.key_commands, "ctrl+k");
    }
}
