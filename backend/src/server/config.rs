//! Application configuration from the environment.
//!
//! `.env` is loaded from the working directory when present; `DB_URL` and
//! `PORT` are required and abort startup with a clear message when missing.

use std::env;

/// Zone the daily cron expressions are evaluated in.
pub const CRON_TIMEZONE: &str = "Europe/Bucharest";

/// Directory served at `/` for client development builds.
pub const STATIC_DIR: &str = "./static";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {name}")]
    MissingVar { name: &'static str },
    #[error("PORT is not a valid port number: {value}")]
    InvalidPort { value: String },
}

/// Runtime configuration resolved once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
}

impl AppConfig {
    /// Read configuration from the process environment, after `.env` has
    /// been loaded by the caller.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = require("DB_URL")?;
        let port_value = require("PORT")?;
        let port = port_value
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort { value: port_value })?;

        Ok(Self { database_url, port })
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar { name }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // Environment-variable tests mutate process state; keep them to error
    // formatting so they stay order-independent.

    #[rstest]
    fn missing_var_error_names_the_variable() {
        let err = ConfigError::MissingVar { name: "DB_URL" };
        assert!(err.to_string().contains("DB_URL"));
    }

    #[rstest]
    fn invalid_port_error_echoes_the_value() {
        let err = ConfigError::InvalidPort {
            value: "eighty".into(),
        };
        assert!(err.to_string().contains("eighty"));
    }
}
