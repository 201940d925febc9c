//! Connection settings from the environment (and `.env`, when present).

use crate::error::ConfigError;
use regex::Regex;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;

pub const DEFAULT_SCHEMA: &str = "public";
pub const DEFAULT_POOL_SIZE: u32 = 50;
const DEFAULT_PORT: &str = "5432";

#[derive(Clone, Debug, PartialEq)]
pub struct DbSettings {
    pub database_url: String,
    pub schema: String,
    pub pool_size: u32,
}

fn var(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    var(name).ok_or(ConfigError::MissingVar(name))
}

/// Schema names end up in generated SQL, so only plain identifiers are accepted.
pub fn validate_schema_name(schema: &str) -> Result<(), ConfigError> {
    let re = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$")
        .map_err(|e| ConfigError::Validation(e.to_string()))?;
    if re.is_match(schema) {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            name: "SCORE_DB_SCHEMA",
            value: schema.to_string(),
        })
    }
}

impl DbSettings {
    /// `DATABASE_URL` wins; otherwise the URL is assembled from the `SCORE_POSTGRESQL_DB_*` parts.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let database_url = match var("DATABASE_URL") {
            Some(url) => url,
            None => format!(
                "postgres://{}:{}@{}:{}/{}",
                required("SCORE_POSTGRESQL_DB_USERNAME")?,
                required("SCORE_POSTGRESQL_DB_PASSWORD")?,
                required("SCORE_POSTGRESQL_DB_ENDPOINT")?,
                var("SCORE_POSTGRESQL_DB_PORT").unwrap_or_else(|| DEFAULT_PORT.into()),
                required("SCORE_POSTGRESQL_DB_NAME")?,
            ),
        };
        let schema = var("SCORE_DB_SCHEMA").unwrap_or_else(|| DEFAULT_SCHEMA.into());
        validate_schema_name(&schema)?;
        let pool_size = match var("SCORE_DB_POOL_SIZE") {
            None => DEFAULT_POOL_SIZE,
            Some(v) => v
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidValue {
                    name: "SCORE_DB_POOL_SIZE",
                    value: v,
                })?,
        };
        Ok(DbSettings {
            database_url,
            schema,
            pool_size,
        })
    }

    /// Sessions run in UTC so naive timestamps round-trip unchanged.
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        let opts = PgConnectOptions::from_str(&self.database_url).map_err(|e| ConfigError::InvalidValue {
            name: "DATABASE_URL",
            value: e.to_string(),
        })?;
        Ok(opts.options([("timezone", "UTC")]))
    }

    pub async fn connect(&self) -> Result<PgPool, crate::error::AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.pool_size)
            .connect_with(self.connect_options()?)
            .await?;
        tracing::info!(schema = %self.schema, pool_size = self.pool_size, "connected");
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_names_must_be_identifiers() {
        validate_schema_name("public").unwrap();
        validate_schema_name("score_v2").unwrap();
        assert!(validate_schema_name("drop table;").is_err());
        assert!(validate_schema_name("9lives").is_err());
        assert!(validate_schema_name("").is_err());
    }

    #[test]
    fn connect_options_accept_a_plain_url() {
        let s = DbSettings {
            database_url: "postgres://score:pw@localhost:5432/score".into(),
            schema: DEFAULT_SCHEMA.into(),
            pool_size: DEFAULT_POOL_SIZE,
        };
        let opts = s.connect_options().unwrap();
        assert_eq!(opts.get_database(), Some("score"));
    }
}
