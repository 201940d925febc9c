//! Typed errors and their mapping onto the response envelope.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("validation: {0}")]
    Validation(String),
    #[error("reference not found: no {entity} matching {key}")]
    ReferenceNotFound { entity: &'static str, key: String },
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("cast: {0}")]
    Cast(String),
    #[error("internal {request} request failed: {message}")]
    InternalRequest { request: String, message: String },
    #[error("database: {0}")]
    Db(sqlx::Error),
}

impl AppError {
    /// Short machine-readable code, used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config_error",
            AppError::Validation(_) => "validation_error",
            AppError::ReferenceNotFound { .. } => "reference_not_found",
            AppError::ConstraintViolation(_) => "constraint_violation",
            AppError::Cast(_) => "cast_error",
            AppError::InternalRequest { .. } => "internal_request_failed",
            AppError::Db(_) => "database_error",
        }
    }
}

/// Integrity errors (SQLSTATE class 23) become `ConstraintViolation`; everything else stays `Db`.
impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.code().map(|c| c.starts_with("23")).unwrap_or(false) {
                return AppError::ConstraintViolation(db.message().to_string());
            }
        }
        AppError::Db(e)
    }
}

/// Raised by the registry when the dispatch wiring itself fails. Never wrapped in an envelope.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("unregistered db_request_name: '{0}'")]
    Unregistered(String),
    #[error("request is missing db_request_name")]
    MissingName,
}
