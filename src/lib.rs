//! score-db: verification metrics store for numerical weather prediction experiments.
//!
//! Requests are plain JSON values `{db_request_name, method, params, body}` submitted through
//! [`DbContext::submit`]; every request gets a [`DbActionResponse`] back.

pub mod config;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod harvest;
pub mod migration;
pub mod registry;
pub mod request;
pub mod response;
pub mod schema;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;
pub mod timefmt;

pub use config::DbSettings;
pub use error::{AppError, ConfigError, DispatchError};
pub use migration::apply_migrations;
pub use registry::Registry;
pub use request::{DbRequest, Method};
pub use response::{Action, DbActionResponse, Details};
pub use service::{CrudService, PgRecordStore, RecordStore};
pub use state::DbContext;
pub use store::ensure_database_exists;
