pub mod settings;

pub use settings::{validate_schema_name, DbSettings, DEFAULT_POOL_SIZE, DEFAULT_SCHEMA};
