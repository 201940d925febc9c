//! Schema descriptors for every table and request entity.

pub mod entities;
pub mod tables;
pub mod types;
pub mod validator;

pub use entities::{entity_by_name, ALL_ENTITIES, VALID_PLATFORMS};
pub use tables::ALL_TABLES;
pub use types::*;
pub use validator::validate_descriptors;
