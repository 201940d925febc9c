//! Execution services: record store, query/upsert/insert executors, resolution, dedup, validation.

pub mod crud;
pub mod dedup;
mod record_store;
pub mod resolver;
#[cfg(test)]
pub(crate) mod testing;
mod validation;

pub use crud::CrudService;
pub use record_store::{PgRecordStore, RecordStore};
pub use validation::RequestValidator;
