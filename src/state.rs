//! Shared request context: record store, target schema and the handler registry.

use crate::error::DispatchError;
use crate::registry::Registry;
use crate::request::DbRequest;
use crate::response::DbActionResponse;
use crate::service::{PgRecordStore, RecordStore};
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct DbContext {
    store: Arc<dyn RecordStore>,
    schema: Arc<str>,
    registry: Arc<Registry>,
}

impl DbContext {
    pub fn new(pool: PgPool, schema: &str) -> Self {
        Self::with_store(Arc::new(PgRecordStore::new(pool)), schema)
    }

    pub fn with_store(store: Arc<dyn RecordStore>, schema: &str) -> Self {
        DbContext {
            store,
            schema: Arc::from(schema),
            registry: Arc::new(Registry::standard()),
        }
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Dispatch a raw request by its `db_request_name`. Only an unknown or missing name is an `Err`;
    /// every other failure comes back as an unsuccessful envelope.
    pub async fn submit(&self, request: &Value) -> Result<DbActionResponse, DispatchError> {
        let name = DbRequest::name_of(request).ok_or(DispatchError::MissingName)?;
        let handler = self
            .registry
            .lookup(name)
            .ok_or_else(|| DispatchError::Unregistered(name.to_string()))?;
        let method = request.get("method").and_then(Value::as_str).unwrap_or_default();
        tracing::info!(request = name, method, "dispatch");
        Ok(handler.handle(self, request).await)
    }
}
