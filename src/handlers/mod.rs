//! Request handlers. Each one answers a `db_request_name` and always returns an envelope.

mod entity;

pub use entity::EntityHandler;

use crate::response::DbActionResponse;
use crate::state::DbContext;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Canonical request name.
    fn name(&self) -> &'static str;

    /// Handle a raw request. Failures are reported inside the envelope.
    async fn handle(&self, ctx: &DbContext, request: &Value) -> DbActionResponse;
}
