//! Maps `db_request_name` values (and their aliases) to handlers.

use crate::handlers::{EntityHandler, RequestHandler};
use crate::harvest::HarvestHandler;
use crate::schema::ALL_ENTITIES;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct Registry {
    handlers: HashMap<&'static str, Arc<dyn RequestHandler>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Register `handler` under its own name and every alias.
    pub fn register(&mut self, aliases: &[&'static str], handler: Arc<dyn RequestHandler>) {
        self.handlers.insert(handler.name(), handler.clone());
        for alias in aliases {
            self.handlers.insert(*alias, handler.clone());
        }
    }

    /// Every entity plus `harvest_metrics`.
    pub fn standard() -> Self {
        #[cfg(debug_assertions)]
        if let Err(e) = crate::schema::validate_descriptors() {
            tracing::error!(error = %e, "schema descriptors are inconsistent");
        }
        let mut registry = Registry::new();
        for &entity in ALL_ENTITIES {
            registry.register(entity.aliases, Arc::new(EntityHandler::new(entity)));
        }
        registry.register(&[], Arc::new(HarvestHandler));
        registry
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn RequestHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Registered names and aliases, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
