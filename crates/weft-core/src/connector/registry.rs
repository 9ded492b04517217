//! Connector registry for runtime capability lookup.
//!
//! A concurrent id-indexed registry of boxed LLM connectors. The action
//! executor resolves the connector named by an action's config here, falling
//! back to the registry's default when the config names none.

use std::sync::Arc;
use std::sync::RwLock;

use dashmap::DashMap;

use super::llm::BoxLlmConnector;

/// Registry of available LLM connectors, indexed by id.
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: DashMap<String, Arc<BoxLlmConnector>>,
    default_id: RwLock<Option<String>>,
}

impl ConnectorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connectors: DashMap::new(),
            default_id: RwLock::new(None),
        }
    }

    /// Register a connector under the given id.
    ///
    /// The first registered connector becomes the default. Registering an
    /// existing id replaces the connector.
    pub fn register(&self, id: impl Into<String>, connector: BoxLlmConnector) {
        let id = id.into();
        {
            let mut default_id = self.default_id.write().unwrap_or_else(|e| e.into_inner());
            if default_id.is_none() {
                *default_id = Some(id.clone());
            }
        }
        self.connectors.insert(id, Arc::new(connector));
    }

    /// Mark an already-registered id as the default connector.
    pub fn set_default(&self, id: impl Into<String>) {
        let mut default_id = self.default_id.write().unwrap_or_else(|e| e.into_inner());
        *default_id = Some(id.into());
    }

    /// Look up a connector by id.
    pub fn get_llm_connector(&self, id: &str) -> Option<Arc<BoxLlmConnector>> {
        self.connectors.get(id).map(|entry| Arc::clone(&entry))
    }

    /// The default connector, if any is registered.
    pub fn default_llm_connector(&self) -> Option<Arc<BoxLlmConnector>> {
        let default_id = self
            .default_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()?;
        self.get_llm_connector(&default_id)
    }

    /// List all registered connector ids.
    pub fn list_ids(&self) -> Vec<String> {
        self.connectors.iter().map(|e| e.key().clone()).collect()
    }
}
