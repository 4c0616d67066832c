//! Process-wide cache of loaded models.

use super::ModelService;
use crate::config::ModelSpec;
use crate::error::AttnError;
use crate::text::TokenizerConvention;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// A model that the service has loaded.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub spec: ModelSpec,
    pub loaded_at: DateTime<Utc>,
}

impl LoadedModel {
    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn convention(&self) -> TokenizerConvention {
        self.spec.convention
    }
}

/// Load-once cache keyed by model id.
///
/// Only models in the registry can be loaded. The first request for a model
/// triggers [`ModelService::load`]; later requests reuse the cached handle.
pub struct ModelCache {
    service: Arc<dyn ModelService>,
    registry: Vec<ModelSpec>,
    loaded: RwLock<HashMap<String, Arc<LoadedModel>>>,
}

impl ModelCache {
    pub fn new(service: Arc<dyn ModelService>, registry: Vec<ModelSpec>) -> Self {
        Self {
            service,
            registry,
            loaded: RwLock::new(HashMap::new()),
        }
    }

    pub fn service(&self) -> &Arc<dyn ModelService> {
        &self.service
    }

    pub fn registry(&self) -> &[ModelSpec] {
        &self.registry
    }

    /// Fetch a loaded model, loading it on first use.
    pub async fn get(&self, model_id: &str) -> Result<Arc<LoadedModel>, AttnError> {
        if let Some(model) = self.loaded.read().await.get(model_id) {
            return Ok(Arc::clone(model));
        }

        let spec = self
            .registry
            .iter()
            .find(|m| m.id == model_id)
            .cloned()
            .ok_or_else(|| AttnError::unsupported_model(model_id))?;

        // Held across the load so concurrent first requests load only once.
        let mut loaded = self.loaded.write().await;
        if let Some(model) = loaded.get(model_id) {
            return Ok(Arc::clone(model));
        }
        info!(model = model_id, service = self.service.name(), "Loading model");
        self.service.load(model_id).await?;
        let model = Arc::new(LoadedModel {
            spec,
            loaded_at: Utc::now(),
        });
        loaded.insert(model_id.to_string(), Arc::clone(&model));
        Ok(model)
    }

    /// Ids of loaded models, sorted.
    pub async fn loaded_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.loaded.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCache")
            .field("service", &self.service.name())
            .field("registry", &self.registry.len())
            .finish()
    }
}
