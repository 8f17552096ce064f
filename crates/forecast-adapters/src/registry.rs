//! Registry of available forecast adapters
//!
//! The registry is built once at startup and read-only afterwards, so it can
//! be shared across concurrent comparison runs without locking.

use crate::adapter::ForecastAdapter;
use crate::config::{ModelEntry, ModelsFile};
use crate::error::{AdapterError, Result};
use crate::local::LocalAdapter;
use forecast_core::ModelId;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Immutable map of model identifiers to adapters
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<ModelId, Arc<dyn ForecastAdapter>>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("models", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AdapterRegistry {
    pub fn builder() -> AdapterRegistryBuilder {
        AdapterRegistryBuilder::default()
    }

    /// Build every model named in a models file
    ///
    /// Remote models share one client. When the file carries no remote
    /// section, settings are read from the environment.
    pub fn from_config(file: &ModelsFile) -> Result<Self> {
        let mut builder = Self::builder();

        let remote = RemoteBackend::new(file)?;

        for entry in &file.models {
            let adapter: Arc<dyn ForecastAdapter> = if let Some(model) = entry.backend.local_model() {
                let mut adapter = LocalAdapter::new(entry.id.clone(), model);
                if let Some(max_horizon) = entry.max_horizon {
                    adapter = adapter.with_max_horizon(max_horizon);
                }
                if let Some(timeout) = entry.timeout() {
                    adapter = adapter.with_timeout(timeout);
                }
                Arc::new(adapter)
            } else {
                remote.adapter(entry)?
            };
            builder = builder.register(adapter)?;
        }

        builder.build()
    }

    pub fn get(&self, id: &ModelId) -> Option<Arc<dyn ForecastAdapter>> {
        self.adapters.get(id).cloned()
    }

    pub fn contains(&self, id: &ModelId) -> bool {
        self.adapters.contains_key(id)
    }

    /// Registered identifiers in sorted order
    pub fn model_ids(&self) -> Vec<ModelId> {
        self.adapters.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Client shared by every remote model of one registry
struct RemoteBackend {
    #[cfg(feature = "remote")]
    client: Option<Arc<crate::remote::RemoteClient>>,
}

#[cfg(feature = "remote")]
impl RemoteBackend {
    fn new(file: &ModelsFile) -> Result<Self> {
        if !file.models.iter().any(|m| m.backend.is_remote()) {
            return Ok(Self { client: None });
        }
        let settings = match &file.remote {
            Some(settings) => settings.clone().with_env_token(),
            None => crate::remote::RemoteSettings::from_env()?,
        };
        Ok(Self {
            client: Some(Arc::new(crate::remote::RemoteClient::new(settings)?)),
        })
    }

    fn adapter(&self, entry: &ModelEntry) -> Result<Arc<dyn ForecastAdapter>> {
        use crate::config::BackendConfig;
        use crate::remote::RemoteForecastAdapter;

        let (BackendConfig::Remote { model }, Some(client)) = (&entry.backend, &self.client) else {
            return Err(AdapterError::Config(format!(
                "model '{}' has no usable backend",
                entry.id
            )));
        };

        let mut adapter =
            RemoteForecastAdapter::new(entry.id.clone(), model.clone(), Arc::clone(client));
        if let Some(max_horizon) = entry.max_horizon {
            adapter = adapter.with_max_horizon(max_horizon);
        }
        if let Some(timeout) = entry.timeout() {
            adapter = adapter.with_timeout(timeout);
        }
        Ok(Arc::new(adapter))
    }
}

#[cfg(not(feature = "remote"))]
impl RemoteBackend {
    fn new(_file: &ModelsFile) -> Result<Self> {
        Ok(Self {})
    }

    fn adapter(&self, entry: &ModelEntry) -> Result<Arc<dyn ForecastAdapter>> {
        Err(AdapterError::Config(format!(
            "model '{}' needs the remote backend, which is not compiled in",
            entry.id
        )))
    }
}

/// Collects adapters and rejects duplicate identifiers
#[derive(Default)]
pub struct AdapterRegistryBuilder {
    adapters: BTreeMap<ModelId, Arc<dyn ForecastAdapter>>,
}

impl AdapterRegistryBuilder {
    pub fn register(mut self, adapter: Arc<dyn ForecastAdapter>) -> Result<Self> {
        let id = adapter.model_id().clone();
        if self.adapters.contains_key(&id) {
            return Err(AdapterError::DuplicateModel(id));
        }
        self.adapters.insert(id, adapter);
        Ok(self)
    }

    pub fn build(self) -> Result<AdapterRegistry> {
        if self.adapters.is_empty() {
            return Err(AdapterError::Config("no models registered".to_string()));
        }
        info!(
            "Registered {} forecast models: {:?}",
            self.adapters.len(),
            self.adapters.keys().map(ModelId::as_str).collect::<Vec<_>>()
        );
        Ok(AdapterRegistry {
            adapters: self.adapters,
        })
    }
}
