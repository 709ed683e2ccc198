//! # Metadata Provider
//!
//! Read-only source of strategy definitions and conversion edges. The real
//! configuration store sits outside this crate; [`InMemoryMetadataProvider`]
//! covers tests and file-driven deployments.

use crate::error::{MapperError, MapperResult};
use crate::models::{ConversionEdge, Strategy};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Load a strategy with its steps
    async fn get_strategy(&self, name: &str) -> MapperResult<Arc<Strategy>>;

    /// All known conversions, in a stable order
    async fn get_conversion_edges(&self) -> MapperResult<Vec<ConversionEdge>>;
}

/// On-disk shape accepted by [`InMemoryMetadataProvider::from_json_str`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataDocument {
    #[serde(default)]
    pub strategies: Vec<Strategy>,
    #[serde(default)]
    pub conversion_edges: Vec<ConversionEdge>,
}

#[derive(Debug, Default)]
pub struct InMemoryMetadataProvider {
    strategies: RwLock<HashMap<String, Arc<Strategy>>>,
    edges: RwLock<Vec<ConversionEdge>>,
}

impl InMemoryMetadataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(self, strategy: Strategy) -> Self {
        self.add_strategy(strategy);
        self
    }

    pub fn with_edge(self, edge: ConversionEdge) -> Self {
        self.edges.write().push(edge);
        self
    }

    pub fn add_strategy(&self, strategy: Strategy) {
        debug!(strategy = %strategy.name, steps = strategy.steps.len(), "Registering strategy");
        self.strategies
            .write()
            .insert(strategy.name.clone(), Arc::new(strategy));
    }

    pub fn from_document(document: MetadataDocument) -> Self {
        let provider = Self::new();
        for strategy in document.strategies {
            provider.add_strategy(strategy);
        }
        *provider.edges.write() = document.conversion_edges;
        provider
    }

    pub fn from_json_str(json: &str) -> MapperResult<Self> {
        let document: MetadataDocument = serde_json::from_str(json)?;
        Ok(Self::from_document(document))
    }

    pub async fn from_json_file(path: impl AsRef<Path>) -> MapperResult<Self> {
        let path = path.as_ref();
        let body = tokio::fs::read_to_string(path).await.map_err(|e| {
            MapperError::Metadata(format!("failed to read {}: {e}", path.display()))
        })?;
        let provider = Self::from_json_str(&body)?;
        info!(
            path = %path.display(),
            strategies = provider.strategies.read().len(),
            edges = provider.edges.read().len(),
            "Metadata loaded from file"
        );
        Ok(provider)
    }
}

#[async_trait]
impl MetadataProvider for InMemoryMetadataProvider {
    async fn get_strategy(&self, name: &str) -> MapperResult<Arc<Strategy>> {
        self.strategies
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| MapperError::ConfigurationError(format!("unknown strategy '{name}'")))
    }

    async fn get_conversion_edges(&self) -> MapperResult<Vec<ConversionEdge>> {
        Ok(self.edges.read().clone())
    }
}
