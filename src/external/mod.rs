//! # External Collaborators
//!
//! Call contracts for the slow outside world: identifier resolvers and result
//! sinks, plus the client factory actions use to reach them by name. Actions
//! never see a raw network or database handle, only what this factory hands
//! out.

pub mod errors;
pub mod resolver;
pub mod sink;

pub use errors::ExternalCallError;
pub use resolver::{ExternalResolver, Resolution, ResolutionStatus, TableResolver};
pub use sink::{InMemorySink, JsonFileSink, ResultRecord, ResultSink};

use dashmap::DashMap;
use std::sync::Arc;

/// Hands out resolver and sink clients by name
pub trait ClientFactory: Send + Sync {
    fn resolver(&self, name: &str) -> Option<Arc<dyn ExternalResolver>>;

    fn sink(&self, name: &str) -> Option<Arc<dyn ResultSink>>;
}

/// Client factory backed by registrations made at startup
#[derive(Default)]
pub struct StaticClientFactory {
    resolvers: DashMap<String, Arc<dyn ExternalResolver>>,
    sinks: DashMap<String, Arc<dyn ResultSink>>,
}

impl StaticClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the resolver's own name
    pub fn with_resolver(self, resolver: Arc<dyn ExternalResolver>) -> Self {
        self.register_resolver(resolver);
        self
    }

    pub fn with_sink(self, sink: Arc<dyn ResultSink>) -> Self {
        self.register_sink(sink);
        self
    }

    pub fn register_resolver(&self, resolver: Arc<dyn ExternalResolver>) {
        self.resolvers.insert(resolver.name().to_string(), resolver);
    }

    pub fn register_sink(&self, sink: Arc<dyn ResultSink>) {
        self.sinks.insert(sink.name().to_string(), sink);
    }
}

impl ClientFactory for StaticClientFactory {
    fn resolver(&self, name: &str) -> Option<Arc<dyn ExternalResolver>> {
        self.resolvers.get(name).map(|entry| entry.value().clone())
    }

    fn sink(&self, name: &str) -> Option<Arc<dyn ResultSink>> {
        self.sinks.get(name).map(|entry| entry.value().clone())
    }
}

impl std::fmt::Debug for StaticClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticClientFactory")
            .field("resolvers", &self.resolvers.len())
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
