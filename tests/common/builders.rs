//! Shared fixtures for orchestrator integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use mapper_core::actions::{Action, ActionServices, StepOutcome};
use mapper_core::checkpoint::{CheckpointStore, MemoryCheckpointStore};
use mapper_core::config::MapperConfig;
use mapper_core::context::{ContextDelta, ExecutionContext};
use mapper_core::error::{MapperError, MapperResult};
use mapper_core::external::{ExternalCallError, ExternalResolver, Resolution, StaticClientFactory};
use mapper_core::metadata::InMemoryMetadataProvider;
use mapper_core::models::{StepDefinition, Strategy};
use mapper_core::orchestration::StrategyOrchestrator;
use mapper_core::registry::ActionRegistry;
use mapper_core::trace::InMemoryTraceRecorder;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const PROBE: &str = "probe";

pub fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Resolver backed by a table that counts calls and can fail transiently first
pub struct CountingResolver {
    name: String,
    table: HashMap<String, Vec<String>>,
    calls: AtomicUsize,
    transient_failures: AtomicUsize,
}

impl CountingResolver {
    pub fn new(name: &str, pairs: &[(&str, &str)]) -> Self {
        let mut table: HashMap<String, Vec<String>> = HashMap::new();
        for (source, target) in pairs {
            table
                .entry(source.to_string())
                .or_default()
                .push(target.to_string());
        }
        Self {
            name: name.to_string(),
            table,
            calls: AtomicUsize::new(0),
            transient_failures: AtomicUsize::new(0),
        }
    }

    /// The next `count` calls fail with a server error
    pub fn failing_first(self, count: usize) -> Self {
        self.transient_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExternalResolver for CountingResolver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(&self, identifier: &str) -> Result<Resolution, ExternalCallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(ExternalCallError::ServerError {
                resolver: self.name.clone(),
                status: 503,
            });
        }
        Ok(match self.table.get(identifier) {
            Some(values) => Resolution::primary(values.clone()),
            None => Resolution::not_found(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProbeParams {
    #[serde(default)]
    append: Option<String>,
    #[serde(default)]
    fail: bool,
    #[serde(default)]
    panic: bool,
    #[serde(default)]
    sleep_ms: Option<u64>,
    /// Fire the shared cancellation token after running
    #[serde(default)]
    cancel: bool,
}

/// One observed probe execution
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeCall {
    pub step_name: String,
    pub identifiers_seen: Vec<String>,
}

/// Scriptable action that records what it saw
#[derive(Clone, Default)]
pub struct Probe {
    calls: Arc<Mutex<Vec<ProbeCall>>>,
    pub cancel: CancellationToken,
}

impl Probe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ProbeCall> {
        self.calls.lock().clone()
    }

    pub fn executed_steps(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.step_name).collect()
    }

    pub fn reset(&self) {
        self.calls.lock().clear();
    }

    /// Built-in actions plus the `probe` tag
    pub fn registry(&self) -> Arc<ActionRegistry> {
        let registry = ActionRegistry::with_builtin_actions();
        let probe = self.clone();
        registry.register_fn(PROBE, move |step, _config| {
            let params: ProbeParams = step.params.parse(&step.name)?;
            Ok(Box::new(ProbeAction {
                step_name: step.name.clone(),
                params,
                probe: probe.clone(),
            }) as Box<dyn Action>)
        });
        Arc::new(registry)
    }
}

struct ProbeAction {
    step_name: String,
    params: ProbeParams,
    probe: Probe,
}

#[async_trait]
impl Action for ProbeAction {
    fn tag(&self) -> &str {
        PROBE
    }

    async fn execute(&self, context: &ExecutionContext, _services: &ActionServices) -> StepOutcome {
        self.probe.calls.lock().push(ProbeCall {
            step_name: self.step_name.clone(),
            identifiers_seen: context.current_identifiers().to_vec(),
        });

        if let Some(ms) = self.params.sleep_ms {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if self.params.panic {
            panic!("probe '{}' panicked", self.step_name);
        }
        if self.params.cancel {
            self.probe.cancel.cancel();
        }
        if self.params.fail {
            return StepOutcome::failure(MapperError::step(&self.step_name, "probe failure"));
        }

        let mut identifiers = context.current_identifiers().to_vec();
        if let Some(value) = &self.params.append {
            identifiers.push(value.clone());
        }
        StepOutcome::success(ContextDelta::new().with_identifiers(identifiers))
    }
}

pub fn probe_step(name: &str, params: serde_json::Value) -> StepDefinition {
    StepDefinition::new(name, PROBE).with_params(params)
}

pub fn appending(name: &str, value: &str) -> StepDefinition {
    probe_step(name, json!({ "append": value }))
}

/// Three appending steps: `["x"]` becomes `["x", "a", "b", "c"]`
pub fn three_step_strategy(name: &str) -> Strategy {
    Strategy::new(name, "test")
        .with_step(appending("one", "a"))
        .with_step(appending("two", "b"))
        .with_step(appending("three", "c"))
}

/// Everything a test needs to drive and inspect runs
pub struct Harness {
    pub orchestrator: StrategyOrchestrator,
    pub probe: Probe,
    pub metadata: Arc<InMemoryMetadataProvider>,
    pub clients: Arc<StaticClientFactory>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub trace: Arc<InMemoryTraceRecorder>,
}

pub struct HarnessBuilder {
    metadata: InMemoryMetadataProvider,
    clients: StaticClientFactory,
    config: MapperConfig,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    probe: Probe,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        let mut config = MapperConfig::default();
        config.backoff.base_delay_ms = 1;
        config.backoff.max_delay_ms = 5;
        Self {
            metadata: InMemoryMetadataProvider::new(),
            clients: StaticClientFactory::new(),
            config,
            checkpoints: None,
            probe: Probe::new(),
        }
    }

    pub fn strategy(self, strategy: Strategy) -> Self {
        Self {
            metadata: self.metadata.with_strategy(strategy),
            ..self
        }
    }

    pub fn edge(self, edge: mapper_core::models::ConversionEdge) -> Self {
        Self {
            metadata: self.metadata.with_edge(edge),
            ..self
        }
    }

    pub fn resolver(self, resolver: Arc<dyn ExternalResolver>) -> Self {
        Self {
            clients: self.clients.with_resolver(resolver),
            ..self
        }
    }

    pub fn configure(mut self, f: impl FnOnce(&mut MapperConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// Reuse a probe across harnesses (simulated restarts)
    pub fn probe(mut self, probe: Probe) -> Self {
        self.probe = probe;
        self
    }

    pub fn build(self) -> MapperResult<Harness> {
        let metadata = Arc::new(self.metadata);
        let clients = Arc::new(self.clients);
        let checkpoints = self
            .checkpoints
            .unwrap_or_else(|| Arc::new(MemoryCheckpointStore::new()));
        let trace = Arc::new(InMemoryTraceRecorder::new());

        let orchestrator = StrategyOrchestrator::builder(metadata.clone(), clients.clone())
            .with_config(self.config)
            .with_registry(self.probe.registry())
            .with_checkpoint_store(checkpoints.clone())
            .with_trace_recorder(trace.clone())
            .build()?;

        Ok(Harness {
            orchestrator,
            probe: self.probe,
            metadata,
            clients,
            checkpoints,
            trace,
        })
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}
