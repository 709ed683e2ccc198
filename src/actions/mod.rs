//! # Actions
//!
//! An action is the executable behavior behind a step's tag. It reads the
//! execution context, may call out through the services bundle, and returns a
//! [`StepOutcome`]. Actions never mutate the context or touch orchestration
//! bookkeeping; the orchestrator applies the returned delta on success.
//!
//! Built-in actions are constructed per step from typed parameter structs, so
//! malformed parameters are rejected before a run starts.

pub mod composite_split;
pub mod external_resolve;
pub mod filter;
pub mod local_convert;
pub mod persist;
pub mod reconcile;

pub use composite_split::CompositeSplitAction;
pub use external_resolve::ExternalResolveAction;
pub use filter::FilterByPresenceAction;
pub use local_convert::LocalConvertAction;
pub use persist::PersistResultsAction;
pub use reconcile::{reconcile, ReconcileAction, Reconciliation};

use crate::cache::{Fingerprint, ResolutionCache};
use crate::config::MapperConfig;
use crate::context::{ContextDelta, ExecutionContext, LookupTable};
use crate::error::{MapperError, MapperResult};
use crate::external::{ClientFactory, ExternalResolver, ResolutionStatus};
use crate::metadata::MetadataProvider;
use crate::models::StepDefinition;
use crate::orchestration::backoff_calculator::{retry_with_backoff, BackoffCalculator};
use crate::path_finder::PathFinder;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Result of executing one step's action
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Success {
        delta: ContextDelta,
        /// Counters recorded in the step's provenance entry
        details: BTreeMap<String, serde_json::Value>,
    },
    Failure { error: MapperError },
}

impl StepOutcome {
    pub fn success(delta: ContextDelta) -> Self {
        Self::Success {
            delta,
            details: BTreeMap::new(),
        }
    }

    pub fn success_with(delta: ContextDelta, details: BTreeMap<String, serde_json::Value>) -> Self {
        Self::Success { delta, details }
    }

    pub fn failure(error: MapperError) -> Self {
        Self::Failure { error }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl From<MapperResult<ContextDelta>> for StepOutcome {
    fn from(result: MapperResult<ContextDelta>) -> Self {
        match result {
            Ok(delta) => Self::success(delta),
            Err(error) => Self::failure(error),
        }
    }
}

/// Capabilities handed to every action
#[derive(Clone)]
pub struct ActionServices {
    pub path_finder: Arc<PathFinder>,
    pub resolution_cache: Arc<ResolutionCache>,
    pub clients: Arc<dyn ClientFactory>,
    pub metadata: Arc<dyn MetadataProvider>,
    pub backoff: BackoffCalculator,
    pub execution_id: String,
    pub strategy_name: String,
}

impl ActionServices {
    pub fn new(
        path_finder: Arc<PathFinder>,
        resolution_cache: Arc<ResolutionCache>,
        clients: Arc<dyn ClientFactory>,
        metadata: Arc<dyn MetadataProvider>,
        backoff: BackoffCalculator,
    ) -> Self {
        Self {
            path_finder,
            resolution_cache,
            clients,
            metadata,
            backoff,
            execution_id: String::new(),
            strategy_name: String::new(),
        }
    }

    /// Copy scoped to one execution
    pub fn for_execution(&self, execution_id: &str, strategy_name: &str) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            strategy_name: strategy_name.to_string(),
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for ActionServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionServices")
            .field("execution_id", &self.execution_id)
            .field("strategy_name", &self.strategy_name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Action: Send + Sync {
    /// Registry tag this action was built from
    fn tag(&self) -> &str;

    async fn execute(&self, context: &ExecutionContext, services: &ActionServices) -> StepOutcome;
}

/// Builds an action for one step; rejects malformed parameters
pub type ActionFactory =
    Arc<dyn Fn(&StepDefinition, &MapperConfig) -> MapperResult<Box<dyn Action>> + Send + Sync>;

/// Read an identifier list from the context or fail the step
pub(crate) fn read_identifiers<'a>(
    context: &'a ExecutionContext,
    key: Option<&str>,
    step_name: &str,
) -> MapperResult<&'a [String]> {
    context.identifiers(key).ok_or_else(|| {
        MapperError::step(
            step_name,
            format!("no identifier list in context slot '{}'", key.unwrap_or_default()),
        )
    })
}

/// Numeric parameter with a configured fallback; zero is rejected
pub(crate) fn positive_or_default(
    value: Option<usize>,
    default: usize,
    field: &str,
    step_name: &str,
) -> MapperResult<usize> {
    match value.unwrap_or(default) {
        0 => Err(MapperError::ConfigurationError(format!(
            "step '{step_name}': {field} must be greater than 0"
        ))),
        n => Ok(n),
    }
}

/// Order-preserving de-duplication
pub(crate) fn dedupe_preserving_order<I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

/// Single-identifier lookups through the Resolution Cache with retry, bounded
/// by a semaphore owned by one action instance
pub(crate) struct BoundedLookup {
    semaphore: Arc<Semaphore>,
    max_attempts: u32,
}

impl BoundedLookup {
    pub(crate) fn new(max_concurrency: usize, max_attempts: u32) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_attempts,
        }
    }

    /// Resolve the step's `max_concurrency` and `max_attempts` against config
    pub(crate) fn from_params(
        max_concurrency: Option<usize>,
        max_attempts: Option<u32>,
        config: &MapperConfig,
        step_name: &str,
    ) -> MapperResult<Self> {
        let defaults = &config.resolution;
        let max_concurrency = positive_or_default(
            max_concurrency,
            defaults.max_concurrency,
            "max_concurrency",
            step_name,
        )?;
        let max_attempts = positive_or_default(
            max_attempts.map(|n| n as usize),
            defaults.max_attempts as usize,
            "max_attempts",
            step_name,
        )? as u32;
        Ok(Self::new(max_concurrency, max_attempts))
    }

    pub(crate) fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Resolved values, or the reason the identifier did not resolve
    pub(crate) async fn resolve(
        &self,
        identifier: &str,
        resolver: &Arc<dyn ExternalResolver>,
        services: &ActionServices,
    ) -> Result<Vec<String>, String> {
        // A closed semaphore only drops the bound; the lookup still runs
        let _permit = self.semaphore.acquire().await.ok();
        let fingerprint = Fingerprint::new(resolver.name(), identifier);
        let trimmed = identifier.trim();

        let result = services
            .resolution_cache
            .get_or_fetch(&fingerprint, || {
                retry_with_backoff(&services.backoff, self.max_attempts, move |_| {
                    resolver.resolve(trimmed)
                })
            })
            .await;

        match result {
            Ok(entry) if entry.resolution.is_resolved() => Ok(entry.resolution.values),
            Ok(entry) => Err(match entry.status() {
                ResolutionStatus::Error => entry
                    .resolution
                    .detail
                    .unwrap_or_else(|| ResolutionStatus::Error.to_string()),
                status => status.to_string(),
            }),
            Err(error) => Err(error.to_string()),
        }
    }
}

/// Failure reasons added to whatever earlier steps recorded under `key`
pub(crate) fn merge_failures(
    context: &ExecutionContext,
    key: &str,
    failures: LookupTable,
) -> LookupTable {
    let mut merged = context.lookup(key).cloned().unwrap_or_default();
    for (identifier, reasons) in failures {
        let recorded = merged.entry(identifier).or_default();
        for reason in reasons {
            if !recorded.contains(&reason) {
                recorded.push(reason);
            }
        }
    }
    merged
}
