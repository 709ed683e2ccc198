//! # External Resolution
//!
//! Resolves identifiers through a named external resolver (for example a
//! historical-identifier service that maps retired accessions to current
//! ones).
//!
//! Identifiers are processed in `batch_size` chunks. Within a chunk every
//! identifier is looked up concurrently, bounded by a semaphore owned by this
//! action instance, and each lookup goes through the Resolution Cache with
//! retry and backoff for transient failures. A failed identifier is recorded
//! under `failures_key` and never fails the step.

use super::{
    dedupe_preserving_order, merge_failures, positive_or_default, read_identifiers, Action,
    ActionServices, BoundedLookup, StepOutcome,
};
use crate::config::MapperConfig;
use crate::constants::{action_tags, context_keys};
use crate::context::{ContextDelta, ContextValue, ExecutionContext, LookupTable};
use crate::error::{MapperError, MapperResult};
use crate::models::StepDefinition;
use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExternalResolveParams {
    /// Client factory name of the resolver
    pub resolver: String,
    #[serde(default)]
    pub input_key: Option<String>,
    #[serde(default)]
    pub output_key: Option<String>,
    /// Identifier type of the resolved values when writing the current identifiers
    #[serde(default)]
    pub output_type: Option<String>,
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Merged with failures earlier steps recorded under the same key
    #[serde(default = "default_failures_key")]
    pub failures_key: String,
    #[serde(default)]
    pub mapping_key: Option<String>,
    /// Carry identifiers that did not resolve through unchanged
    #[serde(default)]
    pub keep_unresolved: bool,
}

pub(crate) fn default_failures_key() -> String {
    context_keys::RESOLUTION_FAILURES.to_string()
}

pub struct ExternalResolveAction {
    step_name: String,
    params: ExternalResolveParams,
    batch_size: usize,
    lookups: BoundedLookup,
}

impl std::fmt::Debug for ExternalResolveAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalResolveAction")
            .field("step_name", &self.step_name)
            .field("resolver", &self.params.resolver)
            .field("batch_size", &self.batch_size)
            .field("max_attempts", &self.lookups.max_attempts())
            .finish()
    }
}

impl ExternalResolveAction {
    pub fn from_step(step: &StepDefinition, config: &MapperConfig) -> MapperResult<Self> {
        let params: ExternalResolveParams = step.params.parse(&step.name)?;
        let batch_size = positive_or_default(
            params.batch_size,
            config.resolution.batch_size,
            "batch_size",
            &step.name,
        )?;
        let lookups =
            BoundedLookup::from_params(params.max_concurrency, params.max_attempts, config, &step.name)?;

        Ok(Self {
            step_name: step.name.clone(),
            params,
            batch_size,
            lookups,
        })
    }

    async fn run(&self, context: &ExecutionContext, services: &ActionServices) -> MapperResult<StepOutcome> {
        let inputs = read_identifiers(context, self.params.input_key.as_deref(), &self.step_name)?;
        let resolver = services.clients.resolver(&self.params.resolver).ok_or_else(|| {
            MapperError::step(
                &self.step_name,
                format!("resolver '{}' is not registered", self.params.resolver),
            )
        })?;

        let mut resolved_values = Vec::new();
        let mut mapping = LookupTable::new();
        let mut failures = LookupTable::new();
        for (batch_index, batch) in inputs.chunks(self.batch_size).enumerate() {
            debug!(
                step = %self.step_name,
                batch = batch_index,
                size = batch.len(),
                "Resolving batch"
            );
            // join_all yields results in input order
            let results = join_all(
                batch
                    .iter()
                    .map(|identifier| self.lookups.resolve(identifier, &resolver, services)),
            )
            .await;

            for (identifier, result) in batch.iter().zip(results) {
                match result {
                    Ok(values) => {
                        resolved_values.extend(values.iter().cloned());
                        mapping.insert(identifier.clone(), values);
                    }
                    Err(reason) => {
                        if self.params.keep_unresolved {
                            resolved_values.push(identifier.clone());
                        }
                        failures.entry(identifier.clone()).or_default().push(reason);
                    }
                }
            }
        }

        info!(
            step = %self.step_name,
            resolver = %self.params.resolver,
            identifiers = inputs.len(),
            resolved = mapping.len(),
            unresolved = failures.len(),
            "External resolution finished"
        );

        let mut details = BTreeMap::new();
        details.insert("resolved".to_string(), mapping.len().into());
        details.insert("unresolved".to_string(), failures.len().into());

        let mut delta = ContextDelta::new().write_identifiers(
            self.params.output_key.as_deref(),
            dedupe_preserving_order(resolved_values),
        );
        if delta.current_identifiers.is_some() {
            if let Some(output_type) = &self.params.output_type {
                delta = delta.with_identifier_type(output_type.clone());
            }
        }
        if let Some(key) = &self.params.mapping_key {
            delta = delta.with_slot(key.clone(), ContextValue::Lookup(mapping));
        }
        let failures = merge_failures(context, &self.params.failures_key, failures);
        delta = delta.with_slot(self.params.failures_key.clone(), ContextValue::Lookup(failures));

        Ok(StepOutcome::success_with(delta, details))
    }
}

#[async_trait]
impl Action for ExternalResolveAction {
    fn tag(&self) -> &str {
        action_tags::EXTERNAL_RESOLVE
    }

    async fn execute(&self, context: &ExecutionContext, services: &ActionServices) -> StepOutcome {
        self.run(context, services)
            .await
            .unwrap_or_else(StepOutcome::failure)
    }
}
