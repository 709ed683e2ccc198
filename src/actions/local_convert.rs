//! Local identifier conversion.
//!
//! Converts identifiers either through a lookup table already in the context
//! (`table_key`) or by asking the Path Finder for a route from the current
//! identifier type to `target_type` and walking it hop by hop through the
//! resolvers each edge names.
//!
//! Graph hops share the lookup path of external resolution: cached, retried
//! on transient failures and bounded per action instance. Reasons an origin
//! identifier lost a branch are recorded under `failures_key`.

use super::external_resolve::default_failures_key;
use super::{
    dedupe_preserving_order, merge_failures, read_identifiers, Action, ActionServices,
    BoundedLookup, StepOutcome,
};
use crate::config::MapperConfig;
use crate::constants::action_tags;
use crate::context::{ContextDelta, ContextValue, ExecutionContext, LookupTable};
use crate::error::{MapperError, MapperResult};
use crate::models::StepDefinition;
use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalConvertParams {
    pub target_type: String,
    #[serde(default)]
    pub input_key: Option<String>,
    #[serde(default)]
    pub output_key: Option<String>,
    /// Context lookup table to convert with instead of the conversion graph
    #[serde(default)]
    pub table_key: Option<String>,
    /// Where to record source -> converted identifiers
    #[serde(default)]
    pub mapping_key: Option<String>,
    /// Where to record identifiers that did not convert
    #[serde(default)]
    pub unmapped_key: Option<String>,
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Per-origin failure reasons from graph hops
    #[serde(default = "default_failures_key")]
    pub failures_key: String,
}

pub struct LocalConvertAction {
    step_name: String,
    params: LocalConvertParams,
    lookups: BoundedLookup,
}

impl std::fmt::Debug for LocalConvertAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalConvertAction")
            .field("step_name", &self.step_name)
            .field("target_type", &self.params.target_type)
            .field("max_attempts", &self.lookups.max_attempts())
            .finish()
    }
}

/// Graph conversion result: origin -> targets, origin -> failure reasons
struct GraphConversion {
    mapping: LookupTable,
    failures: LookupTable,
}

impl LocalConvertAction {
    pub fn from_step(step: &StepDefinition, config: &MapperConfig) -> MapperResult<Self> {
        let params: LocalConvertParams = step.params.parse(&step.name)?;
        if params.target_type.trim().is_empty() {
            return Err(MapperError::ConfigurationError(format!(
                "step '{}': target_type must not be empty",
                step.name
            )));
        }
        let lookups =
            BoundedLookup::from_params(params.max_concurrency, params.max_attempts, config, &step.name)?;
        Ok(Self {
            step_name: step.name.clone(),
            params,
            lookups,
        })
    }

    fn convert_with_table(&self, inputs: &[String], table: &LookupTable) -> LookupTable {
        inputs
            .iter()
            .filter_map(|id| {
                table
                    .get(id)
                    .filter(|targets| !targets.is_empty())
                    .map(|targets| (id.clone(), targets.clone()))
            })
            .collect()
    }

    async fn convert_with_graph(
        &self,
        inputs: &[String],
        source_type: &str,
        services: &ActionServices,
    ) -> MapperResult<GraphConversion> {
        let path = services
            .path_finder
            .find_path(source_type, &self.params.target_type)
            .await?;
        debug!(step = %self.step_name, path = %path.describe(), "Converting along path");

        // origin identifier -> identifiers reached so far
        let mut reached: Vec<(String, Vec<String>)> = inputs
            .iter()
            .map(|id| (id.clone(), vec![id.clone()]))
            .collect();
        let mut failures = LookupTable::new();

        for edge in &path.steps {
            let resolver = services.clients.resolver(&edge.resolver_ref).ok_or_else(|| {
                MapperError::step(
                    &self.step_name,
                    format!("resolver '{}' is not registered", edge.resolver_ref),
                )
            })?;

            let frontier =
                dedupe_preserving_order(reached.iter().flat_map(|(_, current)| current.iter().cloned()));
            let results = join_all(
                frontier
                    .iter()
                    .map(|id| self.lookups.resolve(id, &resolver, services)),
            )
            .await;
            let resolved: HashMap<&str, Result<Vec<String>, String>> =
                frontier.iter().map(String::as_str).zip(results).collect();

            for (origin, current) in reached.iter_mut() {
                let mut next = Vec::new();
                for id in current.iter() {
                    match resolved.get(id.as_str()) {
                        Some(Ok(values)) => next.extend(values.iter().cloned()),
                        Some(Err(reason)) => {
                            let reason = format!("{}: {reason}", edge.resolver_ref);
                            let recorded = failures.entry(origin.clone()).or_default();
                            if !recorded.contains(&reason) {
                                recorded.push(reason);
                            }
                        }
                        None => {}
                    }
                }
                *current = dedupe_preserving_order(next);
            }
        }

        let mapping = reached
            .into_iter()
            .filter(|(_, targets)| !targets.is_empty())
            .collect();
        Ok(GraphConversion { mapping, failures })
    }

    async fn run(&self, context: &ExecutionContext, services: &ActionServices) -> MapperResult<StepOutcome> {
        let inputs = read_identifiers(context, self.params.input_key.as_deref(), &self.step_name)?;

        let (mapping, failures) = match &self.params.table_key {
            Some(key) => {
                let table = context.lookup(key).ok_or_else(|| {
                    MapperError::step(
                        &self.step_name,
                        format!("context slot '{key}' is not a lookup table"),
                    )
                })?;
                (self.convert_with_table(inputs, table), None)
            }
            None => {
                let converted = self
                    .convert_with_graph(inputs, context.current_identifier_type(), services)
                    .await?;
                (converted.mapping, Some(converted.failures))
            }
        };

        let converted = dedupe_preserving_order(
            inputs
                .iter()
                .filter_map(|id| mapping.get(id))
                .flat_map(|targets| targets.iter().cloned()),
        );
        let unmapped: Vec<String> = inputs
            .iter()
            .filter(|id| !mapping.contains_key(*id))
            .cloned()
            .collect();

        let mut details = BTreeMap::new();
        details.insert("mapped".to_string(), mapping.len().into());
        details.insert("unmapped".to_string(), unmapped.len().into());

        let output_key = self.params.output_key.as_deref();
        let mut delta = ContextDelta::new().write_identifiers(output_key, converted);
        if delta.current_identifiers.is_some() {
            delta = delta.with_identifier_type(self.params.target_type.clone());
        }
        if let Some(key) = &self.params.mapping_key {
            delta = delta.with_slot(key.clone(), ContextValue::Lookup(mapping));
        }
        if let Some(key) = &self.params.unmapped_key {
            delta = delta.with_slot(key.clone(), ContextValue::Identifiers(unmapped));
        }
        if let Some(failures) = failures {
            let failures = merge_failures(context, &self.params.failures_key, failures);
            delta = delta.with_slot(
                self.params.failures_key.clone(),
                ContextValue::Lookup(failures),
            );
        }

        Ok(StepOutcome::success_with(delta, details))
    }
}

#[async_trait]
impl Action for LocalConvertAction {
    fn tag(&self) -> &str {
        action_tags::LOCAL_CONVERT
    }

    async fn execute(&self, context: &ExecutionContext, services: &ActionServices) -> StepOutcome {
        self.run(context, services)
            .await
            .unwrap_or_else(StepOutcome::failure)
    }
}
