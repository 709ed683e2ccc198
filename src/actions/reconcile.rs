//! Bidirectional mapping reconciliation.
//!
//! A pair `(s, t)` is confirmed only when `t` is in the forward mapping of `s`
//! and `s` is in the reverse mapping of `t`. One-to-many flags and the
//! canonical pick are derived from confirmed pairs only, so a target that does
//! not reciprocate can never inflate a source's multiplicity.

use super::{Action, ActionServices, StepOutcome};
use crate::config::MapperConfig;
use crate::constants::{action_tags, context_keys};
use crate::context::{ContextDelta, ContextValue, ExecutionContext, LookupTable};
use crate::error::{MapperError, MapperResult};
use crate::models::StepDefinition;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Confirmed pairs plus what is derived from them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Source to confirmed targets, targets sorted
    pub confirmed: LookupTable,
    /// Sources with more than one confirmed target, sorted
    pub one_to_many: Vec<String>,
    /// Source to its canonical target: the smallest confirmed target
    pub canonical: BTreeMap<String, String>,
}

impl Reconciliation {
    pub fn pairs(&self) -> BTreeSet<(String, String)> {
        self.confirmed
            .iter()
            .flat_map(|(source, targets)| {
                targets
                    .iter()
                    .map(move |target| (source.clone(), target.clone()))
            })
            .collect()
    }
}

/// Intersect a forward mapping with the inverse of a reverse mapping
pub fn reconcile(forward: &LookupTable, reverse: &LookupTable) -> Reconciliation {
    let reverse_pairs: HashSet<(&str, &str)> = reverse
        .iter()
        .flat_map(|(target, sources)| {
            sources
                .iter()
                .map(move |source| (source.as_str(), target.as_str()))
        })
        .collect();

    let mut result = Reconciliation::default();
    for (source, targets) in forward {
        let confirmed: BTreeSet<&String> = targets
            .iter()
            .filter(|target| reverse_pairs.contains(&(source.as_str(), target.as_str())))
            .collect();

        let Some(first) = confirmed.first() else {
            continue;
        };
        result.canonical.insert(source.clone(), (*first).clone());
        if confirmed.len() > 1 {
            result.one_to_many.push(source.clone());
        }
        result
            .confirmed
            .insert(source.clone(), confirmed.into_iter().cloned().collect());
    }
    result
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileParams {
    pub forward_key: String,
    pub reverse_key: String,
    #[serde(default = "default_output_key")]
    pub output_key: String,
    #[serde(default = "default_one_to_many_key")]
    pub one_to_many_key: String,
    #[serde(default = "default_canonical_key")]
    pub canonical_key: String,
    /// Replace the current identifiers with each source's canonical target
    #[serde(default)]
    pub update_current: bool,
    /// Identifier type of the canonical targets when `update_current` is set
    #[serde(default)]
    pub output_type: Option<String>,
}

fn default_output_key() -> String {
    context_keys::RECONCILED_MAPPING.to_string()
}

fn default_one_to_many_key() -> String {
    context_keys::ONE_TO_MANY_SOURCES.to_string()
}

fn default_canonical_key() -> String {
    context_keys::CANONICAL_MAPPING.to_string()
}

#[derive(Debug)]
pub struct ReconcileAction {
    step_name: String,
    params: ReconcileParams,
}

impl ReconcileAction {
    pub fn from_step(step: &StepDefinition, _config: &MapperConfig) -> MapperResult<Self> {
        let params: ReconcileParams = step.params.parse(&step.name)?;
        Ok(Self {
            step_name: step.name.clone(),
            params,
        })
    }

    fn lookup<'a>(&self, context: &'a ExecutionContext, key: &str) -> MapperResult<&'a LookupTable> {
        context.lookup(key).ok_or_else(|| {
            MapperError::step(
                &self.step_name,
                format!("context slot '{key}' is not a lookup table"),
            )
        })
    }

    fn run(&self, context: &ExecutionContext) -> MapperResult<StepOutcome> {
        let forward = self.lookup(context, &self.params.forward_key)?;
        let reverse = self.lookup(context, &self.params.reverse_key)?;
        let result = reconcile(forward, reverse);

        let mut details = BTreeMap::new();
        details.insert("sources".to_string(), forward.len().into());
        details.insert("confirmed_sources".to_string(), result.confirmed.len().into());
        details.insert("one_to_many".to_string(), result.one_to_many.len().into());

        let canonical: LookupTable = result
            .canonical
            .iter()
            .map(|(source, target)| (source.clone(), vec![target.clone()]))
            .collect();

        let mut delta = ContextDelta::new();
        if self.params.update_current {
            let targets = super::dedupe_preserving_order(
                context
                    .current_identifiers()
                    .iter()
                    .filter_map(|id| result.canonical.get(id).cloned()),
            );
            delta = delta.with_identifiers(targets);
            if let Some(output_type) = &self.params.output_type {
                delta = delta.with_identifier_type(output_type.clone());
            }
        }

        Ok(StepOutcome::success_with(
            delta
                .with_slot(self.params.output_key.clone(), ContextValue::Lookup(result.confirmed))
                .with_slot(
                    self.params.one_to_many_key.clone(),
                    ContextValue::Identifiers(result.one_to_many),
                )
                .with_slot(self.params.canonical_key.clone(), ContextValue::Lookup(canonical)),
            details,
        ))
    }
}

#[async_trait]
impl Action for ReconcileAction {
    fn tag(&self) -> &str {
        action_tags::RECONCILE
    }

    async fn execute(&self, context: &ExecutionContext, _services: &ActionServices) -> StepOutcome {
        self.run(context).unwrap_or_else(StepOutcome::failure)
    }
}
