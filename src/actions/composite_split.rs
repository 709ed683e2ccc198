//! Expands composite identifiers (`"P1_P2"`) into their parts.

use super::{dedupe_preserving_order, read_identifiers, Action, ActionServices, StepOutcome};
use crate::config::MapperConfig;
use crate::constants::{action_tags, context_keys, DEFAULT_COMPOSITE_DELIMITER};
use crate::context::{ContextDelta, ContextValue, ExecutionContext, LookupTable};
use crate::error::{MapperError, MapperResult};
use crate::models::StepDefinition;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompositeSplitParams {
    #[serde(default)]
    pub input_key: Option<String>,
    #[serde(default)]
    pub output_key: Option<String>,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default)]
    pub track_lineage: bool,
    #[serde(default = "default_lineage_key")]
    pub lineage_key: String,
}

fn default_delimiter() -> String {
    DEFAULT_COMPOSITE_DELIMITER.to_string()
}

fn default_lineage_key() -> String {
    context_keys::COMPOSITE_LINEAGE.to_string()
}

/// Outcome of splitting a list of identifiers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitResult {
    /// Parts in first-seen order, without duplicates or empty parts
    pub identifiers: Vec<String>,
    /// Composite input to the parts it expanded to; only inputs containing the delimiter
    pub lineage: LookupTable,
}

/// Split every identifier on `delimiter`
///
/// Identifiers without the delimiter pass through unchanged.
pub fn split_composites(inputs: &[String], delimiter: &str) -> SplitResult {
    let mut parts_in_order = Vec::with_capacity(inputs.len());
    let mut lineage = LookupTable::new();

    for input in inputs {
        if delimiter.is_empty() || !input.contains(delimiter) {
            parts_in_order.push(input.clone());
            continue;
        }
        let parts = dedupe_preserving_order(
            input
                .split(delimiter)
                .filter(|part| !part.is_empty())
                .map(str::to_string),
        );
        parts_in_order.extend(parts.iter().cloned());
        lineage.insert(input.clone(), parts);
    }

    SplitResult {
        identifiers: dedupe_preserving_order(parts_in_order),
        lineage,
    }
}

#[derive(Debug)]
pub struct CompositeSplitAction {
    step_name: String,
    params: CompositeSplitParams,
}

impl CompositeSplitAction {
    pub fn from_step(step: &StepDefinition, _config: &MapperConfig) -> MapperResult<Self> {
        let params: CompositeSplitParams = step.params.parse(&step.name)?;
        if params.delimiter.is_empty() {
            return Err(MapperError::ConfigurationError(format!(
                "step '{}': delimiter must not be empty",
                step.name
            )));
        }
        Ok(Self {
            step_name: step.name.clone(),
            params,
        })
    }
}

#[async_trait]
impl Action for CompositeSplitAction {
    fn tag(&self) -> &str {
        action_tags::COMPOSITE_SPLIT
    }

    async fn execute(&self, context: &ExecutionContext, _services: &ActionServices) -> StepOutcome {
        let inputs = match read_identifiers(context, self.params.input_key.as_deref(), &self.step_name) {
            Ok(inputs) => inputs,
            Err(error) => return StepOutcome::failure(error),
        };

        let split = split_composites(inputs, &self.params.delimiter);

        let mut details = BTreeMap::new();
        details.insert("composites".to_string(), split.lineage.len().into());
        details.insert("parts".to_string(), split.identifiers.len().into());

        let mut delta =
            ContextDelta::new().write_identifiers(self.params.output_key.as_deref(), split.identifiers);
        if self.params.track_lineage {
            delta = delta.with_slot(
                self.params.lineage_key.clone(),
                ContextValue::Lookup(split.lineage),
            );
        }

        StepOutcome::success_with(delta, details)
    }
}
