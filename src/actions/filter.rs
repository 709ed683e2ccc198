//! Set-membership filtering of identifiers against a second dataset.

use super::{read_identifiers, Action, ActionServices, StepOutcome};
use crate::config::MapperConfig;
use crate::constants::action_tags;
use crate::context::{ContextDelta, ContextValue, ExecutionContext};
use crate::error::{MapperError, MapperResult};
use crate::models::StepDefinition;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Keep identifiers found in the dataset
    #[default]
    Present,
    /// Keep identifiers missing from the dataset
    Absent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterParams {
    #[serde(default)]
    pub input_key: Option<String>,
    #[serde(default)]
    pub output_key: Option<String>,
    /// Inline dataset
    #[serde(default)]
    pub dataset: Option<Vec<String>>,
    /// Context slot holding the dataset; a lookup table contributes its keys
    #[serde(default)]
    pub dataset_key: Option<String>,
    #[serde(default)]
    pub mode: FilterMode,
}

#[derive(Debug)]
pub struct FilterByPresenceAction {
    step_name: String,
    params: FilterParams,
}

impl FilterByPresenceAction {
    pub fn from_step(step: &StepDefinition, _config: &MapperConfig) -> MapperResult<Self> {
        let params: FilterParams = step.params.parse(&step.name)?;
        if params.dataset.is_some() == params.dataset_key.is_some() {
            return Err(MapperError::ConfigurationError(format!(
                "step '{}': exactly one of 'dataset' or 'dataset_key' is required",
                step.name
            )));
        }
        Ok(Self {
            step_name: step.name.clone(),
            params,
        })
    }

    fn dataset<'a>(&'a self, context: &'a ExecutionContext) -> MapperResult<HashSet<&'a str>> {
        if let Some(inline) = &self.params.dataset {
            return Ok(inline.iter().map(String::as_str).collect());
        }

        let key = self.params.dataset_key.as_deref().unwrap_or_default();
        match context.slot(key) {
            Some(ContextValue::Identifiers(ids)) => Ok(ids.iter().map(String::as_str).collect()),
            Some(ContextValue::Lookup(table)) => Ok(table.keys().map(String::as_str).collect()),
            Some(other) => Err(MapperError::step(
                &self.step_name,
                format!("dataset slot '{key}' holds a {} value", other.kind()),
            )),
            None => Err(MapperError::step(
                &self.step_name,
                format!("dataset slot '{key}' is missing"),
            )),
        }
    }

    fn filter(&self, context: &ExecutionContext) -> MapperResult<(ContextDelta, BTreeMap<String, serde_json::Value>)> {
        let inputs = read_identifiers(context, self.params.input_key.as_deref(), &self.step_name)?;
        let dataset = self.dataset(context)?;
        let keep_present = self.params.mode == FilterMode::Present;

        let kept: Vec<String> = inputs
            .iter()
            .filter(|id| dataset.contains(id.as_str()) == keep_present)
            .cloned()
            .collect();

        let mut details = BTreeMap::new();
        details.insert("before".to_string(), inputs.len().into());
        details.insert("after".to_string(), kept.len().into());

        let delta = ContextDelta::new().write_identifiers(self.params.output_key.as_deref(), kept);
        Ok((delta, details))
    }
}

#[async_trait]
impl Action for FilterByPresenceAction {
    fn tag(&self) -> &str {
        action_tags::FILTER_BY_PRESENCE
    }

    async fn execute(&self, context: &ExecutionContext, _services: &ActionServices) -> StepOutcome {
        match self.filter(context) {
            Ok((delta, details)) => StepOutcome::success_with(delta, details),
            Err(error) => StepOutcome::failure(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support::{delta_of, ids, services};
    use crate::context::LookupTable;
    use serde_json::json;

    fn action(params: serde_json::Value) -> FilterByPresenceAction {
        let step = StepDefinition::new("filter", action_tags::FILTER_BY_PRESENCE).with_params(params);
        FilterByPresenceAction::from_step(&step, &MapperConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_keeps_present_identifiers_in_order() {
        let ctx = ExecutionContext::new(ids(&["c", "a", "b"]), "uniprot");
        let outcome = action(json!({"dataset": ["a", "c"]}))
            .execute(&ctx, &services())
            .await;

        let StepOutcome::Success { delta, details } = outcome else {
            panic!("filter failed");
        };
        assert_eq!(delta.current_identifiers, Some(ids(&["c", "a"])));
        assert_eq!(details["before"], json!(3));
        assert_eq!(details["after"], json!(2));
    }

    #[tokio::test]
    async fn test_absent_mode_and_lookup_dataset() {
        let mut table = LookupTable::new();
        table.insert("a".to_string(), ids(&["x"]));
        let mut ctx = ExecutionContext::new(ids(&["a", "b"]), "uniprot");
        ctx.apply(ContextDelta::new().with_slot("known", ContextValue::Lookup(table)))
            .unwrap();

        let delta = delta_of(
            action(json!({"dataset_key": "known", "mode": "absent", "output_key": "novel"}))
                .execute(&ctx, &services())
                .await,
        );
        assert!(delta.current_identifiers.is_none());
        assert_eq!(delta.slots["novel"], ContextValue::Identifiers(ids(&["b"])));
    }

    #[tokio::test]
    async fn test_missing_dataset_slot_fails() {
        let ctx = ExecutionContext::new(ids(&["a"]), "uniprot");
        let outcome = action(json!({"dataset_key": "nowhere"}))
            .execute(&ctx, &services())
            .await;
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_dataset_source_must_be_unambiguous() {
        for params in [json!({}), json!({"dataset": [], "dataset_key": "k"})] {
            let step = StepDefinition::new("filter", action_tags::FILTER_BY_PRESENCE).with_params(params);
            assert!(FilterByPresenceAction::from_step(&step, &MapperConfig::default()).is_err());
        }
    }
}
