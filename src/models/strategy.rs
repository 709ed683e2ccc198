use crate::error::{MapperError, MapperResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Strategy represents a named, ordered list of steps
/// Owned by the metadata provider and shared read-only with executions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    /// Identifier type the strategy is expected to produce
    pub target_type: String,
    pub steps: Vec<StepDefinition>,
}

/// StepDefinition binds one action tag to its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    pub action: String,
    #[serde(default)]
    pub params: StepParams,
    #[serde(default = "default_is_required")]
    pub is_required: bool,
    #[serde(default)]
    pub order: i32,
}

fn default_is_required() -> bool {
    true
}

impl StepDefinition {
    pub fn new(name: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action: action.into(),
            params: StepParams::default(),
            is_required: true,
            order: 0,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = StepParams::from_value(params);
        self
    }

    pub fn optional(mut self) -> Self {
        self.is_required = false;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

impl Strategy {
    pub fn new(name: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_type: target_type.into(),
            steps: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    /// Steps sorted by `order`; equal orders keep their declared position
    pub fn ordered_steps(&self) -> Vec<&StepDefinition> {
        let mut steps: Vec<&StepDefinition> = self.steps.iter().collect();
        steps.sort_by_key(|step| step.order);
        steps
    }

    /// Structural checks performed before any step runs
    pub fn validate(&self) -> MapperResult<()> {
        if self.name.trim().is_empty() {
            return Err(MapperError::ConfigurationError(
                "strategy name must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                return Err(MapperError::ConfigurationError(format!(
                    "strategy '{}' has a step with an empty name",
                    self.name
                )));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(MapperError::ConfigurationError(format!(
                    "strategy '{}' declares step '{}' more than once",
                    self.name, step.name
                )));
            }
        }

        Ok(())
    }
}

/// Loosely typed, action-specific parameter bag
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepParams(serde_json::Map<String, serde_json::Value>);

impl StepParams {
    /// Non-object values yield an empty bag
    pub fn from_value(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deserialize into an action's typed parameter struct
    pub fn parse<T: DeserializeOwned>(&self, step_name: &str) -> MapperResult<T> {
        serde_json::from_value(serde_json::Value::Object(self.0.clone())).map_err(|e| {
            MapperError::ConfigurationError(format!(
                "invalid parameters for step '{step_name}': {e}"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_defaults_from_json() {
        let step: StepDefinition =
            serde_json::from_value(json!({"name": "split", "action": "composite_split"}))
                .unwrap();
        assert!(step.is_required);
        assert_eq!(step.order, 0);
        assert!(step.params.is_empty());
    }

    #[test]
    fn test_ordered_steps_is_stable() {
        let strategy = Strategy::new("s", "uniprot")
            .with_step(StepDefinition::new("c", "x").with_order(2))
            .with_step(StepDefinition::new("a", "x").with_order(1))
            .with_step(StepDefinition::new("b", "x").with_order(1));

        let names: Vec<&str> = strategy
            .ordered_steps()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_duplicate_step_names_rejected() {
        let strategy = Strategy::new("s", "uniprot")
            .with_step(StepDefinition::new("a", "x"))
            .with_step(StepDefinition::new("a", "y"));
        assert!(strategy.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn test_params_parse_reports_step_name() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Params {
            delimiter: String,
        }

        let params = StepParams::from_value(json!({"delimiter": 7}));
        let err = params.parse::<Params>("split_composites").unwrap_err();
        assert!(err.to_string().contains("split_composites"));
    }
}
