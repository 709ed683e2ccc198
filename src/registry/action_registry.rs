//! # Action Registry
//!
//! Maps action tags to factories that build an [`Action`] for a step.
//!
//! ## Overview
//!
//! The registry is populated at process start, usually through
//! [`ActionRegistry::with_builtin_actions`], and can be extended with custom
//! tags. Dispatch is an explicit lookup by tag; building an action parses and
//! validates the step's parameters, so every configuration problem in a
//! strategy surfaces before its first step executes.
//!
//! ## Usage
//!
//! ```rust
//! use mapper_core::registry::ActionRegistry;
//!
//! let registry = ActionRegistry::with_builtin_actions();
//! assert!(registry.contains("composite_split"));
//! assert!(registry.resolve("no_such_action").is_err());
//! ```

use crate::actions::{
    Action, ActionFactory, CompositeSplitAction, ExternalResolveAction, FilterByPresenceAction,
    LocalConvertAction, PersistResultsAction, ReconcileAction,
};
use crate::config::MapperConfig;
use crate::constants::action_tags;
use crate::error::{MapperError, MapperResult};
use crate::models::StepDefinition;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Registry statistics for introspection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_actions: usize,
    /// Registered tags, sorted
    pub tags: Vec<String>,
    pub last_registered_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct ActionRegistry {
    factories: RwLock<HashMap<String, ActionFactory>>,
    last_registered_at: RwLock<Option<DateTime<Utc>>>,
}

impl ActionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in action
    pub fn with_builtin_actions() -> Self {
        let registry = Self::new();
        registry.register_builtin_actions();
        info!(
            actions = action_tags::ALL.len(),
            "Registered built-in actions"
        );
        registry
    }

    fn register_builtin_actions(&self) {
        self.register_fn(action_tags::LOCAL_CONVERT, |step, config| {
            Ok(Box::new(LocalConvertAction::from_step(step, config)?))
        });
        self.register_fn(action_tags::EXTERNAL_RESOLVE, |step, config| {
            Ok(Box::new(ExternalResolveAction::from_step(step, config)?))
        });
        self.register_fn(action_tags::COMPOSITE_SPLIT, |step, config| {
            Ok(Box::new(CompositeSplitAction::from_step(step, config)?))
        });
        self.register_fn(action_tags::FILTER_BY_PRESENCE, |step, config| {
            Ok(Box::new(FilterByPresenceAction::from_step(step, config)?))
        });
        self.register_fn(action_tags::RECONCILE, |step, config| {
            Ok(Box::new(ReconcileAction::from_step(step, config)?))
        });
        self.register_fn(action_tags::PERSIST_RESULTS, |step, config| {
            Ok(Box::new(PersistResultsAction::from_step(step, config)?))
        });
    }

    /// Register a factory under `tag`, replacing any previous registration
    pub fn register(&self, tag: &str, factory: ActionFactory) {
        let mut factories = self.factories.write();
        if factories.contains_key(tag) {
            warn!(tag = tag, "Action already registered, replacing");
        }
        factories.insert(tag.to_string(), factory);
        *self.last_registered_at.write() = Some(Utc::now());
        debug!(tag = tag, "Action registered");
    }

    /// Register a plain closure as a factory
    pub fn register_fn<F>(&self, tag: &str, factory: F)
    where
        F: Fn(&StepDefinition, &MapperConfig) -> MapperResult<Box<dyn Action>> + Send + Sync + 'static,
    {
        self.register(tag, Arc::new(factory));
    }

    /// Look up the factory for `tag`
    pub fn resolve(&self, tag: &str) -> MapperResult<ActionFactory> {
        self.factories.read().get(tag).cloned().ok_or_else(|| {
            MapperError::ConfigurationError(format!("no action registered for tag '{tag}'"))
        })
    }

    /// Build the action for a step, validating its parameters
    pub fn build(&self, step: &StepDefinition, config: &MapperConfig) -> MapperResult<Box<dyn Action>> {
        let factory = self.resolve(&step.action)?;
        factory(step, config)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.read().contains_key(tag)
    }

    pub fn stats(&self) -> RegistryStats {
        let mut tags: Vec<String> = self.factories.read().keys().cloned().collect();
        tags.sort();
        RegistryStats {
            total_actions: tags.len(),
            tags,
            last_registered_at: *self.last_registered_at.read(),
        }
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("tags", &self.stats().tags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionServices, StepOutcome};
    use crate::context::{ContextDelta, ExecutionContext};
    use async_trait::async_trait;
    use serde_json::json;

    struct NoopAction;

    #[async_trait]
    impl Action for NoopAction {
        fn tag(&self) -> &str {
            "noop"
        }

        async fn execute(&self, _context: &ExecutionContext, _services: &ActionServices) -> StepOutcome {
            StepOutcome::success(ContextDelta::new())
        }
    }

    #[test]
    fn test_builtin_actions_registered() {
        let registry = ActionRegistry::with_builtin_actions();
        let stats = registry.stats();
        assert_eq!(stats.total_actions, action_tags::ALL.len());
        for tag in action_tags::ALL {
            assert!(registry.contains(tag), "missing {tag}");
        }
    }

    #[test]
    fn test_unknown_tag_is_configuration_error() {
        let registry = ActionRegistry::new();
        assert!(registry.resolve("nope").err().unwrap().is_configuration());
        assert!(registry.stats().last_registered_at.is_none());
    }

    #[test]
    fn test_custom_registration_and_replacement() {
        let registry = ActionRegistry::with_builtin_actions();
        registry.register_fn("noop", |_, _| Ok(Box::new(NoopAction)));
        registry.register_fn("noop", |_, _| Ok(Box::new(NoopAction)));

        let action = registry
            .build(&StepDefinition::new("s", "noop"), &MapperConfig::default())
            .unwrap();
        assert_eq!(action.tag(), "noop");
        assert_eq!(registry.stats().total_actions, action_tags::ALL.len() + 1);
    }

    #[test]
    fn test_build_validates_params() {
        let registry = ActionRegistry::with_builtin_actions();
        let step = StepDefinition::new("split", action_tags::COMPOSITE_SPLIT)
            .with_params(json!({"delimiter": 5}));
        let err = registry.build(&step, &MapperConfig::default()).err().unwrap();
        assert!(err.is_configuration());
    }
}
