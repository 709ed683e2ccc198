//! Writes selected context slots to an external result sink.

use super::{Action, ActionServices, StepOutcome};
use crate::config::MapperConfig;
use crate::constants::{action_tags, context_keys};
use crate::context::{ContextDelta, ExecutionContext};
use crate::error::{MapperError, MapperResult};
use crate::external::ResultRecord;
use crate::models::StepDefinition;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersistParams {
    /// Client factory name of the sink
    pub sink: String,
    /// Context keys to write; empty means the current identifiers
    #[serde(default)]
    pub keys: Vec<String>,
}

#[derive(Debug)]
pub struct PersistResultsAction {
    step_name: String,
    params: PersistParams,
}

impl PersistResultsAction {
    pub fn from_step(step: &StepDefinition, _config: &MapperConfig) -> MapperResult<Self> {
        let params: PersistParams = step.params.parse(&step.name)?;
        Ok(Self {
            step_name: step.name.clone(),
            params,
        })
    }

    fn payload(&self, context: &ExecutionContext) -> MapperResult<serde_json::Value> {
        let keys: Vec<&str> = if self.params.keys.is_empty() {
            vec![context_keys::CURRENT_IDENTIFIERS]
        } else {
            self.params.keys.iter().map(String::as_str).collect()
        };

        let mut payload = serde_json::Map::new();
        for key in keys {
            let value = match key {
                context_keys::CURRENT_IDENTIFIERS => serde_json::json!(context.current_identifiers()),
                context_keys::CURRENT_IDENTIFIER_TYPE => {
                    serde_json::json!(context.current_identifier_type())
                }
                slot => context
                    .slot(slot)
                    .map(|value| value.to_json())
                    .ok_or_else(|| {
                        MapperError::step(&self.step_name, format!("context slot '{slot}' is missing"))
                    })?,
            };
            payload.insert(key.to_string(), value);
        }
        Ok(serde_json::Value::Object(payload))
    }

    async fn run(&self, context: &ExecutionContext, services: &ActionServices) -> MapperResult<StepOutcome> {
        let sink = services.clients.sink(&self.params.sink).ok_or_else(|| {
            MapperError::step(
                &self.step_name,
                format!("sink '{}' is not registered", self.params.sink),
            )
        })?;

        let record = ResultRecord {
            execution_id: services.execution_id.clone(),
            strategy_name: services.strategy_name.clone(),
            step_name: self.step_name.clone(),
            identifier_type: context.current_identifier_type().to_string(),
            payload: self.payload(context)?,
            written_at: Utc::now(),
        };

        sink.write(&record)
            .await
            .map_err(|e| MapperError::step(&self.step_name, format!("sink '{}': {e:#}", sink.name())))?;

        info!(
            step = %self.step_name,
            sink = %sink.name(),
            execution_id = %services.execution_id,
            "Results persisted"
        );

        let mut details = BTreeMap::new();
        details.insert("sink".to_string(), sink.name().into());
        Ok(StepOutcome::success_with(ContextDelta::new(), details))
    }
}

#[async_trait]
impl Action for PersistResultsAction {
    fn tag(&self) -> &str {
        action_tags::PERSIST_RESULTS
    }

    async fn execute(&self, context: &ExecutionContext, services: &ActionServices) -> StepOutcome {
        self.run(context, services)
            .await
            .unwrap_or_else(StepOutcome::failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support::{ids, services_with};
    use crate::context::{ContextValue, LookupTable};
    use crate::external::{InMemorySink, ResultSink, StaticClientFactory};
    use crate::metadata::InMemoryMetadataProvider;
    use serde_json::json;
    use std::sync::Arc;

    fn action(params: serde_json::Value) -> PersistResultsAction {
        let step = StepDefinition::new("persist", action_tags::PERSIST_RESULTS).with_params(params);
        PersistResultsAction::from_step(&step, &MapperConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_writes_selected_slots() {
        let sink = Arc::new(InMemorySink::new("results"));
        let services = services_with(
            InMemoryMetadataProvider::new(),
            StaticClientFactory::new().with_sink(sink.clone()),
        );
        let mut table = LookupTable::new();
        table.insert("A".to_string(), ids(&["X"]));
        let mut ctx = ExecutionContext::new(ids(&["X"]), "uniprot");
        ctx.apply(ContextDelta::new().with_slot("mapping", ContextValue::Lookup(table)))
            .unwrap();

        let outcome = action(json!({"sink": "results", "keys": ["current_identifiers", "mapping"]}))
            .execute(&ctx, &services)
            .await;
        assert!(outcome.is_success());

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].execution_id, "exec-test");
        assert_eq!(records[0].identifier_type, "uniprot");
        assert_eq!(
            records[0].payload,
            json!({"current_identifiers": ["X"], "mapping": {"A": ["X"]}})
        );
    }

    #[tokio::test]
    async fn test_sink_error_fails_step() {
        struct BrokenSink;

        #[async_trait]
        impl ResultSink for BrokenSink {
            fn name(&self) -> &str {
                "broken"
            }

            async fn write(&self, _record: &ResultRecord) -> anyhow::Result<()> {
                anyhow::bail!("disk full")
            }
        }

        let services = services_with(
            InMemoryMetadataProvider::new(),
            StaticClientFactory::new().with_sink(Arc::new(BrokenSink)),
        );
        let ctx = ExecutionContext::new(ids(&["X"]), "uniprot");

        match action(json!({"sink": "broken"})).execute(&ctx, &services).await {
            StepOutcome::Failure { error } => assert!(error.to_string().contains("disk full")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_slot_fails_step() {
        let services = services_with(
            InMemoryMetadataProvider::new(),
            StaticClientFactory::new().with_sink(Arc::new(InMemorySink::new("results"))),
        );
        let ctx = ExecutionContext::new(ids(&["X"]), "uniprot");
        let outcome = action(json!({"sink": "results", "keys": ["nope"]}))
            .execute(&ctx, &services)
            .await;
        assert!(!outcome.is_success());
    }
}
