mod common;

use common::ids;
use mapper_core::config::{CheckpointBackend, ConfigManager};
use mapper_core::constants::context_keys;
use mapper_core::external::{InMemorySink, StaticClientFactory, TableResolver};
use mapper_core::metadata::InMemoryMetadataProvider;
use mapper_core::orchestration::{ExecutionRequest, ExecutionStatus, StrategyOrchestrator};
use serde_json::json;
use std::sync::Arc;

const METADATA: &str = r#"{
  "strategies": [
    {
      "name": "protein_reconciliation",
      "target_type": "hgnc",
      "steps": [
        { "name": "split", "action": "composite_split", "order": 1,
          "params": { "track_lineage": true } },
        { "name": "to_hgnc", "action": "local_convert", "order": 2,
          "params": { "target_type": "hgnc", "mapping_key": "forward", "unmapped_key": "unmapped" } },
        { "name": "back_to_uniprot", "action": "local_convert", "order": 3,
          "params": { "target_type": "uniprot", "mapping_key": "reverse", "output_key": "round_trip" } },
        { "name": "reconcile", "action": "reconcile", "order": 4,
          "params": { "forward_key": "forward", "reverse_key": "reverse" } },
        { "name": "persist", "action": "persist_results", "order": 5, "is_required": false,
          "params": { "sink": "results", "keys": ["reconciled_mapping", "one_to_many_sources"] } }
      ]
    }
  ],
  "conversion_edges": [
    { "source_type": "uniprot", "target_type": "hgnc", "resolver_ref": "uniprot_to_hgnc", "priority": 1 },
    { "source_type": "hgnc", "target_type": "uniprot", "resolver_ref": "hgnc_to_uniprot", "priority": 1 }
  ]
}"#;

fn clients(sink: Arc<InMemorySink>) -> StaticClientFactory {
    StaticClientFactory::new()
        .with_resolver(Arc::new(TableResolver::from_pairs(
            "uniprot_to_hgnc",
            [("P1", "H1"), ("P2", "H2"), ("P2", "H3"), ("P3", "H3")],
        )))
        .with_resolver(Arc::new(TableResolver::from_pairs(
            "hgnc_to_uniprot",
            [("H1", "P1"), ("H2", "P2"), ("H3", "P2"), ("H3", "P9")],
        )))
        .with_sink(sink)
}

#[tokio::test]
async fn test_reconciliation_pipeline_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint_dir = dir.path().join("checkpoints");
    let config_path = dir.path().join("mapper.toml");
    std::fs::write(
        &config_path,
        format!(
            "[engine]\ncheckpoint_stride = 2\n\n[checkpoint]\nbackend = \"file\"\ndirectory = \"{}\"\n\n[resolution]\nmax_concurrency = 2\n",
            checkpoint_dir.display()
        ),
    )
    .unwrap();
    let metadata_path = dir.path().join("metadata.json");
    std::fs::write(&metadata_path, METADATA).unwrap();

    let manager =
        ConfigManager::load_from_sources(Some(&config_path), "MAPPER_PIPELINE_TEST").unwrap();
    assert_eq!(manager.config().checkpoint.backend, CheckpointBackend::File);
    assert_eq!(manager.config().engine.checkpoint_stride, 2);

    let metadata = InMemoryMetadataProvider::from_json_file(&metadata_path)
        .await
        .unwrap();
    let sink = Arc::new(InMemorySink::new("results"));
    let orchestrator =
        StrategyOrchestrator::builder(Arc::new(metadata), Arc::new(clients(sink.clone())))
            .with_config(manager.config().clone())
            .build()
            .unwrap();

    let result = orchestrator
        .run(ExecutionRequest::new(
            "protein_reconciliation",
            ids(&["P1_P2", "P3", "P4"]),
            "uniprot",
        ))
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert!(!result.is_degraded());
    let context = &result.final_context;

    let lineage = context.lookup(context_keys::COMPOSITE_LINEAGE).unwrap();
    assert_eq!(lineage["P1_P2"], ids(&["P1", "P2"]));

    assert_eq!(context.current_identifiers(), ["H1", "H2", "H3"]);
    assert_eq!(context.current_identifier_type(), "hgnc");
    assert_eq!(context.identifiers(Some("unmapped")).unwrap(), ["P4"]);

    let confirmed = context.lookup(context_keys::RECONCILED_MAPPING).unwrap();
    assert_eq!(confirmed.len(), 2);
    assert_eq!(confirmed["P1"], ids(&["H1"]));
    assert_eq!(confirmed["P2"], ids(&["H2", "H3"]));
    assert!(!confirmed.contains_key("P3"));
    assert_eq!(
        context.identifiers(Some(context_keys::ONE_TO_MANY_SOURCES)).unwrap(),
        ["P2"]
    );
    let canonical = context.lookup(context_keys::CANONICAL_MAPPING).unwrap();
    assert_eq!(canonical["P2"], ids(&["H2"]));

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].execution_id, result.execution_id);
    assert_eq!(records[0].payload["one_to_many_sources"], json!(["P2"]));

    // Completed runs leave no checkpoint behind
    let leftovers = std::fs::read_dir(&checkpoint_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_missing_sink_only_degrades_optional_persist() {
    let metadata = InMemoryMetadataProvider::from_json_str(METADATA).unwrap();
    let clients = StaticClientFactory::new()
        .with_resolver(Arc::new(TableResolver::from_pairs(
            "uniprot_to_hgnc",
            [("P1", "H1")],
        )))
        .with_resolver(Arc::new(TableResolver::from_pairs(
            "hgnc_to_uniprot",
            [("H1", "P1")],
        )));
    let orchestrator = StrategyOrchestrator::builder(Arc::new(metadata), Arc::new(clients))
        .build()
        .unwrap();

    let result = orchestrator
        .run(ExecutionRequest::new(
            "protein_reconciliation",
            ids(&["P1"]),
            "uniprot",
        ))
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert!(result.is_degraded());
    let persist = result.provenance.last().unwrap();
    assert_eq!(persist.step_name, "persist");
    assert!(persist.error.as_deref().unwrap().contains("not registered"));
}

#[test]
fn test_invalid_config_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("mapper.toml");
    std::fs::write(&config_path, "[resolution]\nmax_concurrency = 0\n").unwrap();

    assert!(ConfigManager::load_from_sources(Some(&config_path), "MAPPER_PIPELINE_TEST").is_err());
}
