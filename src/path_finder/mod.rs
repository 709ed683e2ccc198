//! # Path Finder
//!
//! Discovers the chain of atomic conversions connecting two identifier types.
//!
//! The search is a layered breadth-first search over the conversion graph
//! supplied by the metadata provider. Every node reached in a layer keeps only
//! its best label: the per-edge priority sequence from the source, compared
//! lexicographically (lower ranks first). A label is replaced only by a
//! strictly smaller one, so equal candidates resolve to the first discovered
//! in provider edge order. The first layer that reaches the target decides
//! the result, which makes shorter paths always win over better-priority
//! longer ones.
//!
//! Results, including "no path", are cached per `(source, target)` for the
//! lifetime of the instance or until [`PathFinder::clear`].

pub use crate::config::PathFinderConfig;
use crate::error::{MapperError, MapperResult};
use crate::metadata::MetadataProvider;
use crate::models::{ConversionEdge, MappingPath};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

fn effective_priority(config: &PathFinderConfig, edge: &ConversionEdge) -> i32 {
    config
        .priority_overrides
        .get(&edge.resolver_ref)
        .copied()
        .unwrap_or(edge.priority)
}

/// Outgoing edges per identifier type, in provider order, with effective priorities
type Adjacency = HashMap<String, Vec<(ConversionEdge, i32)>>;

#[derive(Debug, Clone)]
struct Label {
    priorities: Vec<i32>,
    edges: Vec<ConversionEdge>,
}

pub struct PathFinder {
    metadata: Arc<dyn MetadataProvider>,
    config: PathFinderConfig,
    graph: RwLock<Option<Arc<Adjacency>>>,
    cache: DashMap<(String, String), MapperResult<MappingPath>>,
}

impl PathFinder {
    pub fn new(metadata: Arc<dyn MetadataProvider>, config: PathFinderConfig) -> Self {
        Self {
            metadata,
            config,
            graph: RwLock::new(None),
            cache: DashMap::new(),
        }
    }

    /// Find the best conversion path from `source_type` to `target_type`
    pub async fn find_path(&self, source_type: &str, target_type: &str) -> MapperResult<MappingPath> {
        let key = (source_type.to_string(), target_type.to_string());
        if let Some(cached) = self.cache.get(&key) {
            return cached.value().clone();
        }

        let result = if source_type == target_type {
            Ok(MappingPath::identity(source_type))
        } else {
            // Provider failures are not cached; only search outcomes are
            let graph = self.graph().await?;
            search(&graph, source_type, target_type)
        };

        match &result {
            Ok(path) => debug!(path = %path.describe(), "Conversion path resolved"),
            Err(_) => debug!(source_type, target_type, "No conversion path"),
        }

        self.cache.insert(key, result.clone());
        result
    }

    /// Forget cached paths and the loaded conversion graph
    pub fn clear(&self) {
        self.cache.clear();
        *self.graph.write() = None;
        debug!("Path finder cache cleared");
    }

    pub fn cached_paths(&self) -> usize {
        self.cache.len()
    }

    async fn graph(&self) -> MapperResult<Arc<Adjacency>> {
        let loaded = self.graph.read().clone();
        if let Some(graph) = loaded {
            return Ok(graph);
        }

        let edges = self.metadata.get_conversion_edges().await?;
        let mut adjacency: Adjacency = HashMap::new();
        for edge in edges {
            let priority = effective_priority(&self.config, &edge);
            adjacency
                .entry(edge.source_type.clone())
                .or_default()
                .push((edge, priority));
        }
        info!(
            identifier_types = adjacency.len(),
            overrides = self.config.priority_overrides.len(),
            "Conversion graph loaded"
        );

        let mut slot = self.graph.write();
        Ok(slot.get_or_insert_with(|| Arc::new(adjacency)).clone())
    }
}

fn search(graph: &Adjacency, source_type: &str, target_type: &str) -> MapperResult<MappingPath> {
    let mut settled: HashSet<String> = HashSet::from([source_type.to_string()]);
    let mut frontier: Vec<(String, Label)> = vec![(
        source_type.to_string(),
        Label {
            priorities: Vec::new(),
            edges: Vec::new(),
        },
    )];

    while !frontier.is_empty() {
        let mut order: Vec<String> = Vec::new();
        let mut layer: HashMap<String, Label> = HashMap::new();

        for (node, label) in &frontier {
            let Some(outgoing) = graph.get(node) else {
                continue;
            };
            for (edge, priority) in outgoing {
                if settled.contains(&edge.target_type) {
                    continue;
                }
                let mut priorities = label.priorities.clone();
                priorities.push(*priority);

                match layer.get_mut(&edge.target_type) {
                    Some(existing) if priorities < existing.priorities => {
                        existing.priorities = priorities;
                        existing.edges = label.edges.clone();
                        existing.edges.push(edge.clone());
                    }
                    Some(_) => {}
                    None => {
                        let mut edges = label.edges.clone();
                        edges.push(edge.clone());
                        order.push(edge.target_type.clone());
                        layer.insert(edge.target_type.clone(), Label { priorities, edges });
                    }
                }
            }
        }

        if let Some(found) = layer.remove(target_type) {
            return Ok(MappingPath {
                source_type: source_type.to_string(),
                target_type: target_type.to_string(),
                steps: found.edges,
                priority: found.priorities,
            });
        }

        frontier = order
            .into_iter()
            .filter_map(|node| layer.remove(&node).map(|label| (node, label)))
            .collect();
        for (node, _) in &frontier {
            settled.insert(node.clone());
        }
    }

    Err(MapperError::PathNotFound {
        source_type: source_type.to_string(),
        target_type: target_type.to_string(),
    })
}
