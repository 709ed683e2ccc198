use serde::{Deserialize, Serialize};

/// ConversionEdge is one atomic, known conversion between identifier types
/// Supplied by the metadata provider; lower `priority` ranks first
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversionEdge {
    pub source_type: String,
    pub target_type: String,
    /// Name the client factory resolves to a resolver
    pub resolver_ref: String,
    #[serde(default)]
    pub priority: i32,
}

impl ConversionEdge {
    pub fn new(
        source_type: impl Into<String>,
        target_type: impl Into<String>,
        resolver_ref: impl Into<String>,
        priority: i32,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            target_type: target_type.into(),
            resolver_ref: resolver_ref.into(),
            priority,
        }
    }
}

/// MappingPath is an ordered chain of conversions from one type to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingPath {
    pub source_type: String,
    pub target_type: String,
    pub steps: Vec<ConversionEdge>,
    /// Effective per-edge priorities, compared edge by edge from the source
    pub priority: Vec<i32>,
}

impl MappingPath {
    /// Empty path: source and target are the same type
    pub fn identity(identifier_type: impl Into<String>) -> Self {
        let identifier_type = identifier_type.into();
        Self {
            source_type: identifier_type.clone(),
            target_type: identifier_type,
            steps: Vec::new(),
            priority: Vec::new(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Human readable form, e.g. `gene_symbol -[hgnc]-> ensembl -[uniprot_map]-> uniprot`
    pub fn describe(&self) -> String {
        let mut out = self.source_type.clone();
        for edge in &self.steps {
            out.push_str(&format!(" -[{}]-> {}", edge.resolver_ref, edge.target_type));
        }
        out
    }
}
