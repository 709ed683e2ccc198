//! # Identifier Resolvers
//!
//! A resolver converts one identifier into zero or more identifiers of another
//! namespace. Conversion edges name resolvers through their `resolver_ref`;
//! the client factory maps those references to live implementations.
//!
//! Remote resolvers (HTTP services and the like) live outside this crate and
//! implement [`ExternalResolver`]. [`TableResolver`] is the in-process lookup
//! table used by local conversions and by tests.

use super::errors::ExternalCallError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Outcome class of a single resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    /// Resolved to the current primary identifier(s)
    Primary,
    /// Resolved through a secondary/alias record
    Secondary,
    /// The service has no record of the identifier
    NotFound,
    /// Terminal failure, cached to avoid hammering the service
    Error,
}

impl fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
            Self::NotFound => write!(f, "not_found"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Resolved value(s) for one identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub values: Vec<String>,
    pub status: ResolutionStatus,
    pub detail: Option<String>,
}

impl Resolution {
    pub fn primary(values: Vec<String>) -> Self {
        Self {
            values,
            status: ResolutionStatus::Primary,
            detail: None,
        }
    }

    pub fn secondary(values: Vec<String>) -> Self {
        Self {
            values,
            status: ResolutionStatus::Secondary,
            detail: None,
        }
    }

    pub fn not_found() -> Self {
        Self {
            values: Vec::new(),
            status: ResolutionStatus::NotFound,
            detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            values: Vec::new(),
            status: ResolutionStatus::Error,
            detail: Some(detail.into()),
        }
    }

    /// True when the resolution produced usable identifiers
    pub fn is_resolved(&self) -> bool {
        matches!(
            self.status,
            ResolutionStatus::Primary | ResolutionStatus::Secondary
        ) && !self.values.is_empty()
    }
}

/// Contract for anything that resolves identifiers, local or remote
#[async_trait]
pub trait ExternalResolver: Send + Sync {
    /// Stable name used in cache fingerprints and logs
    fn name(&self) -> &str;

    /// Resolve a single identifier
    async fn resolve(&self, identifier: &str) -> Result<Resolution, ExternalCallError>;
}

/// In-process lookup-table resolver
#[derive(Debug, Clone, Default)]
pub struct TableResolver {
    name: String,
    table: HashMap<String, Vec<String>>,
}

impl TableResolver {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: HashMap::new(),
        }
    }

    /// Build from `(source, target)` pairs; repeated sources accumulate targets
    pub fn from_pairs<I, S, T>(name: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        let mut resolver = Self::new(name);
        for (source, target) in pairs {
            resolver.insert(source, target);
        }
        resolver
    }

    pub fn insert(&mut self, source: impl Into<String>, target: impl Into<String>) {
        let targets = self.table.entry(source.into()).or_default();
        let target = target.into();
        if !targets.contains(&target) {
            targets.push(target);
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[async_trait]
impl ExternalResolver for TableResolver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(&self, identifier: &str) -> Result<Resolution, ExternalCallError> {
        Ok(match self.table.get(identifier) {
            Some(values) if !values.is_empty() => Resolution::primary(values.clone()),
            _ => Resolution::not_found(),
        })
    }
}
