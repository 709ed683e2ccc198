//! # Execution Context
//!
//! The keyed scratch space threaded through a strategy run. Two well-known
//! keys are typed fields (the current identifiers and their type); everything
//! else lives in named slots holding either an identifier list, a lookup
//! table, a counter or a text value.
//!
//! Actions never mutate the context directly. They read it and return a
//! [`ContextDelta`]; the orchestrator applies the delta only when the step
//! succeeds, so a failed optional step leaves no trace in the context.

use crate::constants::context_keys;
use crate::error::{MapperError, MapperResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lookup table value: key identifier to associated identifiers
pub type LookupTable = BTreeMap<String, Vec<String>>;

/// A value stored in an extension slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ContextValue {
    Identifiers(Vec<String>),
    Lookup(LookupTable),
    Counter(i64),
    Text(String),
}

impl ContextValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Identifiers(_) => "identifiers",
            Self::Lookup(_) => "lookup",
            Self::Counter(_) => "counter",
            Self::Text(_) => "text",
        }
    }

    pub fn as_identifiers(&self) -> Option<&[String]> {
        match self {
            Self::Identifiers(ids) => Some(ids),
            _ => None,
        }
    }

    pub fn as_lookup(&self) -> Option<&LookupTable> {
        match self {
            Self::Lookup(table) => Some(table),
            _ => None,
        }
    }

    /// JSON form used by persistence sinks
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Identifiers(ids) => serde_json::json!(ids),
            Self::Lookup(table) => serde_json::json!(table),
            Self::Counter(n) => serde_json::json!(n),
            Self::Text(s) => serde_json::json!(s),
        }
    }
}

/// Mutable state of one in-flight execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    current_identifiers: Vec<String>,
    current_identifier_type: String,
    #[serde(default)]
    slots: BTreeMap<String, ContextValue>,
}

impl ExecutionContext {
    pub fn new(identifiers: Vec<String>, identifier_type: impl Into<String>) -> Self {
        Self {
            current_identifiers: identifiers,
            current_identifier_type: identifier_type.into(),
            slots: BTreeMap::new(),
        }
    }

    pub fn current_identifiers(&self) -> &[String] {
        &self.current_identifiers
    }

    pub fn current_identifier_type(&self) -> &str {
        &self.current_identifier_type
    }

    pub fn slot(&self, key: &str) -> Option<&ContextValue> {
        self.slots.get(key)
    }

    pub fn slots(&self) -> &BTreeMap<String, ContextValue> {
        &self.slots
    }

    /// Identifier list under `key`; `None` or the well-known key means the current list
    pub fn identifiers(&self, key: Option<&str>) -> Option<&[String]> {
        match key {
            None => Some(&self.current_identifiers),
            Some(k) if k == context_keys::CURRENT_IDENTIFIERS => Some(&self.current_identifiers),
            Some(k) => self.slots.get(k).and_then(ContextValue::as_identifiers),
        }
    }

    pub fn lookup(&self, key: &str) -> Option<&LookupTable> {
        self.slots.get(key).and_then(ContextValue::as_lookup)
    }

    /// Deep copy safe to persist while the live context keeps changing
    pub fn snapshot(&self) -> ExecutionContext {
        self.clone()
    }

    /// Apply a successful step's changes
    pub fn apply(&mut self, delta: ContextDelta) -> MapperResult<()> {
        if let Some(key) = delta
            .slots
            .keys()
            .find(|k| context_keys::RESERVED.contains(&k.as_str()))
        {
            return Err(MapperError::ConfigurationError(format!(
                "context key '{key}' is reserved and cannot be used as a slot"
            )));
        }

        if let Some(ids) = delta.current_identifiers {
            self.current_identifiers = ids;
        }
        if let Some(identifier_type) = delta.current_identifier_type {
            self.current_identifier_type = identifier_type;
        }
        for key in delta.removed {
            self.slots.remove(&key);
        }
        self.slots.extend(delta.slots);
        Ok(())
    }
}

/// Changes an action asks the orchestrator to make
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextDelta {
    pub current_identifiers: Option<Vec<String>>,
    pub current_identifier_type: Option<String>,
    pub slots: BTreeMap<String, ContextValue>,
    pub removed: Vec<String>,
}

impl ContextDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identifiers(mut self, identifiers: Vec<String>) -> Self {
        self.current_identifiers = Some(identifiers);
        self
    }

    pub fn with_identifier_type(mut self, identifier_type: impl Into<String>) -> Self {
        self.current_identifier_type = Some(identifier_type.into());
        self
    }

    pub fn with_slot(mut self, key: impl Into<String>, value: ContextValue) -> Self {
        self.slots.insert(key.into(), value);
        self
    }

    /// Write an identifier list to `key`, routing the well-known key to the current list
    pub fn write_identifiers(mut self, key: Option<&str>, identifiers: Vec<String>) -> Self {
        match key {
            None => self.current_identifiers = Some(identifiers),
            Some(k) if k == context_keys::CURRENT_IDENTIFIERS => {
                self.current_identifiers = Some(identifiers)
            }
            Some(k) => {
                self.slots
                    .insert(k.to_string(), ContextValue::Identifiers(identifiers));
            }
        }
        self
    }

    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.removed.push(key.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.current_identifiers.is_none()
            && self.current_identifier_type.is_none()
            && self.slots.is_empty()
            && self.removed.is_empty()
    }
}
