//! # Registry Infrastructure
//!
//! Tag-based dispatch from strategy steps to executable actions.

pub mod action_registry;

pub use action_registry::{ActionRegistry, RegistryStats};
