pub mod conversion;
pub mod provenance;
pub mod strategy;

// Re-export core models for easy access
pub use conversion::{ConversionEdge, MappingPath};
pub use provenance::{ProvenanceRecord, StepOutcomeKind};
pub use strategy::{StepDefinition, StepParams, Strategy};
