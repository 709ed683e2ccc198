//! # System Constants
//!
//! Well-known context keys, action tags and parameter defaults shared by the
//! orchestrator and the built-in actions.

/// Context keys with engine-defined meaning
pub mod context_keys {
    /// The evolving list of identifiers under conversion
    pub const CURRENT_IDENTIFIERS: &str = "current_identifiers";
    /// The identifier type the current identifiers belong to
    pub const CURRENT_IDENTIFIER_TYPE: &str = "current_identifier_type";

    pub const COMPOSITE_LINEAGE: &str = "composite_lineage";
    pub const RESOLUTION_FAILURES: &str = "resolution_failures";
    pub const UNMAPPED_IDENTIFIERS: &str = "unmapped_identifiers";
    pub const RECONCILED_MAPPING: &str = "reconciled_mapping";
    pub const ONE_TO_MANY_SOURCES: &str = "one_to_many_sources";
    pub const CANONICAL_MAPPING: &str = "canonical_mapping";

    /// Keys an action may not claim as an extension slot
    pub const RESERVED: [&str; 2] = [CURRENT_IDENTIFIERS, CURRENT_IDENTIFIER_TYPE];
}

/// Tags of the built-in actions
pub mod action_tags {
    pub const LOCAL_CONVERT: &str = "local_convert";
    pub const EXTERNAL_RESOLVE: &str = "external_resolve";
    pub const COMPOSITE_SPLIT: &str = "composite_split";
    pub const FILTER_BY_PRESENCE: &str = "filter_by_presence";
    pub const RECONCILE: &str = "reconcile";
    pub const PERSIST_RESULTS: &str = "persist_results";

    pub const ALL: [&str; 6] = [
        LOCAL_CONVERT,
        EXTERNAL_RESOLVE,
        COMPOSITE_SPLIT,
        FILTER_BY_PRESENCE,
        RECONCILE,
        PERSIST_RESULTS,
    ];
}

pub const DEFAULT_COMPOSITE_DELIMITER: &str = "_";

/// Separator between resolver identity and identifier in cache fingerprints
pub const FINGERPRINT_SEPARATOR: char = '\u{1f}';
