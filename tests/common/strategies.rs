#![allow(dead_code)]

use mapper_core::context::LookupTable;
use proptest::prelude::*;

/// Short identifiers drawn from a small alphabet so generated maps overlap
pub fn identifier_strategy() -> impl Strategy<Value = String> {
    "[A-D][0-3]"
}

/// Identifiers that never contain the given delimiter
pub fn plain_identifier_strategy() -> impl Strategy<Value = String> {
    "[A-Z][A-Z0-9]{0,5}"
}

/// Lookup tables with non-empty value lists
pub fn lookup_table_strategy() -> impl Strategy<Value = LookupTable> {
    prop::collection::btree_map(
        identifier_strategy(),
        prop::collection::vec(identifier_strategy(), 1..4),
        0..6,
    )
}

/// Composite tokens: 1..4 plain parts joined by `_`
pub fn composite_strategy() -> impl Strategy<Value = (String, Vec<String>)> {
    prop::collection::vec(plain_identifier_strategy(), 1..4)
        .prop_map(|parts| (parts.join("_"), parts))
}
