mod common;

use common::strategies::*;
use mapper_core::actions::composite_split::split_composites;
use mapper_core::actions::reconcile;
use proptest::prelude::*;
use std::collections::BTreeSet;

fn first_occurrences(parts: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    parts
        .iter()
        .filter(|part| seen.insert(part.as_str()))
        .cloned()
        .collect()
}

proptest! {
    /// Property: a pair survives only when both directions list it
    #[test]
    fn reconciled_pairs_are_exactly_the_mutual_ones(
        forward in lookup_table_strategy(),
        reverse in lookup_table_strategy(),
    ) {
        let expected: BTreeSet<(String, String)> = forward
            .iter()
            .flat_map(|(source, targets)| targets.iter().map(move |t| (source.clone(), t.clone())))
            .filter(|(source, target)| {
                reverse.get(target).is_some_and(|sources| sources.contains(source))
            })
            .collect();

        prop_assert_eq!(reconcile(&forward, &reverse).pairs(), expected);
    }

    /// Property: swapping the maps confirms the mirrored pair set
    #[test]
    fn reconciliation_is_symmetric(
        forward in lookup_table_strategy(),
        reverse in lookup_table_strategy(),
    ) {
        let one_way = reconcile(&forward, &reverse).pairs();
        let other_way: BTreeSet<(String, String)> = reconcile(&reverse, &forward)
            .pairs()
            .into_iter()
            .map(|(target, source)| (source, target))
            .collect();

        prop_assert_eq!(one_way, other_way);
    }

    /// Property: multiplicity and canonical picks come from confirmed pairs only
    #[test]
    fn one_to_many_and_canonical_follow_confirmed_pairs(
        forward in lookup_table_strategy(),
        reverse in lookup_table_strategy(),
    ) {
        let result = reconcile(&forward, &reverse);

        for (source, targets) in &result.confirmed {
            prop_assert!(!targets.is_empty());
            prop_assert_eq!(result.one_to_many.contains(source), targets.len() > 1);
            prop_assert_eq!(result.canonical.get(source), targets.iter().min());
        }
        for source in &result.one_to_many {
            prop_assert!(result.confirmed.contains_key(source));
        }
        prop_assert_eq!(result.canonical.len(), result.confirmed.len());
    }

    /// Property: composites expand to their distinct parts, with lineage only when split
    #[test]
    fn composites_expand_to_their_parts((composite, parts) in composite_strategy()) {
        let result = split_composites(&[composite.clone()], "_");

        prop_assert_eq!(&result.identifiers, &first_occurrences(&parts));
        if parts.len() > 1 {
            prop_assert_eq!(result.lineage.get(&composite), Some(&first_occurrences(&parts)));
        } else {
            prop_assert!(result.lineage.is_empty());
            prop_assert_eq!(result.identifiers, vec![composite]);
        }
    }

    /// Property: splitting never produces empty or duplicate identifiers
    #[test]
    fn split_output_has_no_empty_or_duplicate_parts(
        inputs in prop::collection::vec("[A-C_]{0,6}", 0..8),
    ) {
        let result = split_composites(&inputs, "_");
        let distinct: BTreeSet<&String> = result.identifiers.iter().collect();

        prop_assert_eq!(distinct.len(), result.identifiers.len());
        for (composite, parts) in &result.lineage {
            prop_assert!(composite.contains('_'));
            prop_assert!(parts.iter().all(|part| !part.is_empty() && !part.contains('_')));
        }
    }
}
