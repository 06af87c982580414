/*!
 * Queue Property Tests
 * Filename parsing is total and queue ordering is a total order
 */

use foldhost::queue::{compare, parse_name, sort_entries, EntryState, QueueEntry};
use proptest::prelude::*;
use std::cmp::Ordering;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use time::OffsetDateTime;

fn entry(name: String, key: Option<u64>, mtime: u64) -> QueueEntry {
    QueueEntry {
        path: PathBuf::from("/queue").join(&name),
        protein: name.clone(),
        file_name: name,
        variant: None,
        key,
        modified: SystemTime::UNIX_EPOCH + Duration::from_secs(mtime),
        discovered_at: OffsetDateTime::UNIX_EPOCH,
        state: EntryState::Discovered,
    }
}

fn arb_entry() -> impl Strategy<Value = QueueEntry> {
    (
        "[a-z0-9_]{1,6}\\.fasta",
        proptest::option::of(0u64..5),
        0u64..4,
    )
        .prop_map(|(name, key, mtime)| entry(name, key, mtime))
}

proptest! {
    #[test]
    fn prop_parse_never_panics(name in "\\PC{0,40}") {
        if let Ok(parsed) = parse_name(&name) {
            prop_assert!(!parsed.protein.is_empty());
            prop_assert!(!parsed.protein.contains('_'));
            prop_assert_eq!(parsed.protein.trim(), parsed.protein.as_str());
        }
    }

    #[test]
    fn prop_well_formed_names_parse_back(
        key in proptest::option::of(0u32..100_000),
        protein in "[A-Za-z][A-Za-z0-9-]{0,9}",
        variant in proptest::option::of("[A-Za-z0-9]{1,8}"),
        ext in prop_oneof!["fasta", "fa", "FASTA"],
    ) {
        let mut name = String::new();
        if let Some(k) = key {
            name.push_str(&format!("{}_", k));
        }
        name.push_str(&protein);
        if let Some(v) = &variant {
            name.push('_');
            name.push_str(v);
        }
        name.push('.');
        name.push_str(&ext);

        let parsed = parse_name(&name).unwrap();
        prop_assert_eq!(parsed.key, key.map(u64::from));
        prop_assert_eq!(parsed.protein, protein);
        prop_assert_eq!(parsed.variant, variant);
    }

    #[test]
    fn prop_compare_is_antisymmetric(a in arb_entry(), b in arb_entry()) {
        prop_assert_eq!(compare(&a, &b), compare(&b, &a).reverse());
        prop_assert_eq!(compare(&a, &a), Ordering::Equal);
    }

    #[test]
    fn prop_order_is_independent_of_discovery_order(
        entries in proptest::collection::vec(arb_entry(), 0..20)
    ) {
        let mut forward = entries.clone();
        let mut backward: Vec<QueueEntry> = entries.into_iter().rev().collect();
        sort_entries(&mut forward);
        sort_entries(&mut backward);

        let paths = |v: &[QueueEntry]| v.iter().map(|e| e.path.clone()).collect::<Vec<_>>();
        prop_assert_eq!(paths(&forward), paths(&backward));

        for pair in forward.windows(2) {
            prop_assert_ne!(compare(&pair[0], &pair[1]), Ordering::Greater);
            if pair[0].key.is_none() {
                prop_assert!(pair[1].key.is_none());
            }
        }
    }
}
