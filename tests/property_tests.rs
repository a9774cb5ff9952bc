//! Property-Based Tests
//!
//! Schema text round trips, primary-key lookup against a linear scan, sort
//! stability, and composition of reconciliations over disjoint keys.

use proptest::prelude::*;
use tabula_core::*;
use std::collections::BTreeSet;
use std::sync::Arc;

const TYPES: &[&str] = &["int", "long", "double", "String", "boolean", "java.math.BigDecimal", "Date", "String[]"];

fn keyed() -> SchemaRef {
    RecordSchema::parse("pk_id,int,,,,1\npk_group,int\npk_label,String").unwrap()
}

fn keyed_list(rows: &[(i32, i32)]) -> RecordList {
    let schema = keyed();
    let list = RecordList::with_schema("keyed", &schema);
    for &(id, group) in rows {
        let record = Record::with_values(
            &schema,
            vec![Value::Int(id), Value::Int(group), Value::from(format!("r{}", id).as_str())],
        )
        .unwrap();
        // generated ids may repeat; later duplicates are rejected
        let _ = list.add(record);
    }
    list
}

fn ids(list: &RecordList) -> Vec<i32> {
    list.snapshot().unwrap().iter().map(|r| r.get_int("pk_id").unwrap()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Parsing the canonical text of a schema yields the same instance
    #[test]
    fn prop_schema_text_round_trip(
        columns in prop::collection::btree_set("[a-z]{1,6}", 1..6),
        type_picks in prop::collection::vec(0usize..TYPES.len(), 6),
        key_picks in prop::collection::vec(any::<bool>(), 6),
    ) {
        let text = columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let key = if key_picks[i] { ",,,,1" } else { "" };
                format!("prt_{},{}{}", name, TYPES[type_picks[i]], key)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let schema = RecordSchema::parse(&text).unwrap();
        prop_assert_eq!(schema.len(), columns.len());
        let reparsed = RecordSchema::parse(schema.to_text()).unwrap();
        prop_assert!(Arc::ptr_eq(&schema, &reparsed));
        let keys = key_picks.iter().take(columns.len()).filter(|k| **k).count();
        prop_assert_eq!(schema.primary_key_indices().len(), keys);
    }

    /// The primary-key index agrees with a linear scan
    #[test]
    fn prop_primary_key_matches_scan(
        rows in prop::collection::vec((0i32..50, 0i32..5), 0..40),
        probes in prop::collection::vec(0i32..60, 1..20),
    ) {
        let list = keyed_list(&rows);
        let unique: BTreeSet<i32> = rows.iter().map(|(id, _)| *id).collect();
        prop_assert_eq!(list.len(), unique.len());

        for probe in probes {
            let indexed = list.search_by_primary_key_values(&[Value::Int(probe)]).unwrap();
            let scanned = list
                .snapshot().unwrap()
                .into_iter()
                .find(|r| r.get_int("pk_id").unwrap() == probe);
            prop_assert_eq!(indexed.is_some(), scanned.is_some());
            if let (Some(indexed), Some(scanned)) = (indexed, scanned) {
                prop_assert_eq!(indexed.position(), scanned.position());
            }
        }
    }

    /// Sorting orders by the key and keeps equal keys in prior order
    #[test]
    fn prop_sort_is_stable(rows in prop::collection::vec((0i32..1000, 0i32..4), 0..40)) {
        let list = keyed_list(&rows);
        let before = ids(&list);
        list.sort(&["pk_group"], &[true]).unwrap();
        let after = list.snapshot().unwrap();

        for pair in after.windows(2) {
            let (a, b) = (pair[0].get_int("pk_group").unwrap(), pair[1].get_int("pk_group").unwrap());
            prop_assert!(a <= b);
            if a == b {
                let pa = before.iter().position(|id| *id == pair[0].get_int("pk_id").unwrap());
                let pb = before.iter().position(|id| *id == pair[1].get_int("pk_id").unwrap());
                prop_assert!(pa < pb);
            }
        }
    }

    /// Applying two change sets on disjoint keys in either order gives the
    /// same rows
    #[test]
    fn prop_reconcile_composes_on_disjoint_keys(
        rows in prop::collection::vec((0i32..30, 0i32..3), 0..20),
        first in prop::collection::btree_map(0i32..40, 0u8..3, 0..8),
        second in prop::collection::btree_map(40i32..80, 0u8..3, 0..8),
    ) {
        let schema = keyed();
        let list = keyed_list(&rows);
        let build = |changes: &std::collections::BTreeMap<i32, u8>| {
            let mut set = ChangeSet::new();
            for (&id, &kind) in changes {
                let record = Record::with_values(
                    &schema,
                    vec![Value::Int(id), Value::Int(9), Value::from("changed")],
                )
                .unwrap();
                match kind {
                    0 => set.add(record).unwrap(),
                    1 => set.update(record).unwrap(),
                    _ => set.remove(&record).unwrap(),
                }
            }
            set
        };

        let a_then_b = list.reconcile(&build(&first)).unwrap().reconcile(&build(&second)).unwrap();
        let b_then_a = list.reconcile(&build(&second)).unwrap().reconcile(&build(&first)).unwrap();

        let as_set = |list: &RecordList| -> BTreeSet<(i32, i32)> {
            list.snapshot().unwrap()
                .iter()
                .map(|r| (r.get_int("pk_id").unwrap(), r.get_int("pk_group").unwrap()))
                .collect()
        };
        prop_assert_eq!(as_set(&a_then_b), as_set(&b_then_a));
        prop_assert_eq!(a_then_b.len(), b_then_a.len());

        let mut union = build(&first);
        union.merge(build(&second));
        let at_once = list.reconcile(&union).unwrap();
        prop_assert_eq!(as_set(&a_then_b), as_set(&at_once));
        prop_assert_eq!(ids(&list), ids(&keyed_list(&rows)));
    }
}
