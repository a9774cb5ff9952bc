//! Reconciliation Tests
//!
//! Applying keyed change sets to record lists. The source list is never
//! modified; the result carries copies.

use tabula_core::*;

fn rates() -> SchemaRef {
    RecordSchema::parse("rt_ccy,String,,,,1\nrt_rate,double").unwrap()
}

fn rate(schema: &SchemaRef, ccy: &str, value: f64) -> Record {
    Record::with_values(schema, vec![Value::from(ccy), Value::Double(value)]).unwrap()
}

fn rate_list() -> RecordList {
    let schema = rates();
    let list = RecordList::with_schema("rates", &schema);
    for (ccy, value) in [("EUR", 1.0), ("USD", 1.1), ("GBP", 0.85)] {
        list.add(rate(&schema, ccy, value)).unwrap();
    }
    list
}

fn currencies(list: &RecordList) -> Vec<String> {
    list.snapshot().unwrap()
        .iter()
        .map(|r| r.get_string("rt_ccy").unwrap().unwrap())
        .collect()
}

fn key(ccy: &str) -> IndexKey {
    IndexKey::from(vec![Value::from(ccy)])
}

#[test]
fn test_update_remove_and_append() {
    let schema = rates();
    let list = rate_list();

    let mut changes = ChangeSet::new();
    changes.update(rate(&schema, "USD", 1.2)).unwrap();
    changes.remove(&rate(&schema, "GBP", 0.0)).unwrap();
    changes.add(rate(&schema, "JPY", 160.0)).unwrap();
    changes.add(rate(&schema, "CHF", 0.95)).unwrap();

    let result = list.reconcile(&changes).unwrap();
    assert_eq!(currencies(&result), vec!["EUR", "USD", "JPY", "CHF"]);
    assert_eq!(
        result.search_by_primary_key_values(&[Value::from("USD")]).unwrap().unwrap().get_double("rt_rate").unwrap(),
        1.2
    );

    // source untouched
    assert_eq!(currencies(&list), vec!["EUR", "USD", "GBP"]);
    assert_eq!(
        list.search_by_primary_key_values(&[Value::from("USD")]).unwrap().unwrap().get_double("rt_rate").unwrap(),
        1.1
    );
}

#[test]
fn test_result_rows_are_copies() {
    let list = rate_list();
    let result = list.reconcile(&ChangeSet::new()).unwrap();
    assert_eq!(result, list);
    assert!(!result.ptr_eq(&list));

    result.get(0).unwrap().set_property("rt_rate", Value::Double(9.0)).unwrap();
    assert_eq!(list.get(0).unwrap().get_double("rt_rate").unwrap(), 1.0);
}

#[test]
fn test_key_only_changes_need_fill() {
    let list = rate_list();
    let mut changes = ChangeSet::new();
    changes.mark(key("EUR"), UpdateKind::Update);
    changes.mark(key("SEK"), UpdateKind::Add);

    let err = list.reconcile(&changes).unwrap_err();
    assert_eq!(err.kind(), "reconciliation");

    // fill copies the current row for keys the list holds
    assert_eq!(changes.fill(&list).unwrap(), 1);
    assert!(changes.get(&key("EUR")).unwrap().payload.is_some());
    assert!(changes.get(&key("SEK")).unwrap().payload.is_none());

    changes.take(&key("SEK"));
    let result = list.reconcile(&changes).unwrap();
    assert_eq!(currencies(&result), currencies(&list));
}

#[test]
fn test_mismatched_payload_is_rejected() {
    let list = rate_list();
    let schema = rates();

    let mut changes = ChangeSet::new();
    changes.insert(key("EUR"), UpdateKind::Update, Some(rate(&schema, "USD", 2.0)));
    assert_eq!(list.reconcile(&changes).unwrap_err().kind(), "reconciliation");

    let other = RecordSchema::parse("rx_ccy,String,,,,1\nrx_rate,double").unwrap();
    let foreign = Record::with_values(&other, vec![Value::from("EUR"), Value::Double(1.0)]).unwrap();
    let mut changes = ChangeSet::new();
    changes.update(foreign).unwrap();
    assert_eq!(list.reconcile(&changes).unwrap_err().kind(), "reconciliation");
}

#[test]
fn test_later_change_wins_and_merge() {
    let schema = rates();
    let list = rate_list();

    let mut first = ChangeSet::new();
    first.update(rate(&schema, "EUR", 3.0)).unwrap();
    first.remove(&rate(&schema, "EUR", 0.0)).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first.get(&key("EUR")).unwrap().kind, UpdateKind::Remove);

    let mut second = ChangeSet::new();
    second.update(rate(&schema, "EUR", 4.0)).unwrap();
    second.add(rate(&schema, "NOK", 11.0)).unwrap();
    first.merge(second);
    assert_eq!(first.len(), 2);
    assert_eq!(first.keys().cloned().collect::<Vec<_>>(), vec![key("EUR"), key("NOK")]);

    let result = list.reconcile(&first).unwrap();
    assert_eq!(currencies(&result), vec!["EUR", "USD", "GBP", "NOK"]);
    assert_eq!(result.get(0).unwrap().get_double("rt_rate").unwrap(), 4.0);
}

#[test]
fn test_result_keeps_sort_and_indexes() {
    let schema = rates();
    let list = rate_list();
    list.set_sort_spec(Some(SortSpec::new().then("rt_ccy", true))).unwrap();
    list.create_index("by_rate", &["rt_rate"]).unwrap();

    let mut changes = ChangeSet::new();
    changes.add(rate(&schema, "AUD", 1.6)).unwrap();
    let result = list.reconcile(&changes).unwrap();

    assert_eq!(currencies(&result), vec!["AUD", "EUR", "GBP", "USD"]);
    assert_eq!(result.sort_spec().unwrap(), list.sort_spec().unwrap());
    assert_eq!(result.lookup_index("by_rate", &[Value::Double(1.6)]).unwrap().len(), 1);
    assert_eq!(result.get(0).unwrap().position(), Some(0));
}

#[test]
fn test_reconcile_requires_primary_key() {
    let schema = RecordSchema::parse("rn_a,int").unwrap();
    let list = RecordList::with_schema("keyless", &schema);
    assert_eq!(list.reconcile(&ChangeSet::new()).unwrap_err().kind(), "reconciliation");

    let mut changes = ChangeSet::new();
    let err = changes.add(Record::with_values(&schema, vec![Value::Int(1)]).unwrap()).unwrap_err();
    assert_eq!(err.kind(), "reconciliation");
}

#[test]
fn test_drain_keeps_insertion_order() {
    let schema = rates();
    let mut changes = ChangeSet::new();
    for ccy in ["C", "A", "B"] {
        changes.add(rate(&schema, ccy, 1.0)).unwrap();
    }
    let drained: Vec<IndexKey> = changes.drain().into_iter().map(|(k, _)| k).collect();
    assert_eq!(drained, vec![key("C"), key("A"), key("B")]);
    assert!(changes.is_empty());
}
