//! Record Tests
//!
//! Property access through schemas: computed columns, value-path
//! extraction, codecs and validation on detached and owned records.

use tabula_core::*;
use chrono::NaiveDate;
use std::collections::HashMap;

fn order_lines() -> SchemaRef {
    RecordSchema::parse(
        "ol_id,int,,,,1\n\
         ol_price,double\n\
         ol_qty,int,,,expr{@value@ > 0}\n\
         calc:ol_total,double,,,ol_price * ol_qty\n\
         calc:ol_taxed,double,,,ol_price * ol_qty * dataset.rate\n\
         calc:ol_rows,long,,,dataset.size",
    )
    .unwrap()
}

#[test]
fn test_computed_column_reads_current_values() {
    let schema = order_lines();
    let record = Record::with_properties(
        &schema,
        vec![("ol_id", Value::Int(1)), ("ol_price", Value::Double(2.5)), ("ol_qty", Value::Int(4))],
    )
    .unwrap();

    assert_eq!(record.get_double("ol_total").unwrap(), 10.0);
    record.set_property("ol_qty", Value::Int(2)).unwrap();
    assert_eq!(record.get_double("ol_total").unwrap(), 5.0);

    // computed slots are never stored
    assert_eq!(record.values()[3], Value::Null);
    let err = record.set_property("ol_total", Value::Double(1.0)).unwrap_err();
    assert_eq!(err.kind(), "property_set");
}

#[test]
fn test_computed_column_with_explicit_dataset() {
    let schema = order_lines();
    let record = Record::with_properties(
        &schema,
        vec![("ol_id", Value::Int(1)), ("ol_price", Value::Double(10.0)), ("ol_qty", Value::Int(3))],
    )
    .unwrap();

    let mut dataset: HashMap<String, Value> = HashMap::new();
    dataset.insert("rate".to_string(), Value::Double(1.5));
    let taxed = record.get_property_in("ol_taxed", &dataset).unwrap();
    assert_eq!(taxed, Value::Double(45.0));
}

#[test]
fn test_computed_column_sees_owning_list() {
    let schema = order_lines();
    let list = RecordList::with_schema("lines", &schema);
    for id in 1..=3 {
        list.add(
            Record::with_properties(
                &schema,
                vec![("ol_id", Value::Int(id)), ("ol_price", Value::Double(1.0)), ("ol_qty", Value::Int(1))],
            )
            .unwrap(),
        )
        .unwrap();
    }

    let row = list.get(0).unwrap();
    assert_eq!(row.get_long("ol_rows").unwrap(), 3);

    // a detached copy has no dataset to read from
    let detached = row.clone_with_data();
    assert_eq!(detached.get_property("ol_rows").unwrap_err().kind(), "property_get");
}

#[test]
fn test_extract_from_nested_value() {
    let order = RecordSchema::parse("xo_total,double\nxo_skus,String[]").unwrap();
    let envelope = RecordSchema::parse("xe_order,record").unwrap();
    let target = RecordSchema::parse(
        "xpath:xt_total,double,,,,,/xe_order/xo_total\n\
         xpath:xt_second,String,,,,,/xe_order/xo_skus[2]\n\
         xpath:xt_first,String,,,,,xe_order.xo_skus.0\n\
         xpath:xt_missing,String,,,,,/xe_order/nothing\n\
         xt_plain,int",
    )
    .unwrap();

    let inner = Record::with_values(
        &order,
        vec![Value::Double(99.5), Value::Array(vec![Value::from("a-1"), Value::from("b-2")])],
    )
    .unwrap();
    let outer = Record::with_values(&envelope, vec![Value::Record(inner)]).unwrap();

    let record = Record::new(&target);
    let filled = record.extract_from(&Value::Record(outer)).unwrap();
    assert_eq!(filled, 3);
    assert_eq!(record.get_double("xt_total").unwrap(), 99.5);
    assert_eq!(record.get_string("xt_second").unwrap().as_deref(), Some("b-2"));
    assert_eq!(record.get_string("xt_first").unwrap().as_deref(), Some("a-1"));
    assert_eq!(record.get_property("xt_missing").unwrap(), Value::Null);
}

#[test]
fn test_date_codec_parse_and_format() {
    let schema = RecordSchema::parse(
        "dt_at,Date,date{pattern=yyyy-MM-dd HH:mm},date{pattern=dd.MM.yyyy}\n\
         dt_plain,Date",
    )
    .unwrap();
    let record = Record::new(&schema);

    record.parse_property("dt_at", Value::from("2023-12-31 23:15")).unwrap();
    let expected = NaiveDate::from_ymd_opt(2023, 12, 31)
        .unwrap()
        .and_hms_opt(23, 15, 0)
        .unwrap();
    assert_eq!(record.get_date("dt_at").unwrap(), Some(expected));
    assert_eq!(record.format_property("dt_at").unwrap(), Value::from("31.12.2023"));

    let err = record.parse_property("dt_at", Value::from("31/12/2023")).unwrap_err();
    assert_eq!(err.kind(), "property_set");

    // no codec: the textual codec of the declared type applies
    record.set_property("dt_plain", Value::from("2024-01-02T03:04:05")).unwrap();
    assert_eq!(
        record.get_date("dt_plain").unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(3, 4, 5)
    );
}

#[test]
fn test_validation_reports_failure_and_errors() {
    let schema = order_lines();
    let record = Record::with_properties(&schema, vec![("ol_qty", Value::Int(1))]).unwrap();
    assert!(record.validate().unwrap());

    record.set_property("ol_qty", Value::Int(0)).unwrap();
    assert!(!record.validate().unwrap());
    assert!(!record.validate_property("ol_qty").unwrap());
    assert!(record.validate_property("ol_price").unwrap());

    let strict = RecordSchema::parse("vs_name,String,,,notEmpty\nvalidator:vs_mail,String,,,notNull").unwrap();
    let record = Record::new(&strict);
    assert!(!record.validate().unwrap());
    record.set_property("vs_name", Value::from("x")).unwrap();
    assert!(!record.validate().unwrap());
    record.set_property("vs_mail", Value::from("x@example.org")).unwrap();
    assert!(record.validate().unwrap());
}

#[test]
fn test_numeric_narrowing_is_lossless_only() {
    let schema = RecordSchema::parse("nn_byte,byte\nnn_int,java.lang.Integer\nnn_big,BigInteger").unwrap();
    let record = Record::new(&schema);

    record.set_property("nn_byte", Value::Long(12)).unwrap();
    assert_eq!(record.get_property("nn_byte").unwrap(), Value::Byte(12));
    assert!(record.set_property("nn_byte", Value::Int(300)).is_err());
    assert!(record.set_property("nn_int", Value::Double(1.5)).is_err());
    record.set_property("nn_int", Value::Double(7.0)).unwrap();
    assert_eq!(record.get_property("nn_int").unwrap(), Value::Int(7));

    record.set_property("nn_big", Value::Long(i64::MAX)).unwrap();
    assert_eq!(record.get_long("nn_big").unwrap(), i64::MAX);
}

#[test]
fn test_owned_record_write_updates_primary_index() {
    let schema = RecordSchema::parse("ow_id,int,,,,1\now_label,String").unwrap();
    let list = RecordList::with_schema("owned", &schema);
    list.add(Record::with_values(&schema, vec![Value::Int(1), Value::from("a")]).unwrap())
        .unwrap();
    list.add(Record::with_values(&schema, vec![Value::Int(2), Value::from("b")]).unwrap())
        .unwrap();

    let row = list.get(0).unwrap();
    assert!(row.is_owned());
    assert_eq!(row.position(), Some(0));

    row.set_property("ow_id", Value::Int(10)).unwrap();
    assert!(list.search_by_primary_key_values(&[Value::Int(1)]).unwrap().is_none());
    let found = list.search_by_primary_key_values(&[Value::Int(10)]).unwrap().unwrap();
    assert_eq!(found.get_string("ow_label").unwrap().as_deref(), Some("a"));

    let err = row.set_property("ow_id", Value::Int(2)).unwrap_err();
    assert_eq!(err.kind(), "duplicate_primary_key");
    assert_eq!(row.get_int("ow_id").unwrap(), 10);
}

#[test]
fn test_entries_and_debug_output() {
    let schema = RecordSchema::parse("en_a,int\nen_b,String").unwrap();
    let record = Record::with_values(&schema, vec![Value::Int(1), Value::from("x")]).unwrap();
    let entries = record.entries().unwrap();
    assert_eq!(
        entries,
        vec![("en_a".to_string(), Value::Int(1)), ("en_b".to_string(), Value::from("x"))]
    );
    let debug = format!("{:?}", record);
    assert!(debug.contains("en_a"));
    assert!(debug.contains("en_b"));
}
