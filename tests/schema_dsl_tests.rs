//! Schema DSL Tests
//!
//! Parsing schema text into interned record schemas: quoting, variants,
//! codecs, constraints and schema evolution.

use tabula_core::*;
use std::sync::Arc;

#[test]
fn test_parse_two_column_schema() {
    let schema = RecordSchema::parse(":A,int\n:B,java.lang.String,,,,1").unwrap();

    assert_eq!(schema.len(), 2);
    assert_eq!(schema.names().collect::<Vec<_>>(), vec!["A", "B"]);
    assert_eq!(schema.primary_key_indices(), &[1]);
    assert!(!schema.properties()[0].is_primary_key());
    assert!(schema.properties()[1].is_primary_key());
}

#[test]
fn test_text_round_trip_keeps_identity() {
    let texts = [
        ":A,int\n:B,java.lang.String,,,,1",
        "# comment line\nrt_name,String,trim,,notEmpty\n\nrt_when,Date,date{pattern=yyyy-MM-dd}",
        "validator:rt_mail,String,,,notNull\ncalc:rt_len,int,,,len(rt_mail)",
    ];
    for text in texts {
        let schema = RecordSchema::parse(text).unwrap();
        let reparsed = RecordSchema::parse(schema.to_text()).unwrap();
        assert!(Arc::ptr_eq(&schema, &reparsed), "round trip of {:?}", text);
        assert!(Arc::ptr_eq(&schema, &RecordSchema::parse(text).unwrap()));
    }
}

#[test]
fn test_quoted_and_escaped_fields() {
    let schema = RecordSchema::parse("qe_code,String,\"default{value=a,b}\"").unwrap();
    let record = Record::new(&schema);
    record.parse_property("qe_code", Value::from("")).unwrap();
    assert_eq!(record.get_string("qe_code").unwrap().as_deref(), Some("a,b"));

    let escaped = RecordSchema::parse("qe_other,String,default{value=x\\,y}").unwrap();
    let record = Record::new(&escaped);
    record.parse_property("qe_other", Value::from("")).unwrap();
    assert_eq!(record.get_string("qe_other").unwrap().as_deref(), Some("x,y"));
}

#[test]
fn test_date_codec_with_constant_pattern() {
    let schema = RecordSchema::parse("dc_day,Date,date{pattern=DateFormats.ISO_DATE},date{pattern=dd/MM/yyyy}").unwrap();
    let record = Record::new(&schema);
    record.parse_property("dc_day", Value::from("2024-03-01")).unwrap();
    let day = record.get_date("dc_day").unwrap().unwrap();
    assert_eq!(day.format("%Y-%m-%d").to_string(), "2024-03-01");
    assert_eq!(record.format_property("dc_day").unwrap(), Value::from("01/03/2024"));
}

#[test]
fn test_unknown_date_pattern_rejected_at_definition() {
    let err = RecordSchema::parse("dp_when,java.util.Date,,date{pattern=%Q}").unwrap_err();
    assert_eq!(err.kind(), "schema_definition");

    let schema = RecordSchema::parse("dp_ok,java.util.Date,,date{pattern=%d.%m.%Y}").unwrap();
    let record = Record::new(&schema);
    record.set_property("dp_ok", Value::from("2024-01-01T00:00:00")).unwrap();
    assert_eq!(record.format_property("dp_ok").unwrap(), Value::from("01.01.2024"));
}

#[test]
fn test_blank_trailing_fields_share_the_instance() {
    let plain = RecordSchema::parse("bf_x,int").unwrap();
    assert!(Arc::ptr_eq(&plain, &RecordSchema::parse("bf_x,int, ").unwrap()));
    assert!(Arc::ptr_eq(&plain, &RecordSchema::parse("bf_x,int,,  ,").unwrap()));
}

#[test]
fn test_codec_chain_order() {
    let schema = RecordSchema::parse("cc_tags,String[],trim+split{separator=|}+upper,join{separator=/}").unwrap();
    let record = Record::new(&schema);
    record.parse_property("cc_tags", Value::from(" a|b ")).unwrap();
    assert_eq!(
        record.get_property("cc_tags").unwrap(),
        Value::Array(vec![Value::from("A"), Value::from("B")])
    );
    assert_eq!(record.format_property("cc_tags").unwrap(), Value::from("A/B"));
}

#[test]
fn test_schema_definition_errors_carry_the_line() {
    let cases = [
        ("se_a,int\nse_a,long", "se_a,long"),
        ("se_b,int,,,,yes", "se_b,int"),
        ("se_c,nosuchtype", "se_c,nosuchtype"),
        ("se_d,int,nosuchcodec", "se_d,int,nosuchcodec"),
        ("se_e,int,,,expr{@value@ * 2}", "se_e,int,,,expr"),
    ];
    for (text, offending) in cases {
        match RecordSchema::parse(text).unwrap_err() {
            TabulaError::SchemaDefinition { line, .. } => assert!(line.starts_with(offending), "{} vs {}", line, offending),
            other => panic!("unexpected error for {:?}: {:?}", text, other),
        }
    }
}

#[test]
fn test_registered_service_reference() {
    #[derive(Debug)]
    struct Reverse;

    impl Converter for Reverse {
        fn name(&self) -> &str {
            "reverse"
        }

        fn convert(&self, value: Value) -> std::result::Result<Value, String> {
            Ok(match value {
                Value::String(s) => Value::String(s.chars().rev().collect()),
                other => other,
            })
        }
    }

    registry::global().register_service("reverser", Service::Converter(Arc::new(Reverse)));
    let schema = RecordSchema::parse("sr_word,String,$reverser").unwrap();
    let record = Record::new(&schema);
    record.parse_property("sr_word", Value::from("abc")).unwrap();
    assert_eq!(record.get_string("sr_word").unwrap().as_deref(), Some("cba"));

    let err = RecordSchema::parse("sr_missing,String,$nobody").unwrap_err();
    assert_eq!(err.kind(), "schema_definition");
}

#[test]
fn test_append_and_replace() {
    let base = RecordSchema::parse("ar_id,long,,,,1").unwrap();
    let extended = base.append("ar_label,String").unwrap();
    assert_eq!(extended.len(), 2);
    assert_eq!(base.len(), 1);
    assert!(Arc::ptr_eq(&extended, &RecordSchema::parse("ar_id,long,,,,1\nar_label,String").unwrap()));

    let widened = RecordSchema::parse("ar_id,java.lang.Number,,,,1\nar_label,Object").unwrap();
    assert!(extended.replace(&widened).is_ok());
    let narrowed = RecordSchema::parse("ar_id,int,,,,1").unwrap();
    assert_eq!(extended.replace(&narrowed).unwrap_err().kind(), "schema_definition");
}

#[test]
fn test_fingerprint_lookup() {
    let schema = RecordSchema::parse("fp_x,int\nfp_y,double").unwrap();
    let found = RecordSchema::by_fingerprint(schema.fingerprint()).unwrap();
    assert!(Arc::ptr_eq(&schema, &found));
    assert!(RecordSchema::by_fingerprint("not-a-fingerprint").is_none());
}
