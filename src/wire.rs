//! Serialized record/list wire format
//!
//! A record travels as its schema (inline text or the fingerprint of an
//! already interned schema) followed by its value slots in column order. A
//! list additionally carries its name, synchronization flag and sort
//! specification, then a count-prefixed sequence of rows. Encoding is
//! bincode.

use crate::error::{Result, TabulaError};
use crate::list::{RecordList, SyncMode};
use crate::record::Record;
use crate::schema::{RecordSchema, SchemaRef};
use crate::sort::SortSpec;
use crate::types::{Value, DATE_TIME_FORMAT};
use chrono::NaiveDateTime;
use num_bigint::BigInt;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How schemas are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaEncoding {
    /// Full canonical text
    Inline,
    /// Fingerprint only; the receiver must already know the schema
    Reference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireSchema {
    Text(String),
    Reference(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireValue {
    Null,
    Bool(bool),
    Char(char),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    BigInteger(String),
    Float(f32),
    Double(f64),
    BigDecimal(String),
    String(String),
    Date(String),
    Array(Vec<WireValue>),
    Record(Box<WireRecord>),
    List(Box<WireList>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRecord {
    pub schema: Option<WireSchema>,
    pub values: Vec<WireValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireList {
    pub name: String,
    pub synchronized: bool,
    pub sort: Option<SortSpec>,
    pub schema: Option<WireSchema>,
    pub rows: Vec<Vec<WireValue>>,
}

fn write_schema(schema: &RecordSchema, encoding: SchemaEncoding) -> WireSchema {
    match encoding {
        SchemaEncoding::Inline => WireSchema::Text(schema.to_text().to_string()),
        SchemaEncoding::Reference => WireSchema::Reference(schema.fingerprint().to_string()),
    }
}

fn read_schema(schema: WireSchema) -> Result<SchemaRef> {
    match schema {
        WireSchema::Text(text) => RecordSchema::parse(&text),
        WireSchema::Reference(fingerprint) => RecordSchema::by_fingerprint(&fingerprint)
            .ok_or_else(|| TabulaError::Serialization(format!("unknown schema fingerprint {}", fingerprint))),
    }
}

impl WireValue {
    pub fn from_value(value: &Value, encoding: SchemaEncoding) -> Result<Self> {
        Ok(match value {
            Value::Null => WireValue::Null,
            Value::Bool(v) => WireValue::Bool(*v),
            Value::Char(v) => WireValue::Char(*v),
            Value::Byte(v) => WireValue::Byte(*v),
            Value::Short(v) => WireValue::Short(*v),
            Value::Int(v) => WireValue::Int(*v),
            Value::Long(v) => WireValue::Long(*v),
            Value::BigInteger(v) => WireValue::BigInteger(v.to_string()),
            Value::Float(v) => WireValue::Float(*v),
            Value::Double(v) => WireValue::Double(*v),
            Value::BigDecimal(v) => WireValue::BigDecimal(v.to_string()),
            Value::String(v) => WireValue::String(v.clone()),
            Value::Date(v) => WireValue::Date(v.format(DATE_TIME_FORMAT).to_string()),
            Value::Array(items) => WireValue::Array(write_row(items, encoding)?),
            Value::Record(record) => WireValue::Record(Box::new(WireRecord::from_record(record, encoding)?)),
            Value::List(list) => WireValue::List(Box::new(WireList::from_list(list, encoding)?)),
        })
    }

    pub fn into_value(self) -> Result<Value> {
        Ok(match self {
            WireValue::Null => Value::Null,
            WireValue::Bool(v) => Value::Bool(v),
            WireValue::Char(v) => Value::Char(v),
            WireValue::Byte(v) => Value::Byte(v),
            WireValue::Short(v) => Value::Short(v),
            WireValue::Int(v) => Value::Int(v),
            WireValue::Long(v) => Value::Long(v),
            WireValue::BigInteger(text) => Value::BigInteger(
                BigInt::from_str(&text)
                    .map_err(|e| TabulaError::Serialization(format!("BigInteger '{}': {}", text, e)))?,
            ),
            WireValue::Float(v) => Value::Float(v),
            WireValue::Double(v) => Value::Double(v),
            WireValue::BigDecimal(text) => Value::BigDecimal(
                Decimal::from_str(&text)
                    .map_err(|e| TabulaError::Serialization(format!("BigDecimal '{}': {}", text, e)))?,
            ),
            WireValue::String(v) => Value::String(v),
            WireValue::Date(text) => Value::Date(
                NaiveDateTime::parse_from_str(&text, DATE_TIME_FORMAT)
                    .map_err(|e| TabulaError::Serialization(format!("date '{}': {}", text, e)))?,
            ),
            WireValue::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(WireValue::into_value)
                    .collect::<Result<Vec<_>>>()?,
            ),
            WireValue::Record(record) => Value::Record(record.into_record()?),
            WireValue::List(list) => Value::List(list.into_list()?),
        })
    }
}

fn write_row(values: &[Value], encoding: SchemaEncoding) -> Result<Vec<WireValue>> {
    values.iter().map(|v| WireValue::from_value(v, encoding)).collect()
}

fn read_row(values: Vec<WireValue>) -> Result<Vec<Value>> {
    values.into_iter().map(WireValue::into_value).collect()
}

impl WireRecord {
    pub fn from_record(record: &Record, encoding: SchemaEncoding) -> Result<Self> {
        Ok(WireRecord {
            schema: record.schema().map(|schema| write_schema(&schema, encoding)),
            values: write_row(&record.values(), encoding)?,
        })
    }

    pub fn into_record(self) -> Result<Record> {
        match self.schema {
            None => Ok(Record::unbound()),
            Some(schema) => {
                let schema = read_schema(schema)?;
                Record::with_values(&schema, read_row(self.values)?)
            }
        }
    }
}

impl WireList {
    /// Fails with a concurrent modification when an unguarded list is
    /// busy, rather than writing a partial list.
    pub fn from_list(list: &RecordList, encoding: SchemaEncoding) -> Result<Self> {
        Ok(WireList {
            name: list.name().to_string(),
            synchronized: list.mode().is_synchronized(),
            sort: list.sort_spec()?,
            schema: list.schema().map(|schema| write_schema(&schema, encoding)),
            rows: list
                .snapshot()?
                .iter()
                .map(|row| write_row(&row.values(), encoding))
                .collect::<Result<Vec<_>>>()?,
        })
    }

    pub fn into_list(self) -> Result<RecordList> {
        let schema = self.schema.map(read_schema).transpose()?;
        let mode = if self.synchronized {
            SyncMode::Guarded
        } else {
            SyncMode::Unguarded
        };
        let list = RecordList::with_mode(&self.name, schema.as_ref(), mode);
        list.set_sort_spec(self.sort)?;
        if self.rows.is_empty() {
            return Ok(list);
        }
        let schema = schema.ok_or_else(|| {
            TabulaError::Serialization(format!("list '{}' carries rows but no schema", self.name))
        })?;
        for row in self.rows {
            list.add(Record::with_values(&schema, read_row(row)?)?)?;
        }
        Ok(list)
    }
}

pub fn encode_record(record: &Record, encoding: SchemaEncoding) -> Result<Vec<u8>> {
    bincode::serialize(&WireRecord::from_record(record, encoding)?)
        .map_err(|e| TabulaError::Serialization(e.to_string()))
}

pub fn decode_record(bytes: &[u8]) -> Result<Record> {
    let wire: WireRecord = bincode::deserialize(bytes).map_err(|e| TabulaError::Serialization(e.to_string()))?;
    wire.into_record()
}

pub fn encode_list(list: &RecordList, encoding: SchemaEncoding) -> Result<Vec<u8>> {
    bincode::serialize(&WireList::from_list(list, encoding)?).map_err(|e| TabulaError::Serialization(e.to_string()))
}

pub fn decode_list(bytes: &[u8]) -> Result<RecordList> {
    let wire: WireList = bincode::deserialize(bytes).map_err(|e| TabulaError::Serialization(e.to_string()))?;
    wire.into_list()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::Arc;

    #[test]
    fn test_record_with_reference_schema() {
        let schema = RecordSchema::parse("wr_id,long,,,,1\nwr_when,Date\nwr_amount,BigDecimal").unwrap();
        let when = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap().and_hms_opt(12, 30, 0).unwrap();
        let record = Record::with_values(
            &schema,
            vec![Value::Long(7), Value::Date(when), Value::BigDecimal(Decimal::new(1234, 2))],
        )
        .unwrap();

        let bytes = encode_record(&record, SchemaEncoding::Reference).unwrap();
        let decoded = decode_record(&bytes).unwrap();
        assert_eq!(decoded, record);
        assert!(Arc::ptr_eq(&decoded.schema().unwrap(), &schema));
    }

    #[test]
    fn test_unknown_fingerprint_is_rejected() {
        let wire = WireRecord {
            schema: Some(WireSchema::Reference("00".repeat(32))),
            values: Vec::new(),
        };
        let bytes = bincode::serialize(&wire).unwrap();
        assert_eq!(decode_record(&bytes).unwrap_err().kind(), "serialization");
        assert_eq!(decode_record(&[1, 2, 3]).unwrap_err().kind(), "serialization");
    }

    #[test]
    fn test_list_keeps_name_mode_and_sort() {
        let schema = RecordSchema::parse("wl_id,int,,,,1\nwl_tags,String[]").unwrap();
        let list = RecordList::unguarded("tags", &schema);
        list.set_sort_spec(Some(SortSpec::new().then("wl_id", false))).unwrap();
        list.add(
            Record::with_values(&schema, vec![Value::Int(1), Value::Array(vec![Value::from("a")])]).unwrap(),
        )
        .unwrap();

        let decoded = decode_list(&encode_list(&list, SchemaEncoding::Inline).unwrap()).unwrap();
        assert_eq!(decoded.name(), "tags");
        assert_eq!(decoded.mode(), SyncMode::Unguarded);
        assert_eq!(decoded.sort_spec().unwrap(), list.sort_spec().unwrap());
        assert_eq!(decoded, list);
        assert!(decoded.search_by_primary_key_values(&[Value::Int(1)]).unwrap().is_some());
    }
}
