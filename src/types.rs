//! Core type definitions for Tabula
//!
//! [`Value`] is the runtime value stored in a record slot, [`ValueType`] is
//! the semantic type tag a property declares. The two meet in the numeric
//! lattice ([`ValueType::coerce`]) and in the textual codec
//! ([`ValueType::parse_text`] / [`ValueType::format_text`]).
//!
//! # Numeric lattice
//!
//! ```text
//! byte -> short -> int -> long -> BigInteger
//!                          long -> float -> double -> BigDecimal
//! ```
//!
//! Moving right along an arrow is widening and always accepted. Any other
//! numeric conversion is narrowing and accepted only when it is lossless
//! (`Long(5)` into a `byte` column becomes `Byte(5)`, `Long(300)` is
//! rejected, `Double(2.0)` into an `int` column becomes `Int(2)`, `Double(2.5)`
//! is rejected). Accepted values are converted to the exact declared type.

use crate::list::RecordList;
use crate::record::Record;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Canonical textual form of [`Value::Date`].
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

const DATE_TIME_INPUT_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
const DATE_INPUT_FORMAT: &str = "%Y-%m-%d";

/// Runtime value held by a record slot
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Char(char),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    BigInteger(BigInt),
    Float(f32),
    Double(f64),
    BigDecimal(Decimal),
    String(String),
    Date(NaiveDateTime),
    Array(Vec<Value>),
    /// Detached nested record
    Record(Record),
    /// Nested record list (see the nested-list property variant)
    List(RecordList),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            Value::Byte(_) | Value::Short(_) | Value::Int(_) | Value::Long(_) | Value::BigInteger(_)
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integral()
            || matches!(self, Value::Float(_) | Value::Double(_) | Value::BigDecimal(_))
    }

    /// True for strings and for arrays whose elements are all strings or null.
    pub fn is_textual(&self) -> bool {
        match self {
            Value::String(_) => true,
            Value::Array(items) => items
                .iter()
                .all(|item| matches!(item, Value::String(_) | Value::Null)),
            _ => false,
        }
    }

    /// Type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Char(_) => "char",
            Value::Byte(_) => "byte",
            Value::Short(_) => "short",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::BigInteger(_) => "BigInteger",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::BigDecimal(_) => "BigDecimal",
            Value::String(_) => "String",
            Value::Date(_) => "Date",
            Value::Array(_) => "array",
            Value::Record(_) => "record",
            Value::List(_) => "list",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Integral values that fit in an `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(v) => Some(i64::from(*v)),
            Value::Short(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            Value::BigInteger(v) => v.to_i64(),
            _ => None,
        }
    }

    /// Any numeric value as a double (possibly lossy).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            Value::BigDecimal(v) => v.to_f64(),
            Value::BigInteger(v) => v.to_f64(),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_big_int(&self) -> Option<BigInt> {
        match self {
            Value::BigInteger(v) => Some(v.clone()),
            other => other.as_i64().map(BigInt::from),
        }
    }

    /// Any numeric value as a decimal. Binary floats go through their
    /// shortest round-trip text so `0.1f64` becomes `0.1`.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::BigDecimal(v) => Some(*v),
            Value::BigInteger(v) => Decimal::from_str(&v.to_string()).ok(),
            Value::Float(v) => float_to_decimal(f64::from(*v)),
            Value::Double(v) => float_to_decimal(*v),
            other => other.as_i64().map(Decimal::from),
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&RecordList> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Lenient integral read: null is 0, booleans are 0/1, strings are
    /// parsed, fractional numbers are truncated.
    pub fn coerce_i64(&self) -> Result<i64, String> {
        match self {
            Value::Null => Ok(0),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::String(s) => {
                let t = s.trim();
                if t.is_empty() {
                    return Ok(0);
                }
                if let Ok(v) = t.parse::<i64>() {
                    return Ok(v);
                }
                t.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
                    .ok_or_else(|| format!("'{}' is not a number", s))
            }
            Value::Float(_) | Value::Double(_) => self
                .as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
                .ok_or_else(|| format!("{} is not finite", self)),
            Value::BigDecimal(d) => d
                .trunc()
                .to_i64()
                .ok_or_else(|| format!("{} is out of range", d)),
            other => other
                .as_i64()
                .ok_or_else(|| format!("{} value {} is not integral", other.type_name(), other)),
        }
    }

    /// Lenient floating read, same rules as [`Value::coerce_i64`].
    pub fn coerce_f64(&self) -> Result<f64, String> {
        match self {
            Value::Null => Ok(0.0),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => {
                let t = s.trim();
                if t.is_empty() {
                    return Ok(0.0);
                }
                t.parse::<f64>()
                    .map_err(|_| format!("'{}' is not a number", s))
            }
            other => other
                .as_f64()
                .ok_or_else(|| format!("{} value {} is not numeric", other.type_name(), other)),
        }
    }

    /// Lenient boolean read: null is false, numbers are `!= 0`, strings
    /// accept `true`/`false`/`1`/`0`.
    pub fn coerce_bool(&self) -> Result<bool, String> {
        match self {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(*b),
            Value::String(s) => parse_bool(s.trim()),
            other if other.is_numeric() => Ok(other.as_f64().map(|f| f != 0.0).unwrap_or(true)),
            other => Err(format!("{} value {} is not a boolean", other.type_name(), other)),
        }
    }

    /// Named member of a value: record properties, `length`/`size` of
    /// strings, arrays and lists, positional elements, date fields.
    pub fn member(&self, name: &str) -> Option<Value> {
        match self {
            Value::Record(record) => record.get_property(name).ok(),
            Value::Array(items) => match name {
                "length" | "size" => Some(Value::Long(items.len() as i64)),
                _ => name.parse::<usize>().ok().and_then(|i| items.get(i).cloned()),
            },
            Value::String(s) => match name {
                "length" | "size" => Some(Value::Long(s.chars().count() as i64)),
                _ => None,
            },
            Value::List(list) => match name {
                "length" | "size" => Some(Value::Long(list.len() as i64)),
                "name" => Some(Value::String(list.name().to_string())),
                _ => name
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| list.row_waiting(i))
                    .map(Value::Record),
            },
            Value::Date(d) => match name {
                "year" => Some(Value::Int(d.year())),
                "month" => Some(Value::Int(d.month() as i32)),
                "day" => Some(Value::Int(d.day() as i32)),
                "hour" => Some(Value::Int(d.hour() as i32)),
                "minute" => Some(Value::Int(d.minute() as i32)),
                "second" => Some(Value::Int(d.second() as i32)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Positional element of an array or nested list.
    pub fn element(&self, index: usize) -> Option<Value> {
        match self {
            Value::Array(items) => items.get(index).cloned(),
            Value::List(list) => list.row_waiting(index).map(Value::Record),
            _ => None,
        }
    }

    /// Natural ordering. Numbers compare across kinds; values of
    /// incomparable kinds yield `None`.
    pub fn natural_cmp(&self, other: &Value) -> Option<Ordering> {
        if self.is_numeric() && other.is_numeric() {
            return numeric_cmp(self, other);
        }
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Char(a), Value::Char(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Char(a), Value::String(b)) => Some(a.to_string().as_str().cmp(b.as_str())),
            (Value::String(a), Value::Char(b)) => Some(a.as_str().cmp(b.to_string().as_str())),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.natural_cmp(y)? {
                        Ordering::Equal => continue,
                        ord => return Some(ord),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    /// Equality used by queries: numbers compare by value across kinds,
    /// everything else falls back to strict equality.
    pub fn loose_eq(&self, other: &Value) -> bool {
        if self.is_numeric() && other.is_numeric() {
            return numeric_cmp(self, other) == Some(Ordering::Equal);
        }
        match (self, other) {
            (Value::Char(a), Value::String(b)) | (Value::String(b), Value::Char(a)) => {
                let mut chars = b.chars();
                chars.next() == Some(*a) && chars.next().is_none()
            }
            _ => self == other,
        }
    }
}

fn float_to_decimal(f: f64) -> Option<Decimal> {
    if !f.is_finite() {
        return None;
    }
    Decimal::from_str(&f.to_string())
        .ok()
        .or_else(|| Decimal::from_f64(f))
}

fn numeric_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return Some(x.cmp(&y));
    }
    if a.is_integral() && b.is_integral() {
        return Some(a.as_big_int()?.cmp(&b.as_big_int()?));
    }
    if matches!(a, Value::BigDecimal(_)) || matches!(b, Value::BigDecimal(_)) {
        if let (Some(x), Some(y)) = (a.as_decimal(), b.as_decimal()) {
            return Some(x.cmp(&y));
        }
    }
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

fn parse_bool(text: &str) -> Result<bool, String> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(format!("'{}' is not a boolean", text)),
    }
}

fn parse_date(text: &str) -> Result<NaiveDateTime, String> {
    for format in DATE_TIME_INPUT_FORMATS {
        if let Ok(d) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(d);
        }
    }
    NaiveDate::parse_from_str(text, DATE_INPUT_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| format!("'{}' is not a date", text))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::BigInteger(a), Value::BigInteger(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::BigDecimal(a), Value::BigDecimal(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(v) => v.hash(state),
            Value::Char(v) => v.hash(state),
            Value::Byte(v) => v.hash(state),
            Value::Short(v) => v.hash(state),
            Value::Int(v) => v.hash(state),
            Value::Long(v) => v.hash(state),
            Value::BigInteger(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Double(v) => v.to_bits().hash(state),
            Value::BigDecimal(v) => v.normalize().hash(state),
            Value::String(v) => v.hash(state),
            Value::Date(v) => v.hash(state),
            Value::Array(v) => v.hash(state),
            Value::Record(v) => v.hash(state),
            Value::List(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Char(v) => write!(f, "{}", v),
            Value::Byte(v) => write!(f, "{}", v),
            Value::Short(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::BigInteger(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::BigDecimal(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v.format(DATE_TIME_FORMAT)),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Record(r) => write!(f, "{:?}", r),
            Value::List(l) => write!(f, "{}[{}]", l.name(), l.len()),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    char => Char,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    BigInt => BigInteger,
    f32 => Float,
    f64 => Double,
    Decimal => BigDecimal,
    String => String,
    NaiveDateTime => Date,
    Vec<Value> => Array,
    Record => Record,
    RecordList => List,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Primitive kinds shared by the primitive and boxed type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveKind {
    Boolean,
    Char,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveKind {
    pub fn primitive_name(&self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
        }
    }

    pub fn boxed_name(&self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "java.lang.Boolean",
            PrimitiveKind::Char => "java.lang.Character",
            PrimitiveKind::Byte => "java.lang.Byte",
            PrimitiveKind::Short => "java.lang.Short",
            PrimitiveKind::Int => "java.lang.Integer",
            PrimitiveKind::Long => "java.lang.Long",
            PrimitiveKind::Float => "java.lang.Float",
            PrimitiveKind::Double => "java.lang.Double",
        }
    }

    pub fn zero(&self) -> Value {
        match self {
            PrimitiveKind::Boolean => Value::Bool(false),
            PrimitiveKind::Char => Value::Char('\0'),
            PrimitiveKind::Byte => Value::Byte(0),
            PrimitiveKind::Short => Value::Short(0),
            PrimitiveKind::Int => Value::Int(0),
            PrimitiveKind::Long => Value::Long(0),
            PrimitiveKind::Float => Value::Float(0.0),
            PrimitiveKind::Double => Value::Double(0.0),
        }
    }

    fn numeric(&self) -> Option<Numeric> {
        match self {
            PrimitiveKind::Byte => Some(Numeric::Byte),
            PrimitiveKind::Short => Some(Numeric::Short),
            PrimitiveKind::Int => Some(Numeric::Int),
            PrimitiveKind::Long => Some(Numeric::Long),
            PrimitiveKind::Float => Some(Numeric::Float),
            PrimitiveKind::Double => Some(Numeric::Double),
            PrimitiveKind::Boolean | PrimitiveKind::Char => None,
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (PrimitiveKind::Boolean, Value::Bool(_))
                | (PrimitiveKind::Char, Value::Char(_))
                | (PrimitiveKind::Byte, Value::Byte(_))
                | (PrimitiveKind::Short, Value::Short(_))
                | (PrimitiveKind::Int, Value::Int(_))
                | (PrimitiveKind::Long, Value::Long(_))
                | (PrimitiveKind::Float, Value::Float(_))
                | (PrimitiveKind::Double, Value::Double(_))
        )
    }

    fn parse(&self, text: &str) -> Result<Value, String> {
        let name = self.primitive_name();
        match self {
            PrimitiveKind::Boolean => parse_bool(text).map(Value::Bool),
            PrimitiveKind::Char => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Value::Char(c)),
                    _ => Err(format!("'{}' is not a single character", text)),
                }
            }
            PrimitiveKind::Byte => text.parse::<i8>().map(Value::Byte).map_err(|e| invalid(text, name, e)),
            PrimitiveKind::Short => text.parse::<i16>().map(Value::Short).map_err(|e| invalid(text, name, e)),
            PrimitiveKind::Int => text.parse::<i32>().map(Value::Int).map_err(|e| invalid(text, name, e)),
            PrimitiveKind::Long => text.parse::<i64>().map(Value::Long).map_err(|e| invalid(text, name, e)),
            PrimitiveKind::Float => text.parse::<f32>().map(Value::Float).map_err(|e| invalid(text, name, e)),
            PrimitiveKind::Double => text.parse::<f64>().map(Value::Double).map_err(|e| invalid(text, name, e)),
        }
    }
}

fn invalid(text: &str, type_name: &str, cause: impl fmt::Display) -> String {
    format!("'{}' is not a valid {}: {}", text, type_name, cause)
}

/// Position of a numeric kind in the lattice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Numeric {
    Byte,
    Short,
    Int,
    Long,
    BigInteger,
    Float,
    Double,
    BigDecimal,
}

impl Numeric {
    fn of(value: &Value) -> Option<Numeric> {
        match value {
            Value::Byte(_) => Some(Numeric::Byte),
            Value::Short(_) => Some(Numeric::Short),
            Value::Int(_) => Some(Numeric::Int),
            Value::Long(_) => Some(Numeric::Long),
            Value::BigInteger(_) => Some(Numeric::BigInteger),
            Value::Float(_) => Some(Numeric::Float),
            Value::Double(_) => Some(Numeric::Double),
            Value::BigDecimal(_) => Some(Numeric::BigDecimal),
            _ => None,
        }
    }

    fn integral_rank(&self) -> Option<u8> {
        match self {
            Numeric::Byte => Some(1),
            Numeric::Short => Some(2),
            Numeric::Int => Some(3),
            Numeric::Long => Some(4),
            Numeric::BigInteger => Some(5),
            _ => None,
        }
    }

    fn decimal_rank(&self) -> Option<u8> {
        match self {
            Numeric::Byte | Numeric::Short | Numeric::Int | Numeric::Long => Some(0),
            Numeric::Float => Some(1),
            Numeric::Double => Some(2),
            Numeric::BigDecimal => Some(3),
            Numeric::BigInteger => None,
        }
    }

    /// Whether `self -> target` follows the lattice arrows.
    fn widens_to(&self, target: Numeric) -> bool {
        if let (Some(a), Some(b)) = (self.integral_rank(), target.integral_rank()) {
            return a <= b;
        }
        if *self == Numeric::BigInteger {
            return target == Numeric::BigDecimal;
        }
        match (self.decimal_rank(), target.decimal_rank()) {
            (Some(a), Some(b)) => a <= b && b > 0,
            _ => false,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Numeric::Byte => "byte",
            Numeric::Short => "short",
            Numeric::Int => "int",
            Numeric::Long => "long",
            Numeric::BigInteger => "BigInteger",
            Numeric::Float => "float",
            Numeric::Double => "double",
            Numeric::BigDecimal => "BigDecimal",
        }
    }
}

/// Integral value of a number if it has no fractional part.
fn exact_integral(value: &Value) -> Option<BigInt> {
    match value {
        Value::Float(_) | Value::Double(_) => {
            let f = value.as_f64()?;
            if f.is_finite() && f.fract() == 0.0 {
                BigInt::from_f64(f)
            } else {
                None
            }
        }
        Value::BigDecimal(d) => {
            if d.fract().is_zero() {
                BigInt::from_str(&d.trunc().to_string()).ok()
            } else {
                None
            }
        }
        other => other.as_big_int(),
    }
}

fn convert_numeric(value: &Value, target: Numeric) -> Result<Value, String> {
    let source = Numeric::of(value).ok_or_else(|| format!("{} is not numeric", value.type_name()))?;
    if source == target {
        return Ok(value.clone());
    }
    let widening = source.widens_to(target);
    let converted = match target {
        Numeric::Byte => exact_integral(value)
            .and_then(|v| v.to_i8())
            .map(Value::Byte),
        Numeric::Short => exact_integral(value)
            .and_then(|v| v.to_i16())
            .map(Value::Short),
        Numeric::Int => exact_integral(value)
            .and_then(|v| v.to_i32())
            .map(Value::Int),
        Numeric::Long => exact_integral(value)
            .and_then(|v| v.to_i64())
            .map(Value::Long),
        Numeric::BigInteger => exact_integral(value).map(Value::BigInteger),
        Numeric::Float => {
            let f = value.as_f64();
            if widening {
                f.map(|f| Value::Float(f as f32))
            } else {
                f.filter(|f| lossless_float(value, *f, true))
                    .map(|f| Value::Float(f as f32))
            }
        }
        Numeric::Double => {
            let f = value.as_f64();
            if widening {
                f.map(Value::Double)
            } else {
                f.filter(|f| lossless_float(value, *f, false))
                    .map(Value::Double)
            }
        }
        Numeric::BigDecimal => value.as_decimal().map(Value::BigDecimal),
    };
    converted.ok_or_else(|| {
        format!(
            "{} value {} cannot be converted to {} without loss",
            source.name(),
            value,
            target.name()
        )
    })
}

/// Whether a narrowing conversion of `value` to the float `f` round-trips.
fn lossless_float(value: &Value, f: f64, single: bool) -> bool {
    if single && f.is_finite() && f64::from(f as f32) != f {
        return false;
    }
    match value {
        Value::Double(d) => d.is_nan() || f == *d,
        Value::BigDecimal(d) => float_to_decimal(f) == Some(*d),
        Value::BigInteger(b) => BigInt::from_f64(f).as_ref() == Some(b),
        _ => true,
    }
}

fn parse_number(text: &str) -> Result<Value, String> {
    let t = text.trim();
    if let Ok(v) = t.parse::<i64>() {
        return Ok(Value::Long(v));
    }
    if let Ok(v) = BigInt::from_str(t) {
        return Ok(Value::BigInteger(v));
    }
    t.parse::<f64>()
        .map(Value::Double)
        .map_err(|_| format!("'{}' is not a number", text))
}

/// Semantic type tag declared by a property
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Accepts anything (`java.lang.Object`, the default)
    Any,
    /// Any numeric value (`java.lang.Number`)
    Number,
    Primitive(PrimitiveKind),
    Boxed(PrimitiveKind),
    BigInteger,
    BigDecimal,
    String,
    Date,
    Array(Box<ValueType>),
    /// Nested record
    Record,
    /// Nested record list
    List,
}

impl ValueType {
    /// Resolve a declared type name. Accepts Java-style fully-qualified
    /// names, their simple names, and `T[]` array suffixes.
    pub fn from_name(name: &str) -> Option<ValueType> {
        let name = name.trim();
        if let Some(element) = name.strip_suffix("[]") {
            return ValueType::from_name(element).map(|t| ValueType::Array(Box::new(t)));
        }
        let ty = match name {
            "" | "java.lang.Object" | "Object" | "any" => ValueType::Any,
            "java.lang.Number" | "Number" => ValueType::Number,
            "boolean" | "bool" => ValueType::Primitive(PrimitiveKind::Boolean),
            "char" => ValueType::Primitive(PrimitiveKind::Char),
            "byte" | "i8" => ValueType::Primitive(PrimitiveKind::Byte),
            "short" | "i16" => ValueType::Primitive(PrimitiveKind::Short),
            "int" | "i32" => ValueType::Primitive(PrimitiveKind::Int),
            "long" | "i64" => ValueType::Primitive(PrimitiveKind::Long),
            "float" | "f32" => ValueType::Primitive(PrimitiveKind::Float),
            "double" | "f64" => ValueType::Primitive(PrimitiveKind::Double),
            "java.lang.Boolean" | "Boolean" => ValueType::Boxed(PrimitiveKind::Boolean),
            "java.lang.Character" | "Character" => ValueType::Boxed(PrimitiveKind::Char),
            "java.lang.Byte" | "Byte" => ValueType::Boxed(PrimitiveKind::Byte),
            "java.lang.Short" | "Short" => ValueType::Boxed(PrimitiveKind::Short),
            "java.lang.Integer" | "Integer" => ValueType::Boxed(PrimitiveKind::Int),
            "java.lang.Long" | "Long" => ValueType::Boxed(PrimitiveKind::Long),
            "java.lang.Float" | "Float" => ValueType::Boxed(PrimitiveKind::Float),
            "java.lang.Double" | "Double" => ValueType::Boxed(PrimitiveKind::Double),
            "java.math.BigInteger" | "BigInteger" => ValueType::BigInteger,
            "java.math.BigDecimal" | "BigDecimal" | "decimal" => ValueType::BigDecimal,
            "java.lang.String" | "String" | "string" | "str" => ValueType::String,
            "java.util.Date" | "Date" | "java.time.LocalDateTime" | "datetime" => ValueType::Date,
            "record" | "Record" => ValueType::Record,
            "list" | "RecordList" => ValueType::List,
            _ => return None,
        };
        Some(ty)
    }

    /// Canonical type name
    pub fn name(&self) -> String {
        match self {
            ValueType::Any => "java.lang.Object".to_string(),
            ValueType::Number => "java.lang.Number".to_string(),
            ValueType::Primitive(k) => k.primitive_name().to_string(),
            ValueType::Boxed(k) => k.boxed_name().to_string(),
            ValueType::BigInteger => "java.math.BigInteger".to_string(),
            ValueType::BigDecimal => "java.math.BigDecimal".to_string(),
            ValueType::String => "java.lang.String".to_string(),
            ValueType::Date => "java.util.Date".to_string(),
            ValueType::Array(inner) => format!("{}[]", inner.name()),
            ValueType::Record => "record".to_string(),
            ValueType::List => "list".to_string(),
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, ValueType::Primitive(_))
    }

    fn numeric(&self) -> Option<Numeric> {
        match self {
            ValueType::Primitive(k) | ValueType::Boxed(k) => k.numeric(),
            ValueType::BigInteger => Some(Numeric::BigInteger),
            ValueType::BigDecimal => Some(Numeric::BigDecimal),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric().is_some() || *self == ValueType::Number
    }

    /// Zero value of primitive types, null otherwise.
    pub fn zero_value(&self) -> Value {
        match self {
            ValueType::Primitive(k) => k.zero(),
            _ => Value::Null,
        }
    }

    /// Whether the runtime type of `value` already satisfies this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ValueType::Any, _) => true,
            (ValueType::Number, v) => v.is_numeric(),
            (ValueType::Primitive(k) | ValueType::Boxed(k), v) => k.accepts(v),
            (ValueType::BigInteger, Value::BigInteger(_)) => true,
            (ValueType::BigDecimal, Value::BigDecimal(_)) => true,
            (ValueType::String, Value::String(_)) => true,
            (ValueType::Date, Value::Date(_)) => true,
            (ValueType::Array(inner), Value::Array(items)) => items.iter().all(|v| inner.accepts(v)),
            (ValueType::Record, Value::Record(_)) => true,
            (ValueType::List, Value::List(_)) => true,
            _ => false,
        }
    }

    /// Whether a column of type `other` may be re-declared as `self`
    /// (`self` is a supertype of, or equal to, `other`).
    pub fn is_assignable_from(&self, other: &ValueType) -> bool {
        match (self, other) {
            (ValueType::Any, _) => true,
            (ValueType::Number, t) => t.is_numeric(),
            (ValueType::Primitive(a) | ValueType::Boxed(a), ValueType::Primitive(b) | ValueType::Boxed(b)) => a == b,
            (ValueType::Array(a), ValueType::Array(b)) => a.is_assignable_from(b),
            (a, b) => a == b,
        }
    }

    /// Assignment coercion used by `set`: accept, widen or losslessly
    /// narrow numbers, parse strings (and arrays of strings) through the
    /// textual codec, reject everything else.
    pub fn coerce(&self, value: Value) -> Result<Value, String> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        if let Some(target) = self.numeric() {
            if value.is_numeric() {
                return convert_numeric(&value, target);
            }
        }
        if let ValueType::Array(inner) = self {
            if let Value::Array(items) = value {
                return items
                    .into_iter()
                    .map(|item| inner.coerce(item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array);
            }
        }
        if self.accepts(&value) {
            return Ok(value);
        }
        if let Value::String(text) = &value {
            if *self != ValueType::Record && *self != ValueType::List {
                return self.parse_text(text);
            }
        }
        Err(format!(
            "{} value '{}' is not assignable to {}",
            value.type_name(),
            value,
            self.name()
        ))
    }

    /// Textual codec: parse external text into a value of this type.
    /// Empty text yields the zero value of primitive types and null for
    /// everything else except strings.
    pub fn parse_text(&self, text: &str) -> Result<Value, String> {
        let trimmed = text.trim();
        match self {
            ValueType::Any => Ok(Value::String(text.to_string())),
            ValueType::String => Ok(Value::String(text.to_string())),
            _ if trimmed.is_empty() => Ok(match self {
                ValueType::Array(_) => Value::Array(Vec::new()),
                other => other.zero_value(),
            }),
            ValueType::Number => parse_number(trimmed),
            ValueType::Primitive(k) | ValueType::Boxed(k) => {
                if *k == PrimitiveKind::Char {
                    k.parse(text)
                } else {
                    k.parse(trimmed)
                }
            }
            ValueType::BigInteger => BigInt::from_str(trimmed)
                .map(Value::BigInteger)
                .map_err(|e| format!("'{}' is not a valid BigInteger: {}", text, e)),
            ValueType::BigDecimal => Decimal::from_str(trimmed)
                .or_else(|_| Decimal::from_scientific(trimmed))
                .map(Value::BigDecimal)
                .map_err(|e| format!("'{}' is not a valid BigDecimal: {}", text, e)),
            ValueType::Date => parse_date(trimmed).map(Value::Date),
            ValueType::Array(inner) => trimmed
                .split(',')
                .map(|part| inner.parse_text(part))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            ValueType::Record | ValueType::List => {
                Err(format!("{} has no textual representation", self.name()))
            }
        }
    }

    /// Textual codec: render a value of this type as external text
    /// (arrays render element-wise).
    pub fn format_text(&self, value: &Value) -> Value {
        match (self, value) {
            (_, Value::Null) => Value::Null,
            (ValueType::Array(inner), Value::Array(items)) => {
                Value::Array(items.iter().map(|v| inner.format_text(v)).collect())
            }
            (_, Value::String(_)) => value.clone(),
            (_, other) => Value::String(other.to_string()),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One step of a [`ValuePath`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

/// Compiled navigation path over nested values.
///
/// Two spellings are accepted: slash form `/order/lines[2]/sku` (bracket
/// indices are 1-based) and dotted form `order.lines.1.sku` (bare numeric
/// segments are 0-based).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValuePath {
    source: String,
    segments: Vec<PathSegment>,
}

impl ValuePath {
    pub fn compile(text: &str) -> Result<ValuePath, String> {
        let source = text.trim();
        if source.is_empty() {
            return Err("empty path".to_string());
        }
        let mut segments = Vec::new();
        if let Some(rest) = source.strip_prefix('/') {
            for step in rest.split('/') {
                let (name, index) = match step.find('[') {
                    Some(open) => {
                        let close = step
                            .strip_suffix(']')
                            .ok_or_else(|| format!("unclosed '[' in path step '{}'", step))?;
                        let position: usize = close[open + 1..]
                            .trim()
                            .parse()
                            .map_err(|_| format!("invalid index in path step '{}'", step))?;
                        if position == 0 {
                            return Err(format!("path indices start at 1 in '{}'", step));
                        }
                        (&step[..open], Some(position - 1))
                    }
                    None => (step, None),
                };
                if !name.is_empty() {
                    segments.push(PathSegment::Field(name.to_string()));
                }
                if let Some(i) = index {
                    segments.push(PathSegment::Index(i));
                }
            }
        } else {
            for step in source.split('.') {
                if step.is_empty() {
                    return Err(format!("empty step in path '{}'", source));
                }
                match step.parse::<usize>() {
                    Ok(i) => segments.push(PathSegment::Index(i)),
                    Err(_) => segments.push(PathSegment::Field(step.to_string())),
                }
            }
        }
        if segments.is_empty() {
            return Err(format!("path '{}' selects nothing", source));
        }
        Ok(ValuePath {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Walk the path; `None` when any step is missing.
    pub fn select(&self, value: &Value) -> Option<Value> {
        let mut current = value.clone();
        for segment in &self.segments {
            current = match segment {
                PathSegment::Field(name) => current.member(name)?,
                PathSegment::Index(i) => current.element(*i)?,
            };
        }
        Some(current)
    }
}
