//! Codec chains and built-in converters
//!
//! A codec spec such as `trim+date{pattern=DateFormats.ISO_DATE}` resolves
//! every stage through the component registry once, at schema definition
//! time. Applying the chain feeds the value through each stage in order.

use crate::dsl::{self, CodecStage};
use crate::error::{Result, TabulaError};
use crate::registry::{Capability, ComponentRegistry, Converter, DefaultRegistry};
use crate::types::Value;
use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt::{self, Write};
use std::sync::Arc;

pub const ISO_DATE: &str = "%Y-%m-%d";
pub const ISO_DATE_TIME: &str = "%Y-%m-%dT%H:%M:%S";

/// Resolved, ready-to-apply converter chain
#[derive(Debug, Clone)]
pub struct CodecChain {
    spec: String,
    stages: Vec<Arc<dyn Converter>>,
}

impl CodecChain {
    pub fn parse(spec: &str, registry: &dyn ComponentRegistry) -> Result<CodecChain> {
        let parsed = dsl::parse_codec_spec(spec).map_err(|cause| TabulaError::resolution(spec, cause))?;
        let stages = parsed
            .iter()
            .map(|stage| resolve_stage(stage, registry))
            .collect::<Result<Vec<_>>>()?;
        Ok(CodecChain {
            spec: spec.to_string(),
            stages,
        })
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn apply(&self, value: Value) -> std::result::Result<Value, String> {
        self.stages
            .iter()
            .try_fold(value, |value, stage| {
                stage
                    .convert(value)
                    .map_err(|cause| format!("{}: {}", stage.name(), cause))
            })
    }
}

impl fmt::Display for CodecChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec)
    }
}

fn resolve_stage(stage: &CodecStage, registry: &dyn ComponentRegistry) -> Result<Arc<dyn Converter>> {
    match registry.resolve(&stage.name)? {
        Capability::Converter(mut converter) => {
            for (property, raw) in &stage.properties {
                let value = property_value(raw, registry);
                converter
                    .configure(property, value)
                    .map_err(|cause| TabulaError::resolution(&stage.name, cause))?;
            }
            Ok(Arc::from(converter))
        }
        Capability::SharedConverter(converter) if stage.properties.is_empty() => Ok(converter),
        Capability::SharedConverter(_) => Err(TabulaError::resolution(
            &stage.name,
            "shared service instances cannot be configured",
        )),
        other => Err(TabulaError::resolution(
            &stage.name,
            format!("resolved to a {}, expected a converter", other.kind()),
        )),
    }
}

/// Dotted names that resolve to registered constants are substituted;
/// everything else is passed as text.
fn property_value(raw: &str, registry: &dyn ComponentRegistry) -> Value {
    if raw.contains('.') && dsl::is_component_name(raw) {
        if let Ok(Capability::Constant(value)) = registry.resolve(raw) {
            return value;
        }
    }
    Value::String(raw.to_string())
}

fn text_property(converter: &str, property: &str, value: Value) -> std::result::Result<String, String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Null => Err(format!("{}.{} cannot be null", converter, property)),
        other => Ok(other.to_string()),
    }
}

/// Apply a string transformation to strings and string arrays.
fn map_text(value: Value, f: impl Fn(&str) -> String + Copy) -> Value {
    match value {
        Value::String(s) => Value::String(f(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| map_text(v, f)).collect()),
        other => other,
    }
}

#[derive(Debug, Default)]
struct Trim;

impl Converter for Trim {
    fn name(&self) -> &str {
        "trim"
    }

    fn convert(&self, value: Value) -> std::result::Result<Value, String> {
        Ok(map_text(value, |s| s.trim().to_string()))
    }
}

#[derive(Debug, Default)]
struct Upper;

impl Converter for Upper {
    fn name(&self) -> &str {
        "upper"
    }

    fn convert(&self, value: Value) -> std::result::Result<Value, String> {
        Ok(map_text(value, str::to_uppercase))
    }
}

#[derive(Debug, Default)]
struct Lower;

impl Converter for Lower {
    fn name(&self) -> &str {
        "lower"
    }

    fn convert(&self, value: Value) -> std::result::Result<Value, String> {
        Ok(map_text(value, str::to_lowercase))
    }
}

/// Text to date with `pattern`, date to text on the way out.
#[derive(Debug)]
struct DateCodec {
    pattern: String,
}

impl Default for DateCodec {
    fn default() -> Self {
        DateCodec {
            pattern: ISO_DATE_TIME.to_string(),
        }
    }
}

impl Converter for DateCodec {
    fn name(&self) -> &str {
        "date"
    }

    fn convert(&self, value: Value) -> std::result::Result<Value, String> {
        match value {
            Value::String(s) if s.trim().is_empty() => Ok(Value::Null),
            Value::String(s) => parse_with_pattern(s.trim(), &self.pattern).map(Value::Date),
            Value::Date(d) => {
                let mut out = String::new();
                write!(out, "{}", d.format(&self.pattern))
                    .map_err(|_| format!("cannot format {} with date pattern '{}'", d, self.pattern))?;
                Ok(Value::String(out))
            }
            other => Ok(other),
        }
    }

    fn configure(&mut self, property: &str, value: Value) -> std::result::Result<(), String> {
        match property {
            "pattern" | "format" => {
                let pattern = strftime_pattern(&text_property("date", property, value)?);
                if StrftimeItems::new(&pattern).any(|item| matches!(item, Item::Error)) {
                    return Err(format!("invalid date pattern '{}'", pattern));
                }
                self.pattern = pattern;
                Ok(())
            }
            _ => Err(format!("converter 'date' has no property '{}'", property)),
        }
    }
}

fn parse_with_pattern(text: &str, pattern: &str) -> std::result::Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(text, pattern)
        .or_else(|_| {
            NaiveDate::parse_from_str(text, pattern)
                .map(|date| date.and_time(chrono::NaiveTime::MIN))
        })
        .map_err(|e| format!("'{}' does not match date pattern '{}': {}", text, pattern, e))
}

/// Accept `yyyy-MM-dd HH:mm:ss` style patterns alongside strftime ones.
fn strftime_pattern(pattern: &str) -> String {
    if pattern.contains('%') {
        return pattern.to_string();
    }
    const TOKENS: &[(&str, &str)] = &[
        ("yyyy", "%Y"),
        ("yy", "%y"),
        ("MM", "%m"),
        ("dd", "%d"),
        ("HH", "%H"),
        ("mm", "%M"),
        ("ss", "%S"),
        ("SSS", "%3f"),
    ];
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut rest = pattern;
    'outer: while !rest.is_empty() {
        for (token, replacement) in TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(replacement);
                rest = tail;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

/// Replaces null and empty text with a fixed value.
#[derive(Debug)]
struct DefaultValue {
    value: Value,
}

impl Default for DefaultValue {
    fn default() -> Self {
        DefaultValue { value: Value::Null }
    }
}

impl Converter for DefaultValue {
    fn name(&self) -> &str {
        "default"
    }

    fn convert(&self, value: Value) -> std::result::Result<Value, String> {
        Ok(match value {
            Value::Null => self.value.clone(),
            Value::String(s) if s.is_empty() => self.value.clone(),
            other => other,
        })
    }

    fn configure(&mut self, property: &str, value: Value) -> std::result::Result<(), String> {
        match property {
            "value" => {
                self.value = value;
                Ok(())
            }
            _ => Err(format!("converter 'default' has no property '{}'", property)),
        }
    }
}

#[derive(Debug)]
struct Split {
    separator: String,
}

impl Default for Split {
    fn default() -> Self {
        Split {
            separator: ",".to_string(),
        }
    }
}

impl Converter for Split {
    fn name(&self) -> &str {
        "split"
    }

    fn convert(&self, value: Value) -> std::result::Result<Value, String> {
        Ok(match value {
            Value::String(s) if s.is_empty() => Value::Array(Vec::new()),
            Value::String(s) => Value::Array(
                s.split(self.separator.as_str())
                    .map(|part| Value::String(part.to_string()))
                    .collect(),
            ),
            other => other,
        })
    }

    fn configure(&mut self, property: &str, value: Value) -> std::result::Result<(), String> {
        match property {
            "separator" => {
                let separator = text_property("split", property, value)?;
                if separator.is_empty() {
                    return Err("split.separator cannot be empty".to_string());
                }
                self.separator = separator;
                Ok(())
            }
            _ => Err(format!("converter 'split' has no property '{}'", property)),
        }
    }
}

#[derive(Debug)]
struct Join {
    separator: String,
}

impl Default for Join {
    fn default() -> Self {
        Join {
            separator: ",".to_string(),
        }
    }
}

impl Converter for Join {
    fn name(&self) -> &str {
        "join"
    }

    fn convert(&self, value: Value) -> std::result::Result<Value, String> {
        Ok(match value {
            Value::Array(items) => Value::String(
                items
                    .iter()
                    .map(|v| if v.is_null() { String::new() } else { v.to_string() })
                    .collect::<Vec<_>>()
                    .join(&self.separator),
            ),
            other => other,
        })
    }

    fn configure(&mut self, property: &str, value: Value) -> std::result::Result<(), String> {
        match property {
            "separator" => {
                self.separator = text_property("join", property, value)?;
                Ok(())
            }
            _ => Err(format!("converter 'join' has no property '{}'", property)),
        }
    }
}

pub(crate) fn register_builtins(registry: &DefaultRegistry) {
    registry.register_converter("trim", || Box::new(Trim));
    registry.register_converter("upper", || Box::new(Upper));
    registry.register_converter("lower", || Box::new(Lower));
    registry.register_converter("date", || Box::<DateCodec>::default());
    registry.register_converter("default", || Box::<DefaultValue>::default());
    registry.register_converter("split", || Box::<Split>::default());
    registry.register_converter("join", || Box::<Join>::default());
    registry.register_constant("DateFormats.ISO_DATE", Value::from(ISO_DATE));
    registry.register_constant("DateFormats.ISO_DATE_TIME", Value::from(ISO_DATE_TIME));
}
