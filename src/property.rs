//! Property schemas
//!
//! One [`PropertySchema`] per column. It owns the column's type coercion,
//! its parse and format codec chains, and its constraint. The variant tag
//! of the schema line selects the flavour:
//!
//! | tag | variant | behaviour |
//! |---|---|---|
//! | (none), `default`, `prop` | [`PropertyVariant::Default`] | coercion, codecs, `expr{..}` or validator constraint |
//! | `validator`, `valid` | [`PropertyVariant::ValidatorOnly`] | constraint must name a validator |
//! | `interp`, `el` | [`PropertyVariant::Interpreted`] | constraint compiled by a registered interpreter |
//! | `calc`, `computed`, `projection` | [`PropertyVariant::Computed`] | read-only, value computed from the constraint field |
//! | `list`, `nested`, `record` | [`PropertyVariant::NestedList`] | value is a nested list named by the type field |
//! | `xpath` | [`PropertyVariant::XPath`] | default behaviour plus a value path in the 7th field |
//!
//! Property schemas are immutable and interned by canonical line.

use crate::codec::CodecChain;
use crate::dsl::{self, ConstraintSpec, PropertyDescriptor, BUILTIN_TARGET};
use crate::error::{Result, TabulaError};
use crate::expression::{Dataset, ProjectionScope, ValueScope};
use crate::record::Record;
use crate::registry::{self, Capability, CompiledExpression, ComponentRegistry, Validator};
use crate::types::{Value, ValuePath, ValueType};
use dashmap::DashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};
use tracing::debug;

pub type PropertyRef = Arc<PropertySchema>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyVariant {
    Default,
    ValidatorOnly,
    Interpreted,
    Computed,
    NestedList,
    XPath,
}

impl PropertyVariant {
    pub fn from_tag(tag: Option<&str>) -> Option<PropertyVariant> {
        let variant = match tag.map(|t| t.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("default") | Some("prop") => PropertyVariant::Default,
            Some("validator") | Some("valid") => PropertyVariant::ValidatorOnly,
            Some("interp") | Some("el") => PropertyVariant::Interpreted,
            Some("calc") | Some("computed") | Some("projection") => PropertyVariant::Computed,
            Some("list") | Some("nested") | Some("record") => PropertyVariant::NestedList,
            Some("xpath") => PropertyVariant::XPath,
            Some(_) => return None,
        };
        Some(variant)
    }

    /// Canonical tag; the default variant has none.
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            PropertyVariant::Default => None,
            PropertyVariant::ValidatorOnly => Some("validator"),
            PropertyVariant::Interpreted => Some("interp"),
            PropertyVariant::Computed => Some("calc"),
            PropertyVariant::NestedList => Some("list"),
            PropertyVariant::XPath => Some("xpath"),
        }
    }
}

#[derive(Debug, Clone)]
enum Constraint {
    Expression(Arc<dyn CompiledExpression>),
    Validator(Arc<dyn Validator>),
}

pub struct PropertySchema {
    name: String,
    variant: PropertyVariant,
    value_type: ValueType,
    type_declared: bool,
    parse_codec: Option<CodecChain>,
    format_codec: Option<CodecChain>,
    constraint: Option<Constraint>,
    computed: Option<Arc<dyn CompiledExpression>>,
    nested_list: Option<String>,
    path: Option<ValuePath>,
    primary_key: bool,
    line: String,
}

static PROPERTY_CACHE: OnceLock<DashMap<String, PropertyRef>> = OnceLock::new();

fn cache() -> &'static DashMap<String, PropertyRef> {
    PROPERTY_CACHE.get_or_init(DashMap::new)
}

impl PropertySchema {
    /// Parse one schema line, returning the interned instance.
    pub fn parse_line(line: &str) -> Result<PropertyRef> {
        if let Some(hit) = cache().get(line) {
            return Ok(Arc::clone(hit.value()));
        }

        let mut descriptor = dsl::parse_line(line).map_err(|cause| TabulaError::schema(line, cause))?;
        let variant = PropertyVariant::from_tag(descriptor.variant.as_deref()).ok_or_else(|| {
            TabulaError::schema(
                line,
                format!("unknown property variant '{}'", descriptor.variant.as_deref().unwrap_or("")),
            )
        })?;
        descriptor.variant = variant.tag().map(str::to_string);
        if let Some(name) = descriptor.fields.first_mut() {
            *name = name.trim().to_string();
        }
        let canonical = descriptor.to_line();

        if let Some(hit) = cache().get(&canonical) {
            let property = Arc::clone(hit.value());
            drop(hit);
            cache().insert(line.to_string(), Arc::clone(&property));
            return Ok(property);
        }

        debug!(line = %canonical, "building property schema");
        let built = Arc::new(Self::build(&descriptor, variant, canonical.clone(), registry::global())?);
        let property = Arc::clone(cache().entry(canonical).or_insert(built).value());
        cache().insert(line.to_string(), Arc::clone(&property));
        Ok(property)
    }

    fn build(
        descriptor: &PropertyDescriptor,
        variant: PropertyVariant,
        line: String,
        registry: &dyn ComponentRegistry,
    ) -> Result<PropertySchema> {
        let fail = |cause: String| TabulaError::schema(line.as_str(), cause);

        let (value_type, type_declared, nested_list) = match variant {
            PropertyVariant::NestedList => {
                let list_name = descriptor
                    .type_name()
                    .ok_or_else(|| fail("nested-list property needs the nested list name in the type field".to_string()))?;
                (ValueType::List, true, Some(list_name.to_string()))
            }
            _ => match descriptor.type_name() {
                None => (ValueType::Any, false, None),
                Some(name) => {
                    let ty = ValueType::from_name(name).ok_or_else(|| fail(format!("unknown type '{}'", name)))?;
                    (ty, true, None)
                }
            },
        };

        let chain = |spec: Option<&str>| -> Result<Option<CodecChain>> {
            spec.map(|spec| CodecChain::parse(spec, registry).map_err(|e| fail(e.to_string())))
                .transpose()
        };
        let parse_codec = chain(descriptor.parse_codec())?;
        let format_codec = chain(descriptor.format_codec())?;

        let primary_key = descriptor.primary_key().map_err(fail)?;

        let mut constraint = None;
        let mut computed = None;
        if let Some(spec) = descriptor.constraint() {
            match variant {
                PropertyVariant::Computed => {
                    computed = Some(compile_projection(spec, registry).map_err(fail)?);
                }
                _ => constraint = Some(compile_constraint(variant, spec, registry).map_err(fail)?),
            }
        }

        match variant {
            PropertyVariant::ValidatorOnly if constraint.is_none() => {
                return Err(fail("validator property needs a validator name in the constraint field".to_string()));
            }
            PropertyVariant::Computed => {
                if computed.is_none() {
                    return Err(fail("computed property needs an expression in the constraint field".to_string()));
                }
                if parse_codec.is_some() {
                    return Err(fail("computed property is read-only and takes no parse codec".to_string()));
                }
                if primary_key {
                    return Err(fail("computed property cannot be part of the primary key".to_string()));
                }
            }
            _ => {}
        }

        let path = match (variant, descriptor.extra()) {
            (PropertyVariant::XPath, Some(path)) => Some(ValuePath::compile(path).map_err(fail)?),
            (PropertyVariant::XPath, None) => {
                return Err(fail("xpath property needs a path in the seventh field".to_string()));
            }
            (_, Some(extra)) => return Err(fail(format!("unexpected trailing field '{}'", extra))),
            (_, None) => None,
        };

        Ok(PropertySchema {
            name: descriptor.name().to_string(),
            variant,
            value_type,
            type_declared,
            parse_codec,
            format_codec,
            constraint,
            computed,
            nested_list,
            path,
            primary_key,
            line,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variant(&self) -> PropertyVariant {
        self.variant
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    /// Computed columns reject `set` and `parse`.
    pub fn is_read_only(&self) -> bool {
        self.variant == PropertyVariant::Computed
    }

    pub fn has_constraint(&self) -> bool {
        self.constraint.is_some()
    }

    pub fn nested_list(&self) -> Option<&str> {
        self.nested_list.as_deref()
    }

    pub fn path(&self) -> Option<&ValuePath> {
        self.path.as_ref()
    }

    /// Canonical schema line
    pub fn to_line(&self) -> &str {
        &self.line
    }

    /// Coerce a value for storage.
    pub fn set(&self, value: Value) -> Result<Value> {
        if self.is_read_only() {
            return Err(TabulaError::set(&self.name, "computed property is read-only"));
        }
        if let Some(expected) = &self.nested_list {
            return match value {
                Value::Null => Ok(Value::Null),
                Value::List(list) if list.name() == expected => Ok(Value::List(list)),
                Value::List(list) => Err(TabulaError::set(
                    &self.name,
                    format!("expected nested list '{}', got list '{}'", expected, list.name()),
                )),
                other => Err(TabulaError::set(
                    &self.name,
                    format!("expected nested list '{}', got {}", expected, other.type_name()),
                )),
            };
        }
        self.value_type
            .coerce(value)
            .map_err(|cause| TabulaError::set(&self.name, cause))
    }

    /// Whether `set` would accept the value.
    pub fn check_type(&self, value: &Value) -> bool {
        if self.value_type.accepts(value) && self.nested_list.is_none() && !self.is_read_only() {
            return true;
        }
        self.set(value.clone()).is_ok()
    }

    /// Value of a computed column for `record`.
    pub fn compute(&self, record: &Record, dataset: Option<&dyn Dataset>) -> Result<Value> {
        let program = match &self.computed {
            Some(program) => program,
            None => return Err(TabulaError::get(&self.name, "property is not computed")),
        };
        let scope = ProjectionScope::new(dataset, record);
        let value = program
            .evaluate(&scope)
            .map_err(|cause| TabulaError::get(&self.name, cause))?;
        self.value_type
            .coerce(value)
            .map_err(|cause| TabulaError::get(&self.name, cause))
    }

    /// External representation: format codec if present, else the textual
    /// codec of the declared type, else the value unchanged.
    pub fn format(&self, value: &Value) -> Result<Value> {
        match &self.format_codec {
            Some(chain) => chain
                .apply(value.clone())
                .map_err(|cause| TabulaError::get(&self.name, cause)),
            None if !self.type_declared || self.nested_list.is_some() => Ok(value.clone()),
            None => Ok(self.value_type.format_text(value)),
        }
    }

    /// Parse an external representation: parse codec if present, then the
    /// textual codec of the declared type when still needed.
    pub fn parse(&self, external: Value) -> Result<Value> {
        if self.is_read_only() {
            return Err(TabulaError::set(&self.name, "computed property is read-only"));
        }
        let value = match &self.parse_codec {
            Some(chain) => chain
                .apply(external)
                .map_err(|cause| TabulaError::set(&self.name, cause))?,
            None => external,
        };
        self.set(value)
    }

    /// Run the constraint. `Ok(false)` is a failed validation, `Err` means
    /// the constraint itself failed or produced a non-boolean.
    pub fn validate(&self, value: &Value) -> Result<bool> {
        match &self.constraint {
            None => Ok(true),
            Some(Constraint::Expression(program)) => {
                match program.evaluate(&ValueScope::new(value)) {
                    Ok(Value::Bool(b)) => Ok(b),
                    Ok(other) => Err(TabulaError::validate(
                        &self.name,
                        format!(
                            "constraint `{}` returned {} {}, expected a boolean",
                            program.source(),
                            other.type_name(),
                            other
                        ),
                    )),
                    Err(cause) => Err(TabulaError::validate(&self.name, cause)),
                }
            }
            Some(Constraint::Validator(validator)) => validator
                .validate(value)
                .map_err(|cause| TabulaError::validate(&self.name, format!("{}: {}", validator.name(), cause))),
        }
    }

    /// Select this column's value out of a nested source value.
    pub fn extract(&self, source: &Value) -> Option<Value> {
        self.path.as_ref().and_then(|path| path.select(source))
    }
}

fn compile_constraint(
    variant: PropertyVariant,
    spec: &str,
    registry: &dyn ComponentRegistry,
) -> std::result::Result<Constraint, String> {
    match dsl::parse_constraint_spec(spec)? {
        ConstraintSpec::Named(name) => {
            if variant == PropertyVariant::Interpreted {
                return Err(format!("interpreted property needs target{{expression}}, got '{}'", name));
            }
            match registry.resolve(&name).map_err(|e| e.to_string())? {
                Capability::Validator(validator) => Ok(Constraint::Validator(validator)),
                other => Err(format!("'{}' resolved to a {}, expected a validator", name, other.kind())),
            }
        }
        ConstraintSpec::Expression { target, source } => {
            match variant {
                PropertyVariant::ValidatorOnly => {
                    return Err("validator property takes a validator name, not an expression".to_string());
                }
                PropertyVariant::Interpreted => {}
                _ if target != BUILTIN_TARGET => {
                    return Err(format!(
                        "interpreter '{}' requires the interp: variant",
                        target
                    ));
                }
                _ => {}
            }
            let program = compile_with(&target, &source, registry)?;
            if program.yields_boolean() == Some(false) {
                return Err(format!("constraint `{}` can never produce a boolean", source));
            }
            Ok(Constraint::Expression(program))
        }
    }
}

/// Computed columns accept `target{expression}` or a bare built-in expression.
fn compile_projection(
    spec: &str,
    registry: &dyn ComponentRegistry,
) -> std::result::Result<Arc<dyn CompiledExpression>, String> {
    match dsl::parse_constraint_spec(spec) {
        Ok(ConstraintSpec::Expression { target, source }) => compile_with(&target, &source, registry),
        _ => compile_with(BUILTIN_TARGET, spec, registry),
    }
}

fn compile_with(
    target: &str,
    source: &str,
    registry: &dyn ComponentRegistry,
) -> std::result::Result<Arc<dyn CompiledExpression>, String> {
    match registry.resolve(target).map_err(|e| e.to_string())? {
        Capability::Interpreter(interpreter) => interpreter.compile(source),
        other => Err(format!("'{}' resolved to a {}, expected an interpreter", target, other.kind())),
    }
}

impl fmt::Debug for PropertySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertySchema")
            .field("line", &self.line)
            .field("variant", &self.variant)
            .field("type", &self.value_type)
            .finish()
    }
}

impl fmt::Display for PropertySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

impl PartialEq for PropertySchema {
    fn eq(&self, other: &Self) -> bool {
        self.line == other.line
    }
}

impl Eq for PropertySchema {}

impl Hash for PropertySchema {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.line.hash(state);
    }
}
