//! Component Registry
//!
//! Converters, validators and expression interpreters referenced by name
//! from schema text are resolved here. Plain names resolve to registered
//! factories or instances; `$name` resolves to a shared service instance.
//! Dotted names such as `DateFormats.ISO_DATE` may also resolve to
//! registered constants, which codec properties use as values.
//!
//! The process-wide registry returned by [`global`] comes preloaded with the
//! built-in converters, validators and the `expr` interpreter. Schemas are
//! always resolved against it; custom components are registered on it before
//! the schemas that reference them are parsed.

use crate::error::{Result, TabulaError};
use crate::expression::Scope;
use crate::types::Value;
use dashmap::DashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Value transformer used by codec chains.
pub trait Converter: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn convert(&self, value: Value) -> std::result::Result<Value, String>;

    /// Set a constructor-style property written as `name{property=value}`.
    fn configure(&mut self, property: &str, _value: Value) -> std::result::Result<(), String> {
        Err(format!("converter '{}' has no property '{}'", self.name(), property))
    }
}

/// External validator. `Ok(false)` is a normal failed validation, `Err`
/// means the validator itself could not run.
pub trait Validator: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn validate(&self, value: &Value) -> std::result::Result<bool, String>;
}

/// Pluggable expression language.
pub trait ExpressionInterpreter: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn compile(&self, source: &str) -> std::result::Result<Arc<dyn CompiledExpression>, String>;
}

pub trait CompiledExpression: Send + Sync + fmt::Debug {
    fn source(&self) -> &str;

    fn evaluate(&self, scope: &dyn Scope) -> std::result::Result<Value, String>;

    /// Static result shape if known: `Some(false)` marks an expression
    /// that can never produce a boolean.
    fn yields_boolean(&self) -> Option<bool> {
        None
    }
}

/// Shared instance registered under a `$name` service reference
#[derive(Debug, Clone)]
pub enum Service {
    Converter(Arc<dyn Converter>),
    Validator(Arc<dyn Validator>),
    Interpreter(Arc<dyn ExpressionInterpreter>),
}

/// What a name resolved to
#[derive(Debug)]
pub enum Capability {
    /// Fresh instance, configurable before first use
    Converter(Box<dyn Converter>),
    /// Shared instance from a service reference
    SharedConverter(Arc<dyn Converter>),
    Validator(Arc<dyn Validator>),
    Interpreter(Arc<dyn ExpressionInterpreter>),
    Constant(Value),
}

impl Capability {
    pub fn kind(&self) -> &'static str {
        match self {
            Capability::Converter(_) | Capability::SharedConverter(_) => "converter",
            Capability::Validator(_) => "validator",
            Capability::Interpreter(_) => "interpreter",
            Capability::Constant(_) => "constant",
        }
    }
}

impl From<Service> for Capability {
    fn from(service: Service) -> Self {
        match service {
            Service::Converter(c) => Capability::SharedConverter(c),
            Service::Validator(v) => Capability::Validator(v),
            Service::Interpreter(i) => Capability::Interpreter(i),
        }
    }
}

pub trait ComponentRegistry: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Capability>;
}

type ConverterFactory = Arc<dyn Fn() -> Box<dyn Converter> + Send + Sync>;

/// Registry of named factories, instances, services and constants
#[derive(Default)]
pub struct DefaultRegistry {
    converters: DashMap<String, ConverterFactory>,
    validators: DashMap<String, Arc<dyn Validator>>,
    interpreters: DashMap<String, Arc<dyn ExpressionInterpreter>>,
    services: DashMap<String, Service>,
    constants: DashMap<String, Value>,
}

impl DefaultRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in components.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        crate::codec::register_builtins(&registry);
        crate::expression::register_builtins(&registry);
        registry.register_validator(Arc::new(NotNull));
        registry.register_validator(Arc::new(NotEmpty));
        registry
    }

    pub fn register_converter<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Converter> + Send + Sync + 'static,
    {
        debug!(component = name, kind = "converter", "registering component");
        self.converters.insert(name.to_string(), Arc::new(factory));
    }

    pub fn register_validator(&self, validator: Arc<dyn Validator>) {
        debug!(component = validator.name(), kind = "validator", "registering component");
        self.validators.insert(validator.name().to_string(), validator);
    }

    pub fn register_interpreter(&self, interpreter: Arc<dyn ExpressionInterpreter>) {
        debug!(component = interpreter.name(), kind = "interpreter", "registering component");
        self.interpreters
            .insert(interpreter.name().to_string(), interpreter);
    }

    /// Register a shared instance reachable as `$name`.
    pub fn register_service(&self, name: &str, service: Service) {
        let name = name.strip_prefix('$').unwrap_or(name);
        debug!(component = name, kind = "service", "registering component");
        self.services.insert(name.to_string(), service);
    }

    pub fn register_constant(&self, name: &str, value: Value) {
        self.constants.insert(name.to_string(), value);
    }

    pub fn constant(&self, name: &str) -> Option<Value> {
        self.constants.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        match name.strip_prefix('$') {
            Some(service) => self.services.contains_key(service),
            None => {
                self.converters.contains_key(name)
                    || self.validators.contains_key(name)
                    || self.interpreters.contains_key(name)
                    || self.constants.contains_key(name)
            }
        }
    }
}

impl ComponentRegistry for DefaultRegistry {
    fn resolve(&self, name: &str) -> Result<Capability> {
        if let Some(service) = name.strip_prefix('$') {
            return self
                .services
                .get(service)
                .map(|entry| Capability::from(entry.value().clone()))
                .ok_or_else(|| TabulaError::resolution(name, "no service registered under this name"));
        }
        if let Some(factory) = self.converters.get(name) {
            return Ok(Capability::Converter((factory.value())()));
        }
        if let Some(validator) = self.validators.get(name) {
            return Ok(Capability::Validator(Arc::clone(validator.value())));
        }
        if let Some(interpreter) = self.interpreters.get(name) {
            return Ok(Capability::Interpreter(Arc::clone(interpreter.value())));
        }
        if let Some(constant) = self.constants.get(name) {
            return Ok(Capability::Constant(constant.value().clone()));
        }
        Err(TabulaError::resolution(name, "unknown component"))
    }
}

static GLOBAL: OnceLock<DefaultRegistry> = OnceLock::new();

/// Process-wide registry used by schema parsing.
pub fn global() -> &'static DefaultRegistry {
    GLOBAL.get_or_init(DefaultRegistry::with_builtins)
}

/// Rejects null.
#[derive(Debug)]
struct NotNull;

impl Validator for NotNull {
    fn name(&self) -> &str {
        "notNull"
    }

    fn validate(&self, value: &Value) -> std::result::Result<bool, String> {
        Ok(!value.is_null())
    }
}

/// Rejects null, blank strings and empty arrays or lists.
#[derive(Debug)]
struct NotEmpty;

impl Validator for NotEmpty {
    fn name(&self) -> &str {
        "notEmpty"
    }

    fn validate(&self, value: &Value) -> std::result::Result<bool, String> {
        Ok(match value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::List(list) => !list.is_empty(),
            _ => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Even;

    impl Validator for Even {
        fn name(&self) -> &str {
            "even"
        }

        fn validate(&self, value: &Value) -> std::result::Result<bool, String> {
            value.coerce_i64().map(|n| n % 2 == 0)
        }
    }

    #[test]
    fn test_builtins_resolve() {
        let registry = DefaultRegistry::with_builtins();
        assert_eq!(registry.resolve("trim").unwrap().kind(), "converter");
        assert_eq!(registry.resolve("notNull").unwrap().kind(), "validator");
        assert_eq!(registry.resolve("expr").unwrap().kind(), "interpreter");
        assert_eq!(
            registry.resolve("DateFormats.ISO_DATE").unwrap().kind(),
            "constant"
        );
    }

    #[test]
    fn test_unknown_component() {
        let registry = DefaultRegistry::new();
        let err = registry.resolve("nosuch").unwrap_err();
        assert_eq!(err.kind(), "component_resolution");
        assert!(registry.resolve("$nosuch").is_err());
    }

    #[test]
    fn test_service_reference_is_shared() {
        let registry = DefaultRegistry::new();
        let even: Arc<dyn Validator> = Arc::new(Even);
        registry.register_service("$even", Service::Validator(Arc::clone(&even)));

        match registry.resolve("$even").unwrap() {
            Capability::Validator(v) => {
                assert!(Arc::ptr_eq(&v, &even));
                assert!(v.validate(&Value::Int(4)).unwrap());
                assert!(!v.validate(&Value::Int(3)).unwrap());
            }
            other => panic!("expected validator, got {:?}", other.kind()),
        }
        assert!(registry.contains("$even"));
        assert!(!registry.contains("even"));
    }

    #[test]
    fn test_not_empty() {
        let v = NotEmpty;
        assert!(!v.validate(&Value::Null).unwrap());
        assert!(!v.validate(&Value::from("  ")).unwrap());
        assert!(v.validate(&Value::from("x")).unwrap());
        assert!(!v.validate(&Value::Array(vec![])).unwrap());
    }
}
