//! Expression evaluation
//!
//! Evaluates parsed [`Expression`] trees against a [`Scope`]. The same
//! engine backs property constraints (`@value@` bound to the value under
//! validation), predicate scans (every property bound by name) and
//! computed columns (`dataset.*` and `record.*` bound).
//!
//! Null semantics: `null = null` is true, ordering comparisons involving
//! null are false, arithmetic involving null yields null. `AND`, `OR` and
//! `NOT` require boolean operands.

use crate::expr_ast::{Expression, Function, Literal};
use crate::expr_parser::Parser;
use crate::list::RecordList;
use crate::record::Record;
use crate::registry::{CompiledExpression, DefaultRegistry, ExpressionInterpreter};
use crate::types::Value;
use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// Name under which the built-in interpreter is registered.
pub const BUILTIN_INTERPRETER: &str = "expr";

/// Variable bindings visible to an expression
pub trait Scope {
    /// Value bound to `@value@`, if any.
    fn placeholder(&self) -> Option<Value> {
        None
    }

    /// Resolve a dotted variable path; `None` when the root is unbound.
    fn resolve(&self, path: &[String]) -> Option<Value>;
}

/// Higher-level context a computed column can read from.
pub trait Dataset: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl Dataset for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl Dataset for RecordList {
    fn lookup(&self, name: &str) -> Option<Value> {
        Value::List(self.clone()).member(name)
    }
}

fn navigate(root: Value, rest: &[String]) -> Value {
    rest.iter()
        .try_fold(root, |value, segment| value.member(segment))
        .unwrap_or(Value::Null)
}

/// Binds only `@value@` (and the bare name `value`).
pub struct ValueScope<'a> {
    value: &'a Value,
}

impl<'a> ValueScope<'a> {
    pub fn new(value: &'a Value) -> Self {
        ValueScope { value }
    }
}

impl Scope for ValueScope<'_> {
    fn placeholder(&self) -> Option<Value> {
        Some(self.value.clone())
    }

    fn resolve(&self, path: &[String]) -> Option<Value> {
        match path.split_first() {
            Some((root, rest)) if root == "value" => Some(navigate(self.value.clone(), rest)),
            _ => None,
        }
    }
}

/// Binds every property of a record by name, then the caller's extra
/// variables. `record` names the row itself.
pub struct RecordScope<'a> {
    record: &'a Record,
    extra: Option<&'a HashMap<String, Value>>,
}

impl<'a> RecordScope<'a> {
    pub fn new(record: &'a Record) -> Self {
        RecordScope { record, extra: None }
    }

    pub fn with_variables(record: &'a Record, extra: &'a HashMap<String, Value>) -> Self {
        RecordScope {
            record,
            extra: Some(extra),
        }
    }
}

impl Scope for RecordScope<'_> {
    fn resolve(&self, path: &[String]) -> Option<Value> {
        let (root, rest) = path.split_first()?;
        if self.record.has_property(root) {
            let value = self.record.get_property(root.as_str()).ok()?;
            return Some(navigate(value, rest));
        }
        if let Some(value) = self.extra.and_then(|vars| vars.get(root)) {
            return Some(navigate(value.clone(), rest));
        }
        if root == "record" {
            return Some(navigate(Value::Record(self.record.clone()), rest));
        }
        None
    }
}

/// Scope of a computed column: `dataset.<name>`, `record.<name>` or a
/// bare property name of the current record.
pub struct ProjectionScope<'a> {
    dataset: Option<&'a dyn Dataset>,
    record: &'a Record,
}

impl<'a> ProjectionScope<'a> {
    pub fn new(dataset: Option<&'a dyn Dataset>, record: &'a Record) -> Self {
        ProjectionScope { dataset, record }
    }
}

impl Scope for ProjectionScope<'_> {
    fn resolve(&self, path: &[String]) -> Option<Value> {
        let (root, rest) = path.split_first()?;
        match root.as_str() {
            "dataset" => {
                let dataset = self.dataset?;
                let (name, rest) = rest.split_first()?;
                Some(navigate(dataset.lookup(name).unwrap_or(Value::Null), rest))
            }
            "record" if !self.record.has_property(root) => {
                Some(navigate(Value::Record(self.record.clone()), rest))
            }
            _ => RecordScope::new(self.record).resolve(path),
        }
    }
}

/// Compiled built-in expression
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    source: String,
    ast: Expression,
}

impl Program {
    pub fn compile(source: &str) -> Result<Program, String> {
        let ast = Parser::parse(source)?;
        Ok(Program {
            source: source.trim().to_string(),
            ast,
        })
    }

    pub fn ast(&self) -> &Expression {
        &self.ast
    }

    pub fn evaluate(&self, scope: &dyn Scope) -> Result<Value, String> {
        evaluate(&self.ast, scope)
    }

    /// Evaluate and require a boolean result.
    pub fn evaluate_bool(&self, scope: &dyn Scope) -> Result<bool, String> {
        match self.evaluate(scope)? {
            Value::Bool(b) => Ok(b),
            other => Err(format!(
                "expected a boolean result, got {} {}",
                other.type_name(),
                other
            )),
        }
    }
}

impl CompiledExpression for Program {
    fn source(&self) -> &str {
        &self.source
    }

    fn evaluate(&self, scope: &dyn Scope) -> Result<Value, String> {
        Program::evaluate(self, scope)
    }

    fn yields_boolean(&self) -> Option<bool> {
        self.ast.yields_boolean()
    }
}

/// The built-in `expr` interpreter
#[derive(Debug, Default)]
pub struct BuiltinInterpreter;

impl ExpressionInterpreter for BuiltinInterpreter {
    fn name(&self) -> &str {
        BUILTIN_INTERPRETER
    }

    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledExpression>, String> {
        Ok(Arc::new(Program::compile(source)?))
    }
}

pub(crate) fn register_builtins(registry: &DefaultRegistry) {
    registry.register_interpreter(Arc::new(BuiltinInterpreter));
}

/// Evaluate an expression tree
pub fn evaluate(expr: &Expression, scope: &dyn Scope) -> Result<Value, String> {
    match expr {
        Expression::And(l, r) => {
            if !expect_bool(evaluate(l, scope)?, "AND")? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(expect_bool(evaluate(r, scope)?, "AND")?))
        }
        Expression::Or(l, r) => {
            if expect_bool(evaluate(l, scope)?, "OR")? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(expect_bool(evaluate(r, scope)?, "OR")?))
        }
        Expression::Not(e) => Ok(Value::Bool(!expect_bool(evaluate(e, scope)?, "NOT")?)),

        Expression::Equal(l, r) => {
            let (a, b) = (evaluate(l, scope)?, evaluate(r, scope)?);
            Ok(Value::Bool(values_equal(&a, &b)))
        }
        Expression::NotEqual(l, r) => {
            let (a, b) = (evaluate(l, scope)?, evaluate(r, scope)?);
            Ok(Value::Bool(!values_equal(&a, &b)))
        }
        Expression::LessThan(l, r) => compare(l, r, scope, |o| o == Ordering::Less),
        Expression::LessThanEq(l, r) => compare(l, r, scope, |o| o != Ordering::Greater),
        Expression::GreaterThan(l, r) => compare(l, r, scope, |o| o == Ordering::Greater),
        Expression::GreaterThanEq(l, r) => compare(l, r, scope, |o| o != Ordering::Less),

        Expression::Add(l, r) => arithmetic(Arith::Add, evaluate(l, scope)?, evaluate(r, scope)?),
        Expression::Subtract(l, r) => arithmetic(Arith::Sub, evaluate(l, scope)?, evaluate(r, scope)?),
        Expression::Multiply(l, r) => arithmetic(Arith::Mul, evaluate(l, scope)?, evaluate(r, scope)?),
        Expression::Divide(l, r) => arithmetic(Arith::Div, evaluate(l, scope)?, evaluate(r, scope)?),
        Expression::Modulo(l, r) => arithmetic(Arith::Rem, evaluate(l, scope)?, evaluate(r, scope)?),
        Expression::Negate(e) => negate(evaluate(e, scope)?),

        Expression::Index(base, index) => {
            let base = evaluate(base, scope)?;
            let index = evaluate(index, scope)?;
            Ok(match (&base, &index) {
                (Value::Null, _) | (_, Value::Null) => Value::Null,
                (_, Value::String(name)) => base.member(name).unwrap_or(Value::Null),
                (_, i) => {
                    let i = i
                        .as_i64()
                        .ok_or_else(|| format!("index must be an integer, got {}", i.type_name()))?;
                    usize::try_from(i)
                        .ok()
                        .and_then(|i| base.element(i))
                        .unwrap_or(Value::Null)
                }
            })
        }

        Expression::Variable(path) => scope
            .resolve(path)
            .ok_or_else(|| format!("unknown variable '{}'", path.join("."))),
        Expression::Placeholder(path) => {
            let value = scope
                .placeholder()
                .ok_or_else(|| "no value is bound to @value@ in this context".to_string())?;
            Ok(navigate(value, path))
        }
        Expression::Call(function, args) => {
            let args = args
                .iter()
                .map(|a| evaluate(a, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call(*function, args)
        }
        Expression::Literal(lit) => Ok(literal(lit)),
    }
}

fn literal(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Integer(n) => Value::Long(*n),
        Literal::Float(f) => Value::Double(*f),
        Literal::String(s) => Value::String(s.clone()),
    }
}

fn expect_bool(value: Value, operator: &str) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(format!(
            "{} expects boolean operands, got {} {}",
            operator,
            other.type_name(),
            other
        )),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => a.loose_eq(b),
    }
}

fn compare(
    l: &Expression,
    r: &Expression,
    scope: &dyn Scope,
    test: impl Fn(Ordering) -> bool,
) -> Result<Value, String> {
    let (a, b) = (evaluate(l, scope)?, evaluate(r, scope)?);
    if a.is_null() || b.is_null() {
        return Ok(Value::Bool(false));
    }
    let ordering = a
        .natural_cmp(&b)
        .ok_or_else(|| format!("cannot compare {} with {}", a.type_name(), b.type_name()))?;
    Ok(Value::Bool(test(ordering)))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl Arith {
    fn symbol(&self) -> &'static str {
        match self {
            Arith::Add => "+",
            Arith::Sub => "-",
            Arith::Mul => "*",
            Arith::Div => "/",
            Arith::Rem => "%",
        }
    }
}

fn arithmetic(op: Arith, l: Value, r: Value) -> Result<Value, String> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    if op == Arith::Add && (is_text(&l) || is_text(&r)) {
        return Ok(Value::String(format!("{}{}", l, r)));
    }
    if !l.is_numeric() || !r.is_numeric() {
        return Err(format!(
            "cannot apply '{}' to {} and {}",
            op.symbol(),
            l.type_name(),
            r.type_name()
        ));
    }

    if l.is_integral() && r.is_integral() {
        if let (Some(a), Some(b)) = (l.as_i64(), r.as_i64()) {
            if matches!(op, Arith::Div | Arith::Rem) && b == 0 {
                return Err("division by zero".to_string());
            }
            let exact = match op {
                Arith::Add => a.checked_add(b),
                Arith::Sub => a.checked_sub(b),
                Arith::Mul => a.checked_mul(b),
                Arith::Div => a.checked_div(b),
                Arith::Rem => a.checked_rem(b),
            };
            if let Some(n) = exact {
                return Ok(Value::Long(n));
            }
        }
        if let (Some(a), Some(b)) = (l.as_big_int(), r.as_big_int()) {
            return big_arithmetic(op, a, b).map(Value::BigInteger);
        }
    }

    if matches!(l, Value::BigDecimal(_)) || matches!(r, Value::BigDecimal(_)) {
        if let (Some(a), Some(b)) = (l.as_decimal(), r.as_decimal()) {
            if matches!(op, Arith::Div | Arith::Rem) && b.is_zero() {
                return Err("division by zero".to_string());
            }
            let result = match op {
                Arith::Add => a.checked_add(b),
                Arith::Sub => a.checked_sub(b),
                Arith::Mul => a.checked_mul(b),
                Arith::Div => a.checked_div(b),
                Arith::Rem => a.checked_rem(b),
            };
            return result
                .map(Value::BigDecimal)
                .ok_or_else(|| format!("decimal overflow in {} {} {}", a, op.symbol(), b));
        }
    }

    let (a, b) = match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(format!("cannot apply '{}' to {} and {}", op.symbol(), l, r)),
    };
    if matches!(op, Arith::Div | Arith::Rem) && b == 0.0 {
        return Err("division by zero".to_string());
    }
    Ok(Value::Double(match op {
        Arith::Add => a + b,
        Arith::Sub => a - b,
        Arith::Mul => a * b,
        Arith::Div => a / b,
        Arith::Rem => a % b,
    }))
}

fn big_arithmetic(op: Arith, a: BigInt, b: BigInt) -> Result<BigInt, String> {
    if matches!(op, Arith::Div | Arith::Rem) && b.is_zero() {
        return Err("division by zero".to_string());
    }
    Ok(match op {
        Arith::Add => a + b,
        Arith::Sub => a - b,
        Arith::Mul => a * b,
        Arith::Div => a / b,
        Arith::Rem => a % b,
    })
}

fn is_text(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Char(_))
}

fn negate(value: Value) -> Result<Value, String> {
    Ok(match value {
        Value::Null => Value::Null,
        Value::BigInteger(n) => Value::BigInteger(-n),
        Value::BigDecimal(d) => Value::BigDecimal(-d),
        Value::Float(f) => Value::Float(-f),
        Value::Double(f) => Value::Double(-f),
        other if other.is_integral() => match other.as_i64().and_then(i64::checked_neg) {
            Some(n) => Value::Long(n),
            None => Value::BigInteger(-other.as_big_int().unwrap_or_default()),
        },
        other => return Err(format!("cannot negate {} {}", other.type_name(), other)),
    })
}

fn call(function: Function, args: Vec<Value>) -> Result<Value, String> {
    let mut args = args.into_iter();
    let first = args.next().unwrap_or(Value::Null);
    match function {
        Function::Len => match &first {
            Value::Null => Ok(Value::Long(0)),
            Value::String(_) | Value::Array(_) | Value::List(_) => {
                Ok(first.member("length").unwrap_or(Value::Long(0)))
            }
            other => Err(format!("len() is not defined for {}", other.type_name())),
        },
        Function::Lower => Ok(map_string(first, |s| s.to_lowercase())),
        Function::Upper => Ok(map_string(first, |s| s.to_uppercase())),
        Function::Trim => Ok(map_string(first, |s| s.trim().to_string())),
        Function::Contains => {
            let needle = args.next().unwrap_or(Value::Null);
            Ok(Value::Bool(match &first {
                Value::Null => false,
                Value::Array(items) => items.iter().any(|item| values_equal(item, &needle)),
                Value::List(list) => match &needle {
                    Value::Record(record) => list.contains(record).map_err(|e| e.to_string())?,
                    _ => false,
                },
                haystack => !needle.is_null() && haystack.to_string().contains(&needle.to_string()),
            }))
        }
        Function::StartsWith | Function::EndsWith => {
            let affix = args.next().unwrap_or(Value::Null);
            if first.is_null() || affix.is_null() {
                return Ok(Value::Bool(false));
            }
            let (text, affix) = (first.to_string(), affix.to_string());
            Ok(Value::Bool(if function == Function::StartsWith {
                text.starts_with(&affix)
            } else {
                text.ends_with(&affix)
            }))
        }
        Function::IsNull => Ok(Value::Bool(first.is_null())),
        Function::Abs => match first {
            Value::Null => Ok(Value::Null),
            Value::BigInteger(n) => Ok(Value::BigInteger(n.abs())),
            Value::BigDecimal(d) => Ok(Value::BigDecimal(d.abs())),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            Value::Double(f) => Ok(Value::Double(f.abs())),
            other if other.is_integral() => match other.as_i64() {
                Some(n) if n < 0 => negate(Value::Long(n)),
                Some(n) => Ok(Value::Long(n)),
                None => Err(format!("abs() overflow for {}", other)),
            },
            other => Err(format!("abs() is not defined for {}", other.type_name())),
        },
        Function::Coalesce => Ok(std::iter::once(first)
            .chain(args)
            .find(|v| !v.is_null())
            .unwrap_or(Value::Null)),
    }
}

fn map_string(value: Value, f: impl Fn(&str) -> String) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(f(&s)),
        other => Value::String(f(&other.to_string())),
    }
}
