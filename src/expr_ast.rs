//! Expression Abstract Syntax Tree (AST)
//!
//! Parsed form of constraint, predicate and computed-column expressions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    // Boolean operations
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),

    // Comparisons
    Equal(Box<Expression>, Box<Expression>),
    NotEqual(Box<Expression>, Box<Expression>),
    LessThan(Box<Expression>, Box<Expression>),
    LessThanEq(Box<Expression>, Box<Expression>),
    GreaterThan(Box<Expression>, Box<Expression>),
    GreaterThanEq(Box<Expression>, Box<Expression>),

    // Arithmetic
    Add(Box<Expression>, Box<Expression>),
    Subtract(Box<Expression>, Box<Expression>),
    Multiply(Box<Expression>, Box<Expression>),
    Divide(Box<Expression>, Box<Expression>),
    Modulo(Box<Expression>, Box<Expression>),
    Negate(Box<Expression>),

    /// `expr[index]`
    Index(Box<Expression>, Box<Expression>),

    // Values
    /// Dotted variable path: `age`, `record.owner.name`
    Variable(Vec<String>),
    /// `@value@` (empty path) or `@value.a.b@`
    Placeholder(Vec<String>),
    Call(Function, Vec<Expression>),
    Literal(Literal),
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

/// Built-in functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Function {
    Len,        // len(x): characters, elements or rows
    Lower,      // lower(s)
    Upper,      // upper(s)
    Trim,       // trim(s)
    Contains,   // contains(haystack, needle)
    StartsWith, // startsWith(s, prefix)
    EndsWith,   // endsWith(s, suffix)
    IsNull,     // isNull(x)
    Abs,        // abs(n)
    Coalesce,   // coalesce(a, b, ...)
}

impl Function {
    pub fn from_name(name: &str) -> Option<Function> {
        let function = match name.to_ascii_lowercase().as_str() {
            "len" | "length" => Function::Len,
            "lower" => Function::Lower,
            "upper" => Function::Upper,
            "trim" => Function::Trim,
            "contains" => Function::Contains,
            "startswith" => Function::StartsWith,
            "endswith" => Function::EndsWith,
            "isnull" => Function::IsNull,
            "abs" => Function::Abs,
            "coalesce" => Function::Coalesce,
            _ => return None,
        };
        Some(function)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Len => "len",
            Function::Lower => "lower",
            Function::Upper => "upper",
            Function::Trim => "trim",
            Function::Contains => "contains",
            Function::StartsWith => "startsWith",
            Function::EndsWith => "endsWith",
            Function::IsNull => "isNull",
            Function::Abs => "abs",
            Function::Coalesce => "coalesce",
        }
    }

    /// Accepted argument count as `(min, max)`; `None` max is variadic.
    pub fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Function::Len | Function::Lower | Function::Upper | Function::Trim => (1, Some(1)),
            Function::IsNull | Function::Abs => (1, Some(1)),
            Function::Contains | Function::StartsWith | Function::EndsWith => (2, Some(2)),
            Function::Coalesce => (1, None),
        }
    }

    fn yields_boolean(&self) -> Option<bool> {
        match self {
            Function::Contains | Function::StartsWith | Function::EndsWith | Function::IsNull => {
                Some(true)
            }
            Function::Coalesce => None,
            _ => Some(false),
        }
    }
}

impl Expression {
    /// Helper to create a variable reference from a dotted path
    pub fn variable(path: &str) -> Self {
        Expression::Variable(path.split('.').map(|s| s.to_string()).collect())
    }

    /// Helper to create string literal
    pub fn string(s: &str) -> Self {
        Expression::Literal(Literal::String(s.to_string()))
    }

    /// Helper to create integer literal
    pub fn integer(n: i64) -> Self {
        Expression::Literal(Literal::Integer(n))
    }

    /// Helper to create boolean literal
    pub fn bool(b: bool) -> Self {
        Expression::Literal(Literal::Bool(b))
    }

    /// Static result shape: `Some(true)` always boolean, `Some(false)`
    /// never boolean, `None` when it depends on bound values.
    pub fn yields_boolean(&self) -> Option<bool> {
        match self {
            Expression::And(..)
            | Expression::Or(..)
            | Expression::Not(_)
            | Expression::Equal(..)
            | Expression::NotEqual(..)
            | Expression::LessThan(..)
            | Expression::LessThanEq(..)
            | Expression::GreaterThan(..)
            | Expression::GreaterThanEq(..) => Some(true),
            Expression::Add(..)
            | Expression::Subtract(..)
            | Expression::Multiply(..)
            | Expression::Divide(..)
            | Expression::Modulo(..)
            | Expression::Negate(_) => Some(false),
            Expression::Literal(Literal::Bool(_)) => Some(true),
            Expression::Literal(_) => Some(false),
            Expression::Call(function, _) => function.yields_boolean(),
            Expression::Index(..) | Expression::Variable(_) | Expression::Placeholder(_) => None,
        }
    }

    /// Whether any `@value@` placeholder occurs in the tree.
    pub fn uses_placeholder(&self) -> bool {
        match self {
            Expression::Placeholder(_) => true,
            Expression::Variable(_) | Expression::Literal(_) => false,
            Expression::Not(e) | Expression::Negate(e) => e.uses_placeholder(),
            Expression::Call(_, args) => args.iter().any(|a| a.uses_placeholder()),
            Expression::And(l, r)
            | Expression::Or(l, r)
            | Expression::Equal(l, r)
            | Expression::NotEqual(l, r)
            | Expression::LessThan(l, r)
            | Expression::LessThanEq(l, r)
            | Expression::GreaterThan(l, r)
            | Expression::GreaterThanEq(l, r)
            | Expression::Add(l, r)
            | Expression::Subtract(l, r)
            | Expression::Multiply(l, r)
            | Expression::Divide(l, r)
            | Expression::Modulo(l, r)
            | Expression::Index(l, r) => l.uses_placeholder() || r.uses_placeholder(),
        }
    }
}
