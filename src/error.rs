//! Error types for Tabula
//!
//! Every fallible public operation returns [`Result<T>`]. Leaf helpers
//! (lexer, parser, converters, textual codecs) report plain `String`
//! causes; the operation that called them wraps the cause into the
//! matching [`TabulaError`] variant together with the offending schema
//! line, property name or expression.

use thiserror::Error;

/// Result type alias for Tabula operations.
pub type Result<T> = std::result::Result<T, TabulaError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TabulaError {
    /// Malformed schema text, duplicate name, unresolvable type/codec/validator
    /// or an incompatible schema replacement.
    #[error("schema definition error in `{line}`: {cause}")]
    SchemaDefinition { line: String, cause: String },

    /// Unknown property, schema not initialized, uncoercible value or a
    /// write to a read-only column.
    #[error("cannot set property '{property}': {cause}")]
    PropertySet { property: String, cause: String },

    #[error("cannot get property '{property}': {cause}")]
    PropertyGet { property: String, cause: String },

    /// A constraint threw or produced a non-boolean. A constraint that
    /// evaluates to `false` is not an error.
    #[error("validation of property '{property}' failed: {cause}")]
    PropertyValidate { property: String, cause: String },

    #[error("duplicate primary key {key} in list '{list}'")]
    DuplicatePrimaryKey { list: String, key: String },

    #[error("query `{expression}` failed: {cause}")]
    Query { expression: String, cause: String },

    #[error("concurrent modification of list '{list}': {detail}")]
    ConcurrentModification { list: String, detail: String },

    #[error("cannot resolve component '{name}': {cause}")]
    ComponentResolution { name: String, cause: String },

    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("cannot reconcile change for key {key}: {cause}")]
    Reconciliation { key: String, cause: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl TabulaError {
    pub fn schema(line: impl Into<String>, cause: impl Into<String>) -> Self {
        TabulaError::SchemaDefinition {
            line: line.into(),
            cause: cause.into(),
        }
    }

    pub fn set(property: impl Into<String>, cause: impl Into<String>) -> Self {
        TabulaError::PropertySet {
            property: property.into(),
            cause: cause.into(),
        }
    }

    pub fn get(property: impl Into<String>, cause: impl Into<String>) -> Self {
        TabulaError::PropertyGet {
            property: property.into(),
            cause: cause.into(),
        }
    }

    pub fn validate(property: impl Into<String>, cause: impl Into<String>) -> Self {
        TabulaError::PropertyValidate {
            property: property.into(),
            cause: cause.into(),
        }
    }

    pub fn query(expression: impl Into<String>, cause: impl Into<String>) -> Self {
        TabulaError::Query {
            expression: expression.into(),
            cause: cause.into(),
        }
    }

    pub fn resolution(name: impl Into<String>, cause: impl Into<String>) -> Self {
        TabulaError::ComponentResolution {
            name: name.into(),
            cause: cause.into(),
        }
    }

    /// Short machine-readable category, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            TabulaError::SchemaDefinition { .. } => "schema_definition",
            TabulaError::PropertySet { .. } => "property_set",
            TabulaError::PropertyGet { .. } => "property_get",
            TabulaError::PropertyValidate { .. } => "property_validate",
            TabulaError::DuplicatePrimaryKey { .. } => "duplicate_primary_key",
            TabulaError::Query { .. } => "query",
            TabulaError::ConcurrentModification { .. } => "concurrent_modification",
            TabulaError::ComponentResolution { .. } => "component_resolution",
            TabulaError::IndexOutOfBounds { .. } => "index_out_of_bounds",
            TabulaError::Reconciliation { .. } => "reconciliation",
            TabulaError::Serialization(_) => "serialization",
            TabulaError::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_context() {
        let err = TabulaError::schema(":A,int,,,,2", "invalid primary-key flag '2'");
        let text = err.to_string();
        assert!(text.contains(":A,int,,,,2"));
        assert!(text.contains("primary-key flag"));
        assert_eq!(err.kind(), "schema_definition");
    }

    #[test]
    fn test_duplicate_key_message() {
        let err = TabulaError::DuplicatePrimaryKey {
            list: "users".to_string(),
            key: "(\"x\")".to_string(),
        };
        assert_eq!(err.to_string(), "duplicate primary key (\"x\") in list 'users'");
    }
}
