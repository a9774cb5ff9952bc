//! Tabula - schema-driven in-memory record lists
//!
//! Tabular data model built from a line-oriented schema DSL: typed property
//! schemas, interned record schemas, records, and indexed record lists with
//! predicate scans, stable multi-key sorts and change-set reconciliation.
//!
//! # Architecture
//!
//! - DSL Layer: property-line tokenizer, codec and constraint grammars
//! - Type Layer: runtime values, declared types and the numeric lattice
//! - Component Layer: converters, validators and expression interpreters
//!   resolved by name through a registry
//! - Schema Layer: property schemas and interned record schemas
//! - Data Layer: records and record lists with primary/secondary indexes
//! - Wire Layer: bincode transfer format for records and lists

pub mod error;
pub mod types;
pub mod dsl;

// Expression engine
pub mod expr_lexer;
pub mod expr_ast;
pub mod expr_parser;
pub mod expression;

// Component registry and codecs
pub mod registry;
pub mod codec;

// Schema modules
pub mod property;
pub mod schema;

// Data modules
pub mod record;
pub mod index;
pub mod sort;
pub mod changeset;
pub mod list;

// Transfer and setup
pub mod wire;
pub mod config;
pub mod logging;

pub use error::{Result, TabulaError};
pub use types::{Value, ValueType, ValuePath, PrimitiveKind};

// Schema exports
pub use property::{PropertySchema, PropertyRef, PropertyVariant};
pub use schema::{RecordSchema, SchemaRef};

// Component exports
pub use registry::{
    Capability, CompiledExpression, ComponentRegistry, Converter, DefaultRegistry, ExpressionInterpreter, Service,
    Validator,
};
pub use codec::CodecChain;
pub use expression::{Dataset, Program, Scope};

// Data exports
pub use record::{PropertyKey, Record};
pub use index::{IndexKey, IndexStats, KeyPart};
pub use sort::{SortKey, SortSpec};
pub use changeset::{Change, ChangeSet, UpdateKind};
pub use list::{ListIter, RecordList, SyncMode};

// Transfer and setup exports
pub use wire::{decode_list, decode_record, encode_list, encode_record, SchemaEncoding};
pub use config::{IndexConfig, ListConfig};
pub use logging::init_logging;
