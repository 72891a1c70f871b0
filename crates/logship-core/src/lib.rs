//! # logship-core
//!
//! Core types, traits, and abstractions for the logship record pipeline.
//!
//! This crate defines the record model and everything that works on a
//! record without I/O: field introspection, description templates and
//! record construction. Sinks and dispatch live in the other crates.

pub mod defaults;
pub mod error;
pub mod factory;
pub mod introspect;
pub mod logging;
pub mod naming;
pub mod presets;
pub mod record;
pub mod template;
pub mod traits;
pub mod value;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use factory::{new_record_id, ExtensionValues, RecordFactory};
pub use introspect::{describe, FieldIntrospector, RecordDescriptor};
pub use presets::{DefaultLog, OperationLog, UserAccessLog};
pub use record::{
    CoreFields, FieldSpec, LogRecord, RecordKind, RecordRegistry, RecordType, Severity,
    CORE_FIELD_NAMES,
};
pub use template::{resolve, try_resolve, Bindings};
pub use traits::{LogSink, SinkSwitch};
pub use value::{FieldKind, FieldValue, LongText, StorageType};

/// Decimal type used for `decimal` extension fields.
pub use sqlx::types::BigDecimal;
