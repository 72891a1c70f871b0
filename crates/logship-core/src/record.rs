//! Record model: core fields, record traits and erased record kinds.
//!
//! A record type embeds [`CoreFields`] and declares its own extension
//! fields. The [`record_type!`](crate::record_type) macro generates the
//! descriptor, getters and setters so no runtime reflection is needed.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::introspect::describe;
use crate::value::{FieldKind, FieldValue, StorageType};

/// Names of the fields present on every record.
pub const CORE_FIELD_NAMES: [&str; 4] = ["id", "timestamp", "content", "severity"];

/// Record severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Severity::Trace),
            "DEBUG" => Ok(Severity::Debug),
            "INFO" => Ok(Severity::Info),
            "WARN" | "WARNING" => Ok(Severity::Warn),
            "ERROR" => Ok(Severity::Error),
            other => Err(Error::InvalidInput(format!("unknown severity: {}", other))),
        }
    }
}

crate::enum_field_kind!(Severity);

/// Fields with fixed semantics shared by every record type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoreFields {
    /// Opaque unique id, assigned by the factory.
    pub id: String,
    /// Creation time, assigned by the factory.
    pub timestamp: Option<DateTime<Utc>>,
    /// Free-text description.
    pub content: String,
    /// `None` on a zero value means the factory applies the default level.
    pub severity: Option<Severity>,
}

impl CoreFields {
    /// Value of a core field by name.
    pub fn value(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => Some(FieldValue::Text(self.id.clone())),
            "timestamp" => Some(
                self.timestamp
                    .map(FieldValue::Timestamp)
                    .unwrap_or(FieldValue::Null),
            ),
            "content" => Some(FieldValue::Text(self.content.clone())),
            "severity" => Some(
                self.severity
                    .map(|s| FieldValue::Enum(s.to_string()))
                    .unwrap_or(FieldValue::Null),
            ),
            _ => None,
        }
    }
}

/// Name and inferred storage type of one declared extension field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub storage_type: StorageType,
}

impl FieldSpec {
    /// Declare a field whose storage type is inferred from `T`.
    pub fn of<T: FieldKind>(name: &'static str) -> Self {
        Self {
            name,
            storage_type: T::storage_type(),
        }
    }
}

/// Object-safe view of a record instance.
pub trait LogRecord: Send + Sync + fmt::Debug + 'static {
    /// Erased handle for this record's type.
    fn kind(&self) -> RecordKind;

    fn core(&self) -> &CoreFields;

    fn core_mut(&mut self) -> &mut CoreFields;

    /// Current value of an extension field, `None` if the type has no such field.
    fn field(&self, name: &str) -> Option<FieldValue>;

    /// Assign an extension field. Returns `false` when the name is unknown
    /// or the value cannot be converted to the field's type.
    fn set_field(&mut self, name: &str, value: &FieldValue) -> bool;

    fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    fn id(&self) -> &str {
        &self.core().id
    }

    /// Full-record serialization: core fields then every extension field.
    fn to_json(&self) -> Value {
        let core = self.core();
        let mut map = Map::new();
        map.insert("id".to_string(), Value::String(core.id.clone()));
        map.insert(
            "timestamp".to_string(),
            core.timestamp
                .map(|ts| Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true)))
                .unwrap_or(Value::Null),
        );
        map.insert("content".to_string(), Value::String(core.content.clone()));
        map.insert(
            "severity".to_string(),
            core.severity
                .map(|s| Value::String(s.to_string()))
                .unwrap_or(Value::Null),
        );
        for spec in describe(&self.kind()).extension_fields {
            if let Some(value) = self.field(spec.name) {
                map.insert(spec.name.to_string(), value.to_json());
            }
        }
        Value::Object(map)
    }
}

/// Static description of a concrete record type.
pub trait RecordType: LogRecord + Sized {
    /// Type name used to derive table, topic and index names.
    const TYPE_NAME: &'static str;

    /// Declared extension fields in declaration order.
    fn extension_fields() -> Vec<FieldSpec>;

    /// Fixed table name, overriding the derived one.
    fn table_name() -> Option<&'static str> {
        None
    }

    /// Extra columns worth indexing for this type.
    fn index_fields() -> &'static [&'static str] {
        &[]
    }
}

fn construct_default<R: RecordType + Default>() -> Box<dyn LogRecord> {
    Box::new(R::default())
}

/// Erased, copyable handle to a record type.
///
/// Equality and hashing use the Rust type identity, not the name.
#[derive(Clone, Copy)]
pub struct RecordKind {
    type_id: TypeId,
    name: &'static str,
    table_name: Option<&'static str>,
    index_fields: &'static [&'static str],
    extension_fields: fn() -> Vec<FieldSpec>,
    construct: Option<fn() -> Box<dyn LogRecord>>,
}

impl RecordKind {
    /// Kind for a type that can be instantiated through `Default`.
    pub fn of<R: RecordType + Default>() -> Self {
        Self {
            construct: Some(construct_default::<R>),
            ..Self::descriptor_only::<R>()
        }
    }

    /// Kind for a type without a zero-value constructor. It can be
    /// described and synchronized but not created by the factory.
    pub fn descriptor_only<R: RecordType>() -> Self {
        Self {
            type_id: TypeId::of::<R>(),
            name: R::TYPE_NAME,
            table_name: R::table_name(),
            index_fields: R::index_fields(),
            extension_fields: R::extension_fields,
            construct: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn table_name_override(&self) -> Option<&'static str> {
        self.table_name
    }

    pub fn index_fields(&self) -> &'static [&'static str] {
        self.index_fields
    }

    pub fn extension_fields(&self) -> Vec<FieldSpec> {
        (self.extension_fields)()
    }

    pub fn is_constructible(&self) -> bool {
        self.construct.is_some()
    }

    /// Allocate a zero-value instance.
    pub fn instantiate(&self) -> Result<Box<dyn LogRecord>> {
        match self.construct {
            Some(construct) => Ok(construct()),
            None => Err(Error::Instantiation(format!(
                "record type {} has no zero-value constructor",
                self.name
            ))),
        }
    }
}

impl PartialEq for RecordKind {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for RecordKind {}

impl Hash for RecordKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordKind")
            .field("name", &self.name)
            .field("constructible", &self.construct.is_some())
            .finish()
    }
}

/// Lookup of record kinds by type name.
#[derive(Debug, Clone, Default)]
pub struct RecordRegistry {
    kinds: HashMap<&'static str, RecordKind>,
}

impl RecordRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the preset record types.
    pub fn with_presets() -> Self {
        let mut registry = Self::new();
        registry.register(RecordKind::of::<crate::presets::OperationLog>());
        registry.register(RecordKind::of::<crate::presets::UserAccessLog>());
        registry.register(RecordKind::of::<crate::presets::DefaultLog>());
        registry
    }

    /// Register a kind, replacing any earlier kind with the same name.
    pub fn register(&mut self, kind: RecordKind) -> &mut Self {
        self.kinds.insert(kind.name(), kind);
        self
    }

    pub fn get(&self, name: &str) -> Result<RecordKind> {
        self.kinds
            .get(name)
            .copied()
            .ok_or_else(|| Error::Instantiation(format!("unknown record type: {}", name)))
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.kinds.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Declare a record type.
///
/// The struct gets a leading `pub core: CoreFields` field and
/// implementations of [`LogRecord`] and [`RecordType`]. It must derive
/// `Default` so the factory can instantiate it. An optional
/// `@table "name", @indexes [..],` header fixes the table name and adds
/// index columns.
///
/// ```
/// use logship_core::{record_type, BigDecimal, FieldValue, LogRecord, RecordType};
///
/// record_type! {
///     #[derive(Debug, Clone, Default)]
///     pub struct OrderLog {
///         pub order_id: Option<String>,
///         pub total: Option<BigDecimal>,
///     }
/// }
///
/// let mut order = OrderLog::default();
/// assert!(order.set_field("order_id", &FieldValue::Text("X1".into())));
/// assert_eq!(OrderLog::TYPE_NAME, "OrderLog");
/// assert_eq!(OrderLog::table_name(), None);
/// ```
#[macro_export]
macro_rules! record_type {
    (
        @define [$table:expr] [$indexes:expr]
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $fty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            /// Core fields shared by every record.
            pub core: $crate::CoreFields,
            $(
                $(#[$fmeta])*
                $fvis $field: $fty,
            )*
        }

        impl $crate::LogRecord for $name {
            fn kind(&self) -> $crate::RecordKind {
                $crate::RecordKind::of::<Self>()
            }

            fn core(&self) -> &$crate::CoreFields {
                &self.core
            }

            fn core_mut(&mut self) -> &mut $crate::CoreFields {
                &mut self.core
            }

            fn field(&self, name: &str) -> ::std::option::Option<$crate::FieldValue> {
                match name {
                    $(
                        stringify!($field) => ::std::option::Option::Some(
                            $crate::FieldKind::to_field_value(&self.$field),
                        ),
                    )*
                    _ => ::std::option::Option::None,
                }
            }

            fn set_field(&mut self, name: &str, value: &$crate::FieldValue) -> bool {
                match name {
                    $(
                        stringify!($field) => {
                            match <$fty as $crate::FieldKind>::from_field_value(value) {
                                ::std::option::Option::Some(v) => {
                                    self.$field = v;
                                    true
                                }
                                ::std::option::Option::None => false,
                            }
                        }
                    )*
                    _ => {
                        let _ = value;
                        false
                    }
                }
            }
        }

        impl $crate::RecordType for $name {
            const TYPE_NAME: &'static str = stringify!($name);

            fn extension_fields() -> ::std::vec::Vec<$crate::FieldSpec> {
                ::std::vec![
                    $( $crate::FieldSpec::of::<$fty>(stringify!($field)), )*
                ]
            }

            fn table_name() -> ::std::option::Option<&'static str> {
                $table
            }

            fn index_fields() -> &'static [&'static str] {
                $indexes
            }
        }
    };
    (
        @table $table:literal,
        @indexes [$($index:literal),* $(,)?],
        $($rest:tt)*
    ) => {
        $crate::record_type! {
            @define [::std::option::Option::Some($table)] [&[$($index),*]]
            $($rest)*
        }
    };
    ($($rest:tt)*) => {
        $crate::record_type! {
            @define [::std::option::Option::None] [&[]]
            $($rest)*
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BigDecimal;

    crate::record_type! {
        #[derive(Debug, Clone, Default)]
        struct OrderLog {
            order_id: Option<String>,
            total: Option<BigDecimal>,
            quantity: i32,
        }
    }

    crate::record_type! {
        #[derive(Debug, Clone, Default)]
        struct EmptyLog {}
    }

    #[derive(Debug)]
    struct NoDefaultLog {
        core: CoreFields,
    }

    impl LogRecord for NoDefaultLog {
        fn kind(&self) -> RecordKind {
            RecordKind::descriptor_only::<Self>()
        }

        fn core(&self) -> &CoreFields {
            &self.core
        }

        fn core_mut(&mut self) -> &mut CoreFields {
            &mut self.core
        }

        fn field(&self, _name: &str) -> Option<FieldValue> {
            None
        }

        fn set_field(&mut self, _name: &str, _value: &FieldValue) -> bool {
            false
        }
    }

    impl RecordType for NoDefaultLog {
        const TYPE_NAME: &'static str = "NoDefaultLog";

        fn extension_fields() -> Vec<FieldSpec> {
            Vec::new()
        }
    }

    #[test]
    fn test_severity_parse_and_display() {
        assert_eq!("info".parse::<Severity>().unwrap(), Severity::Info);
        assert_eq!("WARNING".parse::<Severity>().unwrap(), Severity::Warn);
        assert!("loud".parse::<Severity>().is_err());
        assert_eq!(Severity::Error.to_string(), "ERROR");
        assert_eq!(Severity::default(), Severity::Info);
    }

    #[test]
    fn test_macro_generates_type_name_and_fields() {
        assert_eq!(OrderLog::TYPE_NAME, "OrderLog");
        let fields = OrderLog::extension_fields();
        let names: Vec<_> = fields.iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["order_id", "total", "quantity"]);
        assert_eq!(fields[1].storage_type, StorageType::Decimal);
        assert_eq!(fields[2].storage_type, StorageType::Integer);
        assert!(EmptyLog::extension_fields().is_empty());
    }

    #[test]
    fn test_macro_get_and_set() {
        let mut order = OrderLog::default();
        assert!(order.set_field("order_id", &FieldValue::Text("X1".into())));
        assert!(order.set_field("quantity", &FieldValue::Long(3)));
        assert!(!order.set_field("quantity", &FieldValue::Boolean(true)));
        assert!(!order.set_field("unknown", &FieldValue::Integer(1)));

        assert_eq!(order.order_id.as_deref(), Some("X1"));
        assert_eq!(order.quantity, 3);
        assert_eq!(order.field("total"), Some(FieldValue::Null));
        assert_eq!(order.field("missing"), None);
    }

    #[test]
    fn test_to_json_contains_core_and_extension() {
        let mut order = OrderLog::default();
        order.core.id = "abc".to_string();
        order.core.content = "hello".to_string();
        order.core.severity = Some(Severity::Warn);
        order.order_id = Some("X1".to_string());

        let json = order.to_json();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["content"], "hello");
        assert_eq!(json["severity"], "WARN");
        assert_eq!(json["timestamp"], Value::Null);
        assert_eq!(json["order_id"], "X1");
        assert_eq!(json["total"], Value::Null);
        assert_eq!(json["quantity"], 0);
    }

    #[test]
    fn test_kind_identity_and_instantiation() {
        let kind = RecordKind::of::<OrderLog>();
        assert_eq!(kind, OrderLog::default().kind());
        assert_ne!(kind, RecordKind::of::<EmptyLog>());
        assert!(kind.is_constructible());

        let record = kind.instantiate().unwrap();
        assert_eq!(record.type_name(), "OrderLog");
    }

    #[test]
    fn test_descriptor_only_kind_fails_instantiation() {
        let kind = RecordKind::descriptor_only::<NoDefaultLog>();
        assert!(!kind.is_constructible());
        match kind.instantiate() {
            Err(Error::Instantiation(msg)) => assert!(msg.contains("NoDefaultLog")),
            other => panic!("Expected Instantiation error, got {:?}", other.map(|_| ())),
        }
        let record = NoDefaultLog {
            core: CoreFields::default(),
        };
        assert_eq!(record.kind().name(), "NoDefaultLog");
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = RecordRegistry::with_presets();
        registry.register(RecordKind::of::<OrderLog>());

        assert_eq!(registry.get("OrderLog").unwrap().name(), "OrderLog");
        assert!(registry.get("OperationLog").is_ok());
        assert!(matches!(
            registry.get("Nope"),
            Err(Error::Instantiation(_))
        ));
        assert!(registry.names().contains(&"UserAccessLog"));
    }

    #[test]
    fn test_core_field_values() {
        let core = CoreFields {
            id: "1".into(),
            timestamp: None,
            content: "c".into(),
            severity: Some(Severity::Info),
        };
        assert_eq!(core.value("id"), Some(FieldValue::Text("1".into())));
        assert_eq!(core.value("timestamp"), Some(FieldValue::Null));
        assert_eq!(core.value("severity"), Some(FieldValue::Enum("INFO".into())));
        assert_eq!(core.value("other"), None);
    }
}
