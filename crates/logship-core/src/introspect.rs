//! Field introspection: splits a record type into core and extension
//! fields and memoizes the result per type.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::trace;

use crate::record::{FieldSpec, RecordKind, CORE_FIELD_NAMES};
use crate::value::StorageType;

/// Derived description of a record type's fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDescriptor {
    pub type_name: &'static str,
    pub core_fields: [&'static str; 4],
    /// Extension fields in declaration order.
    pub extension_fields: Vec<FieldSpec>,
}

impl RecordDescriptor {
    pub fn extension(&self, name: &str) -> Option<&FieldSpec> {
        self.extension_fields.iter().find(|f| f.name == name)
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.extension(name).is_some()
    }

    /// Extension field names paired with their storage types.
    pub fn typed_fields(&self) -> impl Iterator<Item = (&'static str, StorageType)> + '_ {
        self.extension_fields
            .iter()
            .map(|f| (f.name, f.storage_type))
    }
}

/// Describe a record kind.
///
/// Declared fields are taken in order. A name colliding with a core field
/// is dropped, and when a type composes fields from another type the first
/// declaration of a name wins, so types list their own fields before
/// composed ones.
pub fn describe(kind: &RecordKind) -> RecordDescriptor {
    let mut seen = HashSet::new();
    let mut extension_fields = Vec::new();

    for spec in kind.extension_fields() {
        if CORE_FIELD_NAMES.contains(&spec.name) {
            trace!(
                record_type = kind.name(),
                field = spec.name,
                "Skipping extension field shadowing a core field"
            );
            continue;
        }
        if !seen.insert(spec.name) {
            trace!(
                record_type = kind.name(),
                field = spec.name,
                "Skipping duplicate extension field"
            );
            continue;
        }
        extension_fields.push(spec);
    }

    RecordDescriptor {
        type_name: kind.name(),
        core_fields: CORE_FIELD_NAMES,
        extension_fields,
    }
}

/// Memoizing front for [`describe`], keyed by the record's Rust type.
///
/// Entries live as long as the introspector; share one instance between
/// the factory and the schema synchronizer.
#[derive(Debug, Default)]
pub struct FieldIntrospector {
    cache: RwLock<HashMap<TypeId, Arc<RecordDescriptor>>>,
}

impl FieldIntrospector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn describe(&self, kind: &RecordKind) -> Arc<RecordDescriptor> {
        if let Some(descriptor) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind.type_id())
        {
            return descriptor.clone();
        }

        let descriptor = Arc::new(describe(kind));
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind.type_id())
            .or_insert(descriptor)
            .clone()
    }

    /// Number of memoized descriptors.
    pub fn len(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CoreFields, FieldSpec, LogRecord, RecordType};
    use crate::value::FieldValue;
    use crate::BigDecimal;
    use chrono::{DateTime, Utc};

    crate::record_type! {
        #[derive(Debug, Clone, Default)]
        struct PaymentLog {
            amount: Option<BigDecimal>,
            paid_at: Option<DateTime<Utc>>,
            attempts: i64,
            metadata: serde_json::Value,
        }
    }

    crate::record_type! {
        #[derive(Debug, Clone, Default)]
        struct ShadowLog {
            content: String,
            status: String,
        }
    }

    /// Composes PaymentLog's fields after its own, redeclaring `amount` as text.
    #[derive(Debug, Default)]
    struct RefundLog {
        core: CoreFields,
    }

    impl LogRecord for RefundLog {
        fn kind(&self) -> RecordKind {
            RecordKind::of::<Self>()
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

    impl RecordType for RefundLog {
        const TYPE_NAME: &'static str = "RefundLog";

        fn extension_fields() -> Vec<FieldSpec> {
            let mut fields = vec![
                FieldSpec::of::<String>("reason"),
                FieldSpec::of::<String>("amount"),
            ];
            fields.extend(PaymentLog::extension_fields());
            fields
        }
    }

    #[test]
    fn test_describe_is_idempotent() {
        let kind = RecordKind::of::<PaymentLog>();
        assert_eq!(describe(&kind), describe(&kind));
    }

    #[test]
    fn test_decimal_field_is_decimal() {
        let descriptor = describe(&RecordKind::of::<PaymentLog>());
        assert_eq!(
            descriptor.extension("amount").map(|f| f.storage_type),
            Some(StorageType::Decimal)
        );
        assert_eq!(
            descriptor.extension("metadata").map(|f| f.storage_type),
            Some(StorageType::OpaqueText)
        );
        assert_eq!(
            descriptor.extension("paid_at").map(|f| f.storage_type),
            Some(StorageType::Timestamp)
        );
    }

    #[test]
    fn test_core_names_are_excluded() {
        let descriptor = describe(&RecordKind::of::<ShadowLog>());
        let names: Vec<_> = descriptor.typed_fields().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["status"]);
        assert_eq!(descriptor.core_fields, CORE_FIELD_NAMES);
    }

    #[test]
    fn test_first_declaration_wins() {
        let descriptor = describe(&RecordKind::of::<RefundLog>());
        let fields: Vec<_> = descriptor.typed_fields().collect();
        assert_eq!(
            fields,
            vec![
                ("reason", StorageType::ShortText),
                ("amount", StorageType::ShortText),
                ("paid_at", StorageType::Timestamp),
                ("attempts", StorageType::LongInteger),
                ("metadata", StorageType::OpaqueText),
            ]
        );
    }

    #[test]
    fn test_introspector_memoizes() {
        let introspector = FieldIntrospector::new();
        assert!(introspector.is_empty());

        let kind = RecordKind::of::<PaymentLog>();
        let first = introspector.describe(&kind);
        let second = introspector.describe(&kind);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(introspector.len(), 1);

        introspector.describe(&RecordKind::of::<ShadowLog>());
        assert_eq!(introspector.len(), 2);
    }
}
