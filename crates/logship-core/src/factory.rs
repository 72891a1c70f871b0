//! Record construction from a record kind and named extension values.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::trace;
use uuid::Uuid;

use crate::defaults::FALLBACK_CONTENT;
use crate::error::Result;
use crate::introspect::FieldIntrospector;
use crate::record::{LogRecord, RecordKind, Severity};
use crate::value::FieldValue;

/// Extension values keyed by field name.
pub type ExtensionValues = HashMap<String, FieldValue>;

/// Generate a fresh record id: a UUIDv7 without hyphens.
pub fn new_record_id() -> String {
    Uuid::now_v7().simple().to_string()
}

/// Creates populated record instances. Performs no I/O.
#[derive(Debug, Clone, Default)]
pub struct RecordFactory {
    introspector: Arc<FieldIntrospector>,
}

impl RecordFactory {
    pub fn new(introspector: Arc<FieldIntrospector>) -> Self {
        Self { introspector }
    }

    pub fn introspector(&self) -> &Arc<FieldIntrospector> {
        &self.introspector
    }

    /// Create a record of `kind`.
    ///
    /// Core fields are assigned here; extension values are applied
    /// best-effort, dropping unknown names and values that do not convert.
    /// Fails only when the kind cannot be instantiated.
    pub fn create(
        &self,
        kind: &RecordKind,
        description: &str,
        values: &ExtensionValues,
    ) -> Result<Box<dyn LogRecord>> {
        let mut record = kind.instantiate()?;
        self.populate(record.as_mut(), description, values);
        Ok(record)
    }

    /// Fill core fields and extension values of an existing instance.
    pub fn populate(
        &self,
        record: &mut dyn LogRecord,
        description: &str,
        values: &ExtensionValues,
    ) {
        let descriptor = self.introspector.describe(&record.kind());

        let core = record.core_mut();
        core.id = new_record_id();
        core.timestamp = Some(Utc::now());
        core.content = if description.is_empty() {
            FALLBACK_CONTENT.to_string()
        } else {
            description.to_string()
        };
        if core.severity.is_none() {
            core.severity = Some(Severity::default());
        }

        for (name, value) in values {
            if !descriptor.has_extension(name) {
                trace!(
                    record_type = descriptor.type_name,
                    field = %name,
                    "Dropping value with no matching extension field"
                );
                continue;
            }
            if !record.set_field(name, value) {
                trace!(
                    record_type = descriptor.type_name,
                    field = %name,
                    "Dropping value that does not fit the field type"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CoreFields, FieldSpec, RecordType};
    use crate::{BigDecimal, Error};
    use std::str::FromStr;

    crate::record_type! {
        #[derive(Debug, Clone, Default)]
        struct OrderLog {
            order_id: Option<String>,
            total: Option<BigDecimal>,
            quantity: i32,
        }
    }

    #[derive(Debug, Clone)]
    struct AuditLog {
        core: CoreFields,
    }

    impl Default for AuditLog {
        fn default() -> Self {
            Self {
                core: CoreFields {
                    severity: Some(Severity::Warn),
                    ..CoreFields::default()
                },
            }
        }
    }

    impl LogRecord for AuditLog {
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

    impl RecordType for AuditLog {
        const TYPE_NAME: &'static str = "AuditLog";
        fn extension_fields() -> Vec<FieldSpec> {
            Vec::new()
        }
    }

    #[derive(Debug)]
    struct SealedLog {
        core: CoreFields,
    }

    impl LogRecord for SealedLog {
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

    impl RecordType for SealedLog {
        const TYPE_NAME: &'static str = "SealedLog";
        fn extension_fields() -> Vec<FieldSpec> {
            Vec::new()
        }
    }

    fn values(pairs: &[(&str, FieldValue)]) -> ExtensionValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_create_sets_core_fields() {
        let factory = RecordFactory::default();
        let before = Utc::now();
        let record = factory
            .create(&RecordKind::of::<OrderLog>(), "placed", &ExtensionValues::new())
            .unwrap();

        let core = record.core();
        assert_eq!(core.id.len(), 32);
        assert!(!core.id.contains('-'));
        assert!(core.timestamp.unwrap() >= before);
        assert_eq!(core.content, "placed");
        assert_eq!(core.severity, Some(Severity::Info));
    }

    #[test]
    fn test_ids_are_unique() {
        let factory = RecordFactory::default();
        let kind = RecordKind::of::<OrderLog>();
        let a = factory.create(&kind, "a", &ExtensionValues::new()).unwrap();
        let b = factory.create(&kind, "b", &ExtensionValues::new()).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_empty_description_uses_fallback() {
        let factory = RecordFactory::default();
        let record = factory
            .create(&RecordKind::of::<OrderLog>(), "", &ExtensionValues::new())
            .unwrap();
        assert_eq!(record.core().content, FALLBACK_CONTENT);
    }

    #[test]
    fn test_preset_severity_is_kept() {
        let factory = RecordFactory::default();
        let record = factory
            .create(&RecordKind::of::<AuditLog>(), "x", &ExtensionValues::new())
            .unwrap();
        assert_eq!(record.core().severity, Some(Severity::Warn));
    }

    #[test]
    fn test_extension_values_best_effort() {
        let factory = RecordFactory::default();
        let record = factory
            .create(
                &RecordKind::of::<OrderLog>(),
                "x",
                &values(&[
                    ("order_id", FieldValue::Text("X1".into())),
                    ("total", FieldValue::Double(9.99)),
                    ("quantity", FieldValue::Boolean(true)),
                    ("unknown", FieldValue::Integer(1)),
                    ("id", FieldValue::Text("caller-id".into())),
                ]),
            )
            .unwrap();

        assert_eq!(record.field("order_id"), Some(FieldValue::Text("X1".into())));
        assert_eq!(
            record.field("total"),
            Some(FieldValue::Decimal(BigDecimal::from_str("9.99").unwrap()))
        );
        assert_eq!(record.field("quantity"), Some(FieldValue::Integer(0)));
        assert_ne!(record.id(), "caller-id");
    }

    #[test]
    fn test_create_without_constructor_fails() {
        let factory = RecordFactory::default();
        let result = factory.create(
            &RecordKind::descriptor_only::<SealedLog>(),
            "x",
            &ExtensionValues::new(),
        );
        assert!(matches!(result, Err(Error::Instantiation(_))));
    }

    #[test]
    fn test_factory_shares_introspector() {
        let introspector = Arc::new(FieldIntrospector::new());
        let factory = RecordFactory::new(introspector.clone());
        factory
            .create(&RecordKind::of::<OrderLog>(), "x", &ExtensionValues::new())
            .unwrap();
        assert_eq!(introspector.len(), 1);
    }
}
