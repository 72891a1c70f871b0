//! Preset record types for common audit scenarios.

use chrono::{DateTime, Utc};

use crate::value::LongText;

crate::record_type! {
    @table "log_operation",
    @indexes ["operation_type", "module", "target", "client_ip"],

    /// A user-initiated operation (create, update, delete, export, ...).
    #[derive(Debug, Clone, Default)]
    pub struct OperationLog {
        pub username: Option<String>,
        pub real_name: Option<String>,
        pub email: Option<String>,
        pub role_name: Option<String>,
        pub operation_type: Option<String>,
        pub description: Option<LongText>,
        pub operation_time: Option<DateTime<Utc>>,
        pub client_ip: Option<String>,
        pub ip_location: Option<String>,
        pub browser: Option<String>,
        pub operating_system: Option<String>,
        pub device_type: Option<String>,
        pub status: Option<String>,
        /// Milliseconds.
        pub response_time: Option<i64>,
        pub request_uri: Option<String>,
        pub request_method: Option<String>,
        pub user_agent: Option<LongText>,
        pub session_id: Option<String>,
        pub module: Option<String>,
        pub target: Option<String>,
        /// Entity state before the operation, serialized.
        pub before_data: Option<LongText>,
        /// Entity state after the operation, serialized.
        pub after_data: Option<LongText>,
        pub exception_message: Option<LongText>,
        pub create_time: Option<DateTime<Utc>>,
    }
}

crate::record_type! {
    @table "log_user_access",
    @indexes ["access_type", "client_ip", "session_id"],

    /// A login, logout or page access.
    #[derive(Debug, Clone, Default)]
    pub struct UserAccessLog {
        pub username: Option<String>,
        pub real_name: Option<String>,
        pub email: Option<String>,
        pub access_type: Option<String>,
        pub description: Option<LongText>,
        pub module: Option<String>,
        pub target: Option<String>,
        pub access_time: Option<DateTime<Utc>>,
        pub client_ip: Option<String>,
        pub ip_location: Option<String>,
        pub browser: Option<String>,
        pub operating_system: Option<String>,
        pub device_type: Option<String>,
        pub status: Option<String>,
        pub response_time: Option<i64>,
        pub request_uri: Option<String>,
        pub request_method: Option<String>,
        pub user_agent: Option<LongText>,
        pub session_id: Option<String>,
        pub create_time: Option<DateTime<Utc>>,
        pub exception_message: Option<LongText>,
    }
}

crate::record_type! {
    /// Record kind used when a call names no record type.
    #[derive(Debug, Clone, Default)]
    pub struct DefaultLog {
        pub module: Option<String>,
        pub target: Option<String>,
        pub operation_type: Option<String>,
        pub exception_message: Option<LongText>,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::describe;
    use crate::record::{RecordKind, RecordType};
    use crate::value::StorageType;

    #[test]
    fn test_operation_log_shape() {
        assert_eq!(OperationLog::table_name(), Some("log_operation"));
        assert!(OperationLog::index_fields().contains(&"client_ip"));

        let descriptor = describe(&RecordKind::of::<OperationLog>());
        assert_eq!(descriptor.extension_fields.len(), 24);
        assert_eq!(
            descriptor.extension("response_time").map(|f| f.storage_type),
            Some(StorageType::LongInteger)
        );
        assert_eq!(
            descriptor.extension("before_data").map(|f| f.storage_type),
            Some(StorageType::LongText)
        );
    }

    #[test]
    fn test_user_access_log_shape() {
        assert_eq!(UserAccessLog::table_name(), Some("log_user_access"));
        assert_eq!(
            UserAccessLog::index_fields(),
            &["access_type", "client_ip", "session_id"]
        );
        let descriptor = describe(&RecordKind::of::<UserAccessLog>());
        assert_eq!(descriptor.extension_fields.len(), 21);
    }

    #[test]
    fn test_default_log_shape() {
        assert_eq!(DefaultLog::table_name(), None);
        assert!(DefaultLog::index_fields().is_empty());
        let names: Vec<_> = DefaultLog::extension_fields()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(
            names,
            vec!["module", "target", "operation_type", "exception_message"]
        );
    }
}
