//! Database sink: one row per record in the record type's own table.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres};
use tracing::debug;

use logship_core::{
    BigDecimal, Error, FieldIntrospector, FieldValue, LogRecord, LogSink, RecordKind,
    Result, SinkSwitch, StorageType,
};
use logship_core::logging;

use crate::ddl::{CREATED_AT, UPDATED_AT};
use crate::identifier::quote;
use crate::pg_backend::PgSchemaBackend;
use crate::pool::{create_pool, log_pool_state, PoolConfig};
use crate::schema_sync::{SchemaSynchronizer, SyncConfig, VerifiedTable};

/// Logical name of the database sink.
pub const DATABASE_SINK: &str = "database";

/// Database sink configuration.
#[derive(Debug, Clone)]
pub struct DatabaseSinkConfig {
    pub enabled: bool,
    pub database_url: Option<String>,
    pub pool: PoolConfig,
    pub sync: SyncConfig,
}

impl Default for DatabaseSinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_url: None,
            pool: PoolConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl DatabaseSinkConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `LOG_DB_ENABLED` | `true` | Enable the database sink |
    /// | `DATABASE_URL` | (none) | PostgreSQL connection URL |
    ///
    /// Pool and table naming variables are read by [`PoolConfig::from_env`]
    /// and [`SyncConfig::from_env`].
    pub fn from_env() -> Self {
        let enabled = std::env::var("LOG_DB_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let database_url = std::env::var("DATABASE_URL").ok();

        Self {
            enabled,
            database_url,
            pool: PoolConfig::from_env(),
            sync: SyncConfig::from_env(),
        }
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Writes records to PostgreSQL, reconciling the table schema first.
pub struct DatabaseSink {
    pool: PgPool,
    synchronizer: Arc<SchemaSynchronizer>,
    switch: SinkSwitch,
}

impl DatabaseSink {
    pub fn new(pool: PgPool, synchronizer: Arc<SchemaSynchronizer>) -> Self {
        Self {
            pool,
            synchronizer,
            switch: SinkSwitch::default(),
        }
    }

    /// Connect a pool and wire a PostgreSQL-backed synchronizer.
    pub async fn connect(
        config: &DatabaseSinkConfig,
        introspector: Arc<FieldIntrospector>,
    ) -> Result<Self> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| Error::Config("DATABASE_URL is not set".to_string()))?;
        let pool = create_pool(url, &config.pool).await?;
        let synchronizer = Arc::new(SchemaSynchronizer::new(
            Arc::new(PgSchemaBackend::new(pool.clone())),
            introspector,
            config.sync.clone(),
        ));
        let sink = Self::new(pool, synchronizer);
        sink.switch.set_enabled(config.enabled);
        Ok(sink)
    }

    pub fn switch(&self) -> &SinkSwitch {
        &self.switch
    }

    pub fn synchronizer(&self) -> &Arc<SchemaSynchronizer> {
        &self.synchronizer
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// INSERT for every mapped column, with audit timestamps set to now.
pub fn insert_sql(table: &VerifiedTable) -> String {
    let mut columns: Vec<String> = table.columns.iter().map(|c| quote(&c.column)).collect();
    let mut values: Vec<String> = (1..=table.columns.len()).map(|i| format!("${}", i)).collect();
    if table.has_audit_columns {
        for audit in [CREATED_AT, UPDATED_AT] {
            columns.push(quote(audit));
            values.push("NOW()".to_string());
        }
    }
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote(&table.table),
        columns.join(", "),
        values.join(", ")
    )
}

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

fn bind_value(query: PgQuery<'_>, value: FieldValue, storage_type: StorageType) -> PgQuery<'_> {
    match value {
        FieldValue::Null => bind_null(query, storage_type),
        FieldValue::Text(s) | FieldValue::Enum(s) => query.bind(s),
        FieldValue::Integer(i) => query.bind(i),
        FieldValue::Long(i) => query.bind(i),
        FieldValue::Double(d) => query.bind(d),
        FieldValue::Decimal(d) => query.bind(d),
        FieldValue::Boolean(b) => query.bind(b),
        FieldValue::Timestamp(ts) => query.bind(ts),
        FieldValue::Date(d) => query.bind(d),
        FieldValue::Time(t) => query.bind(t),
        FieldValue::Json(v) => query.bind(v.to_string()),
    }
}

/// Nulls are bound with the column's type so PostgreSQL accepts them.
fn bind_null(query: PgQuery<'_>, storage_type: StorageType) -> PgQuery<'_> {
    match storage_type {
        StorageType::ShortText
        | StorageType::LongText
        | StorageType::EnumText
        | StorageType::OpaqueText => query.bind(None::<String>),
        StorageType::Integer => query.bind(None::<i32>),
        StorageType::LongInteger => query.bind(None::<i64>),
        StorageType::Double => query.bind(None::<f64>),
        StorageType::Decimal => query.bind(None::<BigDecimal>),
        StorageType::Boolean => query.bind(None::<bool>),
        StorageType::Timestamp => query.bind(None::<DateTime<Utc>>),
        StorageType::Date => query.bind(None::<NaiveDate>),
        StorageType::Time => query.bind(None::<NaiveTime>),
    }
}

#[async_trait]
impl LogSink for DatabaseSink {
    fn name(&self) -> &str {
        DATABASE_SINK
    }

    fn supports(&self, _kind: &RecordKind) -> bool {
        self.switch.is_enabled()
    }

    async fn send(&self, record: &dyn LogRecord) -> Result<()> {
        let start = Instant::now();
        let table = self.synchronizer.ensure_schema(&record.kind()).await?;
        let sql = insert_sql(&table);

        let mut query = sqlx::query(&sql);
        for column in &table.columns {
            let value = if column.is_core {
                record.core().value(column.field)
            } else {
                record.field(column.field)
            };
            query = bind_value(query, value.unwrap_or(FieldValue::Null), column.storage_type);
        }
        if let Err(e) = query.execute(&self.pool).await {
            log_pool_state(&self.pool);
            return Err(e.into());
        }

        debug!(
            subsystem = logging::SUBSYSTEM_DB,
            component = "sink",
            op = "insert",
            record_id = record.id(),
            record_type = record.type_name(),
            db_table = %table.table,
            duration_ms = start.elapsed().as_millis() as u64,
            "Record inserted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_sync::MappedColumn;

    fn order_table(has_audit_columns: bool) -> VerifiedTable {
        let column = |name: &'static str, is_core: bool, storage_type| MappedColumn {
            column: name.to_string(),
            field: name,
            is_core,
            storage_type,
        };
        VerifiedTable {
            table: "log_order_log".to_string(),
            columns: vec![
                column("id", true, StorageType::ShortText),
                column("content", true, StorageType::LongText),
                column("total", false, StorageType::Decimal),
            ],
            has_audit_columns,
        }
    }

    #[test]
    fn test_insert_sql_with_audit_columns() {
        assert_eq!(
            insert_sql(&order_table(true)),
            "INSERT INTO \"log_order_log\" (\"id\", \"content\", \"total\", \"created_at\", \"updated_at\") \
             VALUES ($1, $2, $3, NOW(), NOW())"
        );
    }

    #[test]
    fn test_insert_sql_without_audit_columns() {
        assert_eq!(
            insert_sql(&order_table(false)),
            "INSERT INTO \"log_order_log\" (\"id\", \"content\", \"total\") VALUES ($1, $2, $3)"
        );
    }

    #[test]
    fn test_config_builder() {
        let config = DatabaseSinkConfig::default()
            .with_database_url("postgres://localhost/logs")
            .with_enabled(false);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/logs"));
        assert!(!config.enabled);
        assert_eq!(config.pool, PoolConfig::default());
    }

    #[tokio::test]
    async fn test_connect_without_url_is_config_error() {
        let result =
            DatabaseSink::connect(&DatabaseSinkConfig::default(), Arc::new(FieldIntrospector::new()))
                .await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_supports_follows_switch() {
        let pool = PgPool::connect_lazy("postgres://localhost/logship_test").unwrap();
        let synchronizer = Arc::new(SchemaSynchronizer::new(
            Arc::new(PgSchemaBackend::new(pool.clone())),
            Arc::new(FieldIntrospector::new()),
            SyncConfig::default(),
        ));
        let sink = DatabaseSink::new(pool, synchronizer);
        let kind = RecordKind::of::<logship_core::DefaultLog>();

        assert_eq!(sink.name(), DATABASE_SINK);
        assert!(sink.supports(&kind));
        sink.switch().set_enabled(false);
        assert!(!sink.supports(&kind));
    }
}
