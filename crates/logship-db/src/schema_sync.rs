//! Schema synchronization: makes sure a table exists with a column for
//! every field of a record type before rows are written to it.
//!
//! Verified tables are cached for the lifetime of the synchronizer. A
//! field added to a type after its table was verified is picked up only
//! after [`SchemaSynchronizer::clear_cache`] or
//! [`SchemaSynchronizer::invalidate`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use logship_core::naming::{column_name, table_name};
use logship_core::{defaults, Error, FieldIntrospector, RecordKind, Result, StorageType};
use logship_core::logging;

use crate::ddl::{
    audit_columns, core_columns, ColumnDef, CoreColumn, DdlStatement, CREATED_AT, UPDATED_AT,
};
use crate::identifier::validate_identifier;

/// Columns indexed on every new table when present.
pub const COMMON_INDEX_COLUMNS: &[&str] =
    &["timestamp", "username", "user_id", "status", "create_time"];

/// Metadata and DDL access to the storage backend.
#[async_trait]
pub trait SchemaBackend: Send + Sync {
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Column names of an existing table.
    async fn existing_columns(&self, table: &str) -> Result<Vec<String>>;

    /// Run a statement. "Already exists" outcomes from concurrent
    /// creators must be reported as success.
    async fn execute(&self, statement: &DdlStatement) -> Result<()>;
}

/// Synchronizer configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Prefix for derived table names.
    pub table_prefix: String,
    /// Create missing tables; when off a missing table is an error.
    pub auto_create: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            table_prefix: defaults::NAME_PREFIX.to_string(),
            auto_create: defaults::DB_AUTO_CREATE,
        }
    }
}

impl SyncConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `LOG_DB_TABLE_PREFIX` | `log_` | Prefix for derived table names |
    /// | `LOG_DB_AUTO_CREATE` | `true` | Create missing tables |
    pub fn from_env() -> Self {
        let table_prefix = std::env::var("LOG_DB_TABLE_PREFIX")
            .unwrap_or_else(|_| defaults::NAME_PREFIX.to_string());

        let auto_create = std::env::var("LOG_DB_AUTO_CREATE")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(defaults::DB_AUTO_CREATE);

        Self {
            table_prefix,
            auto_create,
        }
    }

    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    pub fn with_auto_create(mut self, auto_create: bool) -> Self {
        self.auto_create = auto_create;
        self
    }
}

/// A writable column of a verified table and where its value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedColumn {
    /// Physical column name.
    pub column: String,
    /// Record field name (core or extension).
    pub field: &'static str,
    pub is_core: bool,
    pub storage_type: StorageType,
}

/// A table known to hold every field of a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedTable {
    pub table: String,
    /// Core columns present in the table, then every extension column.
    pub columns: Vec<MappedColumn>,
    /// Whether `created_at`/`updated_at` exist and should be set on insert.
    pub has_audit_columns: bool,
}

/// Reconciles backend tables with record types, additively.
pub struct SchemaSynchronizer {
    backend: Arc<dyn SchemaBackend>,
    introspector: Arc<FieldIntrospector>,
    config: SyncConfig,
    verified: RwLock<HashMap<RecordKind, Arc<VerifiedTable>>>,
    /// Serializes first-use verification so racing callers issue DDL once.
    sync_lock: Mutex<()>,
}

impl SchemaSynchronizer {
    pub fn new(
        backend: Arc<dyn SchemaBackend>,
        introspector: Arc<FieldIntrospector>,
        config: SyncConfig,
    ) -> Self {
        Self {
            backend,
            introspector,
            config,
            verified: RwLock::new(HashMap::new()),
            sync_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Table name for `kind` under this synchronizer's prefix.
    pub fn table_name(&self, kind: &RecordKind) -> String {
        table_name(kind, &self.config.table_prefix)
    }

    fn cached(&self, kind: &RecordKind) -> Option<Arc<VerifiedTable>> {
        self.verified
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .cloned()
    }

    pub fn is_verified(&self, kind: &RecordKind) -> bool {
        self.cached(kind).is_some()
    }

    /// Forget every verified table.
    pub fn clear_cache(&self) {
        self.verified
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        info!(
            subsystem = logging::SUBSYSTEM_DB,
            component = "schema_sync",
            op = "clear_cache",
            "Schema cache cleared"
        );
    }

    /// Forget one record type so its next use re-verifies the table.
    pub fn invalidate(&self, kind: &RecordKind) -> bool {
        self.verified
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(kind)
            .is_some()
    }

    /// Ensure the table for `kind` exists with every field's column.
    ///
    /// Served from cache after the first success. Backend failures are
    /// returned as [`Error::SchemaSync`] and leave the type unverified.
    pub async fn ensure_schema(&self, kind: &RecordKind) -> Result<Arc<VerifiedTable>> {
        if let Some(table) = self.cached(kind) {
            return Ok(table);
        }

        let _guard = self.sync_lock.lock().await;
        if let Some(table) = self.cached(kind) {
            return Ok(table);
        }

        let start = Instant::now();
        let table = self.table_name(kind);
        let verified = self
            .verify(kind, &table)
            .await
            .map_err(|e| schema_error(&table, e))?;
        let verified = Arc::new(verified);

        self.verified
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(*kind, verified.clone());

        debug!(
            subsystem = logging::SUBSYSTEM_DB,
            component = "schema_sync",
            op = "ensure_schema",
            record_type = kind.name(),
            db_table = %table,
            duration_ms = start.elapsed().as_millis() as u64,
            "Schema verified"
        );
        Ok(verified)
    }

    async fn verify(&self, kind: &RecordKind, table: &str) -> Result<VerifiedTable> {
        validate_identifier(table)?;

        let descriptor = self.introspector.describe(kind);
        let mut extension = Vec::with_capacity(descriptor.extension_fields.len());
        for spec in &descriptor.extension_fields {
            let column = column_name(spec.name);
            validate_identifier(&column)?;
            extension.push(MappedColumn {
                column,
                field: spec.name,
                is_core: false,
                storage_type: spec.storage_type,
            });
        }

        let core: Vec<CoreColumn> = core_columns();

        if self.backend.table_exists(table).await? {
            let existing: HashSet<String> = self
                .backend
                .existing_columns(table)
                .await?
                .into_iter()
                .map(|c| c.to_lowercase())
                .collect();

            for column in &extension {
                if existing.contains(&column.column) {
                    continue;
                }
                self.backend
                    .execute(&DdlStatement::AddColumn {
                        table: table.to_string(),
                        column: ColumnDef::for_storage(&column.column, column.storage_type),
                    })
                    .await?;
                info!(
                    subsystem = logging::SUBSYSTEM_DB,
                    component = "schema_sync",
                    op = "add_column",
                    db_table = %table,
                    column = %column.column,
                    storage_type = %column.storage_type,
                    "Added column"
                );
            }

            let mut columns: Vec<MappedColumn> = core
                .into_iter()
                .filter(|c| existing.contains(&c.def.name))
                .map(core_mapping)
                .collect();
            columns.extend(extension);

            return Ok(VerifiedTable {
                table: table.to_string(),
                columns,
                has_audit_columns: existing.contains(CREATED_AT) && existing.contains(UPDATED_AT),
            });
        }

        if !self.config.auto_create {
            return Err(Error::SchemaSync {
                table: table.to_string(),
                message: "table does not exist and auto-create is disabled".to_string(),
            });
        }

        let mut definitions: Vec<ColumnDef> = core.iter().map(|c| c.def.clone()).collect();
        definitions.extend(
            extension
                .iter()
                .map(|c| ColumnDef::for_storage(&c.column, c.storage_type)),
        );
        definitions.extend(audit_columns());

        self.backend
            .execute(&DdlStatement::CreateTable {
                table: table.to_string(),
                columns: definitions,
            })
            .await?;
        info!(
            subsystem = logging::SUBSYSTEM_DB,
            component = "schema_sync",
            op = "create_table",
            record_type = kind.name(),
            db_table = %table,
            column_count = core.len() + extension.len() + 2,
            "Created log table"
        );

        let mut columns: Vec<MappedColumn> = core
            .into_iter()
            .map(core_mapping)
            .collect();
        columns.extend(extension);

        self.create_indexes(kind, table, &columns).await;

        Ok(VerifiedTable {
            table: table.to_string(),
            columns,
            has_audit_columns: true,
        })
    }

    /// Create convenience indexes; failures are logged and skipped.
    async fn create_indexes(&self, kind: &RecordKind, table: &str, columns: &[MappedColumn]) {
        let present: HashSet<&str> = columns.iter().map(|c| c.column.as_str()).collect();
        let mut wanted: Vec<String> = Vec::new();
        for field in COMMON_INDEX_COLUMNS.iter().chain(kind.index_fields()) {
            let column = column_name(field);
            if present.contains(column.as_str()) && !wanted.contains(&column) {
                wanted.push(column);
            }
        }

        for column in wanted {
            let statement = DdlStatement::CreateIndex {
                table: table.to_string(),
                column,
            };
            if let Err(e) = self.backend.execute(&statement).await {
                warn!(
                    subsystem = logging::SUBSYSTEM_DB,
                    component = "schema_sync",
                    op = "create_index",
                    db_table = %table,
                    error = %e,
                    "Index creation failed, continuing without it"
                );
            }
        }
    }
}

fn core_mapping(core: CoreColumn) -> MappedColumn {
    MappedColumn {
        column: core.def.name,
        field: core.field,
        is_core: true,
        storage_type: core.storage_type,
    }
}

fn schema_error(table: &str, e: Error) -> Error {
    match e {
        Error::SchemaSync { .. } => e,
        other => Error::SchemaSync {
            table: table.to_string(),
            message: other.to_string(),
        },
    }
}
