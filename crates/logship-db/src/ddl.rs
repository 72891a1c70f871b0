//! Additive DDL statements issued by the schema synchronizer.
//!
//! Only creation and column addition exist here; nothing drops, renames
//! or retypes a column.

use logship_core::StorageType;

use crate::identifier::{index_name, quote};

/// Audit column set on insert.
pub const CREATED_AT: &str = "created_at";
/// Audit column set on insert.
pub const UPDATED_AT: &str = "updated_at";

/// A column in a create or alter statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: &'static str,
    pub primary_key: bool,
    pub default_now: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, sql_type: &'static str) -> Self {
        Self {
            name: name.into(),
            sql_type,
            primary_key: false,
            default_now: false,
        }
    }

    pub fn for_storage(name: impl Into<String>, storage_type: StorageType) -> Self {
        Self::new(name, storage_type.sql_type())
    }

    fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    fn default_now(mut self) -> Self {
        self.default_now = true;
        self
    }

    fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", quote(&self.name), self.sql_type);
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if self.default_now {
            sql.push_str(" DEFAULT CURRENT_TIMESTAMP");
        }
        sql
    }
}

/// A core column and the record field it stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreColumn {
    pub field: &'static str,
    pub def: ColumnDef,
    pub storage_type: StorageType,
}

/// Core column definitions in table order.
pub fn core_columns() -> Vec<CoreColumn> {
    vec![
        CoreColumn {
            field: "id",
            def: ColumnDef::new("id", "VARCHAR(64)").primary_key(),
            storage_type: StorageType::ShortText,
        },
        CoreColumn {
            field: "timestamp",
            def: ColumnDef::new("timestamp", "TIMESTAMPTZ"),
            storage_type: StorageType::Timestamp,
        },
        CoreColumn {
            field: "content",
            def: ColumnDef::new("content", "TEXT"),
            storage_type: StorageType::LongText,
        },
        CoreColumn {
            field: "severity",
            def: ColumnDef::new("severity", "VARCHAR(20)"),
            storage_type: StorageType::EnumText,
        },
    ]
}

pub fn audit_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new(CREATED_AT, "TIMESTAMPTZ").default_now(),
        ColumnDef::new(UPDATED_AT, "TIMESTAMPTZ").default_now(),
    ]
}

/// A schema change sent to a [`SchemaBackend`](crate::SchemaBackend).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdlStatement {
    CreateTable {
        table: String,
        columns: Vec<ColumnDef>,
    },
    AddColumn {
        table: String,
        column: ColumnDef,
    },
    CreateIndex {
        table: String,
        column: String,
    },
}

impl DdlStatement {
    pub fn table(&self) -> &str {
        match self {
            DdlStatement::CreateTable { table, .. }
            | DdlStatement::AddColumn { table, .. }
            | DdlStatement::CreateIndex { table, .. } => table,
        }
    }

    /// PostgreSQL text of this statement.
    pub fn to_sql(&self) -> String {
        match self {
            DdlStatement::CreateTable { table, columns } => {
                let columns: Vec<String> = columns.iter().map(ColumnDef::to_sql).collect();
                format!(
                    "CREATE TABLE IF NOT EXISTS {} ({})",
                    quote(table),
                    columns.join(", ")
                )
            }
            DdlStatement::AddColumn { table, column } => format!(
                "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
                quote(table),
                column.to_sql()
            ),
            DdlStatement::CreateIndex { table, column } => format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote(&index_name(table, column)),
                quote(table),
                quote(column)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_sql() {
        let mut columns: Vec<ColumnDef> = core_columns().into_iter().map(|c| c.def).collect();
        columns.push(ColumnDef::for_storage("total", StorageType::Decimal));
        columns.extend(audit_columns());

        let sql = DdlStatement::CreateTable {
            table: "log_order_log".into(),
            columns,
        }
        .to_sql();

        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"log_order_log\" (\"id\" VARCHAR(64) PRIMARY KEY, \
             \"timestamp\" TIMESTAMPTZ, \"content\" TEXT, \"severity\" VARCHAR(20), \
             \"total\" DECIMAL(19,2), \
             \"created_at\" TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP, \
             \"updated_at\" TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP)"
        );
    }

    #[test]
    fn test_add_column_sql() {
        let sql = DdlStatement::AddColumn {
            table: "log_order_log".into(),
            column: ColumnDef::for_storage("note", StorageType::ShortText),
        }
        .to_sql();
        assert_eq!(
            sql,
            "ALTER TABLE \"log_order_log\" ADD COLUMN IF NOT EXISTS \"note\" VARCHAR(255)"
        );
        assert!(!sql.contains("DROP"));
        assert!(!sql.contains("TYPE"));
    }

    #[test]
    fn test_create_index_sql() {
        let stmt = DdlStatement::CreateIndex {
            table: "log_order_log".into(),
            column: "status".into(),
        };
        assert_eq!(stmt.table(), "log_order_log");
        assert_eq!(
            stmt.to_sql(),
            "CREATE INDEX IF NOT EXISTS \"idx_log_order_log_status\" ON \"log_order_log\" (\"status\")"
        );
    }
}
