//! PostgreSQL implementation of [`SchemaBackend`].

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use logship_core::Result;
use logship_core::logging;

use crate::ddl::DdlStatement;
use crate::schema_sync::SchemaBackend;

/// SQLSTATE codes raised when a concurrent creator got there first.
const ALREADY_EXISTS_CODES: &[&str] = &[
    "42P07", // duplicate_table
    "42701", // duplicate_column
    "23505", // unique_violation on pg_type during racing CREATE TABLE
];

/// Schema backend over a PostgreSQL pool, scoped to `current_schema()`.
#[derive(Clone)]
pub struct PgSchemaBackend {
    pool: PgPool,
}

impl PgSchemaBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Whether `err` only says the object already exists.
fn is_already_exists(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .map(|code| ALREADY_EXISTS_CODES.contains(&code.as_ref()))
            .unwrap_or(false),
        _ => false,
    }
}

#[async_trait]
impl SchemaBackend for PgSchemaBackend {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = current_schema() AND table_name::text = $1
            )",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn existing_columns(&self, table: &str) -> Result<Vec<String>> {
        let columns = sqlx::query_scalar::<_, String>(
            "SELECT column_name::text FROM information_schema.columns
             WHERE table_schema = current_schema() AND table_name::text = $1
             ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;
        Ok(columns)
    }

    async fn execute(&self, statement: &DdlStatement) -> Result<()> {
        let sql = statement.to_sql();
        match sqlx::query(&sql).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(e) if is_already_exists(&e) => {
                debug!(
                    subsystem = logging::SUBSYSTEM_DB,
                    component = "schema_sync",
                    db_table = statement.table(),
                    "Object already exists, treating as success"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
