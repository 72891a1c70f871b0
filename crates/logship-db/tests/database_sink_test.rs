//! Integration tests for the database sink against a live PostgreSQL.
//!
//! These tests are ignored by default. Run with a reachable database:
//! `DATABASE_URL=postgres://... cargo test -p logship-db -- --ignored`

use std::collections::HashMap;
use std::sync::Arc;

use logship_core::{
    record_type, BigDecimal, FieldIntrospector, FieldValue, LogSink, RecordFactory, RecordKind,
};
use logship_db::{
    DatabaseSink, DatabaseSinkConfig, SyncConfig, DEFAULT_TEST_DATABASE_URL,
};
use sqlx::PgPool;

record_type! {
    #[derive(Debug, Clone, Default)]
    pub struct ItOrderLog {
        pub order_id: Option<String>,
        pub total: Option<BigDecimal>,
    }
}

fn database_url() -> String {
    dotenvy::dotenv().ok();
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_TEST_DATABASE_URL.to_string())
}

async fn connect_sink(prefix: &str) -> (DatabaseSink, PgPool) {
    let config = DatabaseSinkConfig {
        sync: SyncConfig::default().with_table_prefix(prefix),
        ..DatabaseSinkConfig::default()
    }
    .with_database_url(database_url());
    let sink = DatabaseSink::connect(&config, Arc::new(FieldIntrospector::new()))
        .await
        .expect("Failed to connect to test database");
    let pool = sink.pool().clone();
    (sink, pool)
}

#[tokio::test]
#[ignore]
async fn test_record_round_trips_through_generated_table() {
    let prefix = format!("it_{}_", std::process::id());
    let (sink, pool) = connect_sink(&prefix).await;
    let table = format!("{}it_order_log", prefix);
    sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", table))
        .execute(&pool)
        .await
        .unwrap();

    let factory = RecordFactory::default();
    let mut values = HashMap::new();
    values.insert("order_id".to_string(), FieldValue::Text("X1".into()));
    values.insert("total".to_string(), FieldValue::Double(9.99));
    let record = factory
        .create(&RecordKind::of::<ItOrderLog>(), "order X1 total 9.99", &values)
        .unwrap();

    sink.send(record.as_ref()).await.unwrap();

    let (order_id, total, content): (String, BigDecimal, String) = sqlx::query_as(&format!(
        "SELECT order_id, total, content FROM \"{}\" WHERE id = $1",
        table
    ))
    .bind(record.id())
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(order_id, "X1");
    assert_eq!(total.to_string(), "9.99");
    assert_eq!(content, "order X1 total 9.99");

    sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", table))
        .execute(&pool)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore]
async fn test_null_extension_values_are_inserted() {
    let prefix = format!("itn_{}_", std::process::id());
    let (sink, pool) = connect_sink(&prefix).await;
    let table = format!("{}it_order_log", prefix);

    let record = RecordFactory::default()
        .create(&RecordKind::of::<ItOrderLog>(), "", &HashMap::new())
        .unwrap();
    sink.send(record.as_ref()).await.unwrap();

    let count: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM \"{}\" WHERE order_id IS NULL AND total IS NULL",
        table
    ))
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 1);

    sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", table))
        .execute(&pool)
        .await
        .unwrap();
}
