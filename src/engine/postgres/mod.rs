//! `PostgreSQL` Database Engine Implementation
//!
//! This module implements the `DatabaseEngine` trait for `PostgreSQL` targets.
//!
//! # Features
//! - Bounded connection probe (`SELECT 1`)
//! - Catalog extraction: four readers run concurrently on one connection
//! - Gated statement execution inside a `READ ONLY` transaction
//!
//! # Implementation Notes
//! - Uses `tokio-postgres` (async driver, requires tokio runtime)
//! - Plain TCP by default; relaxed TLS via `native-tls` when the config asks for it
//! - Every call opens its own connection and drops it before returning
//! - Row values decoded in [`value`]

use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_postgres::{Client, Config, NoTls};

use crate::engine::{ConnectionConfig, DatabaseEngine, QueryResult};
use crate::error::{LensError, Result};
use crate::inference::infer_entity_types;
use crate::safety::SafeSql;
use crate::schema::ExtractedSchema;

pub mod catalog;
pub mod value;

/// `PostgreSQL` database engine implementation
pub struct PostgresEngine;

impl DatabaseEngine for PostgresEngine {
    async fn probe(config: &ConnectionConfig, timeout: Duration) -> Result<()> {
        let round_trip = async {
            let client = connect(config).await?;
            client
                .simple_query("SELECT 1")
                .await
                .map_err(|e| LensError::connection_failed(e.to_string()))?;
            Ok(())
        };

        tokio::time::timeout(timeout, round_trip).await.map_err(|_| {
            LensError::connection_failed(format!("Connection timed out after {timeout:?}"))
        })?
    }

    async fn extract(config: &ConnectionConfig) -> Result<ExtractedSchema> {
        let client = connect(config)
            .await
            .map_err(|e| LensError::extraction_failed(e.message()))?;

        let start = Instant::now();
        let (tables, relationships, enums, indexes) = tokio::try_join!(
            catalog::read_tables(&client),
            catalog::read_relationships(&client),
            catalog::read_enums(&client),
            catalog::read_indexes(&client),
        )?;

        tracing::debug!(
            tables = tables.len(),
            relationships = relationships.len(),
            enums = enums.len(),
            indexes = indexes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "catalog read complete"
        );

        let entity_types = infer_entity_types(&tables, &relationships, &enums);

        Ok(ExtractedSchema {
            tables,
            relationships,
            enums,
            indexes,
            entity_types,
            extracted_at: Utc::now(),
        })
    }

    async fn execute_read_only(config: &ConnectionConfig, sql: &SafeSql) -> Result<QueryResult> {
        let client = connect(config)
            .await
            .map_err(|e| LensError::query_failed(e.message()))?;

        client
            .batch_execute("BEGIN READ ONLY")
            .await
            .map_err(|e| LensError::query_failed(e.to_string()))?;

        match run_statement(&client, sql.as_str()).await {
            Ok(result) => {
                client
                    .batch_execute("COMMIT")
                    .await
                    .map_err(|e| LensError::query_failed(e.to_string()))?;
                Ok(result)
            }
            Err(e) => {
                // The connection is dropped right after, so a failed rollback changes nothing
                if let Err(rollback) = client.batch_execute("ROLLBACK").await {
                    tracing::debug!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }
}

/// Prepare and run one statement, collecting columns and decoded rows
async fn run_statement(client: &Client, sql: &str) -> Result<QueryResult> {
    let stmt = client
        .prepare(sql)
        .await
        .map_err(|e| LensError::query_failed(e.to_string()))?;

    let columns: Vec<String> = stmt
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let rows = client
        .query(&stmt, &[])
        .await
        .map_err(|e| LensError::query_failed(e.to_string()))?;

    let rows = rows
        .iter()
        .map(value::decode_row)
        .collect::<Result<Vec<_>>>()?;

    Ok(QueryResult { columns, rows })
}

/// Build `PostgreSQL` connection config from `ConnectionConfig`
fn build_pg_config(config: &ConnectionConfig) -> Result<Config> {
    if config.host.trim().is_empty() {
        return Err(LensError::invalid_input("PostgreSQL requires 'host' parameter"));
    }
    if config.database.trim().is_empty() {
        return Err(LensError::invalid_input(
            "PostgreSQL requires 'database' parameter",
        ));
    }
    if config.user.trim().is_empty() {
        return Err(LensError::invalid_input("PostgreSQL requires 'user' parameter"));
    }

    let mut pg_config = Config::new();
    pg_config
        .host(&config.host)
        .port(config.port)
        .user(&config.user)
        .dbname(&config.database)
        .application_name("schemalens");

    if let Some(password) = &config.password {
        pg_config.password(password);
    }

    Ok(pg_config)
}

/// Open a connection and spawn its driver task
///
/// The task ends when the returned `Client` is dropped. Connection errors are
/// not logged to keep credentials out of the log stream.
async fn connect(config: &ConnectionConfig) -> Result<Client> {
    let pg_config = build_pg_config(config)?;

    if config.accept_invalid_certs {
        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| LensError::connection_failed(format!("Failed to set up TLS: {e}")))?;
        let tls = postgres_native_tls::MakeTlsConnector::new(tls);

        let (client, connection) = pg_config
            .connect(tls)
            .await
            .map_err(|e| LensError::connection_failed(e.to_string()))?;
        tokio::spawn(async move {
            let _ = connection.await;
        });
        Ok(client)
    } else {
        let (client, connection) = pg_config
            .connect(NoTls)
            .await
            .map_err(|e| LensError::connection_failed(e.to_string()))?;
        tokio::spawn(async move {
            let _ = connection.await;
        });
        Ok(client)
    }
}
