//! Pipeline Orchestration
//!
//! [`Lens`] ties the pieces together for the CLI and MCP surfaces:
//!
//! ```text
//! connect:  probe ──ok──> save to registry ──> drop any cached snapshot
//! extract:  resolve ──> engine extract (4 readers ∥) ──> inference ──> cache
//! ask:      validate ──> cached snapshot? ──> generate ──> safety gate
//!                                                          ──> read-only execute
//! ```
//!
//! Every operation is scoped to one request; failures come back as
//! [`LensError`]s and never leave partial state behind. Cached snapshots are
//! keyed by the registry's project and the connection name.

use std::marker::PhantomData;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::ai::generator::SqlGenerator;
use crate::ai::{AiSettings, AiStatus, CompletionBackend, OpenAiClient};
use crate::cache::{FileSchemaStore, SchemaStore};
use crate::config::{
    validate_connection_name, ConfigLocation, ConfigStore, ConnectionSummary, StoredConnection,
};
use crate::engine::postgres::PostgresEngine;
use crate::engine::{ConnectionConfig, DatabaseEngine, Row, DEFAULT_PROBE_TIMEOUT};
use crate::error::{LensError, Result};
use crate::safety;
use crate::schema::ExtractedSchema;

/// Message returned when `ask` runs before any extraction
pub const EXTRACT_FIRST: &str =
    "Schema must be extracted first. Run 'schemalens extract' before asking questions.";

/// Answer to a natural-language question
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AskResponse {
    pub sql: String,
    pub explanation: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub row_count: usize,
}

/// Snapshot tagged with the connection it came from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSchema {
    pub connection: String,
    pub schema: ExtractedSchema,
}

/// Result of removing a saved connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedConnection {
    pub name: String,
    pub removed_schema: bool,
}

/// Entry point for every operation
///
/// Generic over the database engine, snapshot store and language-model
/// backend so each can be swapped out in tests.
pub struct Lens<E, S, B> {
    config: ConfigStore,
    store: S,
    ai: AiSettings,
    backend: Option<B>,
    probe_timeout: Duration,
    _engine: PhantomData<fn() -> E>,
}

/// Production wiring: `PostgreSQL`, file cache, OpenAI-compatible backend
pub type PostgresLens = Lens<PostgresEngine, FileSchemaStore, OpenAiClient>;

impl PostgresLens {
    /// Build from the current directory, platform paths and environment
    pub fn from_env() -> Result<Self> {
        let ai = AiSettings::from_env()?;
        let backend = if ai.enabled() {
            Some(OpenAiClient::from_settings(&ai)?)
        } else {
            None
        };
        Ok(Self::new(
            ConfigStore::discover()?,
            FileSchemaStore::new()?,
            ai,
            backend,
        ))
    }
}

impl<E, S, B> Lens<E, S, B>
where
    E: DatabaseEngine,
    S: SchemaStore,
    B: CompletionBackend + Sync,
{
    pub fn new(config: ConfigStore, store: S, ai: AiSettings, backend: Option<B>) -> Self {
        Self {
            config,
            store,
            ai,
            backend,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            _engine: PhantomData,
        }
    }

    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Check that `config` reaches a live database
    pub async fn probe(&self, config: &ConnectionConfig) -> Result<()> {
        E::probe(config, self.probe_timeout).await
    }

    /// Probe, then persist the connection under `name`
    ///
    /// Nothing is written when the probe fails. A snapshot cached under the
    /// same name describes whatever the name pointed at before, so it is
    /// dropped once the new entry is saved.
    pub async fn register_connection(
        &self,
        name: &str,
        stored: StoredConnection,
        location: ConfigLocation,
    ) -> Result<ConnectionSummary> {
        validate_connection_name(name)?;
        let resolved = stored.resolve()?;

        self.probe(&resolved).await.inspect_err(|e| {
            tracing::info!(
                connection = name,
                code = e.error_code(),
                "probe failed, not saving"
            );
        })?;

        self.config.save_connection(name, stored, location)?;
        if self.store.remove(self.config.project(), name)? {
            tracing::info!(connection = name, "dropped snapshot of previous target");
        }
        tracing::info!(connection = name, ?location, "connection saved");

        self.config
            .list_connections()?
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| LensError::not_found(format!("Connection '{name}'")))
    }

    /// Extract a fresh snapshot and replace the cached one
    ///
    /// The cache is only written once extraction has fully succeeded.
    pub async fn extract(&self, name: Option<&str>) -> Result<ConnectionSchema> {
        let (connection, config) = self.config.resolve(name)?;

        let start = Instant::now();
        let schema = E::extract(&config).await.inspect_err(|e| {
            tracing::warn!(connection = %connection, error = %e, "extraction failed");
        })?;

        self.store.save(self.config.project(), &connection, &schema)?;
        tracing::info!(
            connection = %connection,
            tables = schema.tables.len(),
            relationships = schema.relationships.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "schema extracted"
        );

        Ok(ConnectionSchema { connection, schema })
    }

    fn load_cached(&self, connection: &str) -> Result<ExtractedSchema> {
        self.store
            .load(self.config.project(), connection)?
            .ok_or_else(|| LensError::precondition_failed(EXTRACT_FIRST))
    }

    /// Cached snapshot for a connection
    pub fn cached_schema(&self, name: Option<&str>) -> Result<ConnectionSchema> {
        let (connection, _) = self.config.resolve(name)?;
        let schema = self.load_cached(&connection)?;
        Ok(ConnectionSchema { connection, schema })
    }

    /// Answer `question` against a connection's live database
    pub async fn ask(&self, name: Option<&str>, question: &str) -> Result<AskResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Err(LensError::invalid_input("Question must not be empty"));
        }

        let (connection, config) = self.config.resolve(name)?;
        let schema = self.load_cached(&connection)?;

        let backend = self.backend.as_ref().ok_or(LensError::AiUnavailable)?;
        let generated = SqlGenerator::new(backend)
            .generate(&schema, question)
            .await?;
        tracing::debug!(connection = %connection, sql = %generated.sql, "generated SQL");

        let safe = safety::check(&generated.sql).inspect_err(|e| {
            if let LensError::UnsafeSql { keyword } = e {
                tracing::warn!(
                    connection = %connection,
                    keyword = %keyword,
                    "generated SQL rejected"
                );
            }
        })?;

        let start = Instant::now();
        let result = E::execute_read_only(&config, &safe).await?;
        tracing::info!(
            connection = %connection,
            rows = result.row_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "query executed"
        );

        let row_count = result.row_count();
        Ok(AskResponse {
            sql: generated.sql,
            explanation: generated.explanation,
            columns: result.columns,
            rows: result.rows,
            row_count,
        })
    }

    /// Saved connections for the current project
    pub fn list_connections(&self) -> Result<Vec<ConnectionSummary>> {
        self.config.list_connections()
    }

    /// Forget a connection and its cached snapshot
    pub fn remove_connection(&self, name: &str) -> Result<RemovedConnection> {
        if !self.config.remove_connection(name)? {
            return Err(LensError::not_found(format!("Connection '{name}'")));
        }
        let removed_schema = self.store.remove(self.config.project(), name)?;
        Ok(RemovedConnection {
            name: name.to_string(),
            removed_schema,
        })
    }

    /// Whether text-to-SQL is available
    #[must_use]
    pub fn ai_status(&self) -> AiStatus {
        AiStatus {
            enabled: self.backend.is_some(),
            model: self.ai.model.clone(),
        }
    }
}
