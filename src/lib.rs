//! Schemalens - Schema Introspection and Guarded Text-to-SQL
//!
//! Schemalens connects to an operator-supplied `PostgreSQL` database, extracts a
//! structural snapshot of its catalog, infers typed entity descriptions from
//! it, and answers natural-language questions by generating a single `SELECT`
//! that is checked and then run inside a read-only transaction.
//!
//! # Core Principles
//! - The target database is external and untrusted: nothing is pooled or kept
//!   open between requests
//! - Generated SQL is never executed without passing the safety gate
//! - Snapshots are immutable; a refresh replaces them wholesale
//! - JSON-only output (one envelope per CLI command or MCP tool call)
//!
//! # Architecture
//! Both the CLI and the MCP server are thin wrappers around [`service::Lens`].
//!
//! # Module Organization
//! - [`schema`] - Snapshot data model
//! - [`engine`] - Database engine trait and the `PostgreSQL` implementation
//! - [`inference`] - Entity type inference
//! - [`ai`] - Schema summaries and text-to-SQL generation
//! - [`safety`] - Lexical gate for generated statements
//! - [`cache`] - Snapshot cache
//! - [`config`] - Saved connections
//! - [`service`] - Pipeline orchestration
//! - [`error`] / [`output`] - Errors and JSON envelopes

pub mod ai;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod inference;
pub mod mcp;
pub mod output;
pub mod safety;
pub mod schema;
pub mod service;

pub use ai::{AiSettings, AiStatus, CompletionBackend, OpenAiClient};
pub use cache::{FileSchemaStore, MemorySchemaStore, SchemaStore};
pub use config::{ConfigLocation, ConfigStore, ConnectionSummary, StoredConnection};
pub use engine::postgres::PostgresEngine;
pub use engine::{CellValue, ConnectionConfig, DatabaseEngine, QueryResult, Row};
pub use error::{LensError, Result};
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use safety::SafeSql;
pub use schema::{
    Column, EntityType, EnumType, ExtractedSchema, Index, Relationship, Table, TypeProperty,
};
pub use service::{AskResponse, Lens, PostgresLens};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_api_exports() {
        let config =
            ConnectionConfig::new("localhost", engine::DEFAULT_PORT, "app", "reader", "secret");
        assert_eq!(config.port, 5432);
        assert!(safety::check("SELECT 1").is_ok());
        assert_eq!(LensError::AiUnavailable.error_code(), "AI_ERROR");
    }
}
