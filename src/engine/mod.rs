//! Database Engine Trait and Core Types
//!
//! This module defines the seam between the pipeline and the external database.
//! The `PostgreSQL` implementation lives in [`postgres`].
//!
//! # Stateless Design
//! All trait methods are stateless and take `&ConnectionConfig` as input.
//! Connections are opened, used, and closed within each method call; nothing
//! is pooled across requests because the target database is operator-supplied
//! and not trusted infrastructure.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::Result;
use crate::safety::SafeSql;
use crate::schema::ExtractedSchema;

pub mod postgres;

/// Default `PostgreSQL` port used when the caller omits one
pub const DEFAULT_PORT: u16 = 5432;

/// Default bound for the connection probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection parameters for a target database
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub database: String,

    pub user: String,

    /// Resolved transiently; stored connections may reference an env var instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Negotiate TLS without verifying the server certificate
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub accept_invalid_certs: bool,
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

impl ConnectionConfig {
    /// Create a connection config with TLS verification left to the defaults
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            user: user.into(),
            password: Some(password.into()),
            accept_invalid_certs: false,
        }
    }

    /// Toggle relaxed TLS
    #[must_use]
    pub const fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }
}

// Hand-written so the password never reaches a log line
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

/// One value of a result row
///
/// The row shape of an arbitrary query is only known at run time, so each cell
/// carries its own tag.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    /// Raw bytes, emitted as Base64 in JSON output
    Bytes(Vec<u8>),
    /// JSON/JSONB documents, kept structured
    Nested(serde_json::Value),
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Number(n) => n.serialize(serializer),
            Self::String(s) => serializer.serialize_str(s),
            Self::Bytes(bytes) => {
                use base64::Engine;
                serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            Self::Nested(v) => v.serialize(serializer),
        }
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        Self::Number(v.into())
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// A result row keyed by column name, in result-set column order
pub type Row = IndexMap<String, CellValue>;

/// Tabular result of a read-only statement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    /// Column names in result-set order
    pub columns: Vec<String>,

    /// Rows in the order returned by the database
    pub rows: Vec<Row>,
}

impl QueryResult {
    /// Number of rows returned
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Database engine trait
///
/// Each method is stateless and takes a connection config as input.
pub trait DatabaseEngine {
    /// Probe reachability
    ///
    /// Opens a connection within `timeout`, issues a trivial round-trip, and
    /// closes it. Success or failure only; used as a persistence gate.
    fn probe(
        config: &ConnectionConfig,
        timeout: Duration,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Extract a full snapshot of the target's catalog
    ///
    /// All-or-nothing: any reader failure fails the whole extraction and no
    /// partial snapshot is returned.
    fn extract(config: &ConnectionConfig) -> impl Future<Output = Result<ExtractedSchema>> + Send;

    /// Execute a gated statement inside a read-only transaction
    ///
    /// Opens one dedicated connection, runs the statement, and tears the
    /// connection down regardless of outcome.
    fn execute_read_only(
        config: &ConnectionConfig,
        sql: &SafeSql,
    ) -> impl Future<Output = Result<QueryResult>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_config_defaults() {
        let config: ConnectionConfig = serde_json::from_str(
            r#"{"host":"db.internal","database":"app","user":"reader"}"#,
        )
        .unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.password.is_none());
        assert!(!config.accept_invalid_certs);
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = ConnectionConfig::new("localhost", 5432, "app", "reader", "hunter2");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn test_relaxed_tls_not_serialized_when_off() {
        let config = ConnectionConfig::new("localhost", 5432, "app", "reader", "pw");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("accept_invalid_certs"));

        let json = serde_json::to_string(&config.with_accept_invalid_certs(true)).unwrap();
        assert!(json.contains(r#""accept_invalid_certs":true"#));
    }

    #[test]
    fn test_cell_value_serialization() {
        let row: Row = [
            ("id".to_string(), CellValue::from(7_i64)),
            ("name".to_string(), CellValue::from("Ada")),
            ("active".to_string(), CellValue::from(true)),
            (
                "avatar".to_string(),
                CellValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef]),
            ),
            (
                "meta".to_string(),
                CellValue::Nested(serde_json::json!({"k": [1, 2]})),
            ),
            ("deleted_at".to_string(), CellValue::Null),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["name"], "Ada");
        assert_eq!(json["active"], true);
        assert_eq!(json["avatar"], "3q2+7w==");
        assert_eq!(json["meta"]["k"][1], 2);
        assert!(json["deleted_at"].is_null());
    }

    #[test]
    fn test_row_keeps_column_order() {
        let mut row = Row::new();
        row.insert("zeta".to_string(), CellValue::from(1_i64));
        row.insert("alpha".to_string(), CellValue::from(2_i64));
        row.insert("mid".to_string(), CellValue::Null);

        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"zeta":1,"alpha":2,"mid":null}"#);
    }
}
