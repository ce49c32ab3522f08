//! MCP (Model Context Protocol) Server
//!
//! This module implements an MCP server using manual JSON-RPC 2.0 over stdio.
//!
//! # Architecture
//!
//! - **Transport**: JSON-RPC 2.0 over stdio (line-based)
//! - **Dependencies**: `serde_json`, `schemars` and anyhow (no MCP-specific crates)
//! - **Protocol**: `initialize`, `tools/list`, `tools/call`
//!
//! # MCP Tools
//!
//! - `connect` - Probe and save a target database connection
//! - `extract` - Extract and cache the schema snapshot of a saved connection
//! - `ask` - Answer a natural-language question with a guarded read-only query
//! - `ai_status` - Report whether text-to-SQL is configured
//!
//! Tool results carry the same JSON envelopes as the CLI. A failed operation is
//! returned as a tool result with `isError: true`; the server keeps running.
//!
//! # Usage
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "schemalens": { "command": "schemalens", "args": ["mcp"] }
//!   }
//! }
//! ```

use std::io::{self, BufRead, Write};
use std::time::Instant;

use anyhow::{anyhow, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ai::CompletionBackend;
use crate::cache::SchemaStore;
use crate::config::{ConfigLocation, StoredConnection};
use crate::engine::{ConnectionConfig, DatabaseEngine, DEFAULT_PORT};
use crate::error::LensError;
use crate::output::{ErrorEnvelope, Metadata, SuccessEnvelope};
use crate::service::{AskResponse, Lens};

// ============================================================================
// JSON-RPC 2.0 Structures
// ============================================================================

/// JSON-RPC 2.0 Request
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn result(id: Option<Value>, value: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(value),
            error: None,
        }
    }

    fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError { code, message }),
        }
    }
}

// ============================================================================
// MCP Tool Result Structures
// ============================================================================

/// Text content block for MCP tool results
#[derive(Debug, Serialize)]
struct TextContent {
    #[serde(rename = "type")]
    content_type: String,
    text: String,
}

/// MCP tool call result
#[derive(Debug, Serialize)]
struct CallToolResult {
    content: Vec<TextContent>,
    #[serde(rename = "isError")]
    is_error: bool,
}

impl CallToolResult {
    fn envelope(envelope: &impl Serialize, is_error: bool) -> Result<Value> {
        let text = serde_json::to_string_pretty(envelope)?;
        let result = Self {
            content: vec![TextContent {
                content_type: "text".to_string(),
                text,
            }],
            is_error,
        };
        Ok(serde_json::to_value(result)?)
    }

    fn from_outcome<T: Serialize>(
        command: &str,
        outcome: crate::error::Result<T>,
        start: Instant,
    ) -> Result<Value> {
        let elapsed = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(data) => {
                let envelope = SuccessEnvelope::new(command, data, Metadata::new(elapsed));
                Self::envelope(&envelope, false)
            }
            Err(e) => Self::envelope(&ErrorEnvelope::from_error(command, &e), true),
        }
    }

    /// Answers also report how many rows the query returned
    fn from_answer(outcome: crate::error::Result<AskResponse>, start: Instant) -> Result<Value> {
        let elapsed = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(answer) => {
                let meta = Metadata::with_rows(elapsed, answer.row_count);
                Self::envelope(&SuccessEnvelope::new("ask", answer, meta), false)
            }
            Err(e) => Self::envelope(&ErrorEnvelope::from_error("ask", &e), true),
        }
    }
}

// ============================================================================
// Tool Arguments
// ============================================================================

/// Where a saved connection is written
#[derive(Debug, Clone, Copy, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SaveLocation {
    /// `.schemalens/config.json` in the current project
    #[default]
    Local,
    /// `~/.config/schemalens/connections.json`
    Global,
}

impl From<SaveLocation> for ConfigLocation {
    fn from(value: SaveLocation) -> Self {
        match value {
            SaveLocation::Local => Self::Local,
            SaveLocation::Global => Self::Global,
        }
    }
}

/// Probe a PostgreSQL database and save it under a name. Nothing is saved if
/// the database cannot be reached. NEVER guess credentials; ask the user.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ConnectArgs {
    /// Connection name used by the other tools
    pub name: String,
    /// Database host
    pub host: String,
    /// Database port (default 5432)
    pub port: Option<u16>,
    /// Database name
    pub database: String,
    /// Database user
    pub user: String,
    /// Password, stored in the config file
    pub password: Option<String>,
    /// Environment variable holding the password (preferred over `password`)
    pub password_env: Option<String>,
    /// Accept TLS certificates that fail verification
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Where to save the connection
    #[serde(default)]
    pub save: SaveLocation,
}

/// Extract the schema of a saved connection and cache it. Required before `ask`.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ExtractArgs {
    /// Saved connection name (default connection if omitted)
    pub connection: Option<String>,
}

/// Answer a natural-language question by generating a read-only SELECT,
/// checking it, and running it in a read-only transaction.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct AskArgs {
    /// The question, in plain language
    pub question: String,
    /// Saved connection name (default connection if omitted)
    pub connection: Option<String>,
}

/// Report whether a language-model backend is configured.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct AiStatusArgs {}

fn tool<T: JsonSchema>(name: &str) -> Result<Value> {
    let schema = schemars::schema_for!(T);
    let description = schema
        .schema
        .metadata
        .as_ref()
        .and_then(|m| m.description.clone())
        .unwrap_or_default();
    let mut input_schema = serde_json::to_value(&schema)?;
    if let Some(obj) = input_schema.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
        obj.remove("description");
    }
    Ok(serde_json::json!({
        "name": name,
        "description": description,
        "inputSchema": input_schema
    }))
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: &Value) -> crate::error::Result<T> {
    let args = if args.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        args.clone()
    };
    serde_json::from_value(args).map_err(|e| LensError::invalid_input(e.to_string()))
}

// ============================================================================
// MCP Server
// ============================================================================

/// Start the MCP server
///
/// Reads JSON-RPC requests from stdin, one per line, and writes one response
/// line per request to stdout.
///
/// # Errors
///
/// Returns an error if stdio communication fails.
#[allow(clippy::future_not_send)]
pub async fn serve<E, S, B>(lens: &Lens<E, S, B>) -> Result<()>
where
    E: DatabaseEngine,
    S: SchemaStore,
    B: CompletionBackend + Sync,
{
    let stdin = io::stdin();
    let reader = stdin.lock();
    let mut stdout = io::stdout();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
            Ok(request) => handle_request(lens, request).await,
            Err(e) => JsonRpcResponse::error(None, -32700, format!("Parse error: {e}")),
        };

        // Notifications get no response
        if response.id.is_none() && response.error.is_none() {
            continue;
        }

        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        stdout.flush()?;
    }

    Ok(())
}

async fn handle_request<E, S, B>(
    lens: &Lens<E, S, B>,
    request: JsonRpcRequest,
) -> JsonRpcResponse
where
    E: DatabaseEngine,
    S: SchemaStore,
    B: CompletionBackend + Sync,
{
    tracing::debug!(method = %request.method, "mcp request");

    let result = match request.method.as_str() {
        "initialize" => handle_initialize(),
        "tools/list" => handle_list_tools(),
        "tools/call" => handle_call_tool(lens, request.params).await,
        method if method.starts_with("notifications/") => Ok(Value::Null),
        _ => Err(anyhow!("Unknown method: {}", request.method)),
    };

    match result {
        Ok(value) => JsonRpcResponse::result(request.id, value),
        Err(e) => JsonRpcResponse::error(request.id, -32603, e.to_string()),
    }
}

// ============================================================================
// MCP Protocol Handlers
// ============================================================================

fn handle_initialize() -> Result<Value> {
    Ok(serde_json::json!({
        "protocolVersion": "2024-11-05",
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": "schemalens",
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

fn handle_list_tools() -> Result<Value> {
    Ok(serde_json::json!({
        "tools": [
            tool::<ConnectArgs>("connect")?,
            tool::<ExtractArgs>("extract")?,
            tool::<AskArgs>("ask")?,
            tool::<AiStatusArgs>("ai_status")?,
        ]
    }))
}

async fn handle_call_tool<E, S, B>(lens: &Lens<E, S, B>, params: Option<Value>) -> Result<Value>
where
    E: DatabaseEngine,
    S: SchemaStore,
    B: CompletionBackend + Sync,
{
    let params = params.ok_or_else(|| anyhow!("Missing params"))?;
    let name = params["name"]
        .as_str()
        .ok_or_else(|| anyhow!("Missing tool name"))?;
    let arguments = &params["arguments"];
    let start = Instant::now();

    match name {
        "connect" => {
            let outcome = match parse_args::<ConnectArgs>(arguments) {
                Ok(args) => {
                    let location = ConfigLocation::from(args.save);
                    let stored = StoredConnection::new(
                        ConnectionConfig {
                            host: args.host,
                            port: args.port.unwrap_or(DEFAULT_PORT),
                            database: args.database,
                            user: args.user,
                            password: args.password,
                            accept_invalid_certs: args.accept_invalid_certs,
                        },
                        args.password_env,
                    );
                    lens.register_connection(&args.name, stored, location).await
                }
                Err(e) => Err(e),
            };
            CallToolResult::from_outcome("connect", outcome, start)
        }
        "extract" => {
            let outcome = match parse_args::<ExtractArgs>(arguments) {
                Ok(args) => lens.extract(args.connection.as_deref()).await,
                Err(e) => Err(e),
            };
            CallToolResult::from_outcome("extract", outcome, start)
        }
        "ask" => {
            let outcome = match parse_args::<AskArgs>(arguments) {
                Ok(args) => lens.ask(args.connection.as_deref(), &args.question).await,
                Err(e) => Err(e),
            };
            CallToolResult::from_answer(outcome, start)
        }
        "ai_status" => CallToolResult::from_outcome("ai_status", Ok(lens.ai_status()), start),
        _ => Err(anyhow!("Unknown tool: {name}")),
    }
}
