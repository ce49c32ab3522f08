//! Schemalens CLI Entry Point
//!
//! Subcommands:
//! - `connect` - Probe a PostgreSQL database and save the connection
//! - `extract` - Extract and cache a schema snapshot
//! - `ask` - Answer a question with a guarded read-only query
//! - `schema` - Print the cached snapshot
//! - `list` / `remove` - Manage saved connections
//! - `ai-status` - Report whether text-to-SQL is configured
//! - `mcp` - MCP server mode (hidden, for AI agent integration)
//!
//! All output to stdout is JSON-only. Logs go to stderr.

use std::io::IsTerminal;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use schemalens::config::{ConfigLocation, StoredConnection};
use schemalens::engine::{ConnectionConfig, DEFAULT_PORT};
use schemalens::error::{LensError, Result};
use schemalens::output::{ErrorEnvelope, Metadata, SuccessEnvelope};
use schemalens::service::PostgresLens;

/// Schemalens - schema introspection and guarded text-to-SQL for PostgreSQL
#[derive(Parser)]
#[command(name = "schemalens")]
#[command(about = "Introspect PostgreSQL schemas and answer questions with read-only SQL")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe a database and save the connection (nothing is saved if the probe fails)
    Connect(ConnectArgs),

    /// Extract the schema of a saved connection and cache it
    Extract {
        /// Saved connection name (default connection if omitted)
        #[arg(long)]
        name: Option<String>,
    },

    /// Ask a question in plain language
    Ask {
        /// The question
        question: String,

        /// Saved connection name (default connection if omitted)
        #[arg(long)]
        name: Option<String>,
    },

    /// Print the cached schema snapshot
    Schema {
        /// Saved connection name (default connection if omitted)
        #[arg(long)]
        name: Option<String>,
    },

    /// List saved connections
    List,

    /// Remove a saved connection and its cached snapshot
    Remove {
        /// Connection name
        name: String,
    },

    /// Report whether text-to-SQL is configured
    AiStatus,

    /// Start MCP server (hidden from help, for AI agent integration)
    #[command(hide = true)]
    Mcp,
}

#[derive(Args)]
struct ConnectArgs {
    /// Connection name
    #[arg(long, default_value = "default")]
    name: String,

    #[arg(long)]
    host: String,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(long)]
    database: String,

    #[arg(long)]
    user: String,

    /// Password, stored in the config file (prompted for when omitted)
    #[arg(long, conflicts_with = "password_env")]
    password: Option<String>,

    /// Read the password from this environment variable at connect time
    #[arg(long)]
    password_env: Option<String>,

    /// Accept TLS certificates that fail verification
    #[arg(long)]
    accept_invalid_certs: bool,

    /// Save to the global config instead of the project
    #[arg(long)]
    global: bool,
}

impl ConnectArgs {
    fn into_stored(self) -> Result<(String, StoredConnection, ConfigLocation)> {
        let password = match (self.password, &self.password_env) {
            (Some(password), _) => Some(password),
            (None, None) if std::io::stdin().is_terminal() => {
                let entered = dialoguer::Password::new()
                    .with_prompt("Password")
                    .allow_empty_password(true)
                    .interact()
                    .map_err(|e| {
                        LensError::invalid_input(format!("Failed to read password: {e}"))
                    })?;
                Some(entered).filter(|p| !p.is_empty())
            }
            (None, _) => None,
        };

        let config = ConnectionConfig {
            host: self.host,
            port: self.port,
            database: self.database,
            user: self.user,
            password,
            accept_invalid_certs: self.accept_invalid_certs,
        };
        let location = if self.global {
            ConfigLocation::Global
        } else {
            ConfigLocation::Local
        };

        Ok((self.name, StoredConnection::new(config, self.password_env), location))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "schemalens=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let start = Instant::now();

    let lens = match PostgresLens::from_env() {
        Ok(lens) => lens,
        Err(e) => return emit_error(command_name(&cli.command), &e),
    };

    match cli.command {
        Commands::Connect(args) => {
            let outcome = match args.into_stored() {
                Ok((name, stored, location)) => {
                    lens.register_connection(&name, stored, location).await
                }
                Err(e) => Err(e),
            };
            finish("connect", outcome, start)
        }
        Commands::Extract { name } => finish("extract", lens.extract(name.as_deref()).await, start),
        Commands::Ask { question, name } => match lens.ask(name.as_deref(), &question).await {
            Ok(answer) => {
                let meta = Metadata::with_rows(elapsed_ms(start), answer.row_count);
                emit(&SuccessEnvelope::new("ask", answer, meta))
            }
            Err(e) => emit_error("ask", &e),
        },
        Commands::Schema { name } => finish("schema", lens.cached_schema(name.as_deref()), start),
        Commands::List => finish("list", lens.list_connections(), start),
        Commands::Remove { name } => finish("remove", lens.remove_connection(&name), start),
        Commands::AiStatus => finish("ai_status", Ok(lens.ai_status()), start),
        Commands::Mcp => match schemalens::mcp::serve(&lens).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = %e, "mcp server stopped");
                ExitCode::FAILURE
            }
        },
    }
}

const fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Connect(_) => "connect",
        Commands::Extract { .. } => "extract",
        Commands::Ask { .. } => "ask",
        Commands::Schema { .. } => "schema",
        Commands::List => "list",
        Commands::Remove { .. } => "remove",
        Commands::AiStatus => "ai_status",
        Commands::Mcp => "mcp",
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn finish<T: Serialize>(command: &str, outcome: Result<T>, start: Instant) -> ExitCode {
    match outcome {
        Ok(data) => emit(&SuccessEnvelope::new(command, data, Metadata::new(elapsed_ms(start)))),
        Err(e) => emit_error(command, &e),
    }
}

fn emit_error(command: &str, err: &LensError) -> ExitCode {
    emit(&ErrorEnvelope::from_error(command, err));
    ExitCode::FAILURE
}

fn emit(envelope: &impl Serialize) -> ExitCode {
    match serde_json::to_string_pretty(envelope) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize output");
            ExitCode::FAILURE
        }
    }
}
