//! Text-to-SQL Generation
//!
//! Sends the schema summary and a question to a [`CompletionBackend`] and
//! parses the `{"sql": ..., "explanation": ...}` reply. The statement that comes
//! back is a candidate only; callers must gate it with [`crate::safety::check`].

use serde::{Deserialize, Serialize};

use crate::ai::prompt::build_schema_summary;
use crate::ai::CompletionBackend;
use crate::error::{LensError, Result};
use crate::schema::ExtractedSchema;

/// Fixed instruction constraining the backend to a single read
pub const SYSTEM_PROMPT: &str = "\
You are a PostgreSQL SQL query generator. Given a database schema and a natural language \
question, generate a SELECT query that answers the question.

Rules:
- ONLY generate SELECT queries. Never generate INSERT, UPDATE, DELETE, DROP, or any DDL.
- Use proper PostgreSQL syntax.
- Return ONLY valid SQL, no markdown or explanation in the SQL field.
- If you cannot answer the question with the given schema, explain why.

Respond in this exact JSON format:
{\"sql\": \"SELECT ...\", \"explanation\": \"Brief explanation of what the query does\"}";

/// Candidate statement proposed by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSql {
    pub sql: String,
    pub explanation: String,
}

/// Generator bound to one backend for the lifetime of a command
pub struct SqlGenerator<'a, B> {
    backend: &'a B,
}

impl<'a, B: CompletionBackend + Sync> SqlGenerator<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Ask the backend for a statement answering `question` over `schema`
    pub async fn generate(&self, schema: &ExtractedSchema, question: &str) -> Result<GeneratedSql> {
        let user = user_message(schema, question);
        let content = self.backend.complete(SYSTEM_PROMPT, &user).await?;
        parse_generation(&content)
    }
}

/// User message: summary, blank line, question
#[must_use]
pub fn user_message(schema: &ExtractedSchema, question: &str) -> String {
    format!("Schema:\n{}\n\nQuestion: {question}", build_schema_summary(schema))
}

#[derive(Deserialize)]
struct RawGeneration {
    sql: Option<String>,
    explanation: Option<String>,
}

/// Parse the backend's reply into a [`GeneratedSql`]
///
/// The reply must be a JSON object with a non-blank `sql` string. A missing
/// `explanation` is tolerated and read as empty.
pub fn parse_generation(content: &str) -> Result<GeneratedSql> {
    let raw: RawGeneration = serde_json::from_str(content.trim()).map_err(|e| {
        LensError::generation_failed(format!("Response was not the expected JSON object: {e}"))
    })?;

    let sql = raw
        .sql
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| LensError::generation_failed("Response did not include a SQL statement"))?;

    Ok(GeneratedSql {
        sql,
        explanation: raw.explanation.unwrap_or_default(),
    })
}
