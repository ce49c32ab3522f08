//! Language-Model Backend
//!
//! The backend turns a schema summary plus a question into a candidate SQL
//! statement. It is untrusted: nothing it returns reaches the database without
//! passing [`crate::safety::check`].
//!
//! # Configuration (environment)
//! - `OPENAI_API_KEY`: enables the backend; without it every generation fails
//!   with `AI_ERROR`
//! - `OPENAI_MODEL`: chat model (default `gpt-4o-mini`)
//! - `OPENAI_BASE_URL`: any OpenAI-compatible endpoint
//!   (default `https://api.openai.com/v1`)
//! - `SCHEMALENS_AI_TIMEOUT_SECS`: request timeout in seconds (default 60)
//!
//! One [`OpenAiClient`] is built from [`AiSettings`] when a command starts and
//! is lent to [`generator::SqlGenerator`] by reference.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{LensError, Result};

pub mod generator;
pub mod prompt;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Backend settings resolved from the environment
#[derive(Clone)]
pub struct AiSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl AiSettings {
    /// Resolve settings from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve settings through an arbitrary variable lookup
    ///
    /// Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let timeout = match var("SCHEMALENS_AI_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    LensError::config_error(format!(
                        "SCHEMALENS_AI_TIMEOUT_SECS must be a whole number of seconds, got '{raw}'"
                    ))
                })?;
                Duration::from_secs(secs)
            }
            None => DEFAULT_TIMEOUT,
        };

        Ok(Self {
            api_key: var("OPENAI_API_KEY"),
            model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: var("OPENAI_BASE_URL").map_or_else(
                || DEFAULT_BASE_URL.to_string(),
                |u| u.trim_end_matches('/').to_string(),
            ),
            timeout,
        })
    }

    /// Whether a backend credential is configured
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.api_key.is_some()
    }

    #[must_use]
    pub fn status(&self) -> AiStatus {
        AiStatus {
            enabled: self.enabled(),
            model: self.model.clone(),
        }
    }
}

impl std::fmt::Debug for AiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Availability of the language-model backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiStatus {
    pub enabled: bool,
    pub model: String,
}

/// A chat-completion backend
///
/// Given a system instruction and a user message, returns the raw content of
/// the model's reply. Parsing that content is the caller's job.
pub trait CompletionBackend {
    fn complete(&self, system: &str, user: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Client for OpenAI-compatible `/chat/completions` endpoints
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiClient {
    /// Build a client from settings
    ///
    /// # Errors
    /// * `AiUnavailable` if no API key is configured
    pub fn from_settings(settings: &AiSettings) -> Result<Self> {
        let api_key = settings.api_key.clone().ok_or(LensError::AiUnavailable)?;

        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| {
                LensError::generation_failed(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            api_key,
            model: settings.model.clone(),
            endpoint: format!("{}/chat/completions", settings.base_url),
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Request body: deterministic sampling, JSON-object responses only
fn chat_body(model: &str, system: &str, user: &str) -> serde_json::Value {
    json!({
        "model": model,
        "temperature": 0,
        "response_format": { "type": "json_object" },
        "messages": [
            { "role": "system", "content": system },
            { "role": "user", "content": user }
        ]
    })
}

impl CompletionBackend for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = chat_body(&self.model, system, user);

        tracing::debug!(model = %self.model, endpoint = %self.endpoint, "requesting completion");

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                LensError::generation_failed(format!("Failed to reach language model: {e}"))
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(LensError::generation_failed(format!(
                "Language model returned {status}: {text}"
            )));
        }

        let out: ChatResponse = resp
            .json()
            .await
            .map_err(|e| LensError::generation_failed(format!("Invalid completion payload: {e}")))?;

        out.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LensError::generation_failed("Empty response from language model"))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_key() {
        let settings = AiSettings::from_lookup(lookup(&[])).unwrap();
        assert!(!settings.enabled());
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.timeout, DEFAULT_TIMEOUT);
        assert_eq!(
            settings.status(),
            AiStatus {
                enabled: false,
                model: DEFAULT_MODEL.to_string(),
            }
        );
    }

    #[test]
    fn test_overrides() {
        let settings = AiSettings::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "gpt-4o"),
            ("OPENAI_BASE_URL", "http://localhost:11434/v1/"),
            ("SCHEMALENS_AI_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert!(settings.enabled());
        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(settings.base_url, "http://localhost:11434/v1");
        assert_eq!(settings.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_blank_key_is_disabled() {
        let settings = AiSettings::from_lookup(lookup(&[("OPENAI_API_KEY", "  ")]))
            .unwrap();
        assert!(!settings.enabled());
    }

    #[test]
    fn test_bad_timeout_is_config_error() {
        let err = AiSettings::from_lookup(lookup(&[("SCHEMALENS_AI_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_client_requires_key() {
        let settings = AiSettings::from_lookup(lookup(&[])).unwrap();
        let err = OpenAiClient::from_settings(&settings).err().unwrap();
        assert!(matches!(err, LensError::AiUnavailable));
    }

    #[test]
    fn test_client_endpoint() {
        let settings = AiSettings::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")]))
            .unwrap();
        let client = OpenAiClient::from_settings(&settings).unwrap();
        assert_eq!(client.endpoint, "https://api.openai.com/v1/chat/completions");
        assert_eq!(client.model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_debug_redacts_key() {
        let settings = AiSettings::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-secret")]))
            .unwrap();
        assert!(!format!("{settings:?}").contains("sk-secret"));
    }

    #[test]
    fn test_chat_body_is_deterministic_json_mode() {
        let body = chat_body("gpt-4o-mini", "sys", "usr");
        assert_eq!(body["temperature"], 0);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "usr");
    }
}
