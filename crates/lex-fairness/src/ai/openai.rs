//! OpenAI chat-completions provider.
//!
//! This module provides the [`OpenAiProvider`] which implements the
//! [`TextGenerator`] trait for the OpenAI API (<https://platform.openai.com/>).

use super::{ChatPrompt, TextGenerator};
use anyhow::{Result, anyhow};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default OpenAI chat-completions endpoint.
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Default model for explanations.
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Default timeout for API requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Environment variable consulted when no key is passed explicitly.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<Choice>>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<Message>,
}

/// Configuration for the OpenAI provider.
///
/// `temperature` and `max_tokens` are left to the API's defaults unless set.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// The model to use (e.g., "gpt-3.5-turbo", "gpt-4o").
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Base URL for the API (useful for proxies or compatible servers).
    pub base_url: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl OpenAiConfig {
    /// Create a new configuration builder.
    pub fn builder() -> OpenAiConfigBuilder {
        OpenAiConfigBuilder::default()
    }
}

/// Builder for [`OpenAiConfig`].
#[derive(Default)]
pub struct OpenAiConfigBuilder {
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
    base_url: Option<String>,
}

impl OpenAiConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the temperature (0.0 - 2.0).
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the request timeout in seconds.
    pub fn timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn build(self) -> OpenAiConfig {
        OpenAiConfig {
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout_secs: self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            base_url: self.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

/// Pick the API key: an explicit non-empty key wins, then the environment.
fn select_api_key(explicit: Option<&str>, from_env: Option<String>) -> Result<String> {
    explicit
        .filter(|key| !key.trim().is_empty())
        .map(str::to_string)
        .or(from_env.filter(|key| !key.trim().is_empty()))
        .ok_or_else(|| anyhow!("Please set your OpenAI API KEY."))
}

/// OpenAI provider for generating explanation text.
///
/// # Example
///
/// ```rust,ignore
/// use lex_fairness::ai::{OpenAiConfig, OpenAiProvider};
///
/// // Key from OPENAI_API_KEY
/// let provider = OpenAiProvider::new(None)?;
///
/// let config = OpenAiConfig::builder().model("gpt-4o").build();
/// let provider = OpenAiProvider::with_config(Some("sk-..."), config)?;
/// ```
pub struct OpenAiProvider {
    api_key: String,
    config: OpenAiConfig,
    client: Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OpenAiProvider {
    /// Create a provider with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no key is given and `OPENAI_API_KEY` is unset, or
    /// if the HTTP client cannot be created.
    pub fn new(api_key: Option<&str>) -> Result<Self> {
        Self::with_config(api_key, OpenAiConfig::default())
    }

    /// Create a provider with custom configuration.
    pub fn with_config(api_key: Option<&str>, config: OpenAiConfig) -> Result<Self> {
        let api_key = select_api_key(api_key, std::env::var(API_KEY_ENV).ok())?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            api_key,
            config,
            client,
        })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn build_request(&self, prompt: &ChatPrompt) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: prompt.system.clone(),
                },
                Message {
                    role: "user".to_string(),
                    content: prompt.user.clone(),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    fn call_api(&self, request: &ChatRequest) -> Result<String> {
        let response = self
            .client
            .post(&self.config.base_url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "OpenAI API Error {}: {}",
                response.status(),
                response.text()?
            ));
        }

        let result: ChatResponse = response.json()?;
        extract_content(result)
    }
}

/// Text of the first choice's message.
fn extract_content(response: ChatResponse) -> Result<String> {
    response
        .choices
        .and_then(|choices| choices.into_iter().next())
        .and_then(|choice| choice.message)
        .map(|message| message.content)
        .ok_or_else(|| anyhow!("No response content from OpenAI API"))
}

impl TextGenerator for OpenAiProvider {
    fn generate(&self, prompt: &ChatPrompt) -> Result<String> {
        debug!(
            "Requesting completion from {} ({} prompt chars)",
            self.config.model,
            prompt.system.len() + prompt.user.len()
        );
        self.call_api(&self.build_request(prompt))
    }

    fn name(&self) -> &str {
        "OpenAI"
    }

    fn model(&self) -> Option<&str> {
        Some(&self.config.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // API key selection
    // -------------------------------------------------------------------------

    #[test]
    fn test_explicit_key_wins() {
        let key = select_api_key(Some("sk-arg"), Some("sk-env".to_string())).unwrap();
        assert_eq!(key, "sk-arg");
    }

    #[test]
    fn test_env_key_used_when_absent_or_blank() {
        assert_eq!(select_api_key(None, Some("sk-env".to_string())).unwrap(), "sk-env");
        assert_eq!(select_api_key(Some("  "), Some("sk-env".to_string())).unwrap(), "sk-env");
    }

    #[test]
    fn test_missing_key_message() {
        let err = select_api_key(None, None).unwrap_err();
        assert_eq!(err.to_string(), "Please set your OpenAI API KEY.");
        assert!(select_api_key(Some(""), Some(String::new())).is_err());
    }

    // -------------------------------------------------------------------------
    // Response parsing
    // -------------------------------------------------------------------------

    #[test]
    fn test_extract_content_from_first_choice() {
        let json = r#"{
            "choices": [
                {"message": {"role": "assistant", "content": "Age drove the prediction."}},
                {"message": {"role": "assistant", "content": "ignored"}}
            ]
        }"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(extract_content(response).unwrap(), "Age drove the prediction.");
    }

    #[test]
    fn test_extract_content_empty_or_null_choices() {
        for json in [r#"{"choices": []}"#, r#"{"choices": null}"#, r#"{"choices": [{"message": null}]}"#] {
            let response: ChatResponse = serde_json::from_str(json).unwrap();
            assert!(extract_content(response).is_err());
        }
    }

    #[test]
    fn test_parse_malformed_message() {
        let json = r#"{"choices": [{"message": "not an object"}]}"#;
        let result: std::result::Result<ChatResponse, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    // -------------------------------------------------------------------------
    // Request and config
    // -------------------------------------------------------------------------

    #[test]
    fn test_request_has_system_then_user() {
        let provider = OpenAiProvider::new(Some("sk-test")).unwrap();
        let request = provider.build_request(&ChatPrompt::new("sys", "usr"));

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "sys");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "usr");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = OpenAiConfig::builder().build();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);

        let config = OpenAiConfig::builder()
            .model("gpt-4o")
            .temperature(0.2)
            .max_tokens(256)
            .timeout_secs(5)
            .base_url("http://localhost:8080/v1/chat/completions")
            .build();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.temperature, Some(0.2));
        assert_eq!(config.max_tokens, Some(256));
        assert_eq!(config.timeout_secs, 5);
    }

    #[test]
    fn test_provider_name_and_model() {
        let provider = OpenAiProvider::new(Some("sk-test")).unwrap();
        assert_eq!(provider.name(), "OpenAI");
        assert_eq!(provider.model(), Some("gpt-3.5-turbo"));
        assert!(!format!("{:?}", provider).contains("sk-test"));
    }
}
