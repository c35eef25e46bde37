//! Language-model oracle
//!
//! One OpenAI-compatible chat-completions client behind the [`Oracle`]
//! trait, so every phase that consults the model (Think, intel, pattern
//! extraction, genesis) can be tested with a scripted fake.
//!
//! Structured output comes back as a JSON array embedded in free text;
//! [`extract_json_array`] slices the outermost brackets and decodes,
//! keeping "the model said nothing usable" (`NoJsonFound`) distinct from
//! "the model said something malformed" (`SchemaInvalid`).

use autopilot_core::OracleError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One oracle round-trip.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub system: String,
    pub user: String,
    /// Ask the provider to ground the completion in web search results
    /// (external-intelligence queries only).
    pub web_search: bool,
}

impl OracleRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            web_search: false,
        }
    }

    pub fn with_web_search(mut self) -> Self {
        self.web_search = true;
        self
    }
}

#[async_trait::async_trait]
pub trait Oracle: Send + Sync {
    /// Raw completion text. Empty completions are an error.
    async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

/// Slice the outermost `[` .. `]` from a completion and decode it as a
/// JSON array. Callers decode individual items themselves so that one
/// malformed item does not discard the rest.
pub fn extract_json_array(content: &str) -> Result<Vec<Value>, OracleError> {
    if content.trim().is_empty() {
        return Err(OracleError::Empty);
    }
    let start = content.find('[').ok_or(OracleError::NoJsonFound)?;
    let end = content
        .rfind(']')
        .filter(|&end| end > start)
        .ok_or(OracleError::NoJsonFound)?;
    match serde_json::from_str::<Value>(&content[start..=end]) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(other) => Err(OracleError::SchemaInvalid(format!(
            "expected array, got {}",
            kind_of(&other)
        ))),
        Err(e) => Err(OracleError::SchemaInvalid(e.to_string())),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// OpenAI-compatible chat-completions client.
#[derive(Debug, Clone)]
pub struct OracleClient {
    api_key: Option<String>,
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    http_client: reqwest::Client,
}

impl OracleClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature: 0.3,
            max_tokens: 2048,
            http_client: reqwest::Client::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    web_search: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[async_trait::async_trait]
impl Oracle for OracleClient {
    async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user.clone(),
                },
            ],
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
            web_search: request.web_search,
        };

        let mut builder = self
            .http_client
            .post(self.endpoint())
            .header("Content-Type", "application/json");
        if let Some(api_key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = builder
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(OracleError::Http(format!("{status}: {detail}")));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Http(format!("bad completion payload: {e}")))?;

        let content = completion
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(OracleError::Empty);
        }
        Ok(content)
    }
}
