//! OpenAI-compatible chat completion backend.
//!
//! Speaks the `/v1/chat/completions` protocol (OpenAI, Azure front-ends,
//! Ollama's compatibility endpoint). Rate-limited calls are retried with
//! exponential backoff per the engine-wide policy.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use consulta_core::defaults::{
    DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL, ENV_LLM_API_KEY, ENV_LLM_BASE_URL, ENV_LLM_MODEL,
    LLM_TIMEOUT_SECS,
};
use consulta_core::{ChatBackend, ChatMessage, CompletionParams, Error, Result};

use crate::retry::{with_retry, RetryPolicy};

/// Chat generation backend for OpenAI-compatible servers.
pub struct OpenAiChatBackend {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: Client,
    timeout: Duration,
    retry: RetryPolicy,
}

impl OpenAiChatBackend {
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Self {
        Self {
            base_url,
            api_key,
            model,
            client: Client::new(),
            timeout: Duration::from_secs(LLM_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }

    /// Create from environment variables with defaults.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var(ENV_LLM_BASE_URL).unwrap_or_else(|_| DEFAULT_LLM_BASE_URL.to_string());
        let api_key = std::env::var(ENV_LLM_API_KEY).ok().filter(|k| !k.is_empty());
        let model = std::env::var(ENV_LLM_MODEL).unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string());
        info!(base_url = %base_url, model = %model, "Initializing chat backend");
        Self::new(base_url, api_key, model)
    }

    /// Override the retry policy (tests use a fast one).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn complete_once(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stop: params.stop.clone(),
            response_format: None,
        };
        if params.json_mode {
            body.response_format = Some(ResponseFormat {
                format_type: "json_object".to_string(),
            });
        }

        let mut request = self.client.post(&url).json(&body).timeout(self.timeout);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(format!("LLM call exceeded {:?}", self.timeout))
            } else {
                Error::ProviderUnavailable(format!("LLM request failed: {}", e))
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RateLimited(format!("LLM rate limited: {}", body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return if status.is_client_error() {
                Err(Error::InvalidInput(format!(
                    "LLM rejected prompt ({}): {}",
                    status, body
                )))
            } else {
                Err(Error::ProviderUnavailable(format!(
                    "LLM returned {}: {}",
                    status, body
                )))
            };
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("Bad LLM response body: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::ProviderUnavailable("LLM returned no choices".to_string()))
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl ChatBackend for OpenAiChatBackend {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> Result<String> {
        let start = Instant::now();
        let result = with_retry(&self.retry, "chat_completion", || {
            self.complete_once(messages, params)
        })
        .await;

        debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis() as u64,
            success = result.is_ok(),
            "Chat completion finished"
        );
        result
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models", self.base_url);
        let mut request = self.client.get(&url).timeout(Duration::from_secs(5));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        match request.send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_construction() {
        let backend = OpenAiChatBackend::new(
            "http://localhost:11434/v1".to_string(),
            None,
            "gpt-4o-mini".to_string(),
        );
        assert_eq!(backend.model_name(), "gpt-4o-mini");
        assert_eq!(backend.timeout, Duration::from_secs(LLM_TIMEOUT_SECS));
    }

    #[test]
    fn test_request_serialization_with_json_mode() {
        let req = ChatCompletionRequest {
            model: "m".to_string(),
            messages: vec![ChatMessage::user("hola")],
            temperature: 0.2,
            max_tokens: 100,
            stop: None,
            response_format: Some(ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("stop").is_none());
    }

    #[test]
    fn test_response_deserialization() {
        let json = r#"{
            "choices": [
                {"message": {"role": "assistant", "content": "hola"}}
            ]
        }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content, "hola");
    }

    #[test]
    fn test_empty_choices() {
        let json = r#"{"choices": []}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.choices.is_empty());
    }
}
