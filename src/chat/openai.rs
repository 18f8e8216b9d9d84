//! OpenAI-compatible chat completion backend

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ChatBackend, ChatMessage, ChatReply};
use crate::config::ChatConfig;
use crate::error::{Error, Result};

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
}

/// Chat completions over HTTPS with a bearer key
pub struct OpenAiChat {
    client: reqwest::Client,
    api_url: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiChat {
    pub fn new(config: &ChatConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to build chat HTTP client, using defaults");
                reqwest::Client::new()
            });
        let api_key = config.resolve_api_key();
        if api_key.is_none() {
            tracing::warn!(env = %config.api_key_env, "No chat API key found; remote chat will fail");
        }
        Self {
            client,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            api_key,
            api_key_env: config.api_key_env.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatReply> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            Error::Chat(format!("API key not set (export {})", self.api_key_env))
        })?;

        let payload = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Chat(format!("Request to chat service failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(Error::Chat(format!("Chat service returned {}: {}", status, snippet)));
        }

        let result: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Chat(format!("Failed to parse chat response: {}", e)))?;
        let content = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::Chat("Chat service returned no content".to_string()))?;

        Ok(ChatReply {
            content,
            model: result.model.unwrap_or_else(|| self.model.clone()),
            total_tokens: result.usage.map(|u| u.total_tokens),
        })
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_fails_without_network() {
        let config = ChatConfig {
            api_key_env: "CHATVAULT_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            ..ChatConfig::default()
        };
        let chat = OpenAiChat::new(&config);
        let err = chat
            .complete(&[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Chat(msg) if msg.contains("CHATVAULT_TEST_KEY_THAT_IS_NOT_SET")));
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"model":"gpt-4o-mini","choices":[{"message":{"role":"assistant","content":"Hello!"}}],"usage":{"total_tokens":12}}"#;
        let parsed: CompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Hello!"));
        assert_eq!(parsed.usage.unwrap().total_tokens, 12);
    }

    #[test]
    fn test_request_shape() {
        let messages = [ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let req = CompletionRequest {
            model: "m",
            messages: &messages,
            temperature: 0.7,
            max_tokens: 10,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "hi");
        assert_eq!(value["max_tokens"], 10);
    }
}
