//! Ollama HTTP API backend

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ModelClient;
use crate::error::CollaboratorError;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// `POST {base_url}/api/generate` with streaming disabled
#[derive(Debug, Clone)]
pub struct OllamaHttp {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl OllamaHttp {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/api/generate", base_url.trim_end_matches('/')),
            timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ModelClient for OllamaHttp {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, CollaboratorError> {
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CollaboratorError::Timeout(self.timeout.as_secs())
                } else {
                    CollaboratorError::Unavailable(format!("model runner unreachable: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(CollaboratorError::Unavailable(format!(
                "model runner returned {}",
                response.status()
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::BadOutput(format!("unparseable runner reply: {}", e)))?;

        let text = body.response.trim().to_string();
        if text.is_empty() {
            return Err(CollaboratorError::BadOutput("empty answer".to_string()));
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        "ollama-http"
    }
}
