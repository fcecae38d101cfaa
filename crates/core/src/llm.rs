//! Text generation backend over Ollama's `POST {endpoint}/api/generate`.
//!
//! Requests are sent with `stream=false`, so the whole completion arrives in a
//! single JSON envelope whose `response` field carries the text.

use crate::error::ModelError;
use crate::traits::LanguageModel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            temperature: None,
            max_tokens: None,
            timeout: Duration::from_secs(120),
        }
    }
}

pub struct OllamaModel {
    client: reqwest::Client,
    config: ModelConfig,
    url_generate: String,
}

impl OllamaModel {
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        let endpoint = config.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ModelError::InvalidEndpoint(config.endpoint.clone()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ModelError::Unavailable)?;
        let url_generate = format!("{}/api/generate", endpoint.trim_end_matches('/'));

        Ok(Self {
            client,
            config,
            url_generate,
        })
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "GenerateOptions::is_empty")]
    options: GenerateOptions,
}

#[derive(Debug, Default, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

impl GenerateOptions {
    fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.num_predict.is_none()
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let body = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        debug!("POST {}", self.url_generate);
        let response = self
            .client
            .post(&self.url_generate)
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    ModelError::Timeout(self.url_generate.clone())
                } else {
                    ModelError::Unavailable(error)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ModelError::HttpStatus {
                status,
                url: self.url_generate.clone(),
                snippet: text.chars().take(240).collect(),
            });
        }

        let envelope: GenerateResponse = response.json().await.map_err(|error| {
            ModelError::Decode(format!("{error}; ensure `stream=false` is used"))
        })?;

        Ok(envelope.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(endpoint: String) -> ModelConfig {
        ModelConfig {
            endpoint,
            timeout: Duration::from_secs(5),
            ..ModelConfig::default()
        }
    }

    #[tokio::test]
    async fn generate_returns_the_response_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({"model": "llama3.2", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "llama3.2",
                "response": "**Summary:** 14 days.",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let model = OllamaModel::new(config(server.uri())).unwrap();
        let text = model.generate("prompt").await.unwrap();
        assert_eq!(text, "**Summary:** 14 days.");
    }

    #[tokio::test]
    async fn server_errors_are_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let model = OllamaModel::new(config(server.uri())).unwrap();
        let error = model.generate("prompt").await.unwrap_err();
        assert!(matches!(error, ModelError::HttpStatus { .. }));
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn malformed_envelope_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "hi"})))
            .mount(&server)
            .await;

        let model = OllamaModel::new(config(server.uri())).unwrap();
        let error = model.generate("prompt").await.unwrap_err();
        assert!(matches!(error, ModelError::Decode(_)));
        assert!(!error.is_retryable());
    }

    #[test]
    fn endpoint_without_scheme_is_rejected() {
        let result = OllamaModel::new(config("localhost:11434".to_string()));
        assert!(matches!(result, Err(ModelError::InvalidEndpoint(_))));
    }
}
