//! OpenAI-compatible chat/embedding provider over `reqwest`, grounded on the
//! teacher's `llm/external.rs::openai_compatible_generate` (request shape,
//! clear-error-on-non-JSON-body handling) and the original's
//! `_llm.py::ChatCompletion`/`EmbeddingService` (endpoint paths, payload
//! fields).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use super::{ChatClient, EmbeddingClient, Message, ProviderError};

pub struct OpenAiCompatibleClient {
    client: Client,
    base_url: String,
    api_key: String,
    embedding_model: String,
    dimension: usize,
}

impl OpenAiCompatibleClient {
    pub fn new(base_url: String, api_key: String, embedding_model: String, dimension: usize) -> Self {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(15))
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            base_url,
            api_key,
            embedding_model,
            dimension,
        }
    }

    fn classify_status(status: StatusCode) -> super::ErrorKind {
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            super::ErrorKind::Transient
        } else {
            super::ErrorKind::Fatal
        }
    }

    async fn parse_json_response(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<Value, ProviderError> {
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ProviderError::transient(format!("failed to read response body from {endpoint}: {e}"))
        })?;
        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            let preview: String = trimmed.chars().take(200).collect();
            return Err(ProviderError {
                message: format!(
                    "{endpoint} returned non-JSON (HTTP {status}): {preview}"
                ),
                kind: Self::classify_status(status),
            });
        }
        if !status.is_success() {
            return Err(ProviderError {
                message: format!("{endpoint} returned HTTP {status}: {body}"),
                kind: Self::classify_status(status),
            });
        }
        serde_json::from_str(&body).map_err(|e| {
            ProviderError::fatal(format!("failed to parse JSON from {endpoint}: {e}"))
        })
    }
}

#[async_trait]
impl ChatClient for OpenAiCompatibleClient {
    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        system_prompt: Option<&str>,
        history: &[Message],
        max_tokens: Option<u32>,
    ) -> Result<String, ProviderError> {
        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        for turn in history {
            messages.push(json!({"role": turn.role, "content": turn.content}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        let mut body = json!({
            "model": model,
            "messages": messages,
        });
        if let Some(max_tokens) = max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let endpoint = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::transient(format!("request to {endpoint} failed: {e}")))?;

        let value = Self::parse_json_response(response, &endpoint).await?;
        value["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ProviderError::fatal(format!("unexpected chat response shape: {value}")))
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiCompatibleClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let endpoint = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.embedding_model,
            "input": texts,
        });

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::transient(format!("request to {endpoint} failed: {e}")))?;

        let value = Self::parse_json_response(response, &endpoint).await?;
        let data = value["data"]
            .as_array()
            .ok_or_else(|| ProviderError::fatal(format!("unexpected embedding response shape: {value}")))?;

        data.iter()
            .map(|row| {
                row["embedding"]
                    .as_array()
                    .ok_or_else(|| ProviderError::fatal("embedding row missing `embedding` array".into()))?
                    .iter()
                    .map(|v| {
                        v.as_f64()
                            .map(|f| f as f32)
                            .ok_or_else(|| ProviderError::fatal("embedding value not a number".into()))
                    })
                    .collect()
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
