//! Chat/embedding provider contracts (spec §6) and the shared retry wrapper
//! (spec §4.8). Business logic never talks to a provider directly — it goes
//! through `ChatClient`/`EmbeddingClient`, so tests can substitute a stub.

pub mod openai;

use async_trait::async_trait;
use std::time::Duration;

use crate::config::RetryConfig;

/// A single chat turn in conversation history.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Whether a provider error is worth retrying (spec §4.8: transient
/// connection/rate-limit signals only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Fatal,
}

/// A provider error tagged with retryability, so the retry wrapper doesn't
/// need to parse error strings.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
    pub kind: ErrorKind,
}

impl ProviderError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::Transient,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::Fatal,
        }
    }
}

/// `complete(model, prompt, system_prompt?, history?, max_tokens?) -> string`
/// (spec §6's chat provider contract).
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        system_prompt: Option<&str>,
        history: &[Message],
        max_tokens: Option<u32>,
    ) -> Result<String, ProviderError>;
}

/// `embed(texts) -> float32[N][D]` (spec §6's embedding provider contract).
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    fn dimension(&self) -> usize;
}

/// Run `op` with up to `retry.max_attempts` attempts, exponential backoff
/// bounded to `[backoff_min_secs, backoff_max_secs]`, retrying only on
/// `ErrorKind::Transient` (spec §4.8). Any fatal error or attempt exhaustion
/// is returned as-is to the caller.
pub async fn with_retry<T, F, Fut>(retry: &RetryConfig, mut op: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.kind == ErrorKind::Transient && attempt < retry.max_attempts => {
                let backoff = (retry.backoff_multiplier_secs * 2f64.powi(attempt as i32 - 1))
                    .clamp(retry.backoff_min_secs, retry.backoff_max_secs);
                tracing::warn!(
                    attempt,
                    backoff_secs = backoff,
                    "transient provider error, retrying: {}",
                    err.message
                );
                tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
            }
            Err(err) => return Err(err),
        }
    }
}
