//! Entity-description summarizer, grounded on
//! `original_source/.../summarization/trancated_aggregate.py`: shuffle the
//! candidate descriptions (so the model isn't biased toward whichever
//! caller happened to propose first), truncate to a token budget, and ask
//! the chat model for one aggregate description.

use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::config::RetryConfig;
use crate::llm::{with_retry, ChatClient};
use crate::processing::Tokenizer;

const SEPARATOR: &str = "<SEP>";

pub struct Summarizer {
    chat: Arc<dyn ChatClient>,
    model: String,
    tokenizer: Arc<dyn Tokenizer>,
    input_max_tokens: usize,
    retry: RetryConfig,
}

impl Summarizer {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        model: String,
        tokenizer: Arc<dyn Tokenizer>,
        input_max_tokens: usize,
        retry: RetryConfig,
    ) -> Self {
        Self {
            chat,
            model,
            tokenizer,
            input_max_tokens,
            retry,
        }
    }

    /// Aggregates `descriptions` for `entity_name` into a single description.
    /// A single input description is still run through the model, so the
    /// output register stays consistent whether one or many callers proposed
    /// a description (this mirrors the original, which never special-cases
    /// the singleton case).
    pub async fn summarize_entity(&self, entity_name: &str, descriptions: &[String]) -> anyhow::Result<String> {
        let mut descriptions = descriptions.to_vec();
        descriptions.shuffle(&mut rand::thread_rng());
        let joined = descriptions.join(SEPARATOR);

        let tokens = self.tokenizer.tokenize(&joined);
        let truncated = if tokens.len() <= self.input_max_tokens {
            joined
        } else {
            tokens[..self.input_max_tokens].concat()
        };

        let prompt = format!(
            "Several descriptions of the same entity \"{entity_name}\" were collected \
             independently. Write one concise description that combines all the facts \
             below without contradiction or repetition.\n\nDescriptions:\n{truncated}"
        );

        let summary = with_retry(&self.retry, || async {
            self.chat
                .complete(&self.model, &prompt, None, &[], Some(1000))
                .await
        })
        .await
        .map_err(|e| anyhow::anyhow!("summarization failed: {}", e.message))?;

        Ok(summary.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Message, ProviderError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingChat {
        calls: AtomicUsize,
        last_prompt_len: std::sync::Mutex<usize>,
    }

    #[async_trait]
    impl ChatClient for RecordingChat {
        async fn complete(
            &self,
            _model: &str,
            prompt: &str,
            _system_prompt: Option<&str>,
            _history: &[Message],
            _max_tokens: Option<u32>,
        ) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt_len.lock().unwrap() = prompt.len();
            Ok("combined description".to_string())
        }
    }

    fn summarizer_with(max_tokens: usize) -> (Arc<RecordingChat>, Summarizer) {
        let chat = Arc::new(RecordingChat {
            calls: AtomicUsize::new(0),
            last_prompt_len: std::sync::Mutex::new(0),
        });
        let summarizer = Summarizer::new(
            chat.clone(),
            "gpt-test".to_string(),
            Arc::new(crate::processing::PerCharTokenizer),
            max_tokens,
            RetryConfig::default(),
        );
        (chat, summarizer)
    }

    #[tokio::test]
    async fn combines_descriptions_via_chat_model() {
        let (chat, summarizer) = summarizer_with(10_000);
        let result = summarizer
            .summarize_entity("ACME", &["Makes widgets".to_string(), "Based in Ohio".to_string()])
            .await
            .unwrap();
        assert_eq!(result, "combined description");
        assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn truncates_to_token_budget() {
        let (_chat, summarizer) = summarizer_with(5);
        let long = "x".repeat(1000);
        // Should not panic or send the full 1000-char description untruncated.
        let result = summarizer.summarize_entity("ACME", &[long]).await.unwrap();
        assert_eq!(result, "combined description");
    }
}
