//! End-to-end ingest + fused query (spec §5/§8), exercising the real
//! LanceDB-backed `VectorStore` and `GraphStore` against a tempdir, with
//! stub chat/embedding clients standing in for the provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hirag::config::{Config, ConcurrencyConfig, RetryConfig};
use hirag::extractor::EntityExtractor;
use hirag::graph::GraphStore;
use hirag::llm::{ChatClient, EmbeddingClient, Message, ProviderError};
use hirag::loader::LoadMeta;
use hirag::orchestrator::Orchestrator;
use hirag::processing::{Chunker, PerCharTokenizer};
use hirag::storage::VectorStore;
use hirag::summarizer::Summarizer;
use hirag::types::ContentType;

/// Deterministic embedding: one-hot on the first byte of the text mod
/// `DIM`, so distinct texts land far apart and identical texts collide.
const DIM: usize = 8;

struct StubEmbedder;

#[async_trait]
impl EmbeddingClient for StubEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; DIM];
                let slot = t.bytes().map(|b| b as usize).sum::<usize>() % DIM;
                v[slot] = 1.0;
                v
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

struct StubChat {
    calls: AtomicUsize,
}

#[async_trait]
impl ChatClient for StubChat {
    async fn complete(
        &self,
        _model: &str,
        prompt: &str,
        _system_prompt: Option<&str>,
        _history: &[Message],
        _max_tokens: Option<u32>,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.contains("is there more to extract") {
            return Ok("NO".to_string());
        }
        if prompt.starts_with("Some entities/relations were missed") {
            return Ok(String::new());
        }
        if prompt.contains("identify relationships") {
            return Ok("(\"relationship\"<|>\"ACME\"<|>\"GLOBEX\"<|>\"supplies to\"<|>\"0.9\")##<|COMPLETE|>".to_string());
        }
        if prompt.contains("Identify all named entities") {
            return Ok(concat!(
                "(\"entity\"<|>\"Acme\"<|>\"organization\"<|>\"A widget maker\")##",
                "(\"entity\"<|>\"Globex\"<|>\"organization\"<|>\"A logistics buyer\")",
                "<|COMPLETE|>",
            )
            .to_string());
        }
        Ok("a summary".to_string())
    }
}

async fn build_orchestrator(kb_dir: &std::path::Path) -> Orchestrator {
    let chat = Arc::new(StubChat { calls: AtomicUsize::new(0) });
    let embedder = Arc::new(StubEmbedder);
    let tokenizer = Arc::new(PerCharTokenizer);
    let summarizer = Arc::new(Summarizer::new(
        chat.clone(),
        "gpt-test".to_string(),
        tokenizer,
        4000,
        RetryConfig::default(),
    ));
    let graph_path = kb_dir.join("graph.json");
    let graph_store = Arc::new(GraphStore::load_or_new(&graph_path, summarizer.clone()).unwrap());
    let vector_store = VectorStore::connect(&kb_dir.join("vectors.db"), DIM, embedder, RetryConfig::default())
        .await
        .unwrap();
    let extractor = EntityExtractor::new(
        chat,
        "gpt-test".to_string(),
        summarizer,
        RetryConfig::default(),
        ConcurrencyConfig::default(),
        1,
    );
    let chunker = Chunker::with_default_tokenizer(1000, 200);

    let mut config = Config::default();
    config.storage.graph_blob_path = graph_path;
    config.storage.vector_db_path = kb_dir.join("vectors.db");
    config.storage.embedding_dimension = DIM;

    Orchestrator::new(chunker, vector_store, graph_store, extractor, config)
}

#[tokio::test]
async fn insert_then_query_chunks_returns_the_ingested_text() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = build_orchestrator(dir.path()).await;

    let doc_path = dir.path().join("note.txt");
    std::fs::write(&doc_path, "Acme supplies widgets to Globex on a recurring contract.").unwrap();

    let n = orchestrator
        .insert(&doc_path, ContentType::Txt, LoadMeta::default(), true)
        .await
        .unwrap();
    assert_eq!(n, 1);

    let hits = orchestrator
        .query_chunks("Acme supplies widgets to Globex on a recurring contract.", 5)
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert!(hits[0].get_str("text").contains("Acme"));
}

#[tokio::test]
async fn insert_with_graph_populates_entities_and_relations() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = build_orchestrator(dir.path()).await;

    let doc_path = dir.path().join("note.txt");
    std::fs::write(&doc_path, "Acme supplies widgets to Globex on a recurring contract.").unwrap();
    orchestrator
        .insert(&doc_path, ContentType::Txt, LoadMeta::default(), true)
        .await
        .unwrap();

    let entity_hits = orchestrator.query_entities("Acme widgets", 5).await.unwrap();
    assert!(entity_hits.iter().any(|h| h.get_str("text") == "ACME"));

    let (neighbors, relations) = orchestrator.query_relations("Acme widgets", 5).await.unwrap();
    assert!(neighbors.iter().any(|e| e.page_content == "GLOBEX"));
    assert!(relations.iter().any(|r| r.properties.description == "supplies to"));
}

#[tokio::test]
async fn query_all_fuses_chunks_entities_neighbors_and_relations() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = build_orchestrator(dir.path()).await;

    let doc_path = dir.path().join("note.txt");
    std::fs::write(&doc_path, "Acme supplies widgets to Globex on a recurring contract.").unwrap();
    orchestrator
        .insert(&doc_path, ContentType::Txt, LoadMeta::default(), true)
        .await
        .unwrap();

    let fused = orchestrator.query_all("Acme widgets", 5).await.unwrap();
    let obj = fused.as_object().unwrap();
    assert_eq!(obj.len(), 4);
    assert!(obj.contains_key("chunks"));
    assert!(obj.contains_key("entities"));
    assert!(obj.contains_key("neighbors"));
    assert!(obj.contains_key("relations"));
    assert!(!obj["chunks"].as_array().unwrap().is_empty());
}
