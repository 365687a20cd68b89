//! Top-level engine wiring (spec §5), grounded on the teacher's `RagEngine`
//! orchestration struct: one facade holding every service, fanning work out
//! under the configured concurrency caps, and fusing query results.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::extractor::EntityExtractor;
use crate::graph::GraphStore;
use crate::loader::{load_document, LoadMeta};
use crate::processing::Chunker;
use crate::storage::{NoopRerank, VectorStore};
use crate::types::ContentType;

/// Everything `insert`/`query_*` need: loader registry (free function),
/// chunker, the two stores, the extractor, and the concurrency/timeout knobs.
pub struct Orchestrator {
    chunker: Chunker,
    vector_store: VectorStore,
    graph_store: Arc<GraphStore>,
    extractor: EntityExtractor,
    config: Config,
    graph_blob_path: std::path::PathBuf,
}

impl Orchestrator {
    pub fn new(
        chunker: Chunker,
        vector_store: VectorStore,
        graph_store: Arc<GraphStore>,
        extractor: EntityExtractor,
        config: Config,
    ) -> Self {
        let graph_blob_path = config.storage.graph_blob_path.clone();
        Self { chunker, vector_store, graph_store, extractor, config, graph_blob_path }
    }

    /// Loads, chunks, and indexes `document_path`; when `with_graph` is set,
    /// also extracts entities/relations into the knowledge graph (spec §5).
    pub async fn insert(
        &self,
        document_path: &Path,
        content_type: ContentType,
        meta: LoadMeta,
        with_graph: bool,
    ) -> Result<usize> {
        let files = load_document(document_path, content_type, &meta)
            .with_context(|| format!("failed to load {}", document_path.display()))?;

        // File ids are content-addressed, so re-ingesting the same document
        // reuses the same id — clear its previously-indexed chunk rows first
        // so re-ingest doesn't leave stale rows behind alongside the fresh ones.
        for file in &files {
            self.vector_store.delete_by_doc_id(&file.id).await?;
        }

        let chunks = self.chunk_files(files).await?;

        let chunk_sem = Arc::new(Semaphore::new(self.config.concurrency.chunk_upsert_concurrency));
        stream::iter(chunks.iter().cloned())
            .map(|chunk| {
                let sem = chunk_sem.clone();
                async move {
                    let _permit = sem.acquire_owned().await.expect("semaphore not closed");
                    self.vector_store.upsert_chunk(&chunk).await
                }
            })
            .buffer_unordered(self.config.concurrency.chunk_upsert_concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        if with_graph && !chunks.is_empty() {
            let entities = self.extractor.entity(&chunks).await?;

            let entity_sem = Arc::new(Semaphore::new(self.config.concurrency.entity_upsert_concurrency));
            stream::iter(entities.iter().cloned())
                .map(|entity| {
                    let sem = entity_sem.clone();
                    async move {
                        let _permit = sem.acquire_owned().await.expect("semaphore not closed");
                        self.vector_store.upsert_entity(&entity).await?;
                        self.graph_store.upsert_node(entity).await
                    }
                })
                .buffer_unordered(self.config.concurrency.entity_upsert_concurrency)
                .collect::<Vec<_>>()
                .await
                .into_iter()
                .collect::<Result<Vec<_>>>()?;

            let relations = self.extractor.relation(&chunks, &entities).await?;

            let relation_sem = Arc::new(Semaphore::new(self.config.concurrency.relation_upsert_concurrency));
            stream::iter(relations.into_iter())
                .map(|relation| {
                    let sem = relation_sem.clone();
                    async move {
                        let _permit = sem.acquire_owned().await.expect("semaphore not closed");
                        self.graph_store.upsert_relation(relation).await
                    }
                })
                .buffer_unordered(self.config.concurrency.relation_upsert_concurrency)
                .collect::<Vec<_>>()
                .await
                .into_iter()
                .collect::<Result<Vec<_>>>()?;

            self.graph_store.dump(&self.graph_blob_path)?;
        }

        Ok(chunks.len())
    }

    /// Runs the (CPU-bound, synchronous) chunker off the async executor, the
    /// way the teacher offloads its own sync RAG calls via `spawn_blocking`.
    async fn chunk_files(&self, files: Vec<crate::types::File>) -> Result<Vec<crate::types::Chunk>> {
        let chunker = self.chunker.clone();
        tokio::task::spawn_blocking(move || {
            files.iter().flat_map(|file| chunker.chunk_file(file)).collect()
        })
        .await
        .context("chunking task panicked")
    }

    pub async fn query_chunks(&self, query: &str, topk: usize) -> Result<Vec<crate::storage::QueryHit>> {
        self.vector_store.query_chunks(query, topk, &NoopRerank).await
    }

    pub async fn query_entities(&self, query: &str, topk: usize) -> Result<Vec<crate::storage::QueryHit>> {
        self.vector_store.query_entities(query, topk, &NoopRerank).await
    }

    /// Entity hits, widened one hop each, concatenated in hit order (spec
    /// §4.6 `query_relations`).
    pub async fn query_relations(
        &self,
        query: &str,
        topk: usize,
    ) -> Result<(Vec<crate::types::Entity>, Vec<crate::types::Relation>)> {
        let hits = self.query_entities(query, topk).await?;
        let mut neighbors = Vec::new();
        let mut relations = Vec::new();
        for hit in &hits {
            let doc_key = hit.get_str("document_key");
            let (n, r) = self.graph_store.query_one_hop(doc_key);
            neighbors.extend(n);
            relations.extend(r);
        }
        Ok((neighbors, relations))
    }

    /// Fuses chunk, entity, neighbor and relation results into the four-key
    /// response shape (spec §4.6 `query_all`), bounded by the configured
    /// query timeout.
    pub async fn query_all(&self, query: &str, topk: usize) -> Result<serde_json::Value> {
        let timeout = std::time::Duration::from_secs(self.config.query_timeout_secs);
        tokio::time::timeout(timeout, self.query_all_inner(query, topk))
            .await
            .map_err(|_| anyhow::anyhow!("query timed out after {}s", self.config.query_timeout_secs))?
    }

    async fn query_all_inner(&self, query: &str, topk: usize) -> Result<serde_json::Value> {
        let chunk_hits = self.query_chunks(query, topk).await?;
        let entity_hits = self.query_entities(query, topk).await?;

        let mut neighbors = Vec::new();
        let mut relations = Vec::new();
        for hit in &entity_hits {
            let (n, r) = self.graph_store.query_one_hop(hit.get_str("document_key"));
            neighbors.extend(n);
            relations.extend(r);
        }

        let chunks: Vec<String> = chunk_hits.iter().map(|h| h.get_str("text").to_string()).collect();
        let entities: Vec<String> = entity_hits
            .iter()
            .map(|h| format!("{}: {}", h.get_str("text"), h.get_str("description")))
            .collect();
        let neighbors: Vec<String> = neighbors
            .iter()
            .map(|e| format!("{}: {}", e.page_content, e.metadata.description))
            .collect();
        let relations: Vec<String> = relations
            .iter()
            .map(|r| format!("{} -> {}: {}", r.source.page_content, r.target.page_content, r.properties.description))
            .collect();

        Ok(serde_json::json!({
            "chunks": chunks,
            "entities": entities,
            "neighbors": neighbors,
            "relations": relations,
        }))
    }
}
