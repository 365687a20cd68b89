//! LanceDB-backed vector store (spec §4.2), grounded on the teacher's
//! `lance_store.rs` for the Arrow plumbing (table creation via a seed-then-
//! delete `RecordBatch`, `nearest_to` k-NN queries, `extract_hits`-style
//! column decoding) generalized from one fixed chunk schema to the two named
//! tables (`chunks`, `entities`) spec §4.7 requires.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, BooleanArray, Float32Array, Int32Array, Int8Array, ListArray, RecordBatch,
    RecordBatchIterator, StringArray, FixedSizeListArray,
};
use arrow_schema::{DataType, Field, Schema};
use lancedb::query::{ExecutableQuery, QueryBase};
use serde_json::Value;

use crate::config::RetryConfig;
use crate::llm::EmbeddingClient;
use crate::storage::rerank::RerankStrategy;
use crate::types::{Chunk, Entity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertMode {
    Append,
    Overwrite,
}

/// A projected row returned from `query`: column name to JSON-ish value plus
/// the k-NN distance it was recalled at.
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub distance: f32,
    pub columns: BTreeMap<String, Value>,
}

impl QueryHit {
    pub fn get_str(&self, key: &str) -> &str {
        self.columns.get(key).and_then(Value::as_str).unwrap_or_default()
    }
}

pub struct VectorStore {
    db: lancedb::Connection,
    dimension: usize,
    embedder: Arc<dyn EmbeddingClient>,
    retry: RetryConfig,
}

const CHUNKS_TABLE: &str = "chunks";
const ENTITIES_TABLE: &str = "entities";

impl VectorStore {
    pub async fn connect(path: &Path, dimension: usize, embedder: Arc<dyn EmbeddingClient>, retry: RetryConfig) -> Result<Self> {
        std::fs::create_dir_all(path).ok();
        let db = lancedb::connect(path.to_string_lossy().as_ref())
            .execute()
            .await
            .context("failed to connect to LanceDB")?;
        let store = Self { db, dimension, embedder, retry };
        store.ensure_table(CHUNKS_TABLE).await?;
        store.ensure_table(ENTITIES_TABLE).await?;
        Ok(store)
    }

    fn schema(&self, table_name: &str) -> Arc<Schema> {
        let vector_field = Field::new(
            "vector",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), self.dimension as i32),
            true,
        );
        match table_name {
            CHUNKS_TABLE => Arc::new(Schema::new(vec![
                Field::new("text", DataType::Utf8, false),
                Field::new("document_key", DataType::Utf8, false),
                Field::new("type", DataType::Utf8, false),
                Field::new("filename", DataType::Utf8, false),
                Field::new("page_number", DataType::Int8, true),
                Field::new("uri", DataType::Utf8, false),
                Field::new("private", DataType::Boolean, false),
                Field::new("chunk_idx", DataType::Int32, false),
                Field::new("document_id", DataType::Utf8, false),
                vector_field,
            ])),
            ENTITIES_TABLE => Arc::new(Schema::new(vec![
                Field::new("text", DataType::Utf8, false),
                Field::new("document_key", DataType::Utf8, false),
                Field::new("entity_type", DataType::Utf8, false),
                Field::new("description", DataType::Utf8, false),
                Field::new(
                    "chunk_ids",
                    DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
                    false,
                ),
                vector_field,
            ])),
            other => panic!("unknown table: {other}"),
        }
    }

    async fn ensure_table(&self, table_name: &str) -> Result<()> {
        let names = self.db.table_names().execute().await?;
        if names.contains(&table_name.to_string()) {
            return Ok(());
        }
        let schema = self.schema(table_name);
        let batch = RecordBatch::new_empty(schema.clone());
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        self.db
            .create_table(table_name, Box::new(batches))
            .execute()
            .await
            .with_context(|| format!("failed to create table {table_name}"))?;
        Ok(())
    }

    fn vector_array(&self, vector: &[f32]) -> FixedSizeListArray {
        let values = Float32Array::from(vector.to_vec());
        let item_field = Field::new("item", DataType::Float32, true);
        FixedSizeListArray::new(Arc::new(item_field), self.dimension as i32, Arc::new(values), None)
    }

    /// Embeds `chunk.page_content` and appends/overwrites its row in the
    /// `chunks` table (spec §4.2 `upsert_text`). `document_key = chunk.id`.
    pub async fn upsert_chunk(&self, chunk: &Chunk) -> Result<()> {
        let embedding = crate::llm::with_retry(&self.retry, || async {
            self.embedder.embed(std::slice::from_ref(&chunk.page_content)).await
        })
        .await
        .map_err(|e| anyhow::anyhow!("embedding failed: {}", e.message))?
        .into_iter()
        .next()
        .context("embedder returned no vectors")?;

        let schema = self.schema(CHUNKS_TABLE);
        let page_number = chunk.metadata.page_number.map(|p| p as i8);
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec![chunk.page_content.as_str()])) as Arc<dyn Array>,
                Arc::new(StringArray::from(vec![chunk.id.as_str()])),
                Arc::new(StringArray::from(vec![chunk.metadata.content_type.as_str()])),
                Arc::new(StringArray::from(vec![chunk.metadata.filename.as_str()])),
                Arc::new(Int8Array::from(vec![page_number])),
                Arc::new(StringArray::from(vec![chunk.metadata.uri.as_str()])),
                Arc::new(BooleanArray::from(vec![chunk.metadata.private])),
                Arc::new(Int32Array::from(vec![chunk.metadata.chunk_idx as i32])),
                Arc::new(StringArray::from(vec![chunk.metadata.document_id.as_str()])),
                Arc::new(self.vector_array(&embedding)) as Arc<dyn Array>,
            ],
        )
        .context("failed to build chunk record batch")?;

        self.write_row(CHUNKS_TABLE, batch, &chunk.id, UpsertMode::Overwrite).await
    }

    /// Embeds `entity.page_content` (the canonical name) and appends/
    /// overwrites its row in the `entities` table. `document_key = entity.id`.
    pub async fn upsert_entity(&self, entity: &Entity) -> Result<()> {
        let embed_text = format!("{}: {}", entity.page_content, entity.metadata.description);
        let embedding = crate::llm::with_retry(&self.retry, || async {
            self.embedder.embed(std::slice::from_ref(&embed_text)).await
        })
        .await
        .map_err(|e| anyhow::anyhow!("embedding failed: {}", e.message))?
        .into_iter()
        .next()
        .context("embedder returned no vectors")?;

        let schema = self.schema(ENTITIES_TABLE);
        let chunk_ids: Vec<&str> = entity.metadata.chunk_ids.iter().map(String::as_str).collect();
        let chunk_ids_list = string_list_array(vec![chunk_ids]);

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec![entity.page_content.as_str()])) as Arc<dyn Array>,
                Arc::new(StringArray::from(vec![entity.id.as_str()])),
                Arc::new(StringArray::from(vec![entity.metadata.entity_type.as_str()])),
                Arc::new(StringArray::from(vec![entity.metadata.description.as_str()])),
                Arc::new(chunk_ids_list) as Arc<dyn Array>,
                Arc::new(self.vector_array(&embedding)) as Arc<dyn Array>,
            ],
        )
        .context("failed to build entity record batch")?;

        self.write_row(ENTITIES_TABLE, batch, &entity.id, UpsertMode::Overwrite).await
    }

    async fn write_row(&self, table_name: &str, batch: RecordBatch, document_key: &str, mode: UpsertMode) -> Result<()> {
        let table = self.db.open_table(table_name).execute().await?;
        if mode == UpsertMode::Overwrite {
            let predicate = format!("document_key = '{}'", document_key.replace('\'', "''"));
            table.delete(&predicate).await.ok();
        }
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table.add(Box::new(reader)).execute().await.context("failed to write row")?;
        Ok(())
    }

    /// Deletes every row whose `document_id` (chunks) matches `doc_id`.
    /// Supplementary to spec §4.2 — used when a document is re-ingested.
    pub async fn delete_by_doc_id(&self, doc_id: &str) -> Result<usize> {
        let table = self.db.open_table(CHUNKS_TABLE).execute().await?;
        let before = table.count_rows(None).await.unwrap_or(0);
        let predicate = format!("document_id = '{}'", doc_id.replace('\'', "''"));
        table.delete(&predicate).await?;
        let after = table.count_rows(None).await.unwrap_or(0);
        Ok(before.saturating_sub(after))
    }

    async fn query(
        &self,
        table_name: &str,
        query_text: &str,
        topk: usize,
        document_list: Option<&[String]>,
        require_private: Option<bool>,
        distance_threshold: f32,
        rerank: &dyn RerankStrategy,
    ) -> Result<Vec<QueryHit>> {
        let embedding = crate::llm::with_retry(&self.retry, || async {
            self.embedder.embed(std::slice::from_ref(&query_text.to_string())).await
        })
        .await
        .map_err(|e| anyhow::anyhow!("embedding failed: {}", e.message))?
        .into_iter()
        .next()
        .context("embedder returned no vectors")?;

        let table = self.db.open_table(table_name).execute().await?;
        let mut builder = table.query().nearest_to(embedding.as_slice())?.limit(topk.max(1) * 4);

        let mut predicates = Vec::new();
        if let Some(docs) = document_list {
            if !docs.is_empty() {
                let quoted: Vec<String> = docs.iter().map(|d| format!("'{}'", d.replace('\'', "''"))).collect();
                predicates.push(format!("document_key IN ({})", quoted.join(", ")));
            }
        }
        if table_name == CHUNKS_TABLE {
            if let Some(private) = require_private {
                predicates.push(format!("private = {private}"));
            }
        }
        if !predicates.is_empty() {
            builder = builder.only_if(predicates.join(" AND "));
        }

        let results = builder.execute().await.context("vector query failed")?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        let mut hits = extract_hits(&batches);
        hits.retain(|h| h.distance <= distance_threshold);

        let hits = rerank.rerank(query_text, hits);
        Ok(hits.into_iter().take(topk).collect())
    }

    /// `query_chunks(q, topk)`: distance_threshold=100 (spec §4.6 — effectively no cutoff).
    pub async fn query_chunks(&self, query_text: &str, topk: usize, rerank: &dyn RerankStrategy) -> Result<Vec<QueryHit>> {
        self.query(CHUNKS_TABLE, query_text, topk, None, None, 100.0, rerank).await
    }

    pub async fn query_entities(&self, query_text: &str, topk: usize, rerank: &dyn RerankStrategy) -> Result<Vec<QueryHit>> {
        self.query(ENTITIES_TABLE, query_text, topk, None, None, 100.0, rerank).await
    }
}

fn string_list_array(rows: Vec<Vec<&str>>) -> ListArray {
    let item_field = Arc::new(Field::new("item", DataType::Utf8, true));
    let mut offsets: Vec<i32> = vec![0];
    let mut flat: Vec<&str> = Vec::new();
    for row in &rows {
        flat.extend(row.iter().copied());
        offsets.push(flat.len() as i32);
    }
    let values = StringArray::from(flat);
    ListArray::new(
        item_field,
        arrow_array::OffsetBuffer::new(offsets.into()),
        Arc::new(values),
        None,
    )
}

/// Decodes every scalar column of a batch into a JSON value, plus
/// `_distance` into `QueryHit::distance` (0.0 when the column is absent, i.e.
/// a non-similarity listing).
fn extract_hits(batches: &[RecordBatch]) -> Vec<QueryHit> {
    let mut hits = Vec::new();
    for batch in batches {
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

        for row in 0..batch.num_rows() {
            let mut columns = BTreeMap::new();
            for field in batch.schema().fields() {
                if field.name() == "vector" || field.name() == "_distance" {
                    continue;
                }
                let column = batch.column_by_name(field.name()).unwrap();
                let value = column_value_at(column, row);
                columns.insert(field.name().clone(), value);
            }
            let distance = distances.map(|d| d.value(row)).unwrap_or(0.0);
            hits.push(QueryHit { distance, columns });
        }
    }
    hits
}

fn column_value_at(column: &Arc<dyn Array>, row: usize) -> Value {
    if column.is_null(row) {
        return Value::Null;
    }
    if let Some(arr) = column.as_any().downcast_ref::<StringArray>() {
        return Value::String(arr.value(row).to_string());
    }
    if let Some(arr) = column.as_any().downcast_ref::<Int32Array>() {
        return Value::from(arr.value(row));
    }
    if let Some(arr) = column.as_any().downcast_ref::<Int8Array>() {
        return Value::from(arr.value(row));
    }
    if let Some(arr) = column.as_any().downcast_ref::<BooleanArray>() {
        return Value::Bool(arr.value(row));
    }
    if let Some(arr) = column.as_any().downcast_ref::<ListArray>() {
        let item = arr.value(row);
        if let Some(strings) = item.as_any().downcast_ref::<StringArray>() {
            return Value::Array(strings.iter().map(|s| Value::String(s.unwrap_or_default().to_string())).collect());
        }
    }
    Value::Null
}
