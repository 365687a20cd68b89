//! LLM-driven entity/relation extraction with bounded gleaning (spec §4.4),
//! grounded on `original_source/.../entity/vanilla.py`'s `entity()`/
//! `relation()` methods: per-chunk extraction prompt, a fixed number of
//! "continue" gleaning passes with a yes/no termination check, record
//! parsing, cross-chunk dedup/merge, and endpoint resolution for relations.

pub mod parser;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;

use crate::config::{ConcurrencyConfig, RetryConfig};
use crate::llm::{with_retry, ChatClient, Message};
use crate::summarizer::Summarizer;
use crate::types::{Chunk, Entity, Relation, RelationProperties};

use parser::{parse_records, Record, COMPLETION_DELIMITER, DEFAULT_ENTITY_TYPES, RECORD_DELIMITER, TUPLE_DELIMITER};

pub struct EntityExtractor {
    chat: Arc<dyn ChatClient>,
    model: String,
    summarizer: Arc<Summarizer>,
    retry: RetryConfig,
    concurrency: ConcurrencyConfig,
    max_gleaning: usize,
}

impl EntityExtractor {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        model: String,
        summarizer: Arc<Summarizer>,
        retry: RetryConfig,
        concurrency: ConcurrencyConfig,
        max_gleaning: usize,
    ) -> Self {
        Self { chat, model, summarizer, retry, concurrency, max_gleaning }
    }

    fn entity_extraction_prompt(&self, chunk_text: &str) -> String {
        format!(
            "Identify all named entities in the text below. Use entity types from: {types}.\n\
             For each entity, output a record of the form\n\
             (\"entity\"{d}<name>{d}<type>{d}<description>){r}\n\
             Separate records with {r} and end the list with {c}.\n\n\
             Text:\n{chunk_text}",
            types = DEFAULT_ENTITY_TYPES.join(", "),
            d = TUPLE_DELIMITER,
            r = RECORD_DELIMITER,
            c = COMPLETION_DELIMITER,
        )
    }

    fn relation_extraction_prompt(&self, chunk_text: &str, entity_names: &[String]) -> String {
        format!(
            "Given the entities {entities:?} mentioned in the text below, identify \
             relationships between pairs of them. Output a record of the form\n\
             (\"relationship\"{d}<source>{d}<target>{d}<description>{d}<weight 0-1>){r}\n\
             Separate records with {r} and end the list with {c}.\n\n\
             Text:\n{chunk_text}",
            entities = entity_names,
            d = TUPLE_DELIMITER,
            r = RECORD_DELIMITER,
            c = COMPLETION_DELIMITER,
        )
    }

    const CONTINUE_PROMPT: &'static str =
        "Some entities/relations were missed in the last extraction. Continue, \
         outputting only the additional records in the same format.";
    const TERMINATION_PROMPT: &'static str =
        "There might still be entities/relations missed. Answer exactly \"YES\" or \"NO\": \
         is there more to extract?";

    /// Runs one initial extraction call plus up to `max_gleaning` "continue"
    /// passes, each gated by a yes/no termination check on the prior pass.
    async fn run_gleaning_loop(&self, initial_prompt: &str) -> anyhow::Result<String> {
        let mut history = vec![Message::user(initial_prompt.to_string())];
        let first = self.complete(initial_prompt, &[]).await?;
        history.push(Message::assistant(first.clone()));
        let mut accumulated = first;

        for glean_idx in 0..self.max_gleaning {
            let glean_result = self.complete(Self::CONTINUE_PROMPT, &history).await?;
            history.push(Message::user(Self::CONTINUE_PROMPT.to_string()));
            history.push(Message::assistant(glean_result.clone()));
            accumulated.push_str(&glean_result);

            if glean_idx == self.max_gleaning - 1 {
                break;
            }

            let verdict = self.complete(Self::TERMINATION_PROMPT, &history).await?;
            let verdict = verdict.trim().trim_matches('"').trim_matches('\'').to_lowercase();
            if verdict != "yes" {
                break;
            }
        }

        Ok(accumulated)
    }

    async fn complete(&self, prompt: &str, history: &[Message]) -> anyhow::Result<String> {
        with_retry(&self.retry, || async { self.chat.complete(&self.model, prompt, None, history, None).await })
            .await
            .map_err(|e| anyhow::anyhow!("extraction call failed: {}", e.message))
    }

    /// Per-chunk entity extraction + cross-chunk dedup/merge (spec §4.4).
    pub async fn entity(&self, chunks: &[Chunk]) -> anyhow::Result<Vec<Entity>> {
        let extract_sem = Arc::new(Semaphore::new(self.concurrency.entity_extract_concurrency));
        let per_chunk: Vec<Vec<Entity>> = stream::iter(chunks.iter().cloned())
            .map(|chunk| {
                let sem = extract_sem.clone();
                async move {
                    let _permit = sem.acquire_owned().await.expect("semaphore not closed");
                    self.extract_entities_from_chunk(&chunk).await
                }
            })
            .buffer_unordered(self.concurrency.entity_extract_concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<anyhow::Result<Vec<_>>>()?;

        let all: Vec<Entity> = per_chunk.into_iter().flatten().collect();

        let mut by_name: HashMap<String, Vec<Entity>> = HashMap::new();
        for entity in all {
            by_name.entry(entity.page_content.clone()).or_default().push(entity);
        }

        let (singletons, to_merge): (Vec<_>, Vec<_>) =
            by_name.into_values().partition(|group| group.len() == 1);

        let merge_sem = Arc::new(Semaphore::new(self.concurrency.entity_merge_concurrency));
        let merged: Vec<Entity> = stream::iter(to_merge.into_iter())
            .map(|group| {
                let sem = merge_sem.clone();
                async move {
                    let _permit = sem.acquire_owned().await.expect("semaphore not closed");
                    self.merge_entity_group(group).await
                }
            })
            .buffer_unordered(self.concurrency.entity_merge_concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut result: Vec<Entity> = singletons.into_iter().flatten().collect();
        result.extend(merged);
        Ok(result)
    }

    async fn extract_entities_from_chunk(&self, chunk: &Chunk) -> anyhow::Result<Vec<Entity>> {
        let prompt = self.entity_extraction_prompt(&chunk.page_content);
        let raw = self.run_gleaning_loop(&prompt).await?;

        let entities = parse_records(&raw)
            .into_iter()
            .filter_map(|record| match record {
                Record::Entity { name, entity_type, description } => {
                    Some(Entity::new(&name, entity_type, description, chunk.id.clone()))
                }
                Record::Relation { .. } => None,
            })
            .collect();
        Ok(entities)
    }

    /// Merges a group of same-name entities: description via the summarizer,
    /// `chunk_ids` unioned, `entity_type` by mode (ties broken by first
    /// occurrence — spec §4.4).
    async fn merge_entity_group(&self, group: Vec<Entity>) -> anyhow::Result<Entity> {
        let name = group[0].page_content.clone();
        let descriptions: Vec<String> = {
            let mut seen = HashSet::new();
            group
                .iter()
                .map(|e| e.metadata.description.clone())
                .filter(|d| seen.insert(d.clone()))
                .collect()
        };
        let description = self.summarizer.summarize_entity(&name, &descriptions).await?;

        let mut chunk_ids = std::collections::BTreeSet::new();
        for entity in &group {
            chunk_ids.extend(entity.metadata.chunk_ids.iter().cloned());
        }

        let mut type_counts: Vec<(String, usize)> = Vec::new();
        for entity in &group {
            match type_counts.iter_mut().find(|(t, _)| *t == entity.metadata.entity_type) {
                Some((_, count)) => *count += 1,
                None => type_counts.push((entity.metadata.entity_type.clone(), 1)),
            }
        }
        let entity_type = type_counts
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .map(|(t, _)| t)
            .unwrap_or_default();

        Ok(Entity {
            id: crate::ids::compute_mdhash_id(&name, "ent-"),
            page_content: name,
            metadata: crate::types::EntityMetadata { entity_type, description, chunk_ids },
        })
    }

    /// Per-chunk relation extraction against that chunk's entity dictionary
    /// (spec §4.4). Relations are never merged across chunks.
    pub async fn relation(&self, chunks: &[Chunk], entities: &[Entity]) -> anyhow::Result<Vec<Relation>> {
        let sem = Arc::new(Semaphore::new(self.concurrency.relation_extract_concurrency));
        let per_chunk: Vec<Vec<Relation>> = stream::iter(chunks.iter().cloned())
            .map(|chunk| {
                let sem = sem.clone();
                let chunk_entities: HashMap<String, Entity> = entities
                    .iter()
                    .filter(|e| e.metadata.chunk_ids.contains(&chunk.id))
                    .map(|e| (e.page_content.clone(), e.clone()))
                    .collect();
                async move {
                    let _permit = sem.acquire_owned().await.expect("semaphore not closed");
                    self.extract_relations_from_chunk(&chunk, &chunk_entities).await
                }
            })
            .buffer_unordered(self.concurrency.relation_extract_concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(per_chunk.into_iter().flatten().collect())
    }

    async fn extract_relations_from_chunk(
        &self,
        chunk: &Chunk,
        chunk_entities: &HashMap<String, Entity>,
    ) -> anyhow::Result<Vec<Relation>> {
        if chunk_entities.is_empty() {
            return Ok(Vec::new());
        }
        let entity_names: Vec<String> = chunk_entities.keys().cloned().collect();
        let prompt = self.relation_extraction_prompt(&chunk.page_content, &entity_names);
        let raw = self.run_gleaning_loop(&prompt).await?;

        let relations = parse_records(&raw)
            .into_iter()
            .filter_map(|record| match record {
                Record::Relation { src, tgt, description, weight } => {
                    if src == tgt {
                        tracing::warn!(entity = %src, chunk_id = %chunk.id, "dropping self-loop relation");
                        return None;
                    }
                    let Some(source) = chunk_entities.get(&src) else {
                        tracing::warn!(src = %src, chunk_id = %chunk.id, "relation source not found in chunk entities, dropping");
                        return None;
                    };
                    let Some(target) = chunk_entities.get(&tgt) else {
                        tracing::warn!(tgt = %tgt, chunk_id = %chunk.id, "relation target not found in chunk entities, dropping");
                        return None;
                    };
                    Some(Relation {
                        source: source.clone(),
                        target: target.clone(),
                        properties: RelationProperties { description, weight, chunk_id: chunk.id.clone() },
                    })
                }
                Record::Entity { .. } => None,
            })
            .collect();
        Ok(relations)
    }
}
