//! Directed knowledge graph (spec §4.3), grounded on
//! `original_source/.../storage/networkx.py` for the node/edge shape and the
//! concurrent compare-and-merge `upsert_node` protocol, and on the teacher's
//! `graph/knowledge_graph.rs` for the `petgraph::DiGraph` + name-index
//! structure (the teacher has no concurrency story of its own; the merge
//! loop here is reimplemented from the original's asyncio single-threaded
//! algorithm under an explicit lock).

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::summarizer::Summarizer;
use crate::types::{Entity, EntityMetadata, Relation, RelationProperties};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeData {
    entity_name: String,
    entity_type: String,
    description: String,
    chunk_ids: BTreeSet<String>,
}

impl From<&Entity> for NodeData {
    fn from(entity: &Entity) -> Self {
        Self {
            entity_name: entity.page_content.clone(),
            entity_type: entity.metadata.entity_type.clone(),
            description: entity.metadata.description.clone(),
            chunk_ids: entity.metadata.chunk_ids.clone(),
        }
    }
}

impl NodeData {
    fn into_entity(self, id: String) -> Entity {
        Entity {
            id,
            page_content: self.entity_name,
            metadata: EntityMetadata {
                entity_type: self.entity_type,
                description: self.description,
                chunk_ids: self.chunk_ids,
            },
        }
    }
}

/// The persisted shape: a directed multigraph plus the id-to-node-index
/// lookup, so `load()` doesn't have to rebuild the index by re-scanning.
#[derive(Serialize, Deserialize)]
struct GraphBlob {
    graph: DiGraph<(String, NodeData), RelationProperties>,
}

struct Inner {
    graph: DiGraph<(String, NodeData), RelationProperties>,
    index: HashMap<String, NodeIndex>,
    /// Outgoing/incoming edges in insertion order, per node — petgraph does
    /// not guarantee edge iteration order matches insertion order.
    outgoing_order: HashMap<NodeIndex, Vec<EdgeIndex>>,
    incoming_order: HashMap<NodeIndex, Vec<EdgeIndex>>,
}

enum UpsertOutcome {
    Done,
    NeedsMerge(String),
}

/// Directed entity graph with atomic compare-and-merge node upsert under
/// concurrent writers (spec §4.3's "subtle part").
pub struct GraphStore {
    inner: RwLock<Inner>,
    summarizer: Arc<Summarizer>,
}

impl GraphStore {
    pub fn new(summarizer: Arc<Summarizer>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                graph: DiGraph::new(),
                index: HashMap::new(),
                outgoing_order: HashMap::new(),
                incoming_order: HashMap::new(),
            }),
            summarizer,
        }
    }

    /// Loads an existing graph blob from `path`, or starts empty if the path
    /// does not exist (spec §4.3 persistence contract).
    pub fn load_or_new(path: &Path, summarizer: Arc<Summarizer>) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new(summarizer));
        }
        let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let blob: GraphBlob = serde_json::from_slice(&bytes).context("failed to deserialize graph blob")?;

        let mut index = HashMap::new();
        let mut outgoing_order: HashMap<NodeIndex, Vec<EdgeIndex>> = HashMap::new();
        let mut incoming_order: HashMap<NodeIndex, Vec<EdgeIndex>> = HashMap::new();
        for idx in blob.graph.node_indices() {
            let (id, _) = &blob.graph[idx];
            index.insert(id.clone(), idx);
        }
        for edge in blob.graph.edge_indices() {
            let (source, target) = blob.graph.edge_endpoints(edge).expect("edge endpoints exist");
            outgoing_order.entry(source).or_default().push(edge);
            incoming_order.entry(target).or_default().push(edge);
        }

        Ok(Self {
            inner: RwLock::new(Inner {
                graph: blob.graph,
                index,
                outgoing_order,
                incoming_order,
            }),
            summarizer,
        })
    }

    /// Writes the entire graph to a single blob at `path` (spec §4.3 `dump`).
    pub fn dump(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let inner = self.inner.read();
        let blob = GraphBlob { graph: inner.graph.clone() };
        let bytes = serde_json::to_vec(&blob).context("failed to serialize graph blob")?;
        std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// The compare-and-merge loop (spec §4.3). Terminates when either the
    /// node is new, or our proposed description matches what's currently
    /// stored, reducing the summarizer to at most one call per contender.
    pub async fn upsert_node(&self, mut node: Entity) -> Result<()> {
        let mut record_description: Option<String> = None;
        loop {
            let outcome = {
                let mut inner = self.inner.write();
                match inner.index.get(&node.id).copied() {
                    None => {
                        let idx = inner.graph.add_node((node.id.clone(), NodeData::from(&node)));
                        inner.index.insert(node.id.clone(), idx);
                        UpsertOutcome::Done
                    }
                    Some(idx) => {
                        let existing = inner.graph[idx].1.description.clone();
                        if record_description.as_deref() == Some(existing.as_str()) {
                            inner.graph[idx].1 = NodeData::from(&node);
                            UpsertOutcome::Done
                        } else if record_description.is_none() && node.metadata.description == existing {
                            UpsertOutcome::Done
                        } else {
                            UpsertOutcome::NeedsMerge(existing)
                        }
                    }
                }
            };

            match outcome {
                UpsertOutcome::Done => return Ok(()),
                UpsertOutcome::NeedsMerge(latest) => {
                    let merged = self
                        .summarizer
                        .summarize_entity(&node.page_content, &[node.metadata.description.clone(), latest.clone()])
                        .await?;
                    node.metadata.description = merged;
                    record_description = Some(latest);
                }
            }
        }
    }

    /// Upserts both endpoints, then adds an edge carrying `relation.properties`.
    /// Multiple edges between the same pair are allowed (facts aren't merged).
    pub async fn upsert_relation(&self, relation: Relation) -> Result<()> {
        let source_id = relation.source.id.clone();
        let target_id = relation.target.id.clone();
        self.upsert_node(relation.source).await?;
        self.upsert_node(relation.target).await?;

        let mut inner = self.inner.write();
        let source_idx = *inner.index.get(&source_id).expect("source just upserted");
        let target_idx = *inner.index.get(&target_id).expect("target just upserted");
        let edge_idx = inner.graph.add_edge(source_idx, target_idx, relation.properties);
        inner.outgoing_order.entry(source_idx).or_default().push(edge_idx);
        inner.incoming_order.entry(target_idx).or_default().push(edge_idx);
        Ok(())
    }

    pub fn query_node(&self, id: &str) -> Option<Entity> {
        let inner = self.inner.read();
        let idx = *inner.index.get(id)?;
        let (node_id, data) = inner.graph[idx].clone();
        Some(data.into_entity(node_id))
    }

    /// One-hop neighbours and the edges connecting them: the union of
    /// outgoing-edge targets and incoming-edge sources, each edge reported
    /// once (spec §9's resolution of the graph's directed-multigraph open
    /// question; §8 scenario 5 pins the exact contract).
    pub fn query_one_hop(&self, id: &str) -> (Vec<Entity>, Vec<Relation>) {
        let inner = self.inner.read();
        let Some(&idx) = inner.index.get(id) else {
            return (Vec::new(), Vec::new());
        };

        let mut seen = std::collections::HashSet::new();
        let mut neighbors = Vec::new();
        let mut relations = Vec::new();

        let empty = Vec::new();
        let outgoing = inner.outgoing_order.get(&idx).unwrap_or(&empty);
        let incoming = inner.incoming_order.get(&idx).unwrap_or(&empty);

        for &edge_idx in outgoing.iter().chain(incoming.iter()) {
            if !seen.insert(edge_idx) {
                continue;
            }
            let Some((source_idx, target_idx)) = inner.graph.edge_endpoints(edge_idx) else {
                continue;
            };
            let (source_id, source_data) = inner.graph[source_idx].clone();
            let (target_id, target_data) = inner.graph[target_idx].clone();
            let properties = inner.graph[edge_idx].clone();

            let other = if source_idx == idx { (target_id.clone(), target_data.clone()) } else { (source_id.clone(), source_data.clone()) };
            neighbors.push(other.1.into_entity(other.0));
            relations.push(Relation {
                source: source_data.into_entity(source_id),
                target: target_data.into_entity(target_id),
                properties,
            });
        }
        (neighbors, relations)
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.read().graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatClient, Message, ProviderError};
    use async_trait::async_trait;

    struct StubChat;

    #[async_trait]
    impl ChatClient for StubChat {
        async fn complete(
            &self,
            _model: &str,
            _prompt: &str,
            _system_prompt: Option<&str>,
            _history: &[Message],
            _max_tokens: Option<u32>,
        ) -> Result<String, ProviderError> {
            Ok("merged description".to_string())
        }
    }

    fn test_store() -> GraphStore {
        let summarizer = Arc::new(Summarizer::new(
            Arc::new(StubChat),
            "gpt-test".to_string(),
            Arc::new(crate::processing::PerCharTokenizer),
            4000,
            crate::config::RetryConfig::default(),
        ));
        GraphStore::new(summarizer)
    }

    fn entity(name: &str, desc: &str, chunk_id: &str) -> Entity {
        Entity::new(name, "ORG".to_string(), desc.to_string(), chunk_id.to_string())
    }

    #[tokio::test]
    async fn new_node_is_added_without_merge() {
        let store = test_store();
        store.upsert_node(entity("Acme", "A maker of widgets", "c1")).await.unwrap();
        assert_eq!(store.node_count(), 1);
        let fetched = store.query_node(&crate::ids::compute_mdhash_id("ACME", "ent-")).unwrap();
        assert_eq!(fetched.metadata.description, "A maker of widgets");
    }

    #[tokio::test]
    async fn reupserting_identical_description_skips_merge() {
        let store = test_store();
        let e = entity("Acme", "A maker of widgets", "c1");
        store.upsert_node(e.clone()).await.unwrap();
        store.upsert_node(e).await.unwrap();
        assert_eq!(store.node_count(), 1);
    }

    #[tokio::test]
    async fn conflicting_description_triggers_merge() {
        let store = test_store();
        store.upsert_node(entity("Acme", "A maker of widgets", "c1")).await.unwrap();
        store.upsert_node(entity("Acme", "A logistics company", "c2")).await.unwrap();
        let fetched = store.query_node(&crate::ids::compute_mdhash_id("ACME", "ent-")).unwrap();
        assert_eq!(fetched.metadata.description, "merged description");
    }

    #[tokio::test]
    async fn relation_creates_both_endpoints_and_edge() {
        let store = test_store();
        let a = entity("Acme", "maker", "c1");
        let b = entity("Globex", "buyer", "c1");
        let relation = Relation {
            source: a.clone(),
            target: b.clone(),
            properties: RelationProperties {
                description: "supplies".to_string(),
                weight: 1.0,
                chunk_id: "c1".to_string(),
            },
        };
        store.upsert_relation(relation).await.unwrap();
        assert_eq!(store.node_count(), 2);
        assert_eq!(store.edge_count(), 1);

        let (neighbors, relations) = store.query_one_hop(&a.id);
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].page_content, "GLOBEX");
        assert_eq!(relations[0].properties.description, "supplies");
    }

    #[tokio::test]
    async fn query_one_hop_also_follows_incoming_edges() {
        let store = test_store();
        let a = entity("Acme", "maker", "c1");
        let b = entity("Globex", "buyer", "c1");
        let relation = Relation {
            source: a.clone(),
            target: b.clone(),
            properties: RelationProperties {
                description: "supplies".to_string(),
                weight: 1.0,
                chunk_id: "c1".to_string(),
            },
        };
        store.upsert_relation(relation).await.unwrap();

        // b has no outgoing edges, but the edge into it from a must still
        // show up as a one-hop neighbour.
        let (neighbors, relations) = store.query_one_hop(&b.id);
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].page_content, "ACME");
        assert_eq!(relations[0].properties.description, "supplies");
    }

    #[tokio::test]
    async fn query_one_hop_reports_each_edge_once_on_a_cycle() {
        let store = test_store();
        let a = entity("Acme", "maker", "c1");
        let b = entity("Globex", "buyer", "c1");
        let c = entity("Initech", "hauler", "c1");
        for (source, target) in [(a.clone(), b.clone()), (b.clone(), c.clone()), (c.clone(), a.clone())] {
            store
                .upsert_relation(Relation {
                    source,
                    target,
                    properties: RelationProperties {
                        description: "links".to_string(),
                        weight: 1.0,
                        chunk_id: "c1".to_string(),
                    },
                })
                .await
                .unwrap();
        }

        let (neighbors, relations) = store.query_one_hop(&a.id);
        assert_eq!(neighbors.len(), 2);
        assert_eq!(relations.len(), 2);
        let names: BTreeSet<_> = neighbors.iter().map(|e| e.page_content.clone()).collect();
        assert_eq!(names, BTreeSet::from(["GLOBEX".to_string(), "INITECH".to_string()]));
    }

    struct CountingChat {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl ChatClient for CountingChat {
        async fn complete(
            &self,
            _model: &str,
            _prompt: &str,
            _system_prompt: Option<&str>,
            _history: &[Message],
            _max_tokens: Option<u32>,
        ) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok("merged description".to_string())
        }
    }

    #[tokio::test]
    async fn concurrent_upserts_of_the_same_node_merge_with_at_most_two_summarizer_calls() {
        let chat = Arc::new(CountingChat { calls: std::sync::atomic::AtomicUsize::new(0) });
        let summarizer = Arc::new(Summarizer::new(
            chat.clone(),
            "gpt-test".to_string(),
            Arc::new(crate::processing::PerCharTokenizer),
            4000,
            crate::config::RetryConfig::default(),
        ));
        let store = Arc::new(GraphStore::new(summarizer));

        let store_a = store.clone();
        let store_b = store.clone();
        let a = tokio::spawn(async move { store_a.upsert_node(entity("Acme", "A maker of widgets", "c1")).await });
        let b = tokio::spawn(async move { store_b.upsert_node(entity("Acme", "A logistics company", "c2")).await });
        let (ra, rb) = tokio::join!(a, b);
        ra.unwrap().unwrap();
        rb.unwrap().unwrap();

        assert_eq!(store.node_count(), 1);
        let fetched = store.query_node(&crate::ids::compute_mdhash_id("ACME", "ent-")).unwrap();
        assert_eq!(fetched.metadata.description, "merged description");
        assert!(chat.calls.load(std::sync::atomic::Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn dump_and_load_round_trip() {
        let store = test_store();
        store.upsert_node(entity("Acme", "maker", "c1")).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        store.dump(&path).unwrap();

        let reloaded = GraphStore::load_or_new(&path, store.summarizer.clone()).unwrap();
        assert_eq!(reloaded.node_count(), 1);
    }
}
