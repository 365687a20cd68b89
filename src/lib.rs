//! hirag: a retrieval-augmented knowledge-base engine combining a LanceDB
//! vector index with a petgraph knowledge graph, fed by an LLM-driven
//! entity/relation extraction pipeline.

pub mod config;
pub mod extractor;
pub mod graph;
pub mod ids;
pub mod llm;
pub mod loader;
pub mod orchestrator;
pub mod processing;
pub mod storage;
pub mod summarizer;
pub mod types;

pub use config::Config;
pub use orchestrator::Orchestrator;
pub use types::{Chunk, Entity, File, Relation};
