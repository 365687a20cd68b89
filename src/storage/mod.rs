pub mod rerank;
pub mod vector_store;

pub use rerank::{NoopRerank, RerankStrategy};
pub use vector_store::{QueryHit, UpsertMode, VectorStore};
