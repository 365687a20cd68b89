//! Pluggable rerank hook applied after k-NN recall and distance filtering
//! (spec §4.2). No example repo in the pack carries a standalone reranker
//! crate, so the default is a no-op pass-through; callers with an actual
//! cross-encoder wire it in by implementing `RerankStrategy`.

use crate::storage::vector_store::QueryHit;

pub trait RerankStrategy: Send + Sync {
    /// Reorders (and may trim) `hits` for `query`. The default impl leaves
    /// distance order untouched.
    fn rerank(&self, query: &str, hits: Vec<QueryHit>) -> Vec<QueryHit>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRerank;

impl RerankStrategy for NoopRerank {
    fn rerank(&self, _query: &str, hits: Vec<QueryHit>) -> Vec<QueryHit> {
        hits
    }
}
