//! Retrieval-augmented context for persona backgrounds
//!
//! Ported from `rag.py`'s `RAGService`/`PersonaKnowledgeBase`, made
//! multi-tenant the way `rag_adapter.py` resolves a collection name per
//! `(tenant_id, persona_id)`. Collections are named `u_{tenant}_persona_{handle}_rag` —
//! the `u_` prefix is this crate's own addition (see `collection_name`
//! doc comment) and is not present in the original service.

mod chunker;
mod embedder;
mod store;

pub use chunker::Chunker;
pub use embedder::{Embedder, FallbackEmbedder};
pub use store::{Chunk, InMemoryVectorStore, VectorStore};

use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("no background knowledge configured for persona '{0}'")]
    NoKnowledgeBase(String),
}

/// Builds the tenant/persona-scoped collection name.
///
/// Some vector-store backends (including Milvus) reject collection names
/// that start with a digit, and tenant or persona identifiers are not
/// guaranteed to start with a letter. The original Python adapter names
/// collections `{tenant_id}_persona_{persona_id}_rag` with no such
/// guard; this crate prefixes every collection with `u_` to stay valid
/// regardless of identifier shape. [`legacy_collection_name`] produces the
/// unprefixed name for migrating data ingested before this change.
pub fn collection_name(tenant_id: &str, persona_handle: &str) -> String {
    format!("u_{tenant_id}_persona_{persona_handle}_rag")
}

/// The pre-migration collection name, kept only so operators can detect and
/// migrate data ingested under the old convention.
pub fn legacy_collection_name(tenant_id: &str, persona_handle: &str) -> String {
    format!("{tenant_id}_persona_{persona_handle}_rag")
}

fn chunk_id(tenant_id: &str, persona_handle: &str, source: &str, chunk: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{tenant_id}:{persona_handle}:{source}:{chunk}"));
    let digest = hasher.finalize();
    hex::encode(digest)[..16].to_string()
}

/// Coordinates chunking, embedding and retrieval for persona background
/// knowledge across every tenant and persona.
pub struct RagRetriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
}

impl RagRetriever {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder, chunker: Chunker::new(500, 50) }
    }

    pub fn with_defaults() -> Self {
        Self::new(Arc::new(InMemoryVectorStore::new()), Arc::new(FallbackEmbedder::new()))
    }

    /// Ingest background text for a persona, returning the chunk ids stored.
    pub fn ingest(&self, tenant_id: &str, persona_handle: &str, source: &str, content: &str) -> Vec<String> {
        let collection = collection_name(tenant_id, persona_handle);
        let mut ids = Vec::new();

        for chunk_text in self.chunker.split(content) {
            let id = chunk_id(tenant_id, persona_handle, source, &chunk_text);
            let vector = self.embedder.embed(&chunk_text);
            self.store.upsert(
                &collection,
                Chunk { id: id.clone(), source: source.to_string(), text: chunk_text },
                vector,
            );
            ids.push(id);
        }

        ids
    }

    pub fn delete_by_source(&self, tenant_id: &str, persona_handle: &str, source: &str) {
        let collection = collection_name(tenant_id, persona_handle);
        self.store.delete_by_source(&collection, source);
    }

    pub fn drop(&self, tenant_id: &str, persona_handle: &str) {
        let collection = collection_name(tenant_id, persona_handle);
        self.store.drop_collection(&collection);
    }

    /// Search a persona's background knowledge and return it formatted for prompt injection,
    /// `[source] text` blocks joined by `---`, matching `RAGService.retrieve_context`.
    ///
    /// Returns `""` (never an error) when the collection is empty — RAG failures and misses
    /// must never block a persona's reply (spec §4.5).
    pub fn retrieve_context(&self, tenant_id: &str, persona_handle: &str, query: &str, top_k: usize) -> String {
        let collection = collection_name(tenant_id, persona_handle);
        let query_vector = self.embedder.embed(query);
        let chunks = self.store.search(&collection, &query_vector, top_k);

        if chunks.is_empty() {
            return String::new();
        }

        chunks
            .iter()
            .map(|c| format!("[{}] {}", c.source, c.text))
            .collect::<Vec<_>>()
            .join("\n---\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_name_is_prefixed_and_scoped() {
        let name = collection_name("acme", "aria");
        assert_eq!(name, "u_acme_persona_aria_rag");
        assert!(name.chars().next().unwrap().is_ascii_alphabetic());
    }

    #[test]
    fn ingest_then_retrieve_finds_source() {
        let retriever = RagRetriever::with_defaults();
        retriever.ingest("acme", "aria", "backstory", "Aria grew up sailing the northern coast every summer.");

        let context = retriever.retrieve_context("acme", "aria", "sailing the coast", 3);
        assert!(context.contains("backstory"));
        assert!(context.contains("sailing"));
    }

    #[test]
    fn retrieve_on_empty_collection_returns_empty_string() {
        let retriever = RagRetriever::with_defaults();
        let context = retriever.retrieve_context("acme", "nobody", "anything", 3);
        assert_eq!(context, "");
    }

    #[test]
    fn retrieval_is_isolated_per_tenant() {
        let retriever = RagRetriever::with_defaults();
        retriever.ingest("acme", "aria", "backstory", "a very specific and unique detail about acme");

        let other_tenant = retriever.retrieve_context("other", "aria", "unique detail", 3);
        assert_eq!(other_tenant, "");
    }
}
