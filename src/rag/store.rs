//! In-process vector store
//!
//! Ported from `rag.py`'s `InMemoryVectorStore`: a collection-scoped map of
//! chunk id to (text, vector), searched by cosine similarity. Collections are
//! the unit of tenant/persona isolation — see `super::collection_name`.

use super::embedder::cosine_similarity;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub source: String,
    pub text: String,
}

#[derive(Default)]
struct Collection {
    chunks: HashMap<String, Chunk>,
    vectors: HashMap<String, Vec<f32>>,
}

/// A trait seam so the worker's retrieval path doesn't depend on the concrete
/// in-process store — a future Milvus-backed implementation could satisfy
/// the same interface (spec §4.5 names the in-process store as the minimum).
pub trait VectorStore: Send + Sync {
    fn upsert(&self, collection: &str, chunk: Chunk, vector: Vec<f32>);
    fn search(&self, collection: &str, query_vector: &[f32], top_k: usize) -> Vec<Chunk>;
    fn delete_by_source(&self, collection: &str, source: &str);
    fn drop_collection(&self, collection: &str);
}

pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self { collections: RwLock::new(HashMap::new()) }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorStore for InMemoryVectorStore {
    fn upsert(&self, collection: &str, chunk: Chunk, vector: Vec<f32>) {
        let mut collections = self.collections.write().unwrap();
        let entry = collections.entry(collection.to_string()).or_default();
        entry.vectors.insert(chunk.id.clone(), vector);
        entry.chunks.insert(chunk.id.clone(), chunk);
    }

    fn search(&self, collection: &str, query_vector: &[f32], top_k: usize) -> Vec<Chunk> {
        let collections = self.collections.read().unwrap();
        let Some(entry) = collections.get(collection) else { return Vec::new() };

        let mut scored: Vec<(f32, &Chunk)> = entry
            .vectors
            .iter()
            .map(|(id, vector)| (cosine_similarity(query_vector, vector), &entry.chunks[id]))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(top_k).map(|(_, chunk)| chunk.clone()).collect()
    }

    fn delete_by_source(&self, collection: &str, source: &str) {
        let mut collections = self.collections.write().unwrap();
        let Some(entry) = collections.get_mut(collection) else { return };
        let ids: Vec<String> =
            entry.chunks.iter().filter(|(_, c)| c.source == source).map(|(id, _)| id.clone()).collect();
        for id in ids {
            entry.chunks.remove(&id);
            entry.vectors.remove(&id);
        }
    }

    fn drop_collection(&self, collection: &str) {
        self.collections.write().unwrap().remove(collection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_returns_top_k_by_similarity() {
        let store = InMemoryVectorStore::new();
        store.upsert("c1", Chunk { id: "a".into(), source: "s".into(), text: "x".into() }, vec![1.0, 0.0]);
        store.upsert("c1", Chunk { id: "b".into(), source: "s".into(), text: "y".into() }, vec![0.0, 1.0]);

        let results = store.search("c1", &[1.0, 0.0], 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[test]
    fn delete_by_source_removes_matching_chunks_only() {
        let store = InMemoryVectorStore::new();
        store.upsert("c1", Chunk { id: "a".into(), source: "keep".into(), text: "x".into() }, vec![1.0]);
        store.upsert("c1", Chunk { id: "b".into(), source: "drop".into(), text: "y".into() }, vec![1.0]);

        store.delete_by_source("c1", "drop");

        let results = store.search("c1", &[1.0], 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[test]
    fn search_on_missing_collection_returns_empty() {
        let store = InMemoryVectorStore::new();
        assert!(store.search("missing", &[1.0], 5).is_empty());
    }
}
