//! In-memory [`Store`] implementation.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Vector search is
//! brute-force cosine similarity over every stored vector, which is plenty
//! for a folder of policy files. Nothing is persisted; the collection lives
//! as long as the process.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, Document};

use super::{ChunkCandidate, Store, StoreStats};

/// Default collection name.
pub const DEFAULT_COLLECTION: &str = "nebula_gears_policies";

struct StoredChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Ephemeral, process-scoped vector collection.
pub struct InMemoryStore {
    collection: String,
    docs: RwLock<HashMap<String, Document>>,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryStore {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            docs: RwLock::new(HashMap::new()),
            chunks: RwLock::new(Vec::new()),
        }
    }

    fn read_docs(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Document>>> {
        self.docs
            .read()
            .map_err(|_| anyhow!("collection '{}' lock poisoned", self.collection))
    }

    fn write_docs(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Document>>> {
        self.docs
            .write()
            .map_err(|_| anyhow!("collection '{}' lock poisoned", self.collection))
    }

    fn read_chunks(&self) -> Result<RwLockReadGuard<'_, Vec<StoredChunk>>> {
        self.chunks
            .read()
            .map_err(|_| anyhow!("collection '{}' lock poisoned", self.collection))
    }

    fn write_chunks(&self) -> Result<RwLockWriteGuard<'_, Vec<StoredChunk>>> {
        self.chunks
            .write()
            .map_err(|_| anyhow!("collection '{}' lock poisoned", self.collection))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_COLLECTION)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn upsert_document(&self, doc: &Document) -> Result<String> {
        self.write_docs()?.insert(doc.id.clone(), doc.clone());
        Ok(doc.id.clone())
    }

    async fn replace_chunks(
        &self,
        doc_id: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        if chunks.len() != vectors.len() {
            bail!(
                "document {} has {} chunks but {} vectors",
                doc_id,
                chunks.len(),
                vectors.len()
            );
        }
        if !self.read_docs()?.contains_key(doc_id) {
            bail!("document not found: {}", doc_id);
        }

        let mut stored = self.write_chunks()?;
        stored.retain(|sc| sc.chunk.document_id != doc_id);
        for (chunk, vector) in chunks.iter().zip(vectors) {
            let mut chunk = chunk.clone();
            chunk.document_id = doc_id.to_string();
            stored.push(StoredChunk {
                chunk,
                vector: vector.clone(),
            });
        }
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.read_docs()?.get(id).cloned())
    }

    async fn documents(&self) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = self.read_docs()?.values().cloned().collect();
        docs.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(docs)
    }

    async fn vector_search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ChunkCandidate>> {
        let stored = self.read_chunks()?;
        let mut candidates: Vec<ChunkCandidate> = stored
            .iter()
            .map(|sc| ChunkCandidate {
                chunk_id: sc.chunk.id.clone(),
                document_id: sc.chunk.document_id.clone(),
                chunk_index: sc.chunk.chunk_index,
                raw_score: cosine_similarity(query_vec, &sc.vector) as f64,
                text: sc.chunk.text.clone(),
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk_index.cmp(&b.chunk_index))
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let chunks = self.read_chunks()?;
        Ok(StoreStats {
            documents: self.read_docs()?.len(),
            chunks: chunks.len(),
            vectors: chunks.iter().filter(|sc| !sc.vector.is_empty()).count(),
        })
    }
}
