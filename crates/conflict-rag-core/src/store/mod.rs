//! Vector store abstraction.
//!
//! The [`Store`] trait covers everything the indexing and retrieval
//! pipeline needs from a collection: documents, their chunks, one embedding
//! per chunk, and nearest-neighbour lookup. [`memory::InMemoryStore`] is
//! the ephemeral implementation the CLI uses.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, Document};

/// A chunk returned from vector search.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: i64,
    /// Cosine similarity against the query vector.
    pub raw_score: f64,
    pub text: String,
}

/// Item counts for a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub documents: usize,
    pub chunks: usize,
    pub vectors: usize,
}

/// Abstract vector store backing one named collection.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_document`](Store::upsert_document) | Insert or replace a document |
/// | [`replace_chunks`](Store::replace_chunks) | Replace a document's chunks and their vectors |
/// | [`get_document`](Store::get_document) | Look up a document by ID |
/// | [`documents`](Store::documents) | All documents, ordered by `source_id` |
/// | [`vector_search`](Store::vector_search) | Cosine similarity search over chunk vectors |
/// | [`stats`](Store::stats) | Document, chunk, and vector counts |
#[async_trait]
pub trait Store: Send + Sync {
    /// Name of the collection this store holds.
    fn collection(&self) -> &str;

    /// Insert or replace a document, returning its ID.
    async fn upsert_document(&self, doc: &Document) -> Result<String>;

    /// Replace all chunks for a document. `vectors[i]` belongs to `chunks[i]`.
    async fn replace_chunks(&self, doc_id: &str, chunks: &[Chunk], vectors: &[Vec<f32>])
        -> Result<()>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    async fn documents(&self) -> Result<Vec<Document>>;

    /// Return up to `limit` chunks ranked by similarity to `query_vec`.
    async fn vector_search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ChunkCandidate>>;

    async fn stats(&self) -> Result<StoreStats>;
}
