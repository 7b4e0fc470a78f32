//! Core data models shared by the loader, the store, and retrieval.

use serde::Serialize;

/// A loaded text document.
///
/// `source` is the file name and is what the model is asked to cite.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub source: String,
    pub source_id: String,
    pub source_url: Option<String>,
    pub title: Option<String>,
    pub updated_at: i64,
    pub content_type: String,
    pub body: String,
    pub hash: String,
}

/// A chunk of a document's body text.
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}
