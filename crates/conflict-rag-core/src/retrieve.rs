//! Top-k retrieval over a [`Store`].
//!
//! The retriever works entirely through the [`Store`] trait. The caller
//! embeds the question and passes the query vector in.
//!
//! # Algorithm
//!
//! 1. Fetch `candidate_k` chunk candidates by cosine similarity and drop
//!    those below `min_score`, if set. In [`GroupBy::Document`] mode the
//!    fetch doubles until `top_k` documents are represented or the store
//!    is exhausted.
//! 2. Group or pass through the candidates.
//!    In [`GroupBy::Chunk`] mode each candidate is a result. In
//!    [`GroupBy::Document`] mode candidates are grouped per document: the
//!    document score is its best chunk's score, and its text is the
//!    `max_chunks_per_doc` best chunks in reading order.
//! 3. Sort by score (desc), then source name (asc).
//! 4. Truncate to `top_k`.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::store::{ChunkCandidate, Store};

/// Unit of retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    /// One result per document, built from its best chunks.
    #[default]
    Document,
    /// One result per chunk.
    Chunk,
}

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct RetrievalParams {
    pub top_k: usize,
    pub candidate_k: usize,
    pub group_by: GroupBy,
    pub max_chunks_per_doc: usize,
    pub min_score: Option<f64>,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: 3,
            candidate_k: 20,
            group_by: GroupBy::Document,
            max_chunks_per_doc: 3,
            min_score: None,
        }
    }
}

/// A retrieved passage, ready to be placed in a prompt.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedDocument {
    pub document_id: String,
    /// File name of the source document.
    pub source: String,
    /// Cosine similarity of the best matching chunk.
    pub score: f64,
    pub text: String,
}

/// Retrieve the `top_k` passages most similar to `query_vec`.
pub async fn retrieve<S: Store + ?Sized>(
    store: &S,
    query_vec: &[f32],
    params: &RetrievalParams,
) -> Result<Vec<RetrievedDocument>> {
    if params.top_k == 0 {
        bail!("top_k must be >= 1");
    }
    if query_vec.is_empty() {
        bail!("query vector is empty");
    }

    let candidates = fetch_candidates(store, query_vec, params).await?;
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let mut sources: HashMap<String, String> = HashMap::new();
    for c in &candidates {
        if !sources.contains_key(&c.document_id) {
            let source = store
                .get_document(&c.document_id)
                .await?
                .map(|d| d.source)
                .unwrap_or_else(|| c.document_id.clone());
            sources.insert(c.document_id.clone(), source);
        }
    }
    let source_of = |doc_id: &str| sources.get(doc_id).cloned().unwrap_or_default();

    let mut results: Vec<RetrievedDocument> = match params.group_by {
        GroupBy::Chunk => candidates
            .iter()
            .map(|c| RetrievedDocument {
                document_id: c.document_id.clone(),
                source: source_of(&c.document_id),
                score: c.raw_score,
                text: c.text.clone(),
            })
            .collect(),
        GroupBy::Document => group_by_document(&candidates, params.max_chunks_per_doc.max(1))
            .into_iter()
            .map(|(doc_id, score, text)| RetrievedDocument {
                source: source_of(&doc_id),
                document_id: doc_id,
                score,
                text,
            })
            .collect(),
    };

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.source.cmp(&b.source))
    });
    results.truncate(params.top_k);

    Ok(results)
}

/// Fetch chunk candidates above `min_score`.
///
/// In document mode the fetch is widened (doubling) until `top_k` distinct
/// documents are present or every stored chunk has been considered, so one
/// long document cannot crowd the others out.
async fn fetch_candidates<S: Store + ?Sized>(
    store: &S,
    query_vec: &[f32],
    params: &RetrievalParams,
) -> Result<Vec<ChunkCandidate>> {
    let total = store.stats().await?.chunks;
    let mut limit = params.candidate_k.max(params.top_k);

    loop {
        let mut candidates = store.vector_search(query_vec, limit).await?;
        if let Some(min) = params.min_score {
            candidates.retain(|c| c.raw_score >= min);
        }

        let enough = match params.group_by {
            GroupBy::Chunk => true,
            GroupBy::Document => distinct_documents(&candidates) >= params.top_k,
        };
        if enough || limit >= total {
            return Ok(candidates);
        }
        limit = (limit * 2).min(total);
    }
}

fn distinct_documents(candidates: &[ChunkCandidate]) -> usize {
    candidates
        .iter()
        .map(|c| c.document_id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Group candidates per document as `(document_id, max score, joined text)`.
fn group_by_document(
    candidates: &[ChunkCandidate],
    max_chunks_per_doc: usize,
) -> Vec<(String, f64, String)> {
    let mut groups: HashMap<&str, Vec<&ChunkCandidate>> = HashMap::new();
    for c in candidates {
        groups.entry(c.document_id.as_str()).or_default().push(c);
    }

    groups
        .into_iter()
        .map(|(doc_id, mut chunks)| {
            chunks.sort_by(|a, b| {
                b.raw_score
                    .partial_cmp(&a.raw_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let best = chunks[0].raw_score;
            chunks.truncate(max_chunks_per_doc);
            chunks.sort_by_key(|c| c.chunk_index);
            let text = chunks
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            (doc_id.to_string(), best, text)
        })
        .collect()
}
