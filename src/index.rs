//! Index construction.
//!
//! Loads the data folder, chunks every document, embeds the chunks in
//! batches, and stores everything in a fresh [`InMemoryStore`].

use anyhow::{bail, Context, Result};

use conflict_rag_core::chunk::chunk_text;
use conflict_rag_core::embedding::{EmbedKind, Embedder};
use conflict_rag_core::models::{Chunk, Document};
use conflict_rag_core::store::memory::InMemoryStore;
use conflict_rag_core::store::Store;

use crate::config::Config;
use crate::loader;
use crate::progress::{IndexProgressEvent, ProgressReporter};

/// Summary of a freshly built index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    /// Dimensionality of the stored vectors.
    pub dims: usize,
}

/// Load the data folder and index it with `embedder`.
pub async fn build_index(
    config: &Config,
    embedder: &dyn Embedder,
    progress: &dyn ProgressReporter,
) -> Result<(InMemoryStore, IndexStats)> {
    progress.report(IndexProgressEvent::Loading {
        dir: config.data.dir.display().to_string(),
    });
    let docs = load_corpus(config)?;
    index_documents(config, docs, embedder, progress).await
}

/// Load the data folder, failing when nothing matches.
pub fn load_corpus(config: &Config) -> Result<Vec<Document>> {
    let docs = loader::load_documents(&config.data)?;
    if docs.is_empty() {
        bail!(
            "No documents found in '{}' (include globs: {})",
            config.data.dir.display(),
            config.data.include_globs.join(", ")
        );
    }
    Ok(docs)
}

/// Index already-loaded documents.
pub async fn index_documents(
    config: &Config,
    docs: Vec<Document>,
    embedder: &dyn Embedder,
    progress: &dyn ProgressReporter,
) -> Result<(InMemoryStore, IndexStats)> {
    let store = InMemoryStore::new(config.retrieval.collection.clone());

    let per_doc: Vec<(Document, Vec<Chunk>)> = docs
        .into_iter()
        .map(|doc| {
            let chunks = chunk_text(
                &doc.id,
                &doc.body,
                config.chunking.max_tokens,
                config.chunking.overlap_tokens,
            );
            (doc, chunks)
        })
        .collect();

    let texts: Vec<String> = per_doc
        .iter()
        .flat_map(|(_, chunks)| chunks.iter().map(|c| c.text.clone()))
        .collect();
    let total = texts.len() as u64;

    let batch_size = config.embedding.batch_size.max(1);
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size) {
        let batch_vectors = embedder
            .embed(batch, EmbedKind::Document)
            .await
            .with_context(|| format!("Failed to embed documents with {}", embedder.model_name()))?;
        if batch_vectors.len() != batch.len() {
            bail!(
                "embedder returned {} vectors for {} chunks",
                batch_vectors.len(),
                batch.len()
            );
        }
        vectors.extend(batch_vectors);
        progress.report(IndexProgressEvent::Embedding {
            n: vectors.len() as u64,
            total,
        });
    }

    let dims = vectors.first().map(|v| v.len()).unwrap_or(0);
    let declared = embedder.dims();
    if declared > 0 && dims != declared {
        bail!(
            "{} returned {}-dimensional vectors, expected {}",
            embedder.model_name(),
            dims,
            declared
        );
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        bail!(
            "embedder returned vectors of mixed dimensionality ({} and {})",
            dims,
            bad.len()
        );
    }

    let mut offset = 0;
    let mut chunk_count = 0;
    let documents = per_doc.len();
    for (doc, chunks) in per_doc {
        let doc_vectors = &vectors[offset..offset + chunks.len()];
        offset += chunks.len();
        chunk_count += chunks.len();

        let doc_id = store.upsert_document(&doc).await?;
        store.replace_chunks(&doc_id, &chunks, doc_vectors).await?;
    }

    let sources: Vec<String> = store
        .documents()
        .await?
        .into_iter()
        .map(|d| d.source)
        .collect();
    tracing::debug!(?sources, "indexed sources");
    tracing::info!(
        collection = store.collection(),
        documents,
        chunks = chunk_count,
        dims,
        "index built"
    );

    Ok((
        store,
        IndexStats {
            documents,
            chunks: chunk_count,
            dims,
        },
    ))
}
