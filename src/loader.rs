//! Data-folder loader.
//!
//! Walks the configured data directory and turns every matching file into
//! a [`Document`] whose `source` is the file name, so answers can cite it.
//! Glob patterns are matched against the path relative to the folder and
//! `*` does not cross `/`: the default `*.txt` only picks up top-level
//! files, `**/*.txt` recurses.

use anyhow::{bail, Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::path::Path;
use uuid::Uuid;
use walkdir::WalkDir;

use conflict_rag_core::models::Document;

use crate::config::DataConfig;

pub fn load_documents(data: &DataConfig) -> Result<Vec<Document>> {
    let root = &data.dir;
    if !root.is_dir() {
        bail!(
            "Folder '{}' not found. Please move your .txt files into a '{}' folder.",
            root.display(),
            root.display()
        );
    }

    let include_set = build_globset(&data.include_globs)?;
    let exclude_set = build_globset(&data.exclude_globs)?;

    let mut docs = Vec::new();

    let mut walker = WalkDir::new(root).follow_links(data.follow_symlinks);
    if let Some(depth) = walk_depth(&data.include_globs) {
        walker = walker.max_depth(depth);
    }
    for entry in walker {
        let entry = entry?;
        let is_file = entry.file_type().is_file()
            || (entry.path_is_symlink() && entry.path().is_file());
        if !is_file {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        docs.push(file_to_document(path, &rel_str)?);
    }

    docs.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    tracing::debug!(dir = %root.display(), count = docs.len(), "loaded documents");

    Ok(docs)
}

fn file_to_document(path: &Path, relative_path: &str) -> Result<Document> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    let updated_at = metadata
        .modified()
        .ok()
        .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} as UTF-8 text", path.display()))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| relative_path.to_string());

    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());

    Ok(Document {
        id: Uuid::new_v4().to_string(),
        source: file_name.clone(),
        source_id: relative_path.to_string(),
        source_url: Some(format!("file://{}", path.display())),
        title: Some(file_name),
        updated_at,
        content_type: "text/plain".to_string(),
        body,
        hash: format!("{:x}", hasher.finalize()),
    })
}

/// Deepest directory level any include pattern can match, or `None` when a
/// `**` pattern needs an unbounded walk.
fn walk_depth(patterns: &[String]) -> Option<usize> {
    if patterns.iter().any(|p| p.contains("**")) {
        return None;
    }
    patterns.iter().map(|p| p.matches('/').count() + 1).max()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .with_context(|| format!("Invalid glob pattern: {}", pattern))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
