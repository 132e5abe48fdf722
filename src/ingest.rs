//! Manuscript ingestion: read text, chunk it, store the chunks.
//!
//! Validation diagnostics are advisory. Undersized or oversized chunks are
//! logged and still stored.

use std::path::Path;

use anyhow::{Context, Result};

use crate::chunk::{ChunkOptions, TextChunker};
use crate::models::Chunk;
use crate::store::ChunkStore;

/// Read a manuscript file as UTF-8 text.
pub fn read_manuscript(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read manuscript: {}", path.display()))?;
    String::from_utf8(bytes)
        .with_context(|| format!("Manuscript is not valid UTF-8: {}", path.display()))
}

/// Chunk `text` and save the chunks for `manuscript_id`, replacing any
/// previous chunk list.
pub async fn ingest_manuscript(
    store: &dyn ChunkStore,
    manuscript_id: &str,
    text: &str,
    options: ChunkOptions,
) -> Result<Vec<Chunk>> {
    let chunker = TextChunker::new(options);
    let chunks = chunker.chunk(text);

    for chunk in &chunks {
        let validation = chunker.validate(chunk);
        if !validation.valid {
            tracing::warn!(
                manuscript_id,
                chunk_index = chunk.index,
                issues = ?validation.issues,
                "Chunk validation issues"
            );
        }
    }

    store
        .save_chunks(manuscript_id, &chunks)
        .await
        .with_context(|| format!("Failed to store chunks for {}", manuscript_id))?;

    tracing::info!(manuscript_id, chunks = chunks.len(), "Manuscript ingested");
    Ok(chunks)
}
