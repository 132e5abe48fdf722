//! Chunk and job persistence abstraction.
//!
//! The [`ChunkStore`] trait is the only way the pipeline reads chunk lists
//! and writes chunk state, job counters, and the per-attempt audit trail.
//! Backends decide how (and whether) to persist; [`InMemoryChunkStore`]
//! keeps everything in process and backs the CLI and the tests.
//!
//! Implementations must be `Send + Sync` to be shared across job tasks.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Chunk, ChunkState, ProcessingJob, ProviderAttemptRecord};

/// One persisted provider attempt, correlated to its job and chunk.
#[derive(Debug, Clone, Serialize)]
pub struct StoredAttempt {
    pub job_id: String,
    pub chunk_id: String,
    pub record: ProviderAttemptRecord,
    pub created_at: DateTime<Utc>,
}

/// Abstract storage backend for manuscripts, chunk state and jobs.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`save_chunks`](ChunkStore::save_chunks) | Store a manuscript's chunks as `pending` |
/// | [`load_chunks`](ChunkStore::load_chunks) | Read the ordered chunk list |
/// | [`update_chunk`](ChunkStore::update_chunk) | Write one chunk's processing state |
/// | [`chunk_states`](ChunkStore::chunk_states) | Read every chunk's state |
/// | [`save_job`](ChunkStore::save_job) | Insert or update a job |
/// | [`get_job`](ChunkStore::get_job) | Read a job |
/// | [`record_attempts`](ChunkStore::record_attempts) | Append audit records |
/// | [`attempts`](ChunkStore::attempts) | Read a job's audit records |
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Replace the chunk list of a manuscript, resetting every chunk to `pending`.
    async fn save_chunks(&self, manuscript_id: &str, chunks: &[Chunk]) -> Result<()>;

    /// Chunks of a manuscript in ascending index order.
    async fn load_chunks(&self, manuscript_id: &str) -> Result<Vec<Chunk>>;

    async fn update_chunk(&self, manuscript_id: &str, state: &ChunkState) -> Result<()>;

    async fn chunk_states(&self, manuscript_id: &str) -> Result<Vec<ChunkState>>;

    async fn save_job(&self, job: &ProcessingJob) -> Result<()>;

    async fn get_job(&self, job_id: &str) -> Result<Option<ProcessingJob>>;

    async fn record_attempts(
        &self,
        job_id: &str,
        chunk_id: &str,
        attempts: &[ProviderAttemptRecord],
    ) -> Result<()>;

    async fn attempts(&self, job_id: &str) -> Result<Vec<StoredAttempt>>;
}

struct Manuscript {
    chunks: Vec<Chunk>,
    states: Vec<ChunkState>,
}

/// In-memory store for the CLI and tests.
pub struct InMemoryChunkStore {
    manuscripts: RwLock<HashMap<String, Manuscript>>,
    jobs: RwLock<HashMap<String, ProcessingJob>>,
    attempts: RwLock<Vec<StoredAttempt>>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self {
            manuscripts: RwLock::new(HashMap::new()),
            jobs: RwLock::new(HashMap::new()),
            attempts: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("store lock poisoned"))
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn save_chunks(&self, manuscript_id: &str, chunks: &[Chunk]) -> Result<()> {
        let mut chunks = chunks.to_vec();
        chunks.sort_by_key(|c| c.index);
        let states = chunks.iter().map(ChunkState::pending).collect();
        write(&self.manuscripts)?.insert(manuscript_id.to_string(), Manuscript { chunks, states });
        Ok(())
    }

    async fn load_chunks(&self, manuscript_id: &str) -> Result<Vec<Chunk>> {
        read(&self.manuscripts)?
            .get(manuscript_id)
            .map(|m| m.chunks.clone())
            .ok_or_else(|| anyhow!("Manuscript not found: {}", manuscript_id))
    }

    async fn update_chunk(&self, manuscript_id: &str, state: &ChunkState) -> Result<()> {
        let mut manuscripts = write(&self.manuscripts)?;
        let manuscript = manuscripts
            .get_mut(manuscript_id)
            .ok_or_else(|| anyhow!("Manuscript not found: {}", manuscript_id))?;
        match manuscript.states.iter_mut().find(|s| s.chunk_id == state.chunk_id) {
            Some(stored) => {
                *stored = state.clone();
                Ok(())
            }
            None => bail!("Chunk {} not found in manuscript {}", state.chunk_id, manuscript_id),
        }
    }

    async fn chunk_states(&self, manuscript_id: &str) -> Result<Vec<ChunkState>> {
        read(&self.manuscripts)?
            .get(manuscript_id)
            .map(|m| m.states.clone())
            .ok_or_else(|| anyhow!("Manuscript not found: {}", manuscript_id))
    }

    async fn save_job(&self, job: &ProcessingJob) -> Result<()> {
        write(&self.jobs)?.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<ProcessingJob>> {
        Ok(read(&self.jobs)?.get(job_id).cloned())
    }

    async fn record_attempts(
        &self,
        job_id: &str,
        chunk_id: &str,
        attempts: &[ProviderAttemptRecord],
    ) -> Result<()> {
        let now = Utc::now();
        write(&self.attempts)?.extend(attempts.iter().map(|record| StoredAttempt {
            job_id: job_id.to_string(),
            chunk_id: chunk_id.to_string(),
            record: record.clone(),
            created_at: now,
        }));
        Ok(())
    }

    async fn attempts(&self, job_id: &str) -> Result<Vec<StoredAttempt>> {
        Ok(read(&self.attempts)?
            .iter()
            .filter(|a| a.job_id == job_id)
            .cloned()
            .collect())
    }
}
