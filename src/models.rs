//! Core data models used throughout chunk-relay.
//!
//! These types represent the chunks, jobs, provider attempts, and processing
//! results that flow through the chunk → orchestrate → track pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A logical completion backend, ranked by priority.
///
/// The set is closed: an invalid provider identifier cannot be represented.
/// [`ProviderSlot::ALL`] is the fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSlot {
    Main,
    Backup1,
    Backup2,
}

impl ProviderSlot {
    /// All slots in fallback priority order.
    pub const ALL: [ProviderSlot; 3] = [
        ProviderSlot::Main,
        ProviderSlot::Backup1,
        ProviderSlot::Backup2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderSlot::Main => "main",
            ProviderSlot::Backup1 => "backup1",
            ProviderSlot::Backup2 => "backup2",
        }
    }
}

impl fmt::Display for ProviderSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderSlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(ProviderSlot::Main),
            "backup1" => Ok(ProviderSlot::Backup1),
            "backup2" => Ok(ProviderSlot::Backup2),
            other => Err(format!("Unknown provider slot: '{}'", other)),
        }
    }
}

/// Role tag for a completion message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// A single role-tagged message sent to a completion provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A bounded segment of a manuscript's normalized text.
///
/// Created once by the chunker and immutable afterwards. Character and word
/// counts are derived from `content` on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub index: usize,
    pub content: String,
    /// Number of leading characters re-included from the previous chunk.
    pub overlap: usize,
    /// SHA-256 of `content`, hex encoded.
    pub hash: String,
}

impl Chunk {
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }

    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }

    /// The part of `content` that is not shared with the previous chunk.
    pub fn unique_content(&self) -> &str {
        match self.content.char_indices().nth(self.overlap) {
            Some((byte_idx, _)) => &self.content[byte_idx..],
            None => "",
        }
    }
}

/// Processing state of a single chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Pending => "pending",
            ChunkStatus::Processing => "processing",
            ChunkStatus::Completed => "completed",
            ChunkStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ChunkStatus::Completed | ChunkStatus::Failed)
    }
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable processing record for a chunk, as written to the chunk store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkState {
    pub chunk_id: String,
    pub index: usize,
    pub status: ChunkStatus,
    pub response: Option<String>,
    pub provider_used: Option<ProviderSlot>,
    pub error_message: Option<String>,
    pub retry_count: usize,
}

impl ChunkState {
    pub fn pending(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            index: chunk.index,
            status: ChunkStatus::Pending,
            response: None,
            provider_used: None,
            error_message: None,
            retry_count: 0,
        }
    }

    /// `pending → processing`. A chunk from an earlier run may be re-entered
    /// from `failed`; a completed chunk is never reopened.
    pub fn begin(&mut self) -> bool {
        if self.status == ChunkStatus::Completed {
            return false;
        }
        self.status = ChunkStatus::Processing;
        self.error_message = None;
        true
    }

    /// Apply a processing result: `processing → completed | failed`.
    pub fn resolve(&mut self, result: &ProcessResult) {
        self.retry_count = result.attempts;
        if result.success {
            self.status = ChunkStatus::Completed;
            self.response = result.response.clone();
            self.provider_used = result.provider_used;
            self.error_message = None;
        } else {
            self.status = ChunkStatus::Failed;
            self.error_message = result.error_message.clone();
        }
    }

    /// `processing → failed` for an error raised outside the orchestrator.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = ChunkStatus::Failed;
        self.error_message = Some(message.into());
    }
}

/// Aggregate status of a processing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    InProgress,
    Completed,
    Partial,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Partial => "partial",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::InProgress)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing run over every chunk of one manuscript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub id: String,
    pub manuscript_id: String,
    pub status: JobStatus,
    pub total_chunks: usize,
    pub completed_chunks: usize,
    pub failed_chunks: usize,
    pub error_message: Option<String>,
    pub system_prompt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingJob {
    pub fn new(manuscript_id: &str, total_chunks: usize, system_prompt: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            manuscript_id: manuscript_id.to_string(),
            status: JobStatus::InProgress,
            total_chunks,
            completed_chunks: 0,
            failed_chunks: 0,
            error_message: None,
            system_prompt,
            created_at: now,
            updated_at: now,
        }
    }

    /// Chunks resolved so far, successfully or not.
    pub fn resolved_chunks(&self) -> usize {
        self.completed_chunks + self.failed_chunks
    }

    /// Count one chunk resolution. Ignored once every chunk is accounted for
    /// or the job is terminal, so the counters never exceed `total_chunks`.
    pub fn record(&mut self, success: bool) {
        if self.status.is_terminal() || self.resolved_chunks() >= self.total_chunks {
            return;
        }
        if success {
            self.completed_chunks += 1;
        } else {
            self.failed_chunks += 1;
        }
        self.updated_at = Utc::now();
    }

    /// Derive the terminal status from the chunk outcome distribution.
    pub fn finish(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        if self.failed_chunks == 0 {
            self.status = JobStatus::Completed;
            self.error_message = None;
        } else {
            self.status = JobStatus::Partial;
            self.error_message = Some(format!("{} chunks failed to process", self.failed_chunks));
        }
        self.updated_at = Utc::now();
    }

    /// Force the job into `failed` after a job-wide error.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error_message = Some(message.into());
        self.updated_at = Utc::now();
    }
}

/// Outcome of a single provider invocation for a single chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAttemptRecord {
    pub provider: ProviderSlot,
    /// 1-based retry counter within `provider`.
    pub attempt: u32,
    pub success: bool,
    pub response_time_ms: u64,
    pub error_message: Option<String>,
}

/// Uniform result of resolving one chunk across all providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub success: bool,
    pub response: Option<String>,
    pub provider_used: Option<ProviderSlot>,
    pub attempts: usize,
    pub error_message: Option<String>,
    pub total_response_time_ms: u64,
    pub provider_attempts: Vec<ProviderAttemptRecord>,
}

impl ProcessResult {
    pub fn succeeded(
        response: String,
        provider: ProviderSlot,
        provider_attempts: Vec<ProviderAttemptRecord>,
    ) -> Self {
        Self {
            success: true,
            response: Some(response),
            provider_used: Some(provider),
            attempts: provider_attempts.len(),
            error_message: None,
            total_response_time_ms: total_time(&provider_attempts),
            provider_attempts,
        }
    }

    pub fn failed(error_message: String, provider_attempts: Vec<ProviderAttemptRecord>) -> Self {
        Self {
            success: false,
            response: None,
            provider_used: None,
            attempts: provider_attempts.len(),
            error_message: Some(error_message),
            total_response_time_ms: total_time(&provider_attempts),
            provider_attempts,
        }
    }
}

fn total_time(attempts: &[ProviderAttemptRecord]) -> u64 {
    attempts.iter().map(|a| a.response_time_ms).sum()
}
