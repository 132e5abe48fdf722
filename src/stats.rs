//! Job and provider statistics.
//!
//! Summarizes the attempt audit trail and chunk states of a job: how far it
//! got, which providers answered, and how reliable each slot has been. Used
//! by `relay process` to print a summary once a job finishes.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::models::{ChunkState, ChunkStatus, ProcessingJob, ProviderAttemptRecord, ProviderSlot};
use crate::store::ChunkStore;

/// Aggregate figures over a set of provider attempts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptStats {
    pub total_attempts: usize,
    pub successful_attempts: usize,
    pub failed_attempts: usize,
    pub provider_success: BTreeMap<ProviderSlot, usize>,
    pub provider_failure: BTreeMap<ProviderSlot, usize>,
    pub average_response_time_ms: f64,
    /// Percentage in `0.0..=100.0`.
    pub success_rate: f64,
}

pub fn attempt_stats(attempts: &[ProviderAttemptRecord]) -> AttemptStats {
    let mut provider_success = BTreeMap::new();
    let mut provider_failure = BTreeMap::new();
    let mut successful = 0;
    let mut total_time: u64 = 0;

    for a in attempts {
        total_time = total_time.saturating_add(a.response_time_ms);
        if a.success {
            successful += 1;
            *provider_success.entry(a.provider).or_insert(0) += 1;
        } else {
            *provider_failure.entry(a.provider).or_insert(0) += 1;
        }
    }

    let total = attempts.len();
    let (average_response_time_ms, success_rate) = if total > 0 {
        (
            total_time as f64 / total as f64,
            successful as f64 * 100.0 / total as f64,
        )
    } else {
        (0.0, 0.0)
    };

    AttemptStats {
        total_attempts: total,
        successful_attempts: successful,
        failed_attempts: total - successful,
        provider_success,
        provider_failure,
        average_response_time_ms,
        success_rate,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProviderHealth {
    pub available: bool,
    pub success_rate: f64,
}

/// Health of every slot. A slot is unavailable only when it has attempts and
/// none of them succeeded; a slot with no recorded attempts counts as healthy.
pub fn provider_health(
    attempts: &[ProviderAttemptRecord],
) -> BTreeMap<ProviderSlot, ProviderHealth> {
    ProviderSlot::ALL
        .into_iter()
        .map(|slot| {
            let mine: Vec<&ProviderAttemptRecord> =
                attempts.iter().filter(|a| a.provider == slot).collect();
            let success_rate = if mine.is_empty() {
                100.0
            } else {
                mine.iter().filter(|a| a.success).count() as f64 * 100.0 / mine.len() as f64
            };
            let health = ProviderHealth {
                available: success_rate > 0.0,
                success_rate,
            };
            (slot, health)
        })
        .collect()
}

/// Point-in-time view of a job for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job: ProcessingJob,
    pub chunks_by_status: BTreeMap<&'static str, usize>,
    /// Completed chunks as a percentage of the total.
    pub progress: f64,
    pub provider_stats: AttemptStats,
}

impl JobSnapshot {
    pub fn build(
        job: ProcessingJob,
        states: &[ChunkState],
        attempts: &[ProviderAttemptRecord],
    ) -> Self {
        let mut chunks_by_status = BTreeMap::new();
        for status in [
            ChunkStatus::Pending,
            ChunkStatus::Processing,
            ChunkStatus::Completed,
            ChunkStatus::Failed,
        ] {
            chunks_by_status.insert(status.as_str(), 0);
        }
        for state in states {
            *chunks_by_status.entry(state.status.as_str()).or_insert(0) += 1;
        }

        let progress = if job.total_chunks > 0 {
            job.completed_chunks as f64 * 100.0 / job.total_chunks as f64
        } else {
            0.0
        };

        Self {
            job,
            chunks_by_status,
            progress,
            provider_stats: attempt_stats(attempts),
        }
    }
}

/// Load a job and everything needed to describe it.
pub async fn job_snapshot(store: &dyn ChunkStore, job_id: &str) -> Result<JobSnapshot> {
    let job = store
        .get_job(job_id)
        .await?
        .ok_or_else(|| anyhow!("Job not found: {}", job_id))?;
    let states = store.chunk_states(&job.manuscript_id).await?;
    let attempts: Vec<ProviderAttemptRecord> = store
        .attempts(job_id)
        .await?
        .into_iter()
        .map(|a| a.record)
        .collect();
    Ok(JobSnapshot::build(job, &states, &attempts))
}

/// Print a human-readable job summary to stdout.
pub fn print_snapshot(snapshot: &JobSnapshot) {
    let job = &snapshot.job;
    let stats = &snapshot.provider_stats;

    println!("Chunk Relay — Job Summary");
    println!("=========================");
    println!();
    println!("  Job:         {}", job.id);
    println!("  Manuscript:  {}", job.manuscript_id);
    println!("  Status:      {}", job.status);
    println!("  Chunks:      {}", job.total_chunks);
    println!("  Progress:    {:.0}%", snapshot.progress);
    println!("  Completed:   {}", job.completed_chunks);
    println!("  Failed:      {}", job.failed_chunks);
    if let Some(ref msg) = job.error_message {
        println!("  Error:       {}", msg);
    }
    println!("  Elapsed:     {}", format_duration(job.updated_at - job.created_at));
    println!();
    println!(
        "  Attempts:    {} ({} ok, {} failed, {:.1}% success, avg {:.0} ms)",
        stats.total_attempts,
        stats.successful_attempts,
        stats.failed_attempts,
        stats.success_rate,
        stats.average_response_time_ms
    );

    if stats.total_attempts > 0 {
        println!();
        println!("  By provider:");
        println!("  {:<10} {:>8} {:>8}", "PROVIDER", "OK", "FAILED");
        println!("  {}", "-".repeat(28));
        for slot in ProviderSlot::ALL {
            let ok = stats.provider_success.get(&slot).copied().unwrap_or(0);
            let failed = stats.provider_failure.get(&slot).copied().unwrap_or(0);
            if ok + failed > 0 {
                println!("  {:<10} {:>8} {:>8}", slot.as_str(), ok, failed);
            }
        }
    }

    println!();
}

fn format_duration(delta: chrono::Duration) -> String {
    let secs = delta.num_seconds().max(0);
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}
