//! Job progress reporting.
//!
//! Reports observable progress while a job runs so users see how many chunks
//! are resolved and how many are left. Progress is emitted on **stderr** so
//! stdout remains parseable for scripts.

use std::io::Write;
use std::sync::Arc;

use crate::models::JobStatus;

/// A single progress event for a job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobProgressEvent {
    /// The chunk list was loaded; `total` chunks will be processed.
    Started { job_id: String, total: usize },
    /// One chunk reached a terminal state.
    ChunkResolved {
        job_id: String,
        index: usize,
        success: bool,
        completed: usize,
        failed: usize,
        total: usize,
    },
    /// The job reached a terminal state.
    Finished {
        job_id: String,
        status: JobStatus,
        completed: usize,
        failed: usize,
    },
}

/// Reports job progress. Implementations write to stderr (human or JSON).
pub trait JobProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the job tracker.
    fn report(&self, event: JobProgressEvent);
}

/// Human-friendly progress on stderr: "job 1f3c…  chunk 12  ok  13 / 1,024 resolved".
pub struct StderrProgress;

impl JobProgressReporter for StderrProgress {
    fn report(&self, event: JobProgressEvent) {
        let line = match &event {
            JobProgressEvent::Started { job_id, total } => {
                format!("job {}  started  {} chunks\n", job_id, format_number(*total))
            }
            JobProgressEvent::ChunkResolved {
                job_id,
                index,
                success,
                completed,
                failed,
                total,
            } => format!(
                "job {}  chunk {}  {}  {} / {} resolved\n",
                job_id,
                index,
                if *success { "ok" } else { "failed" },
                format_number(completed + failed),
                format_number(*total)
            ),
            JobProgressEvent::Finished {
                job_id,
                status,
                completed,
                failed,
            } => format!(
                "job {}  {}  completed {}  failed {}\n",
                job_id,
                status,
                format_number(*completed),
                format_number(*failed)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JobProgressReporter for JsonProgress {
    fn report(&self, event: JobProgressEvent) {
        let obj = match &event {
            JobProgressEvent::Started { job_id, total } => serde_json::json!({
                "event": "started",
                "job_id": job_id,
                "total": total
            }),
            JobProgressEvent::ChunkResolved {
                job_id,
                index,
                success,
                completed,
                failed,
                total,
            } => serde_json::json!({
                "event": "chunk",
                "job_id": job_id,
                "index": index,
                "success": success,
                "completed": completed,
                "failed": failed,
                "total": total
            }),
            JobProgressEvent::Finished {
                job_id,
                status,
                completed,
                failed,
            } => serde_json::json!({
                "event": "finished",
                "job_id": job_id,
                "status": status.as_str(),
                "completed": completed,
                "failed": failed
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl JobProgressReporter for NoProgress {
    fn report(&self, _event: JobProgressEvent) {}
}

fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode. Caller hands it to the job tracker.
    pub fn reporter(&self) -> Arc<dyn JobProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}
