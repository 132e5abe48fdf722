//! Supervised background execution of processing jobs.
//!
//! [`JobSupervisor::submit`] creates a job and hands it to a spawned tokio
//! task, returning immediately with the `in_progress` job record. Each job
//! gets a child of the supervisor's root [`CancellationToken`], so one job can
//! be cancelled alone and [`JobSupervisor::shutdown`] cancels them all.
//!
//! The job itself runs in an inner task. If that task panics or is aborted the
//! monitoring task marks the job `failed` and persists it, so a crash never
//! leaves a job stuck `in_progress`.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::models::ProcessingJob;
use crate::tracker::{JobOptions, JobTracker};

struct RunningJob {
    cancel: CancellationToken,
    handle: JoinHandle<ProcessingJob>,
}

pub struct JobSupervisor {
    tracker: Arc<JobTracker>,
    root: CancellationToken,
    jobs: Mutex<HashMap<String, RunningJob>>,
}

impl JobSupervisor {
    pub fn new(tracker: Arc<JobTracker>) -> Self {
        Self {
            tracker,
            root: CancellationToken::new(),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Token whose cancellation stops every job of this supervisor.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Create a job for `manuscript_id` and start it in the background.
    pub async fn submit(&self, manuscript_id: &str, options: JobOptions) -> Result<ProcessingJob> {
        if self.root.is_cancelled() {
            bail!("Supervisor is shut down");
        }

        let job = self
            .tracker
            .create_job(manuscript_id, options.system_prompt.clone())
            .await
            .with_context(|| format!("Failed to create job for manuscript {}", manuscript_id))?;

        let cancel = self.root.child_token();
        let span = tracing::info_span!("job", job_id = %job.id, manuscript_id);
        let handle = tokio::spawn(
            supervise(self.tracker.clone(), job.clone(), options, cancel.clone()).instrument(span),
        );

        tracing::info!(job_id = %job.id, total = job.total_chunks, "Job submitted");
        let mut jobs = self.jobs.lock().await;
        // Finished jobs are read back from the store by `wait`.
        jobs.retain(|_, running| !running.handle.is_finished());
        jobs.insert(job.id.clone(), RunningJob { cancel, handle });
        Ok(job)
    }

    /// Request cancellation of one job. Returns `false` if it is not running.
    pub async fn cancel(&self, job_id: &str) -> bool {
        match self.jobs.lock().await.get(job_id) {
            Some(running) => {
                running.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self, job_id: &str) -> bool {
        self.jobs
            .lock()
            .await
            .get(job_id)
            .map_or(false, |running| !running.handle.is_finished())
    }

    /// Wait for a job to reach its terminal state.
    ///
    /// A job that was already awaited is read back from the store.
    pub async fn wait(&self, job_id: &str) -> Result<ProcessingJob> {
        let running = self.jobs.lock().await.remove(job_id);
        match running {
            Some(running) => running
                .handle
                .await
                .with_context(|| format!("Supervisor task for job {} failed", job_id)),
            None => match self.tracker.store().get_job(job_id).await? {
                Some(job) if job.status.is_terminal() => Ok(job),
                Some(_) => bail!("Job {} is not managed by this supervisor", job_id),
                None => bail!("Job not found: {}", job_id),
            },
        }
    }

    /// Cancel every job and wait for all of them to settle.
    pub async fn shutdown(&self) -> Vec<ProcessingJob> {
        self.root.cancel();
        let running: Vec<(String, RunningJob)> = self.jobs.lock().await.drain().collect();

        let mut finished = Vec::with_capacity(running.len());
        for (job_id, job) in running {
            match job.handle.await {
                Ok(job) => finished.push(job),
                Err(e) => tracing::error!(job_id = %job_id, error = %e, "Supervisor task failed"),
            }
        }
        finished
    }
}

async fn supervise(
    tracker: Arc<JobTracker>,
    job: ProcessingJob,
    options: JobOptions,
    cancel: CancellationToken,
) -> ProcessingJob {
    let run = tokio::spawn({
        let tracker = tracker.clone();
        let job = job.clone();
        async move { tracker.run(job, &options, cancel).await }
            .instrument(tracing::Span::current())
    });

    match run.await {
        Ok(job) => job,
        Err(e) => {
            let mut job = job;
            let message = if e.is_panic() {
                format!("Job task crashed: {}", e)
            } else {
                format!("Job task aborted: {}", e)
            };
            tracing::error!(job_id = %job.id, error = %message, "Job task did not complete");

            // Keep whatever counters the task persisted before it died.
            if let Ok(Some(stored)) = tracker.store().get_job(&job.id).await {
                job = stored;
            }
            job.fail(message);
            if let Err(e) = tracker.store().save_job(&job).await {
                tracing::error!(job_id = %job.id, error = %e, "Failed to persist crashed job");
            }
            job
        }
    }
}
