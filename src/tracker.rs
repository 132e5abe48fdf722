//! Job and chunk state machine.
//!
//! [`JobTracker::run`] drives one job: it loads the manuscript's chunks, moves
//! each through `pending → processing → completed | failed`, persists chunk
//! state, the attempt trace and the job counters after every resolution, and
//! finally derives the terminal job status.
//!
//! Errors while processing a single chunk (including a panic inside a
//! provider) mark only that chunk failed. Errors outside that scope, such as
//! an unreadable chunk list, a failed write of the chunk's final state, or
//! cancellation, fail the whole job and stop processing.
//!
//! Each run starts from the stored chunk states, so a chunk completed by an
//! earlier job is counted again but never reopened.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use futures::future::try_join_all;
use futures::FutureExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::models::{Chunk, ChunkState, ProcessResult, ProcessingJob};
use crate::orchestrator::{FallbackOrchestrator, ProcessChunkParams};
use crate::progress::{JobProgressEvent, JobProgressReporter, NoProgress};
use crate::store::ChunkStore;

/// Per-run prompts and concurrency.
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub system_prompt: Option<String>,
    pub user_prompt: Option<String>,
    /// Chunks in flight at once. `1` keeps strict ascending index order.
    pub concurrency: usize,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            system_prompt: None,
            user_prompt: None,
            concurrency: 1,
        }
    }
}

pub struct JobTracker {
    orchestrator: Arc<FallbackOrchestrator>,
    store: Arc<dyn ChunkStore>,
    progress: Arc<dyn JobProgressReporter>,
}

impl JobTracker {
    pub fn new(orchestrator: Arc<FallbackOrchestrator>, store: Arc<dyn ChunkStore>) -> Self {
        Self {
            orchestrator,
            store,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn JobProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    /// Create and persist an `in_progress` job for a manuscript.
    pub async fn create_job(
        &self,
        manuscript_id: &str,
        system_prompt: Option<String>,
    ) -> Result<ProcessingJob> {
        let total = self.store.load_chunks(manuscript_id).await?.len();
        let job = ProcessingJob::new(manuscript_id, total, system_prompt);
        self.store.save_job(&job).await?;
        Ok(job)
    }

    /// Run a job to its terminal state and return the final job record.
    ///
    /// Never fails: job-wide errors are folded into `status = failed` with
    /// the error text in `error_message`. A job that is already terminal is
    /// returned as is and nothing is written.
    pub async fn run(
        &self,
        job: ProcessingJob,
        options: &JobOptions,
        cancel: CancellationToken,
    ) -> ProcessingJob {
        if job.status.is_terminal() {
            tracing::warn!(
                job_id = %job.id,
                status = %job.status,
                "Job already finished, not rerunning"
            );
            return job;
        }
        let job_id = job.id.clone();
        let shared = Mutex::new(job);

        let outcome = self.run_chunks(&shared, options, &cancel).await;

        let mut job = shared.into_inner();
        match outcome {
            Ok(()) => {
                job.finish();
                tracing::info!(
                    job_id = %job_id,
                    status = %job.status,
                    completed = job.completed_chunks,
                    failed = job.failed_chunks,
                    "Processing complete"
                );
            }
            Err(e) => {
                let message = format!("{:#}", e);
                tracing::error!(
                    job_id = %job_id,
                    error = %message,
                    "Fatal error in job processing"
                );
                job.fail(message);
            }
        }

        if let Err(e) = self.store.save_job(&job).await {
            tracing::error!(job_id = %job_id, error = %e, "Failed to persist terminal job state");
        }
        self.progress.report(JobProgressEvent::Finished {
            job_id,
            status: job.status,
            completed: job.completed_chunks,
            failed: job.failed_chunks,
        });
        job
    }

    async fn run_chunks(
        &self,
        shared: &Mutex<ProcessingJob>,
        options: &JobOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (job_id, manuscript_id) = {
            let job = shared.lock().await;
            (job.id.clone(), job.manuscript_id.clone())
        };

        let mut chunks = self
            .store
            .load_chunks(&manuscript_id)
            .await
            .with_context(|| format!("Failed to load chunks for manuscript {}", manuscript_id))?;
        chunks.sort_by_key(|c| c.index);
        let mut previous: HashMap<String, ChunkState> = self
            .store
            .chunk_states(&manuscript_id)
            .await
            .with_context(|| format!("Failed to load chunk states for {}", manuscript_id))?
            .into_iter()
            .map(|s| (s.chunk_id.clone(), s))
            .collect();

        {
            let mut job = shared.lock().await;
            job.total_chunks = chunks.len();
            self.store.save_job(&job).await?;
        }
        tracing::info!(job_id = %job_id, total = chunks.len(), "Starting job processing");
        self.progress.report(JobProgressEvent::Started {
            job_id: job_id.clone(),
            total: chunks.len(),
        });

        for batch in chunks.chunks(options.concurrency.max(1)) {
            if cancel.is_cancelled() {
                bail!("Job cancelled");
            }
            // The first job-fatal error drops the rest of the batch mid-flight.
            try_join_all(batch.iter().map(|chunk| {
                let state = previous
                    .remove(&chunk.id)
                    .unwrap_or_else(|| ChunkState::pending(chunk));
                self.resolve_chunk(shared, &job_id, &manuscript_id, chunk, state, options, cancel)
            }))
            .await?;
        }

        if cancel.is_cancelled() {
            bail!("Job cancelled");
        }
        Ok(())
    }

    /// Take one chunk through processing and fold its outcome into the job.
    ///
    /// `state` is the chunk's stored state; a chunk completed by an earlier
    /// run is counted as completed without being sent again.
    #[allow(clippy::too_many_arguments)]
    async fn resolve_chunk(
        &self,
        shared: &Mutex<ProcessingJob>,
        job_id: &str,
        manuscript_id: &str,
        chunk: &Chunk,
        mut state: ChunkState,
        options: &JobOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if !state.begin() {
            tracing::debug!(job_id, chunk_index = chunk.index, "Chunk already completed");
            return self.record_resolution(shared, job_id, chunk.index, true).await;
        }

        let scope = self.process_one(job_id, manuscript_id, chunk, &state, options, cancel);
        let attempt = AssertUnwindSafe(scope)
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(anyhow!("chunk processing panicked: {}", panic_message(&*panic)))
            });

        let success = match attempt {
            Ok(result) => {
                state.resolve(&result);
                if result.success {
                    tracing::info!(
                        job_id,
                        chunk_index = chunk.index,
                        provider = ?result.provider_used,
                        attempts = result.attempts,
                        "Chunk completed"
                    );
                } else {
                    tracing::warn!(
                        job_id,
                        chunk_index = chunk.index,
                        attempts = result.attempts,
                        error = ?result.error_message,
                        "Chunk failed"
                    );
                }
                result.success
            }
            Err(e) => {
                let message = format!("{:#}", e);
                tracing::error!(
                    job_id,
                    chunk_index = chunk.index,
                    error = %message,
                    "Error processing chunk"
                );
                state.fail(message);
                false
            }
        };

        // Outside the per-chunk scope: a failure here is job-fatal.
        self.store
            .update_chunk(manuscript_id, &state)
            .await
            .with_context(|| format!("Failed to save state of {}", chunk.id))?;
        self.record_resolution(shared, job_id, chunk.index, success).await
    }

    async fn record_resolution(
        &self,
        shared: &Mutex<ProcessingJob>,
        job_id: &str,
        index: usize,
        success: bool,
    ) -> Result<()> {
        let mut job = shared.lock().await;
        job.record(success);
        self.store.save_job(&job).await?;
        self.progress.report(JobProgressEvent::ChunkResolved {
            job_id: job_id.to_string(),
            index,
            success,
            completed: job.completed_chunks,
            failed: job.failed_chunks,
            total: job.total_chunks,
        });
        Ok(())
    }

    async fn process_one(
        &self,
        job_id: &str,
        manuscript_id: &str,
        chunk: &Chunk,
        state: &ChunkState,
        options: &JobOptions,
        cancel: &CancellationToken,
    ) -> Result<ProcessResult> {
        self.store.update_chunk(manuscript_id, state).await?;

        let params = ProcessChunkParams {
            job_id,
            chunk_id: &chunk.id,
            content: &chunk.content,
            system_prompt: options.system_prompt.as_deref(),
            user_prompt: options.user_prompt.as_deref(),
        };
        let result = self.orchestrator.process_chunk(&params, cancel).await;

        self.store
            .record_attempts(job_id, &chunk.id, &result.provider_attempts)
            .await
            .context("Failed to record provider attempts")?;
        Ok(result)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkOptions, TextChunker};
    use crate::models::{
        ChatMessage, ChunkStatus, JobStatus, ProviderAttemptRecord, ProviderSlot,
    };
    use crate::provider::{CompletionProvider, ProviderError, ProviderSet};
    use crate::retry::RetryPolicy;
    use crate::store::{InMemoryChunkStore, StoredAttempt};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Succeeds unless the chunk text contains `fail`; panics on `boom` and
    /// never answers `hang`.
    struct ContentDriven;

    #[async_trait]
    impl CompletionProvider for ContentDriven {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
            let content = &messages[messages.len() - 1].content;
            if content.contains("boom") {
                panic!("provider exploded");
            }
            if content.contains("hang") {
                std::future::pending::<()>().await;
            }
            if content.contains("fail") {
                return Err(ProviderError::Request("rejected".into()));
            }
            Ok(format!("processed {}", content.len()))
        }
    }

    /// Answers every chunk the same way.
    struct Fixed(bool);

    #[async_trait]
    impl CompletionProvider for Fixed {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, ProviderError> {
            if self.0 {
                Ok("fixed".into())
            } else {
                Err(ProviderError::Request("offline".into()))
            }
        }
    }

    fn tracker_for(
        store: Arc<InMemoryChunkStore>,
        provider: Arc<dyn CompletionProvider>,
    ) -> JobTracker {
        let providers = ProviderSet::shared(provider);
        JobTracker::new(Arc::new(FallbackOrchestrator::new(providers, policy())), store)
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            retry_delay: Duration::from_millis(1),
            max_retry_delay: Duration::from_millis(2),
            exponential_backoff: true,
        }
    }

    /// One chunk per word.
    fn word_chunks(text: &str) -> Vec<Chunk> {
        TextChunker::new(ChunkOptions {
            max_chunk_size: 6,
            overlap_size: 0,
            preserve_paragraphs: false,
        })
        .chunk(text)
    }

    async fn setup(text: &str) -> (JobTracker, Arc<InMemoryChunkStore>, ProcessingJob) {
        let store = Arc::new(InMemoryChunkStore::new());
        store.save_chunks("m1", &word_chunks(text)).await.unwrap();
        let orchestrator = Arc::new(FallbackOrchestrator::new(
            ProviderSet::shared(Arc::new(ContentDriven)),
            policy(),
        ));
        let tracker = JobTracker::new(orchestrator, store.clone());
        let job = tracker.create_job("m1", None).await.unwrap();
        (tracker, store, job)
    }

    #[tokio::test]
    async fn all_success_completes_job() {
        let (tracker, store, job) = setup("alpha bravo delta").await;
        assert_eq!(job.total_chunks, 3);

        let job = tracker.run(job, &JobOptions::default(), CancellationToken::new()).await;

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!((job.completed_chunks, job.failed_chunks), (3, 0));
        assert!(job.error_message.is_none());
        let states = store.chunk_states("m1").await.unwrap();
        assert!(states.iter().all(|s| s.status == ChunkStatus::Completed));
        assert!(states.iter().all(|s| s.provider_used == Some(ProviderSlot::Main)));
        assert_eq!(store.get_job(&job.id).await.unwrap().unwrap(), job);
    }

    #[tokio::test]
    async fn finished_job_is_returned_unchanged() {
        let (tracker, store, job) = setup("alpha bravo").await;
        let done = tracker.run(job, &JobOptions::default(), CancellationToken::new()).await;
        assert_eq!(done.status, JobStatus::Completed);

        let again = tracker
            .run(done.clone(), &JobOptions::default(), CancellationToken::new())
            .await;

        assert_eq!(again, done);
        assert_eq!(store.get_job(&done.id).await.unwrap().unwrap(), done);
        assert_eq!(store.attempts(&done.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn completed_chunks_survive_a_later_job() {
        let (tracker, store, job) = setup("alpha bravo").await;
        tracker.run(job, &JobOptions::default(), CancellationToken::new()).await;
        let before = store.chunk_states("m1").await.unwrap();

        let offline = tracker_for(store.clone(), Arc::new(Fixed(false)));
        let job = offline.create_job("m1", None).await.unwrap();
        let job = offline.run(job, &JobOptions::default(), CancellationToken::new()).await;

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!((job.completed_chunks, job.failed_chunks), (2, 0));
        assert_eq!(store.chunk_states("m1").await.unwrap(), before);
        assert_eq!(before[0].response.as_deref(), Some("processed 5"));
        assert!(store.attempts(&job.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_chunks_are_retried_by_a_later_job() {
        let (tracker, store, job) = setup("alpha fail").await;
        let first = tracker.run(job, &JobOptions::default(), CancellationToken::new()).await;
        assert_eq!(first.status, JobStatus::Partial);

        let online = tracker_for(store.clone(), Arc::new(Fixed(true)));
        let job = online.create_job("m1", None).await.unwrap();
        let job = online.run(job, &JobOptions::default(), CancellationToken::new()).await;

        assert_eq!(job.status, JobStatus::Completed);
        let states = store.chunk_states("m1").await.unwrap();
        assert_eq!(states[0].response.as_deref(), Some("processed 5"));
        assert_eq!(states[1].status, ChunkStatus::Completed);
        assert_eq!(states[1].response.as_deref(), Some("fixed"));
        assert!(states[1].error_message.is_none());
        let attempts = store.attempts(&job.id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].chunk_id, "chunk_1");
    }

    #[tokio::test]
    async fn chunk_failures_make_job_partial() {
        let (tracker, store, job) = setup("alpha fail delta").await;
        let job = tracker.run(job, &JobOptions::default(), CancellationToken::new()).await;

        assert_eq!(job.status, JobStatus::Partial);
        assert_eq!((job.completed_chunks, job.failed_chunks), (2, 1));
        assert_eq!(job.error_message.as_deref(), Some("1 chunks failed to process"));

        let states = store.chunk_states("m1").await.unwrap();
        assert_eq!(states[1].status, ChunkStatus::Failed);
        assert_eq!(states[1].retry_count, 6);
        assert!(states[1].error_message.as_deref().unwrap().starts_with("All providers failed."));
        assert_eq!(store.attempts(&job.id).await.unwrap().len(), 1 + 6 + 1);
    }

    #[tokio::test]
    async fn provider_panic_only_fails_its_chunk() {
        let (tracker, store, job) = setup("alpha boom delta").await;
        let job = tracker.run(job, &JobOptions::default(), CancellationToken::new()).await;

        assert_eq!(job.status, JobStatus::Partial);
        assert_eq!((job.completed_chunks, job.failed_chunks), (2, 1));
        let states = store.chunk_states("m1").await.unwrap();
        assert!(states[1]
            .error_message
            .as_deref()
            .unwrap()
            .contains("provider exploded"));
        assert_eq!(states[2].status, ChunkStatus::Completed);
    }

    #[tokio::test]
    async fn cancelled_job_fails_without_processing() {
        let (tracker, store, job) = setup("alpha bravo").await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let job = tracker.run(job, &JobOptions::default(), cancel).await;

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("Job cancelled"));
        assert_eq!(job.resolved_chunks(), 0);
        let states = store.chunk_states("m1").await.unwrap();
        assert!(states.iter().all(|s| s.status == ChunkStatus::Pending));
    }

    #[tokio::test]
    async fn concurrent_batches_keep_counters_consistent() {
        let (tracker, _store, job) = setup("alpha bravo fail delta echo golf hotel").await;
        let options = JobOptions {
            concurrency: 3,
            ..JobOptions::default()
        };
        let job = tracker.run(job, &options, CancellationToken::new()).await;

        assert_eq!(job.total_chunks, 7);
        assert_eq!(job.completed_chunks + job.failed_chunks, 7);
        assert_eq!(job.failed_chunks, 1);
        assert_eq!(job.status, JobStatus::Partial);
    }

    #[tokio::test]
    async fn progress_events_advance_monotonically() {
        struct Collect(std::sync::Mutex<Vec<JobProgressEvent>>);
        impl JobProgressReporter for Collect {
            fn report(&self, event: JobProgressEvent) {
                self.0.lock().unwrap().push(event);
            }
        }

        let (tracker, _store, job) = setup("alpha fail delta").await;
        let events = Arc::new(Collect(std::sync::Mutex::new(Vec::new())));
        let tracker = tracker.with_progress(events.clone());
        tracker.run(job, &JobOptions::default(), CancellationToken::new()).await;

        let events = events.0.lock().unwrap();
        let resolved: Vec<(usize, usize)> = events
            .iter()
            .filter_map(|e| match e {
                JobProgressEvent::ChunkResolved { index, completed, failed, .. } => {
                    Some((*index, completed + failed))
                }
                _ => None,
            })
            .collect();
        assert_eq!(resolved, vec![(0, 1), (1, 2), (2, 3)]);
        assert!(matches!(events.first(), Some(JobProgressEvent::Started { total: 3, .. })));
        assert!(matches!(
            events.last(),
            Some(JobProgressEvent::Finished { status: JobStatus::Partial, .. })
        ));
    }

    /// Delegates to an in-memory store but can fail chosen operations.
    struct FlakyStore {
        inner: InMemoryChunkStore,
        fail_load: bool,
        fail_attempts_for: Option<&'static str>,
        /// Fails the write of this chunk's final state.
        fail_resolution_for: Option<&'static str>,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: InMemoryChunkStore::new(),
                fail_load: false,
                fail_attempts_for: None,
                fail_resolution_for: None,
            }
        }
    }

    #[async_trait]
    impl ChunkStore for FlakyStore {
        async fn save_chunks(&self, manuscript_id: &str, chunks: &[Chunk]) -> Result<()> {
            self.inner.save_chunks(manuscript_id, chunks).await
        }
        async fn load_chunks(&self, manuscript_id: &str) -> Result<Vec<Chunk>> {
            if self.fail_load {
                bail!("database unavailable");
            }
            self.inner.load_chunks(manuscript_id).await
        }
        async fn update_chunk(&self, manuscript_id: &str, state: &ChunkState) -> Result<()> {
            if self.fail_resolution_for == Some(state.chunk_id.as_str())
                && state.status != ChunkStatus::Processing
            {
                bail!("disk full");
            }
            self.inner.update_chunk(manuscript_id, state).await
        }
        async fn chunk_states(&self, manuscript_id: &str) -> Result<Vec<ChunkState>> {
            self.inner.chunk_states(manuscript_id).await
        }
        async fn save_job(&self, job: &ProcessingJob) -> Result<()> {
            self.inner.save_job(job).await
        }
        async fn get_job(&self, job_id: &str) -> Result<Option<ProcessingJob>> {
            self.inner.get_job(job_id).await
        }
        async fn record_attempts(
            &self,
            job_id: &str,
            chunk_id: &str,
            attempts: &[ProviderAttemptRecord],
        ) -> Result<()> {
            if self.fail_attempts_for == Some(chunk_id) {
                bail!("audit log full");
            }
            self.inner.record_attempts(job_id, chunk_id, attempts).await
        }
        async fn attempts(&self, job_id: &str) -> Result<Vec<StoredAttempt>> {
            self.inner.attempts(job_id).await
        }
    }

    async fn flaky_tracker(store: FlakyStore, text: &str) -> (JobTracker, Arc<FlakyStore>) {
        store.inner.save_chunks("m1", &word_chunks(text)).await.unwrap();
        let store = Arc::new(store);
        let orchestrator = Arc::new(FallbackOrchestrator::new(
            ProviderSet::shared(Arc::new(ContentDriven)),
            policy(),
        ));
        (JobTracker::new(orchestrator, store.clone()), store)
    }

    #[tokio::test]
    async fn unreadable_chunk_list_fails_job() {
        let store = FlakyStore {
            fail_load: true,
            ..FlakyStore::new()
        };
        let (tracker, store) = flaky_tracker(store, "alpha bravo delta").await;
        let job = ProcessingJob::new("m1", 3, None);

        let job = tracker.run(job, &JobOptions::default(), CancellationToken::new()).await;

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.as_deref().unwrap().contains("database unavailable"));
        assert_eq!(store.get_job(&job.id).await.unwrap().unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn per_chunk_store_error_is_absorbed() {
        let store = FlakyStore {
            fail_attempts_for: Some("chunk_1"),
            ..FlakyStore::new()
        };
        let (tracker, store) = flaky_tracker(store, "alpha bravo delta").await;
        let job = tracker.create_job("m1", None).await.unwrap();

        let job = tracker.run(job, &JobOptions::default(), CancellationToken::new()).await;

        assert_eq!(job.status, JobStatus::Partial);
        assert_eq!((job.completed_chunks, job.failed_chunks), (2, 1));
        let states = store.chunk_states("m1").await.unwrap();
        assert_eq!(states[1].status, ChunkStatus::Failed);
        assert!(states[1].error_message.as_deref().unwrap().contains("audit log full"));
    }

    #[tokio::test]
    async fn store_failure_mid_run_halts_job() {
        let store = FlakyStore {
            fail_resolution_for: Some("chunk_1"),
            ..FlakyStore::new()
        };
        let (tracker, store) = flaky_tracker(store, "alpha bravo delta").await;
        let job = tracker.create_job("m1", None).await.unwrap();

        let job = tracker.run(job, &JobOptions::default(), CancellationToken::new()).await;

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.as_deref().unwrap().contains("disk full"));
        let stored = store.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!((stored.completed_chunks, stored.failed_chunks), (1, 0));

        let attempted: Vec<String> = store
            .attempts(&job.id)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.chunk_id)
            .collect();
        assert_eq!(attempted, vec!["chunk_0", "chunk_1"]);
        let states = store.chunk_states("m1").await.unwrap();
        assert_eq!(states[0].status, ChunkStatus::Completed);
        assert_eq!(states[2].status, ChunkStatus::Pending);
    }

    #[tokio::test]
    async fn store_failure_drops_rest_of_batch() {
        let store = FlakyStore {
            fail_resolution_for: Some("chunk_1"),
            ..FlakyStore::new()
        };
        let (tracker, store) = flaky_tracker(store, "alpha bravo hang echo").await;
        let job = tracker.create_job("m1", None).await.unwrap();
        let options = JobOptions {
            concurrency: 3,
            ..JobOptions::default()
        };

        let job = tokio::time::timeout(
            Duration::from_secs(5),
            tracker.run(job, &options, CancellationToken::new()),
        )
        .await
        .expect("job should halt without waiting for the hanging chunk");

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failed_chunks, 0);
        let states = store.chunk_states("m1").await.unwrap();
        assert_ne!(states[2].status, ChunkStatus::Completed);
        assert_eq!(states[3].status, ChunkStatus::Pending);
    }
}
