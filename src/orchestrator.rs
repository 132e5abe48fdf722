//! Per-chunk fallback and retry loop.
//!
//! [`FallbackOrchestrator::process_chunk`] tries every provider in slot order.
//! Each provider gets up to `max_retries` attempts with a backoff sleep
//! between attempts; there is no sleep between providers. The first non-empty
//! response wins. Every attempt, successful or not, is appended to the trace
//! returned in the [`ProcessResult`].
//!
//! Both suspension points (the provider call and the backoff sleep) race
//! against a [`CancellationToken`]. Once the token fires the in-flight attempt
//! is recorded as cancelled and no further attempt starts for that chunk.

use futures::future::join_all;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::models::{ChatMessage, Chunk, ProcessResult, ProviderAttemptRecord, ProviderSlot};
use crate::provider::{ProviderError, ProviderSet};
use crate::retry::RetryPolicy;

/// Input for one chunk. `job_id` and `chunk_id` are only used for tracing.
#[derive(Debug, Clone, Copy)]
pub struct ProcessChunkParams<'a> {
    pub job_id: &'a str,
    pub chunk_id: &'a str,
    pub content: &'a str,
    pub system_prompt: Option<&'a str>,
    pub user_prompt: Option<&'a str>,
}

pub struct FallbackOrchestrator {
    providers: ProviderSet,
    policy: RetryPolicy,
}

impl FallbackOrchestrator {
    pub fn new(providers: ProviderSet, policy: RetryPolicy) -> Self {
        Self { providers, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    /// Resolve one chunk into a [`ProcessResult`].
    pub async fn process_chunk(
        &self,
        params: &ProcessChunkParams<'_>,
        cancel: &CancellationToken,
    ) -> ProcessResult {
        let messages = build_messages(params.content, params.system_prompt, params.user_prompt);
        let mut trace = Vec::new();
        let mut last_error = String::from("no providers configured");

        for (slot, provider) in self.providers.iter() {
            for attempt in 1..=self.policy.max_retries {
                if cancel.is_cancelled() {
                    return cancelled(trace, &last_error);
                }

                let started = Instant::now();
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(ProviderError::Cancelled),
                    result = provider.complete(&messages) => result.and_then(|text| {
                        if text.trim().is_empty() {
                            Err(ProviderError::EmptyResponse)
                        } else {
                            Ok(text)
                        }
                    }),
                };
                let response_time_ms = elapsed_ms(started);

                match outcome {
                    Ok(text) => {
                        trace.push(record(slot, attempt, response_time_ms, None));
                        tracing::debug!(
                            job_id = params.job_id,
                            chunk_id = params.chunk_id,
                            provider = %slot,
                            attempt,
                            response_time_ms,
                            "Provider attempt succeeded"
                        );
                        return ProcessResult::succeeded(text, slot, trace);
                    }
                    Err(err) => {
                        let message = err.to_string();
                        trace.push(record(slot, attempt, response_time_ms, Some(message.clone())));
                        tracing::warn!(
                            job_id = params.job_id,
                            chunk_id = params.chunk_id,
                            provider = %slot,
                            attempt,
                            error = %message,
                            "Provider attempt failed"
                        );
                        last_error = message;

                        if err == ProviderError::Cancelled {
                            return cancelled(trace, &last_error);
                        }

                        if attempt < self.policy.max_retries {
                            let delay = self.policy.delay(attempt);
                            tokio::select! {
                                biased;
                                _ = cancel.cancelled() => return cancelled(trace, &last_error),
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                    }
                }
            }

            tracing::warn!(
                job_id = params.job_id,
                chunk_id = params.chunk_id,
                provider = %slot,
                "All {} attempts failed. Moving to next provider.",
                self.policy.max_retries
            );
        }

        ProcessResult::failed(format!("All providers failed. Last error: {}", last_error), trace)
    }

    /// Process many chunks in sequential batches of `concurrency`, running each
    /// batch concurrently. Results are keyed by chunk id in batch-major order.
    pub async fn process_chunks_batched(
        &self,
        job_id: &str,
        chunks: &[Chunk],
        system_prompt: Option<&str>,
        user_prompt: Option<&str>,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Vec<(String, ProcessResult)> {
        let mut results = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(concurrency.max(1)) {
            let in_flight = batch.iter().map(|chunk| async move {
                let params = ProcessChunkParams {
                    job_id,
                    chunk_id: &chunk.id,
                    content: &chunk.content,
                    system_prompt,
                    user_prompt,
                };
                (chunk.id.clone(), self.process_chunk(&params, cancel).await)
            });
            results.extend(join_all(in_flight).await);
        }

        results
    }
}

/// Optional system message first, then one user message holding the
/// instruction and the content separated by a blank line.
pub fn build_messages(
    content: &str,
    system_prompt: Option<&str>,
    user_prompt: Option<&str>,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);

    if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
        messages.push(ChatMessage::system(system));
    }

    let body = match user_prompt.filter(|s| !s.is_empty()) {
        Some(instruction) => format!("{}\n\n{}", instruction, content),
        None => content.to_string(),
    };
    messages.push(ChatMessage::user(body));

    messages
}

fn record(
    provider: ProviderSlot,
    attempt: u32,
    response_time_ms: u64,
    error_message: Option<String>,
) -> ProviderAttemptRecord {
    ProviderAttemptRecord {
        provider,
        attempt,
        success: error_message.is_none(),
        response_time_ms,
        error_message,
    }
}

fn cancelled(trace: Vec<ProviderAttemptRecord>, last_error: &str) -> ProcessResult {
    ProcessResult::failed(format!("Processing cancelled. Last error: {}", last_error), trace)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
