//! # Chunk Relay
//!
//! Splits long manuscripts into overlapping, size-bounded chunks and resolves
//! every chunk through a ranked set of completion providers with retry,
//! exponential backoff and fallback, tracking each chunk and the overall job
//! through a persisted state machine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ Ingest   │──▶│ ChunkStore  │◀──│  JobTracker  │──▶│ Orchestrator│
//! │ chunker  │   │ chunks/jobs │   │ state machine│   │ retry+fallbk│
//! └──────────┘   └─────────────┘   └──────▲───────┘   └──────┬──────┘
//!                                         │                  ▼
//!                                  ┌──────┴───────┐   ┌─────────────┐
//!                                  │JobSupervisor │   │ ProviderSet │
//!                                  │ tokio tasks  │   │ main/b1/b2  │
//!                                  └──────────────┘   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! relay chunk manuscript.txt --max-chunk-size 8000
//! relay process manuscript.txt --user-prompt "Summarize" --concurrency 3
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`chunk`] | Size-bounded chunking with overlap |
//! | [`config`] | TOML configuration parsing |
//! | [`ingest`] | Manuscript loading and chunk persistence |
//! | [`logging`] | Tracing subscriber setup |
//! | [`models`] | Core data types |
//! | [`orchestrator`] | Per-chunk retry and provider fallback |
//! | [`progress`] | Job progress reporting on stderr |
//! | [`provider`] | Completion provider trait and command provider |
//! | [`retry`] | Backoff policy |
//! | [`stats`] | Attempt statistics and job snapshots |
//! | [`store`] | Chunk and job storage abstraction |
//! | [`supervisor`] | Background job execution |
//! | [`tracker`] | Job and chunk state machine |

pub mod chunk;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod provider;
pub mod retry;
pub mod stats;
pub mod store;
pub mod supervisor;
pub mod tracker;
