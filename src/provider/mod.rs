//! Completion provider abstraction.
//!
//! Defines the [`CompletionProvider`] trait that every backend implements and
//! the [`ProviderSet`] that binds one provider to each [`ProviderSlot`].
//! The orchestrator walks the set in slot priority order.
//!
//! Shipped implementation:
//! - **[`CommandProvider`]**: spawns a local program per call, writes the
//!   messages as JSON to its stdin and reads the completion from stdout.
//!
//! Any other transport is plugged in by implementing the trait:
//!
//! ```rust
//! use async_trait::async_trait;
//! use chunk_relay::models::ChatMessage;
//! use chunk_relay::provider::{CompletionProvider, ProviderError};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl CompletionProvider for Echo {
//!     async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
//!         messages
//!             .last()
//!             .map(|m| m.content.clone())
//!             .ok_or_else(|| ProviderError::Request("no messages".into()))
//!     }
//! }
//! ```

mod command;

pub use command::CommandProvider;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ProvidersConfig;
use crate::models::{ChatMessage, ProviderSlot};

/// A text-completion backend.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Complete the conversation, returning the generated text.
    ///
    /// Whitespace-only output is returned as-is; the orchestrator classifies
    /// it as a failed attempt.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("Empty response from provider")]
    EmptyResponse,
    #[error("timed out after {0}s")]
    Timeout(u64),
    #[error("provider exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },
    #[error("cancelled")]
    Cancelled,
}

/// One provider per slot, iterated in fallback order.
#[derive(Clone, Default)]
pub struct ProviderSet {
    slots: Vec<(ProviderSlot, Arc<dyn CompletionProvider>)>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `provider` to `slot`, replacing any previous binding.
    pub fn with(mut self, slot: ProviderSlot, provider: Arc<dyn CompletionProvider>) -> Self {
        self.slots.retain(|(s, _)| *s != slot);
        self.slots.push((slot, provider));
        self.slots.sort_by_key(|(s, _)| *s);
        self
    }

    /// The same provider in every slot; only the priority differs.
    pub fn shared(provider: Arc<dyn CompletionProvider>) -> Self {
        ProviderSlot::ALL
            .into_iter()
            .fold(Self::new(), |set, slot| set.with(slot, provider.clone()))
    }

    /// A [`CommandProvider`] for each configured slot.
    pub fn from_config(config: &ProvidersConfig) -> Self {
        config.configured().fold(Self::new(), |set, (slot, cfg)| {
            set.with(slot, Arc::new(CommandProvider::new(slot, cfg.clone())))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProviderSlot, &dyn CompletionProvider)> {
        self.slots.iter().map(|(slot, p)| (*slot, p.as_ref()))
    }

    pub fn slots(&self) -> Vec<ProviderSlot> {
        self.slots.iter().map(|(slot, _)| *slot).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
