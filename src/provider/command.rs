//! Provider backed by a local program.
//!
//! Each call spawns the configured command, writes the messages to its stdin
//! as a JSON array of `{"role", "content"}` objects, and reads the completion
//! from stdout. A non-zero exit status fails the attempt with stderr
//! attached. The child is killed if the call is dropped (timeout or
//! cancellation).

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{CompletionProvider, ProviderError};
use crate::config::CommandProviderConfig;
use crate::models::{ChatMessage, ProviderSlot};

pub struct CommandProvider {
    slot: ProviderSlot,
    config: CommandProviderConfig,
}

impl CommandProvider {
    pub fn new(slot: ProviderSlot, config: CommandProviderConfig) -> Self {
        Self { slot, config }
    }

    async fn run(&self, payload: Vec<u8>) -> Result<String, ProviderError> {
        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ProviderError::Request(format!(
                    "failed to spawn '{}' for {}: {}",
                    self.config.command, self.slot, e
                ))
            })?;

        let stdin = child.stdin.take();
        let write = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&payload).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };

        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output.map_err(|e| ProviderError::Request(e.to_string()))?;

        if !output.status.success() {
            return Err(ProviderError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        // A child that exits successfully without reading all of stdin is fine.
        if let Err(e) = written {
            tracing::debug!(provider = %self.slot, error = %e, "provider closed stdin early");
        }

        let text = String::from_utf8(output.stdout)
            .map_err(|_| ProviderError::Request("provider output is not valid UTF-8".into()))?;
        Ok(text.trim_end().to_string())
    }
}

#[async_trait]
impl CompletionProvider for CommandProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let payload =
            serde_json::to_vec(messages).map_err(|e| ProviderError::Request(e.to_string()))?;
        let timeout = self.config.timeout_secs;

        tokio::time::timeout(Duration::from_secs(timeout), self.run(payload))
            .await
            .map_err(|_| ProviderError::Timeout(timeout))?
    }
}
