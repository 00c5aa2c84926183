//! Scripted `CompletionProvider` for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use tenfold_gateway::{CompletionProvider, FragmentStream, PromptContext, ProviderError};

/// One scripted `open` call.
pub enum ScriptedBehavior {
    /// Fail before the stream opens.
    FailOpen(ProviderError),
    /// Stream the given fragments, then end cleanly.
    Chunks(Vec<String>),
    /// Wait, then stream the fragments. Lets tests overlap an in-flight
    /// turn with a second action.
    DelayedChunks(Duration, Vec<String>),
    /// Stream the given fragments, then fail mid-stream.
    ChunksThenError(Vec<String>, ProviderError),
}

/// A provider that replays a script, one behavior per `open` call. Calls
/// past the end of the script fail with a retryable timeout. Every prompt
/// it was opened with is recorded for assertions.
pub struct ScriptedProvider {
    name: String,
    models: Vec<String>,
    script: Mutex<VecDeque<ScriptedBehavior>>,
    calls: AtomicU32,
    prompts: Mutex<Vec<PromptContext>>,
}

impl ScriptedProvider {
    #[must_use]
    pub fn new(name: &str, script: Vec<ScriptedBehavior>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            models: vec!["scripted-model".to_owned()],
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// How many times `open` was called.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Snapshot of every prompt context `open` has seen, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn prompts(&self) -> Vec<PromptContext> {
        self.prompts.lock().unwrap().clone()
    }

    /// Appends more scripted behaviors for later calls.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn extend_script(&self, behaviors: Vec<ScriptedBehavior>) {
        self.script.lock().unwrap().extend(behaviors);
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn models(&self) -> &[String] {
        &self.models
    }

    async fn open(
        &self,
        ctx: &PromptContext,
        _model: &str,
    ) -> Result<FragmentStream, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(ctx.clone());
        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ScriptedBehavior::FailOpen(ProviderError::Timeout));
        match behavior {
            ScriptedBehavior::FailOpen(err) => Err(err),
            ScriptedBehavior::Chunks(chunks) => {
                let items: Vec<Result<String, ProviderError>> =
                    chunks.into_iter().map(Ok).collect();
                Ok(Box::pin(futures::stream::iter(items)))
            }
            ScriptedBehavior::DelayedChunks(delay, chunks) => {
                let items: Vec<Result<String, ProviderError>> =
                    chunks.into_iter().map(Ok).collect();
                Ok(Box::pin(
                    futures::stream::once(async move {
                        tokio::time::sleep(delay).await;
                        futures::stream::iter(items)
                    })
                    .flatten(),
                ))
            }
            ScriptedBehavior::ChunksThenError(chunks, err) => {
                let mut items: Vec<Result<String, ProviderError>> =
                    chunks.into_iter().map(Ok).collect();
                items.push(Err(err));
                Ok(Box::pin(futures::stream::iter(items)))
            }
        }
    }
}
