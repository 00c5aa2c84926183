//! Ordered-failover completion gateway.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use tenfold_core::clock::Clock;

use crate::health::ProviderHealth;
use crate::prompt::PromptContext;
use crate::provider::{CompletionProvider, ProviderError};

/// Gateway tuning.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Attempts per provider before failing over.
    pub max_attempts: u32,
    /// First retry delay; doubles per attempt.
    pub base_backoff: Duration,
    /// Consecutive failures before a provider is put on cooldown.
    pub failure_threshold: u32,
    /// How long a tripped provider is skipped before being probed again.
    pub cooldown: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Terminal gateway failures.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Every configured provider failed before a fragment was delivered.
    #[error("all completion providers exhausted")]
    Exhausted,

    /// A provider failed after at least one fragment reached the caller.
    /// The call is irrevocable at that point; restarting would duplicate
    /// partial narrative.
    #[error("stream interrupted mid-delivery: {0}")]
    Interrupted(String),
}

struct Entry {
    provider: Arc<dyn CompletionProvider>,
    health: ProviderHealth,
}

enum Attempt {
    Complete(String),
    Interrupted(String),
    Failed,
}

/// Single streaming-call facade over the ordered provider list.
pub struct CompletionGateway {
    entries: Vec<Entry>,
    config: GatewayConfig,
    clock: Arc<dyn Clock>,
}

impl CompletionGateway {
    #[must_use]
    pub fn new(
        providers: Vec<Arc<dyn CompletionProvider>>,
        config: GatewayConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let entries = providers
            .into_iter()
            .map(|provider| Entry {
                provider,
                health: ProviderHealth::new(),
            })
            .collect();
        Self {
            entries,
            config,
            clock,
        }
    }

    /// Health state for a named provider, if configured.
    #[must_use]
    pub fn provider_health(&self, name: &str) -> Option<&ProviderHealth> {
        self.entries
            .iter()
            .find(|e| e.provider.name() == name)
            .map(|e| &e.health)
    }

    /// Streams a completion, forwarding each fragment into `sink` as it
    /// arrives and returning the full accumulated text once the stream
    /// ends. The sink is the live output; the return value is the
    /// deferred final value consumed after the stream completes.
    ///
    /// # Errors
    ///
    /// `GatewayError::Exhausted` when every provider fails before any
    /// fragment is delivered; `GatewayError::Interrupted` when a stream
    /// dies after delivery began.
    pub async fn stream_completion(
        &self,
        ctx: &PromptContext,
        preference: Option<&str>,
        sink: &mpsc::Sender<String>,
    ) -> Result<String, GatewayError> {
        for idx in self.ordered(preference) {
            let entry = &self.entries[idx];
            if !entry.health.is_available(
                self.clock.now(),
                self.config.failure_threshold,
                self.config.cooldown,
            ) {
                debug!(provider = entry.provider.name(), "provider cooling down, skipped");
                continue;
            }
            match self.attempt_provider(entry, ctx, sink).await {
                Attempt::Complete(full) => return Ok(full),
                Attempt::Interrupted(detail) => return Err(GatewayError::Interrupted(detail)),
                Attempt::Failed => {}
            }
        }
        Err(GatewayError::Exhausted)
    }

    /// Non-streaming convenience: runs the same failover machinery and
    /// drains fragments internally.
    ///
    /// # Errors
    ///
    /// Same as [`Self::stream_completion`].
    pub async fn complete(
        &self,
        ctx: &PromptContext,
        preference: Option<&str>,
    ) -> Result<String, GatewayError> {
        let (tx, mut rx) = mpsc::channel(16);
        let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
        let result = self.stream_completion(ctx, preference, &tx).await;
        drop(tx);
        let _ = drain.await;
        result
    }

    /// Provider order for one call: the explicit preference first when it
    /// names a configured provider, then the configured order.
    fn ordered(&self, preference: Option<&str>) -> Vec<usize> {
        let preferred = preference
            .and_then(|name| self.entries.iter().position(|e| e.provider.name() == name));
        let mut order = Vec::with_capacity(self.entries.len());
        if let Some(idx) = preferred {
            order.push(idx);
        }
        order.extend((0..self.entries.len()).filter(|i| Some(*i) != preferred));
        order
    }

    async fn attempt_provider(
        &self,
        entry: &Entry,
        ctx: &PromptContext,
        sink: &mpsc::Sender<String>,
    ) -> Attempt {
        let name = entry.provider.name();
        let models = entry.provider.models();
        for attempt in 0..self.config.max_attempts {
            if attempt > 0 {
                let delay = self.config.base_backoff * 2u32.pow(attempt - 1);
                tokio::time::sleep(delay).await;
            }
            let model = &models[attempt as usize % models.len()];

            let mut stream = match entry.provider.open(ctx, model).await {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(provider = name, %model, attempt, error = %err, "completion open failed");
                    entry.health.record_failure(self.clock.now());
                    if err.retryable() {
                        continue;
                    }
                    return Attempt::Failed;
                }
            };

            let mut full = String::new();
            let mut delivered = false;
            let mut stream_error: Option<ProviderError> = None;
            while let Some(item) = stream.next().await {
                match item {
                    Ok(fragment) => {
                        full.push_str(&fragment);
                        // The fragment counts as delivered even if the
                        // receiver has gone away; it left the gateway.
                        let _ = sink.send(fragment).await;
                        delivered = true;
                    }
                    Err(err) => {
                        stream_error = Some(err);
                        break;
                    }
                }
            }

            if let Some(err) = stream_error {
                warn!(provider = name, %model, attempt, error = %err, "completion stream failed");
                entry.health.record_failure(self.clock.now());
                if delivered {
                    return Attempt::Interrupted(err.to_string());
                }
                if err.retryable() {
                    continue;
                }
                return Attempt::Failed;
            }

            if full.is_empty() {
                warn!(provider = name, %model, attempt, "empty completion");
                entry.health.record_failure(self.clock.now());
                continue;
            }

            entry.health.record_success(self.clock.now());
            return Attempt::Complete(full);
        }
        Attempt::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};

    use tenfold_core::clock::Clock;

    use crate::provider::FragmentStream;

    struct TestClock(DateTime<Utc>);

    impl Clock for TestClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn test_clock() -> Arc<dyn Clock> {
        Arc::new(TestClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()))
    }

    enum Behavior {
        FailOpen(ProviderError),
        Chunks(Vec<&'static str>),
        ChunksThenError(Vec<&'static str>, ProviderError),
    }

    struct ScriptedProvider {
        name: String,
        models: Vec<String>,
        script: Mutex<VecDeque<Behavior>>,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new(name: &str, script: Vec<Behavior>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_owned(),
                models: vec!["model-a".to_owned()],
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
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
            _ctx: &PromptContext,
            _model: &str,
        ) -> Result<FragmentStream, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let behavior = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Behavior::FailOpen(ProviderError::Timeout));
            match behavior {
                Behavior::FailOpen(err) => Err(err),
                Behavior::Chunks(chunks) => {
                    let items: Vec<Result<String, ProviderError>> =
                        chunks.into_iter().map(|c| Ok(c.to_owned())).collect();
                    Ok(Box::pin(futures::stream::iter(items)))
                }
                Behavior::ChunksThenError(chunks, err) => {
                    let mut items: Vec<Result<String, ProviderError>> =
                        chunks.into_iter().map(|c| Ok(c.to_owned())).collect();
                    items.push(Err(err));
                    Ok(Box::pin(futures::stream::iter(items)))
                }
            }
        }
    }

    fn gateway(providers: Vec<Arc<ScriptedProvider>>) -> CompletionGateway {
        let providers: Vec<Arc<dyn CompletionProvider>> = providers
            .into_iter()
            .map(|p| p as Arc<dyn CompletionProvider>)
            .collect();
        CompletionGateway::new(providers, GatewayConfig::default(), test_clock())
    }

    async fn run(
        gateway: &CompletionGateway,
        preference: Option<&str>,
    ) -> (Result<String, GatewayError>, Vec<String>) {
        let (tx, mut rx) = mpsc::channel(64);
        let result = gateway
            .stream_completion(&PromptContext::new("act"), preference, &tx)
            .await;
        drop(tx);
        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk);
        }
        (result, chunks)
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failures_retry_same_provider() {
        let alpha = ScriptedProvider::new(
            "alpha",
            vec![
                Behavior::FailOpen(ProviderError::RateLimited),
                Behavior::FailOpen(ProviderError::Timeout),
                Behavior::Chunks(vec!["hello ", "world"]),
            ],
        );
        let beta = ScriptedProvider::new("beta", vec![Behavior::Chunks(vec!["unused"])]);
        let gw = gateway(vec![alpha.clone(), beta.clone()]);

        let (result, chunks) = run(&gw, None).await;
        assert_eq!(result.unwrap(), "hello world");
        assert_eq!(chunks, vec!["hello ", "world"]);
        assert_eq!(alpha.calls(), 3);
        assert_eq!(beta.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_over_after_exhausting_retries() {
        let alpha = ScriptedProvider::new(
            "alpha",
            vec![
                Behavior::FailOpen(ProviderError::Timeout),
                Behavior::FailOpen(ProviderError::Timeout),
                Behavior::FailOpen(ProviderError::Timeout),
            ],
        );
        let beta = ScriptedProvider::new("beta", vec![Behavior::Chunks(vec!["from beta"])]);
        let gw = gateway(vec![alpha.clone(), beta.clone()]);

        let (result, chunks) = run(&gw, None).await;
        assert_eq!(result.unwrap(), "from beta");
        assert_eq!(chunks, vec!["from beta"]);
        assert_eq!(alpha.calls(), 3);
        assert_eq!(gw.provider_health("alpha").unwrap().consecutive_failures(), 3);
        assert_eq!(gw.provider_health("beta").unwrap().consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_failure_fails_over_immediately() {
        let alpha = ScriptedProvider::new(
            "alpha",
            vec![Behavior::FailOpen(ProviderError::Http { status: 401 })],
        );
        let beta = ScriptedProvider::new("beta", vec![Behavior::Chunks(vec!["ok"])]);
        let gw = gateway(vec![alpha.clone(), beta.clone()]);

        let (result, _) = run(&gw, None).await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(alpha.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mid_stream_failure_after_delivery_is_irrevocable() {
        let alpha = ScriptedProvider::new(
            "alpha",
            vec![Behavior::ChunksThenError(
                vec!["partial"],
                ProviderError::Timeout,
            )],
        );
        let beta = ScriptedProvider::new("beta", vec![Behavior::Chunks(vec!["never"])]);
        let gw = gateway(vec![alpha.clone(), beta.clone()]);

        let (result, chunks) = run(&gw, None).await;
        assert!(matches!(result, Err(GatewayError::Interrupted(_))));
        assert_eq!(chunks, vec!["partial"]);
        assert_eq!(beta.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pre_delivery_stream_failure_retries() {
        let alpha = ScriptedProvider::new(
            "alpha",
            vec![
                Behavior::ChunksThenError(vec![], ProviderError::Timeout),
                Behavior::Chunks(vec!["recovered"]),
            ],
        );
        let gw = gateway(vec![alpha.clone()]);

        let (result, chunks) = run(&gw, None).await;
        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(chunks, vec!["recovered"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_completion_is_retried() {
        let alpha = ScriptedProvider::new(
            "alpha",
            vec![Behavior::Chunks(vec![]), Behavior::Chunks(vec!["second try"])],
        );
        let gw = gateway(vec![alpha.clone()]);

        let (result, _) = run(&gw, None).await;
        assert_eq!(result.unwrap(), "second try");
        assert_eq!(alpha.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_providers_failing_is_exhausted() {
        let alpha = ScriptedProvider::new(
            "alpha",
            vec![Behavior::FailOpen(ProviderError::Http { status: 500 })],
        );
        let gw = gateway(vec![alpha]);

        let (result, chunks) = run(&gw, None).await;
        assert!(matches!(result, Err(GatewayError::Exhausted)));
        assert!(chunks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_preference_is_tried_first() {
        let alpha = ScriptedProvider::new("alpha", vec![Behavior::Chunks(vec!["from alpha"])]);
        let beta = ScriptedProvider::new("beta", vec![Behavior::Chunks(vec!["from beta"])]);
        let gw = gateway(vec![alpha.clone(), beta.clone()]);

        let (result, _) = run(&gw, Some("beta")).await;
        assert_eq!(result.unwrap(), "from beta");
        assert_eq!(alpha.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooling_down_provider_is_skipped() {
        let alpha = ScriptedProvider::new("alpha", vec![Behavior::Chunks(vec!["from alpha"])]);
        let beta = ScriptedProvider::new("beta", vec![Behavior::Chunks(vec!["from beta"])]);
        let gw = gateway(vec![alpha.clone(), beta.clone()]);
        let now = test_clock().now();
        for _ in 0..3 {
            gw.provider_health("alpha").unwrap().record_failure(now);
        }

        let (result, _) = run(&gw, None).await;
        assert_eq!(result.unwrap(), "from beta");
        assert_eq!(alpha.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_drains_chunks_internally() {
        let alpha = ScriptedProvider::new("alpha", vec![Behavior::Chunks(vec!["a", "b", "c"])]);
        let gw = gateway(vec![alpha]);

        let full = gw.complete(&PromptContext::new("act"), None).await.unwrap();
        assert_eq!(full, "abc");
    }
}
