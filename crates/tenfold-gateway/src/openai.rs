//! OpenAI-compatible chat-completions provider.
//!
//! Speaks the `/chat/completions` wire protocol with `stream: true`,
//! decoding the server-sent-event framing (`data:` lines terminated by
//! `[DONE]`) into text fragments. Any endpoint implementing the same
//! protocol works through a custom `base_url`.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Serialize;

use tenfold_core::chat::Role;

use crate::prompt::PromptContext;
use crate::provider::{CompletionProvider, FragmentStream, ProviderError};

/// Static configuration for one OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Name used for preference selection and logs.
    pub name: String,
    /// Base URL up to and excluding `/chat/completions`.
    pub base_url: String,
    pub api_key: String,
    /// Candidate models in preference order.
    pub models: Vec<String>,
    pub connect_timeout: Duration,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

/// Provider speaking the OpenAI chat-completions protocol.
pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Builds the provider and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Transport` if the client cannot be built.
    pub fn new(config: OpenAiConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn models(&self) -> &[String] {
        &self.config.models
    }

    async fn open(
        &self,
        ctx: &PromptContext,
        model: &str,
    ) -> Result<FragmentStream, ProviderError> {
        let messages = ctx.messages();
        let request = ChatRequest {
            model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: wire_role(m.role),
                    content: &m.content,
                })
                .collect(),
            stream: true,
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
            });
        }

        Ok(sse_fragments(Box::pin(response.bytes_stream())))
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<bytes::Bytes>> + Send>>;

struct SseState {
    inner: ByteStream,
    buffer: String,
}

/// Decodes an SSE byte stream into content fragments, ending at `[DONE]`.
fn sse_fragments(inner: ByteStream) -> FragmentStream {
    let state = SseState {
        inner,
        buffer: String::new(),
    };
    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(pos) = state.buffer.find('\n') {
                let line: String = state.buffer.drain(..=pos).collect();
                match parse_sse_line(line.trim()) {
                    SseEvent::Ignore => continue,
                    SseEvent::Done => return None,
                    SseEvent::Content(content) => return Some((Ok(content), state)),
                }
            }
            match state.inner.next().await {
                Some(Ok(bytes)) => state.buffer.push_str(&String::from_utf8_lossy(&bytes)),
                Some(Err(e)) => {
                    return Some((Err(ProviderError::Transport(e.to_string())), state));
                }
                None => return None,
            }
        }
    }))
}

enum SseEvent {
    Content(String),
    Done,
    Ignore,
}

fn parse_sse_line(line: &str) -> SseEvent {
    let Some(data) = line.strip_prefix("data:") else {
        return SseEvent::Ignore;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseEvent::Done;
    }
    let Ok(value) = serde_json::from_str::<serde_json::Value>(data) else {
        return SseEvent::Ignore;
    };
    value["choices"][0]["delta"]["content"]
        .as_str()
        .map_or(SseEvent::Ignore, |content| {
            SseEvent::Content(content.to_owned())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content_of(event: SseEvent) -> Option<String> {
        match event {
            SseEvent::Content(c) => Some(c),
            _ => None,
        }
    }

    #[test]
    fn test_parse_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"once upon"}}]}"#;
        assert_eq!(content_of(parse_sse_line(line)).unwrap(), "once upon");
    }

    #[test]
    fn test_parse_done_marker() {
        assert!(matches!(parse_sse_line("data: [DONE]"), SseEvent::Done));
    }

    #[test]
    fn test_role_only_delta_is_ignored() {
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert!(matches!(parse_sse_line(line), SseEvent::Ignore));
    }

    #[test]
    fn test_blank_and_comment_lines_are_ignored() {
        assert!(matches!(parse_sse_line(""), SseEvent::Ignore));
        assert!(matches!(parse_sse_line(": keep-alive"), SseEvent::Ignore));
    }

    #[tokio::test]
    async fn test_sse_stream_splits_fragments_across_chunks() {
        let raw: Vec<reqwest::Result<bytes::Bytes>> = vec![
            Ok(bytes::Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\ndata: {\"choi",
            )),
            Ok(bytes::Bytes::from_static(
                b"ces\":[{\"delta\":{\"content\":\"b\"}}]}\n\ndata: [DONE]\n",
            )),
        ];
        let stream = sse_fragments(Box::pin(futures::stream::iter(raw)));
        let fragments: Vec<String> = stream.map(Result::unwrap).collect().await;
        assert_eq!(fragments, vec!["a", "b"]);
    }
}
