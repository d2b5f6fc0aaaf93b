//! Agent session relay.
//!
//! Forwards a user message to the hosted travel agent under a session
//! identifier and hands back its reply, either collected in full or as a
//! pull-driven stream of text deltas.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, VoyageError};
use crate::models::SessionId;

// ============================================================================
// AgentProvider trait
// ============================================================================

/// One event of an agent invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Raw UTF-8 bytes; a character may be split across chunks.
    Chunk(Bytes),
    Trace(Value),
}

pub type AgentEventStream = BoxStream<'static, Result<AgentEvent>>;

#[derive(Debug, Clone)]
pub struct AgentInvocation {
    pub session_id: SessionId,
    pub input_text: String,
    pub enable_trace: bool,
}

/// Abstraction over the hosted conversational agent.
#[async_trait]
pub trait AgentProvider: Send + Sync {
    /// Start an invocation. Events are only fetched as the returned stream is polled.
    async fn invoke_agent(&self, invocation: AgentInvocation) -> Result<AgentEventStream>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Replies and frames
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReply {
    pub response: String,
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<Value>>,
}

/// A frame of the session event stream sent to streaming clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamFrame {
    Session {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Content {
        text: String,
    },
    Done,
    Error {
        message: String,
    },
}

// ============================================================================
// UTF-8 delta decoding
// ============================================================================

/// Incremental UTF-8 decoder carrying an incomplete trailing sequence
/// (at most three bytes) into the next chunk.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `chunk` as forms complete characters.
    pub fn push(&mut self, chunk: &[u8]) -> Result<String> {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(chunk);

        match String::from_utf8(buf) {
            Ok(text) => Ok(text),
            Err(err) => {
                let utf8 = err.utf8_error();
                if utf8.error_len().is_some() {
                    return Err(VoyageError::AgentInvocation(format!(
                        "agent sent invalid UTF-8: {utf8}"
                    )));
                }
                let mut bytes = err.into_bytes();
                self.pending = bytes.split_off(utf8.valid_up_to());
                String::from_utf8(bytes).map_err(|e| {
                    VoyageError::AgentInvocation(format!("agent sent invalid UTF-8: {e}"))
                })
            }
        }
    }

    /// Fails when the stream ended in the middle of a character.
    pub fn finish(self) -> Result<()> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(VoyageError::AgentInvocation(format!(
                "agent response ended inside a UTF-8 sequence ({} dangling bytes)",
                self.pending.len()
            )))
        }
    }
}

// ============================================================================
// DeltaStream
// ============================================================================

/// Text deltas of one streaming invocation.
///
/// Owns the provider stream and releases it as soon as the invocation ends,
/// faults, or the consumer drops this handle. Trace events and empty deltas
/// are skipped. Yields an error at most once, then ends.
pub struct DeltaStream {
    inner: Option<AgentEventStream>,
    decoder: Utf8Decoder,
}

impl DeltaStream {
    pub fn new(events: AgentEventStream) -> Self {
        Self {
            inner: Some(events),
            decoder: Utf8Decoder::new(),
        }
    }

    fn fail(&mut self, err: VoyageError) -> Poll<Option<Result<String>>> {
        self.inner = None;
        tracing::error!(error = %err, "Agent stream failed");
        Poll::Ready(Some(Err(err)))
    }
}

impl Stream for DeltaStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            let Some(events) = this.inner.as_mut() else {
                return Poll::Ready(None);
            };

            match ready!(events.poll_next_unpin(cx)) {
                Some(Ok(AgentEvent::Chunk(bytes))) => match this.decoder.push(&bytes) {
                    Ok(text) if text.is_empty() => continue,
                    Ok(text) => return Poll::Ready(Some(Ok(text))),
                    Err(e) => return this.fail(e),
                },
                Some(Ok(AgentEvent::Trace(_))) => continue,
                Some(Err(e)) => return this.fail(e),
                None => {
                    this.inner = None;
                    let decoder = std::mem::take(&mut this.decoder);
                    return match decoder.finish() {
                        Ok(()) => Poll::Ready(None),
                        Err(e) => this.fail(e),
                    };
                }
            }
        }
    }
}

// ============================================================================
// AgentSessionRelay
// ============================================================================

#[derive(Clone)]
pub struct AgentSessionRelay {
    provider: Arc<dyn AgentProvider>,
}

enum FrameState {
    Announce {
        relay: AgentSessionRelay,
        message: String,
        session_id: SessionId,
    },
    Connect {
        relay: AgentSessionRelay,
        message: String,
        session_id: SessionId,
    },
    Streaming(DeltaStream),
    Finished,
}

impl AgentSessionRelay {
    pub fn new(provider: Arc<dyn AgentProvider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Send `message` and wait for the complete reply.
    ///
    /// A fault anywhere in the exchange fails the whole call; no partial
    /// reply is returned.
    pub async fn invoke(
        &self,
        message: &str,
        session_id: Option<String>,
        trace: bool,
    ) -> Result<AgentReply> {
        validate_message(message)?;
        let session_id = SessionId::resolve(session_id);
        tracing::info!(session_id = %session_id, provider = self.provider.name(), "Invoking agent");

        let mut events = self
            .provider
            .invoke_agent(AgentInvocation {
                session_id: session_id.clone(),
                input_text: message.to_string(),
                enable_trace: trace,
            })
            .await
            .map_err(|e| {
                tracing::error!(session_id = %session_id, error = %e, "Agent invocation failed");
                e
            })?;

        let mut decoder = Utf8Decoder::new();
        let mut response = String::new();
        let mut traces = Vec::new();
        while let Some(event) = events.next().await {
            match event? {
                AgentEvent::Chunk(bytes) => response.push_str(&decoder.push(&bytes)?),
                AgentEvent::Trace(value) if trace => traces.push(value),
                AgentEvent::Trace(_) => {}
            }
        }
        decoder.finish()?;

        Ok(AgentReply {
            response,
            session_id,
            trace: trace.then_some(traces),
        })
    }

    /// Start an invocation and return its text deltas as they arrive.
    pub async fn invoke_streaming(&self, message: &str, session_id: SessionId) -> Result<DeltaStream> {
        validate_message(message)?;
        tracing::info!(session_id = %session_id, provider = self.provider.name(), "Streaming agent reply");

        let events = self
            .provider
            .invoke_agent(AgentInvocation {
                session_id,
                input_text: message.to_string(),
                enable_trace: false,
            })
            .await?;
        Ok(DeltaStream::new(events))
    }

    /// Session frames for an event-stream client: the session announcement,
    /// then content deltas, then `done` or a single `error`.
    ///
    /// The provider is not contacted until the frame after the announcement
    /// is pulled.
    pub fn session_frames(
        &self,
        message: String,
        session_id: Option<String>,
    ) -> BoxStream<'static, StreamFrame> {
        let initial = FrameState::Announce {
            relay: self.clone(),
            message,
            session_id: SessionId::resolve(session_id),
        };

        stream::unfold(initial, |state| async move {
            match state {
                FrameState::Announce {
                    relay,
                    message,
                    session_id,
                } => {
                    let frame = StreamFrame::Session {
                        session_id: session_id.to_string(),
                    };
                    Some((
                        frame,
                        FrameState::Connect {
                            relay,
                            message,
                            session_id,
                        },
                    ))
                }
                FrameState::Connect {
                    relay,
                    message,
                    session_id,
                } => match relay.invoke_streaming(&message, session_id).await {
                    Ok(deltas) => Some(next_frame(deltas).await),
                    Err(e) => Some((error_frame(&e), FrameState::Finished)),
                },
                FrameState::Streaming(deltas) => Some(next_frame(deltas).await),
                FrameState::Finished => None,
            }
        })
        .boxed()
    }
}

async fn next_frame(mut deltas: DeltaStream) -> (StreamFrame, FrameState) {
    match deltas.next().await {
        Some(Ok(text)) => (StreamFrame::Content { text }, FrameState::Streaming(deltas)),
        Some(Err(e)) => (error_frame(&e), FrameState::Finished),
        None => (StreamFrame::Done, FrameState::Finished),
    }
}

fn error_frame(err: &VoyageError) -> StreamFrame {
    StreamFrame::Error {
        message: err.to_string(),
    }
}

fn validate_message(message: &str) -> Result<()> {
    if message.trim().is_empty() {
        return Err(VoyageError::InvalidArgument(
            "message must not be empty".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
