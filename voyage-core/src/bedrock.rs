//! Hosted travel agent reached through the Bedrock agent runtime.

use async_trait::async_trait;
use aws_sdk_bedrockagentruntime::error::DisplayErrorContext;
use aws_sdk_bedrockagentruntime::types::ResponseStream;
use aws_sdk_bedrockagentruntime::Client;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde_json::Value;

use crate::config::AgentConfig;
use crate::error::{Result, VoyageError};
use crate::relay::{AgentEvent, AgentEventStream, AgentInvocation, AgentProvider};

#[derive(Debug, Clone)]
pub struct BedrockAgentProvider {
    client: Client,
    agent_id: String,
    agent_alias_id: String,
}

impl BedrockAgentProvider {
    pub fn new(client: Client, config: &AgentConfig) -> Result<Self> {
        if config.agent_id.is_empty() {
            return Err(VoyageError::MissingConfig("agent.agent_id"));
        }
        if config.agent_alias_id.is_empty() {
            return Err(VoyageError::MissingConfig("agent.agent_alias_id"));
        }
        Ok(Self {
            client,
            agent_id: config.agent_id.clone(),
            agent_alias_id: config.agent_alias_id.clone(),
        })
    }
}

fn agent_error<E>(err: E) -> VoyageError
where
    E: std::error::Error,
{
    VoyageError::AgentInvocation(DisplayErrorContext(&err).to_string())
}

#[async_trait]
impl AgentProvider for BedrockAgentProvider {
    async fn invoke_agent(&self, invocation: AgentInvocation) -> Result<AgentEventStream> {
        let output = self
            .client
            .invoke_agent()
            .agent_id(&self.agent_id)
            .agent_alias_id(&self.agent_alias_id)
            .session_id(invocation.session_id.as_str())
            .input_text(invocation.input_text)
            .enable_trace(invocation.enable_trace)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    session_id = %invocation.session_id,
                    error = %DisplayErrorContext(&e),
                    "InvokeAgent request failed"
                );
                agent_error(e)
            })?;

        // The receiver holds the response connection; it is dropped with the stream.
        let events = stream::unfold(Some(output.completion), |receiver| async move {
            let mut receiver = receiver?;
            loop {
                match receiver.recv().await {
                    Ok(Some(ResponseStream::Chunk(part))) => {
                        let bytes = part
                            .bytes
                            .map(|b| Bytes::from(b.into_inner()))
                            .unwrap_or_default();
                        return Some((Ok(AgentEvent::Chunk(bytes)), Some(receiver)));
                    }
                    Ok(Some(ResponseStream::Trace(part))) => {
                        let trace = Value::String(format!("{part:?}"));
                        return Some((Ok(AgentEvent::Trace(trace)), Some(receiver)));
                    }
                    Ok(Some(other)) => {
                        tracing::debug!(event = ?other, "Ignoring agent stream event");
                        continue;
                    }
                    Ok(None) => return None,
                    Err(e) => {
                        tracing::error!(error = %DisplayErrorContext(&e), "Agent response stream failed");
                        return Some((Err(agent_error(e)), None));
                    }
                }
            }
        });

        Ok(events.boxed())
    }

    fn name(&self) -> &str {
        "bedrock"
    }
}
