//! Streaming conversation engine: the tool-calling turn loop.
//!
//! Each turn flattens the [`ConversationContext`] into a [`ProviderRequest`],
//! streams the model's answer (forwarding text as [`Chunk`]s), runs any
//! requested tools in index order, and appends the agent and tool messages
//! before looping. The loop ends on the first turn without tool calls.

mod run;
mod tool_phase;
mod turn;

pub use run::{EngineOutcome, EngineRun, PendingOutcome};
pub use tool_phase::INVALID_JSON_ARGUMENTS;

use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::SyllabusError;
use crate::provider::{ModelProvider, ProviderRequest};
use crate::tools::ToolRegistry;
use crate::types::{Chunk, CompletionResult, ConversationContext, Message};

/// Where the engine forwards streamed text.
pub type ChunkSink = mpsc::UnboundedSender<Chunk>;

/// Limits applied to every run.
#[derive(Debug, Clone, Builder)]
pub struct EngineOptions {
    /// Turns allowed before a still-tool-calling model is cut off.
    #[builder(default = 16)]
    pub max_turns: usize,
    /// Budget for one streaming call, from request to end of stream.
    #[builder(default = Duration::from_secs(300))]
    pub call_timeout: Duration,
    /// Longest gap allowed between two stream events.
    #[builder(default = Duration::from_secs(120))]
    pub stream_idle_timeout: Duration,
    #[builder(default)]
    pub cancel: CancellationToken,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Drives model turns against a conversation context.
#[derive(Clone)]
pub struct Engine {
    provider: Arc<dyn ModelProvider>,
    tools: Arc<ToolRegistry>,
    options: EngineOptions,
}

impl Engine {
    pub fn new(provider: Arc<dyn ModelProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            tools,
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Same provider and options, different tools.
    pub fn with_tools(&self, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider: self.provider.clone(),
            tools,
            options: self.options.clone(),
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Run turns until the model answers without calling tools.
    ///
    /// Returns one [`CompletionResult`] per turn. Transport failures, timeouts,
    /// cancellation, and the turn cap abort the run with an error.
    pub async fn run(
        &self,
        ctx: &mut ConversationContext,
        chunks: Option<&ChunkSink>,
    ) -> Result<Vec<CompletionResult>, SyllabusError> {
        let max_turns = self.options.max_turns.max(1);
        let mut responses = Vec::new();

        for turn in 1..=max_turns {
            let request = ProviderRequest::from_context(ctx);
            ctx.take_forced_tool();

            let mut output =
                turn::stream_turn(self.provider.as_ref(), &request, chunks, &self.options).await?;

            debug!(
                turn,
                turn_id = %output.turn_id,
                text_len = output.text.len(),
                tool_calls = output.tool_calls.len(),
                finish_reason = ?output.finish_reason,
                "turn streamed"
            );

            if output.tool_calls.is_empty() {
                ctx.push(Message::agent(output.text.clone()));
                responses.push(output.into_result());
                return Ok(responses);
            }

            tool_phase::execute_tool_calls(&self.tools, &mut output.tool_calls).await?;

            ctx.push(Message::agent_with_tool_calls(
                output.text.clone(),
                output.tool_calls.clone(),
            ));
            for call in &output.tool_calls {
                ctx.push(Message::tool_result(
                    call.id.clone(),
                    call.result.clone().unwrap_or_default(),
                ));
            }
            responses.push(output.into_result());
        }

        Err(SyllabusError::TurnLimitExceeded { max_turns })
    }

    /// Run to completion without a chunk consumer.
    pub async fn get_responses(
        &self,
        ctx: &mut ConversationContext,
    ) -> Result<Vec<CompletionResult>, SyllabusError> {
        self.run(ctx, None).await
    }

    /// Run on a background task, streaming chunks and delivering the outcome separately.
    pub fn stream(&self, mut ctx: ConversationContext) -> EngineRun {
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = oneshot::channel();
        let cancel = self.options.cancel.child_token();

        let mut engine = self.clone();
        engine.options.cancel = cancel.clone();

        tokio::spawn(async move {
            let outcome = engine
                .run(&mut ctx, Some(&chunk_tx))
                .await
                .map(|responses| EngineOutcome {
                    context: ctx,
                    responses,
                });
            drop(chunk_tx);
            let _ = result_tx.send(outcome);
        });

        EngineRun::new(chunk_rx, result_rx, cancel)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("provider", &self.provider.provider_name())
            .field("model", &self.provider.model_id())
            .field("tools", &self.tools)
            .field("options", &self.options)
            .finish()
    }
}
