//! Handle for a run executing on a background task.

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::error::SyllabusError;
use crate::types::{Chunk, CompletionResult, ConversationContext};

/// What a finished run hands back: the augmented context and one result per turn.
#[derive(Debug, Clone)]
pub struct EngineOutcome {
    pub context: ConversationContext,
    pub responses: Vec<CompletionResult>,
}

impl EngineOutcome {
    /// Text of the final turn.
    pub fn final_text(&self) -> &str {
        self.responses.last().map_or("", |r| r.text.as_str())
    }
}

/// Pending final outcome of a run, delivered separately from its chunks.
#[derive(Debug)]
pub struct PendingOutcome {
    rx: oneshot::Receiver<Result<EngineOutcome, SyllabusError>>,
    cancel: CancellationToken,
}

impl PendingOutcome {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run to finish. A run whose task vanished reports `Canceled`.
    pub async fn wait(self) -> Result<EngineOutcome, SyllabusError> {
        self.rx.await.unwrap_or(Err(SyllabusError::Canceled))
    }
}

/// In-flight streamed run: a chunk stream plus a separately awaited outcome.
#[derive(Debug)]
pub struct EngineRun {
    chunks: UnboundedReceiverStream<Chunk>,
    outcome: PendingOutcome,
}

impl EngineRun {
    pub(super) fn new(
        chunks: mpsc::UnboundedReceiver<Chunk>,
        result: oneshot::Receiver<Result<EngineOutcome, SyllabusError>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            chunks: UnboundedReceiverStream::new(chunks),
            outcome: PendingOutcome { rx: result, cancel },
        }
    }

    /// Chunks in arrival order. Ends when the run finishes.
    pub fn chunks(&mut self) -> &mut UnboundedReceiverStream<Chunk> {
        &mut self.chunks
    }

    pub fn cancel(&self) {
        self.outcome.cancel();
    }

    pub fn into_parts(self) -> (UnboundedReceiverStream<Chunk>, PendingOutcome) {
        (self.chunks, self.outcome)
    }

    /// Wait for the outcome, discarding any unread chunks.
    pub async fn wait(self) -> Result<EngineOutcome, SyllabusError> {
        self.outcome.wait().await
    }

    /// Drain every chunk, then wait for the outcome.
    pub async fn collect(self) -> Result<(Vec<Chunk>, EngineOutcome), SyllabusError> {
        let (chunks, outcome) = self.into_parts();
        let chunks: Vec<Chunk> = chunks.collect().await;
        let outcome = outcome.wait().await?;
        Ok((chunks, outcome))
    }
}
