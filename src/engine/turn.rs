//! Streaming phase of a turn: drive the provider stream and aggregate deltas.

use std::collections::BTreeMap;

use futures::StreamExt;
use tokio::time::{self, Instant};
use tracing::debug;

use super::{ChunkSink, EngineOptions};
use crate::error::SyllabusError;
use crate::provider::{ModelProvider, ProviderRequest};
use crate::types::{
    Chunk, CompletionResult, FinishReason, StreamEvent, ToolCallDelta, ToolCallRecord,
};

/// Everything one turn's stream produced.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TurnOutput {
    pub turn_id: String,
    pub text: String,
    /// Ordered by index.
    pub tool_calls: Vec<ToolCallRecord>,
    pub finish_reason: Option<FinishReason>,
}

impl TurnOutput {
    pub fn into_result(self) -> CompletionResult {
        CompletionResult {
            turn_id: self.turn_id,
            text: self.text,
            tool_calls: self.tool_calls,
            finish_reason: self.finish_reason,
        }
    }
}

/// Merges stream events into turn text and per-index tool call records.
#[derive(Debug)]
pub(crate) struct TurnAccumulator {
    turn_id: String,
    turn_id_fixed: bool,
    text: String,
    calls: BTreeMap<u32, ToolCallRecord>,
    finish_reason: Option<FinishReason>,
}

impl TurnAccumulator {
    pub fn new() -> Self {
        Self {
            turn_id: uuid::Uuid::new_v4().to_string(),
            turn_id_fixed: false,
            text: String::new(),
            calls: BTreeMap::new(),
            finish_reason: None,
        }
    }

    /// Append text, returning the chunk to forward. Empty deltas yield nothing.
    pub fn push_text(&mut self, turn_id: Option<String>, text: String) -> Option<Chunk> {
        if !self.turn_id_fixed {
            if let Some(id) = turn_id.filter(|id| !id.is_empty()) {
                self.turn_id = id;
            }
            self.turn_id_fixed = true;
        }
        if text.is_empty() {
            return None;
        }
        self.text.push_str(&text);
        Some(Chunk {
            turn_id: self.turn_id.clone(),
            text,
        })
    }

    /// The first delta for an index creates the record; later ones extend its arguments.
    pub fn push_tool_delta(&mut self, delta: ToolCallDelta) {
        let ToolCallDelta {
            index,
            id,
            name,
            arguments,
        } = delta;
        let record = self.calls.entry(index).or_insert_with(|| {
            ToolCallRecord::new(index, id.clone().unwrap_or_default(), name.clone().unwrap_or_default())
        });
        if record.id.is_empty() {
            if let Some(id) = id {
                record.id = id;
            }
        }
        if record.name.is_empty() {
            if let Some(name) = name {
                record.name = name;
            }
        }
        record.arguments.push_str(&arguments);
    }

    pub fn finish(&mut self, reason: FinishReason) {
        self.finish_reason = Some(reason);
    }

    pub fn into_output(self) -> TurnOutput {
        let tool_calls = self
            .calls
            .into_values()
            .map(|mut record| {
                if record.id.is_empty() {
                    record.id = format!("call_{}", record.index);
                }
                record
            })
            .collect();
        TurnOutput {
            turn_id: self.turn_id,
            text: self.text,
            tool_calls,
            finish_reason: self.finish_reason,
        }
    }
}

/// Open the provider stream and consume it to the end, forwarding text chunks.
///
/// Fails on transport errors, on the whole-call deadline, on an idle gap
/// between events, and on cancellation.
pub(crate) async fn stream_turn(
    provider: &dyn ModelProvider,
    request: &ProviderRequest,
    chunks: Option<&ChunkSink>,
    options: &EngineOptions,
) -> Result<TurnOutput, SyllabusError> {
    let call_deadline = time::sleep(options.call_timeout);
    tokio::pin!(call_deadline);
    let call_timeout_ms = options.call_timeout.as_millis() as u64;

    let mut stream = tokio::select! {
        biased;
        _ = options.cancel.cancelled() => return Err(SyllabusError::Canceled),
        _ = &mut call_deadline => return Err(SyllabusError::Timeout(call_timeout_ms)),
        opened = provider.stream_turn(request) => opened?,
    };

    let idle = time::sleep(options.stream_idle_timeout);
    tokio::pin!(idle);
    let mut acc = TurnAccumulator::new();

    loop {
        tokio::select! {
            biased;
            _ = options.cancel.cancelled() => return Err(SyllabusError::Canceled),
            _ = &mut call_deadline => return Err(SyllabusError::Timeout(call_timeout_ms)),
            _ = &mut idle => {
                debug!(provider = provider.provider_name(), "stream idle timeout");
                return Err(SyllabusError::Timeout(options.stream_idle_timeout.as_millis() as u64));
            }
            event = stream.next() => {
                let Some(event) = event else { break };
                idle.as_mut().reset(Instant::now() + options.stream_idle_timeout);
                match event? {
                    StreamEvent::TextDelta { turn_id, text } => {
                        if let (Some(chunk), Some(sink)) = (acc.push_text(turn_id, text), chunks) {
                            // The receiver may be gone; the turn still completes.
                            let _ = sink.send(chunk);
                        }
                    }
                    StreamEvent::ToolCallDelta(delta) => acc.push_tool_delta(delta),
                    StreamEvent::Finish(reason) => acc.finish(reason),
                }
            }
        }
    }

    Ok(acc.into_output())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn delta(index: u32, id: Option<&str>, name: Option<&str>, args: &str) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            arguments: args.to_string(),
        }
    }

    #[test]
    fn text_deltas_concatenate_in_order() {
        let mut acc = TurnAccumulator::new();
        let first = acc.push_text(Some("chatcmpl-1".into()), "Hi".into()).unwrap();
        let second = acc.push_text(Some("chatcmpl-1".into()), " there".into()).unwrap();
        assert_eq!(first.turn_id, "chatcmpl-1");
        assert_eq!(second.text, " there");
        assert!(acc.push_text(None, String::new()).is_none());
        assert_eq!(acc.into_output().text, "Hi there");
    }

    #[test]
    fn argument_fragments_merge_by_index() {
        let mut acc = TurnAccumulator::new();
        acc.push_tool_delta(delta(0, Some("call_a"), Some("weather"), "{\"city\":"));
        acc.push_tool_delta(delta(1, Some("call_b"), Some("time"), "{}"));
        acc.push_tool_delta(delta(0, None, None, "\"NYC\"}"));
        let out = acc.into_output();

        assert_eq!(out.tool_calls.len(), 2);
        assert_eq!(out.tool_calls[0].id, "call_a");
        assert_eq!(out.tool_calls[0].arguments, "{\"city\":\"NYC\"}");
        assert_eq!(out.tool_calls[1].name, "time");
    }

    #[test]
    fn records_are_ordered_by_index_not_arrival() {
        let mut acc = TurnAccumulator::new();
        acc.push_tool_delta(delta(1, Some("second"), Some("b"), ""));
        acc.push_tool_delta(delta(0, Some("first"), Some("a"), ""));
        let ids: Vec<_> = acc.into_output().tool_calls.into_iter().map(|tc| tc.id).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[test]
    fn missing_id_is_synthesized() {
        let mut acc = TurnAccumulator::new();
        acc.push_tool_delta(delta(2, None, Some("a"), "{}"));
        assert_eq!(acc.into_output().tool_calls[0].id, "call_2");
    }
}
