//! Streaming types.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::message::ToolCallRecord;

/// Why the model stopped producing output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

/// Incremental fragment of a tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    /// Argument text fragment, appended in arrival order.
    pub arguments: String,
}

/// One event from a provider stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    TextDelta {
        /// Transport-assigned identifier for the turn, when available.
        turn_id: Option<String>,
        text: String,
    },
    ToolCallDelta(ToolCallDelta),
    Finish(FinishReason),
}

impl StreamEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta {
            turn_id: None,
            text: text.into(),
        }
    }

    pub fn tool_call(
        index: u32,
        id: Option<&str>,
        name: Option<&str>,
        arguments: impl Into<String>,
    ) -> Self {
        Self::ToolCallDelta(ToolCallDelta {
            index,
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            arguments: arguments.into(),
        })
    }
}

/// Streamed unit of text forwarded to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub turn_id: String,
    pub text: String,
}

/// Collected outcome of one turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionResult {
    pub turn_id: String,
    pub text: String,
    /// Calls requested this turn, each with its result set.
    pub tool_calls: Vec<ToolCallRecord>,
    pub finish_reason: Option<FinishReason>,
}

impl CompletionResult {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn finish_reason_uses_snake_case() {
        assert_eq!(FinishReason::ToolCalls.to_string(), "tool_calls");
        assert_eq!(
            FinishReason::from_str("content_filter").unwrap(),
            FinishReason::ContentFilter
        );
        assert_eq!(
            serde_json::to_string(&FinishReason::Length).unwrap(),
            "\"length\""
        );
    }
}
