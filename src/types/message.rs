//! Message types for model communication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyllabusError;

/// Who authored a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
    Tool,
}

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageBlob>,
    /// Only populated on agent messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
    /// Only populated on tool messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            images: Vec::new(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create a user message with attached images.
    pub fn user_with_images(text: impl Into<String>, images: Vec<ImageBlob>) -> Self {
        Self {
            images,
            ..Self::new(Role::User, text)
        }
    }

    /// Create an agent message.
    pub fn agent(text: impl Into<String>) -> Self {
        Self::new(Role::Agent, text)
    }

    /// Create an agent message carrying the tool calls it requested.
    pub fn agent_with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCallRecord>) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Agent, text)
        }
    }

    /// Create a tool result message answering `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, result)
        }
    }

    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }
}

/// Raw image bytes attached to a user message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageBlob {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl ImageBlob {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }

    /// PNG image, the format uploaded lesson images arrive in.
    pub fn png(data: Vec<u8>) -> Self {
        Self::new(data, "image/png")
    }

    /// Encode as a `data:` URL.
    pub fn to_data_url(&self) -> String {
        use base64::Engine as _;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.data);
        format!("data:{};base64,{}", self.mime_type, encoded)
    }
}

/// A tool call requested by the model within one streamed turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallRecord {
    /// Position within the turn.
    pub index: u32,
    pub id: String,
    pub name: String,
    /// Raw argument text. Only meaningful once the turn's stream has ended.
    pub arguments: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl ToolCallRecord {
    pub fn new(index: u32, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            index,
            id: id.into(),
            name: name.into(),
            arguments: String::new(),
            result: None,
        }
    }

    /// Parse the accumulated argument text. Empty text is not valid JSON.
    pub fn parsed_arguments(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.arguments)
    }

    /// Whether the call was executed and its handler accepted it.
    pub fn succeeded(&self) -> bool {
        self.result
            .as_deref()
            .is_some_and(|result| !result.starts_with("Error: "))
    }

    /// Record the execution result. A record's result can be set only once.
    pub fn set_result(&mut self, result: impl Into<String>) -> Result<(), SyllabusError> {
        if self.result.is_some() {
            return Err(SyllabusError::InvalidState(format!(
                "tool call {} already has a result",
                self.id
            )));
        }
        self.result = Some(result.into());
        Ok(())
    }
}
