//! Conversation context: system prompt, append-only history, and tool set.

use serde::{Deserialize, Serialize};

use super::message::{Message, Role, ToolCallRecord};
use crate::provider::ToolDefinition;

/// The state one engine run works against.
///
/// Messages can only be appended. Their order is the order sent to the model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationContext {
    system_prompt: Option<String>,
    messages: Vec<Message>,
    tools: Vec<ToolDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    forced_tool: Option<String>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(system_prompt.into()),
            ..Self::default()
        }
    }

    /// Set the tools offered to the model.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(Message::user(text));
    }

    /// Require the model to call `name` on the next turn only.
    pub fn force_tool(&mut self, name: impl Into<String>) {
        self.forced_tool = Some(name.into());
    }

    pub fn forced_tool(&self) -> Option<&str> {
        self.forced_tool.as_deref()
    }

    /// Consume the forced tool for the turn about to be sent.
    pub fn take_forced_tool(&mut self) -> Option<String> {
        self.forced_tool.take()
    }

    /// Latest recorded call to the named tool, if the model made one.
    pub fn find_tool_call(&self, name: &str) -> Option<&ToolCallRecord> {
        self.messages
            .iter()
            .rev()
            .flat_map(|m| m.tool_calls.iter().rev())
            .find(|tc| tc.name == name)
    }

    /// Latest call to the named tool whose handler accepted it.
    pub fn find_accepted_tool_call(&self, name: &str) -> Option<&ToolCallRecord> {
        self.messages
            .iter()
            .rev()
            .flat_map(|m| m.tool_calls.iter().rev())
            .find(|tc| tc.name == name && tc.succeeded())
    }

    /// Text of the last agent message.
    pub fn last_agent_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Agent)
            .map(|m| m.text.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_tool_is_taken_once() {
        let mut ctx = ConversationContext::new();
        ctx.force_tool("outline");
        assert_eq!(ctx.take_forced_tool().as_deref(), Some("outline"));
        assert_eq!(ctx.take_forced_tool(), None);
    }

    #[test]
    fn find_tool_call_returns_latest() {
        let mut ctx = ConversationContext::new();
        let mut first = ToolCallRecord::new(0, "a", "outline");
        first.arguments = "{\"v\":1}".into();
        let mut second = ToolCallRecord::new(0, "b", "outline");
        second.arguments = "{\"v\":2}".into();
        ctx.push(Message::agent_with_tool_calls("", vec![first]));
        ctx.push(Message::tool_result("a", "ok"));
        ctx.push(Message::agent_with_tool_calls("", vec![second]));

        assert_eq!(ctx.find_tool_call("outline").map(|tc| tc.id.as_str()), Some("b"));
        assert!(ctx.find_tool_call("missing").is_none());
    }

    #[test]
    fn accepted_call_skips_rejected_ones() {
        let mut ctx = ConversationContext::new();
        let mut accepted = ToolCallRecord::new(0, "a", "outline");
        accepted.set_result("ok").unwrap();
        let mut rejected = ToolCallRecord::new(0, "b", "outline");
        rejected.set_result("Error: empty outline").unwrap();
        ctx.push(Message::agent_with_tool_calls("", vec![accepted]));
        ctx.push(Message::agent_with_tool_calls("", vec![rejected]));

        assert_eq!(ctx.find_tool_call("outline").map(|tc| tc.id.as_str()), Some("b"));
        assert_eq!(
            ctx.find_accepted_tool_call("outline").map(|tc| tc.id.as_str()),
            Some("a")
        );
    }
}
