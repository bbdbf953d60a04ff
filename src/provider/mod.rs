//! Model provider trait and implementations.

pub mod http;

#[cfg(feature = "openai")]
pub mod openai;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::config::ModelSettings;
use crate::error::SyllabusError;
use crate::types::{ConversationContext, Message, StreamEvent};

/// Tool declaration sent to the provider API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// How the model may pick tools for a turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ToolChoice {
    #[default]
    Auto,
    /// The model must call this tool.
    Required(String),
}

/// A single streaming request sent to a model provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    /// `None` when no tools are offered; transports omit the field entirely.
    pub tools: Option<Vec<ToolDefinition>>,
    pub tool_choice: ToolChoice,
}

impl ProviderRequest {
    /// Flatten a conversation context into a request for its next turn.
    pub fn from_context(ctx: &ConversationContext) -> Self {
        let tools = (!ctx.tools().is_empty()).then(|| ctx.tools().to_vec());
        let tool_choice = match (ctx.forced_tool(), &tools) {
            (Some(name), Some(_)) => ToolChoice::Required(name.to_string()),
            _ => ToolChoice::Auto,
        };
        Self {
            system_prompt: ctx.system_prompt().map(str::to_string),
            messages: ctx.messages().to_vec(),
            tools,
            tool_choice,
        }
    }
}

/// Event stream returned by a provider for one turn.
pub type EventStream = BoxStream<'static, Result<StreamEvent, SyllabusError>>;

/// The single capability the engine needs from a model vendor.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g., "openai").
    fn provider_name(&self) -> &str;

    /// The model ID this provider instance serves.
    fn model_id(&self) -> &str;

    /// Open a streaming call for one turn.
    async fn stream_turn(&self, request: &ProviderRequest) -> Result<EventStream, SyllabusError>;
}

/// Create the provider named in `settings`.
pub fn create_provider(settings: &ModelSettings) -> Result<Box<dyn ModelProvider>, SyllabusError> {
    match settings.provider.as_str() {
        #[cfg(feature = "openai")]
        "openai" => {
            let api_key = settings
                .api_key
                .clone()
                .ok_or_else(|| SyllabusError::Authentication("Missing OPENAI_API_KEY".into()))?;
            let client = http::build_client(settings.request_timeout())?;
            Ok(Box::new(openai::OpenAiProvider::new(
                client,
                settings.model.clone(),
                api_key,
                settings.base_url.clone(),
            )))
        }
        other => Err(SyllabusError::Configuration(format!(
            "Unsupported provider: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weather_tool() -> ToolDefinition {
        ToolDefinition {
            name: "weather".into(),
            description: "Current weather".into(),
            parameters: serde_json::json!({ "type": "object" }),
        }
    }

    #[test]
    fn empty_tool_set_is_omitted() {
        let mut ctx = ConversationContext::with_system_prompt("be brief");
        ctx.push_user("hi");
        let request = ProviderRequest::from_context(&ctx);
        assert!(request.tools.is_none());
        assert_eq!(request.system_prompt.as_deref(), Some("be brief"));
        assert_eq!(request.messages.len(), 1);
    }

    #[test]
    fn forced_tool_becomes_required_choice() {
        let mut ctx = ConversationContext::new().with_tools(vec![weather_tool()]);
        ctx.force_tool("weather");
        let request = ProviderRequest::from_context(&ctx);
        assert_eq!(request.tool_choice, ToolChoice::Required("weather".into()));
    }

    #[test]
    fn unknown_provider_is_a_configuration_error() {
        let settings = ModelSettings {
            provider: "carrier-pigeon".into(),
            ..ModelSettings::default()
        };
        let err = create_provider(&settings).err().unwrap();
        assert!(matches!(err, SyllabusError::Configuration(_)));
    }
}
