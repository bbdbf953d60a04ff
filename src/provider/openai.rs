//! OpenAI-compatible Chat Completions streaming provider.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tracing::debug;

use crate::error::SyllabusError;
use crate::types::{FinishReason, Message, Role, StreamEvent, ToolCallDelta};

use super::http::{bearer_headers, next_line, parse_sse_line, status_to_error, SseLine};
use super::{EventStream, ModelProvider, ProviderRequest, ToolChoice};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    client: reqwest::Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(
        client: reqwest::Client,
        model: impl Into<String>,
        api_key: impl Into<String>,
        base_url: Option<String>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    pub fn build_request_body(&self, request: &ProviderRequest) -> serde_json::Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(ref system) = request.system_prompt {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.extend(request.messages.iter().map(message_to_openai));

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });

        if let (Some(obj), Some(tools)) = (body.as_object_mut(), request.tools.as_ref()) {
            let tool_defs: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            obj.insert("tools".into(), tool_defs.into());

            if let ToolChoice::Required(ref name) = request.tool_choice {
                obj.insert(
                    "tool_choice".into(),
                    serde_json::json!({ "type": "function", "function": { "name": name } }),
                );
            }
        }

        body
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn stream_turn(&self, request: &ProviderRequest) -> Result<EventStream, SyllabusError> {
        let body = self.build_request_body(request);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.as_ref().map_or(0, Vec::len),
            "OpenAI stream_turn"
        );

        let resp = self
            .client
            .post(&url)
            .headers(bearer_headers(&self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let byte_stream = resp.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();
            futures::pin_mut!(byte_stream);

            'read: while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(SyllabusError::Network(e));
                        break;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(line) = next_line(&mut buffer) {
                    match parse_sse_line(&line) {
                        SseLine::Skip => continue,
                        SseLine::Done => break 'read,
                        SseLine::Data(data) => match serde_json::from_str::<OpenAiStreamChunk>(data) {
                            Ok(chunk) => {
                                for event in chunk_to_events(chunk) {
                                    yield Ok(event);
                                }
                            }
                            Err(e) => {
                                yield Err(SyllabusError::Stream(format!("malformed stream chunk: {e}")));
                                break 'read;
                            }
                        },
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

fn chunk_to_events(chunk: OpenAiStreamChunk) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    let Some(choice) = chunk.choices.into_iter().next() else {
        return events;
    };

    if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
        events.push(StreamEvent::TextDelta {
            turn_id: chunk.id.clone(),
            text,
        });
    }

    for tc in choice.delta.tool_calls.unwrap_or_default() {
        let (name, arguments) = match tc.function {
            Some(f) => (f.name, f.arguments.unwrap_or_default()),
            None => (None, String::new()),
        };
        events.push(StreamEvent::ToolCallDelta(ToolCallDelta {
            index: tc.index,
            id: tc.id,
            name,
            arguments,
        }));
    }

    if let Some(reason) = choice.finish_reason.as_deref().and_then(parse_finish_reason) {
        events.push(StreamEvent::Finish(reason));
    }

    events
}

fn parse_finish_reason(s: &str) -> Option<FinishReason> {
    match s {
        "stop" => Some(FinishReason::Stop),
        "length" => Some(FinishReason::Length),
        "tool_calls" | "function_call" => Some(FinishReason::ToolCalls),
        "content_filter" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

fn message_to_openai(msg: &Message) -> serde_json::Value {
    match msg.role {
        Role::User if msg.has_images() => {
            let mut parts = vec![serde_json::json!({ "type": "text", "text": msg.text })];
            parts.extend(msg.images.iter().map(|img| {
                serde_json::json!({
                    "type": "image_url",
                    "image_url": { "url": img.to_data_url() }
                })
            }));
            serde_json::json!({ "role": "user", "content": parts })
        }
        Role::User => serde_json::json!({ "role": "user", "content": msg.text }),
        Role::Agent if !msg.tool_calls.is_empty() => {
            let tool_calls: Vec<serde_json::Value> = msg
                .tool_calls
                .iter()
                .map(|tc| {
                    serde_json::json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": tc.arguments,
                        }
                    })
                })
                .collect();
            let content = if msg.text.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::Value::String(msg.text.clone())
            };
            serde_json::json!({
                "role": "assistant",
                "content": content,
                "tool_calls": tool_calls,
            })
        }
        Role::Agent => serde_json::json!({ "role": "assistant", "content": msg.text }),
        Role::Tool => serde_json::json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id,
            "content": msg.text,
        }),
    }
}

// OpenAI stream chunk types (internal)

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct OpenAiStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCallDelta>>,
}

#[derive(Deserialize)]
struct OpenAiToolCallDelta {
    index: u32,
    id: Option<String>,
    function: Option<OpenAiFunctionDelta>,
}

#[derive(Deserialize)]
struct OpenAiFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ToolDefinition;
    use crate::types::{ImageBlob, ToolCallRecord};
    use pretty_assertions::assert_eq;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new(reqwest::Client::new(), "gpt-4o", "sk-test", None)
    }

    fn request(messages: Vec<Message>) -> ProviderRequest {
        ProviderRequest {
            system_prompt: None,
            messages,
            tools: None,
            tool_choice: ToolChoice::Auto,
        }
    }

    #[test]
    fn system_prompt_is_first_message() {
        let mut req = request(vec![Message::user("hi")]);
        req.system_prompt = Some("be terse".into());
        let body = provider().build_request_body(&req);
        assert_eq!(body["messages"][0], serde_json::json!({ "role": "system", "content": "be terse" }));
        assert_eq!(body["messages"][1], serde_json::json!({ "role": "user", "content": "hi" }));
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn images_become_multipart_content() {
        let msg = Message::user_with_images("what is this", vec![ImageBlob::png(vec![1, 2, 3])]);
        let body = provider().build_request_body(&request(vec![msg]));
        assert_eq!(
            body["messages"][0]["content"],
            serde_json::json!([
                { "type": "text", "text": "what is this" },
                { "type": "image_url", "image_url": { "url": "data:image/png;base64,AQID" } },
            ])
        );
    }

    #[test]
    fn agent_tool_calls_keep_raw_arguments() {
        let mut record = ToolCallRecord::new(0, "call_1", "weather");
        record.arguments = r#"{"city":"NYC"}"#.into();
        let messages = vec![
            Message::agent_with_tool_calls("", vec![record]),
            Message::tool_result("call_1", "72F"),
        ];
        let body = provider().build_request_body(&request(messages));
        assert_eq!(
            body["messages"][0],
            serde_json::json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": { "name": "weather", "arguments": "{\"city\":\"NYC\"}" },
                }],
            })
        );
        assert_eq!(
            body["messages"][1],
            serde_json::json!({ "role": "tool", "tool_call_id": "call_1", "content": "72F" })
        );
    }

    #[test]
    fn forced_tool_sets_tool_choice() {
        let mut req = request(vec![Message::user("go")]);
        req.tools = Some(vec![ToolDefinition {
            name: "outline".into(),
            description: "Submit an outline".into(),
            parameters: serde_json::json!({ "type": "object" }),
        }]);
        req.tool_choice = ToolChoice::Required("outline".into());
        let body = provider().build_request_body(&req);
        assert_eq!(body["tools"][0]["function"]["name"], "outline");
        assert_eq!(body["tool_choice"]["function"]["name"], "outline");
    }

    #[test]
    fn chunk_with_tool_delta_and_finish() {
        let chunk: OpenAiStreamChunk = serde_json::from_value(serde_json::json!({
            "id": "chatcmpl-1",
            "choices": [{
                "delta": { "tool_calls": [{ "index": 0, "id": "call_1", "function": { "name": "weather", "arguments": "" } }] },
                "finish_reason": "tool_calls",
            }],
        }))
        .unwrap();
        assert_eq!(
            chunk_to_events(chunk),
            vec![
                StreamEvent::tool_call(0, Some("call_1"), Some("weather"), ""),
                StreamEvent::Finish(FinishReason::ToolCalls),
            ]
        );
    }
}
