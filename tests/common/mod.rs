//! Shared test helpers: a scripted streaming provider and event builders.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use syllabus::error::SyllabusError;
use syllabus::provider::{EventStream, ModelProvider, ProviderRequest};
use syllabus::types::{FinishReason, StreamEvent};

/// What the provider does for one turn.
pub enum Turn {
    Events(Vec<Result<StreamEvent, SyllabusError>>),
    /// Emit these events, then never yield again.
    Stall(Vec<StreamEvent>),
    /// Fail before any stream is opened.
    OpenError(SyllabusError),
}

/// Provider that replays one scripted turn per call and records every request.
pub struct ScriptedProvider {
    turns: Mutex<VecDeque<Turn>>,
    fallback: Option<Vec<StreamEvent>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            turns: Mutex::new(VecDeque::new()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replays `events` for every call once the script runs out.
    pub fn repeating(events: Vec<StreamEvent>) -> Self {
        Self {
            fallback: Some(events),
            ..Self::new()
        }
    }

    pub fn then(self, events: Vec<StreamEvent>) -> Self {
        self.then_turn(Turn::Events(events.into_iter().map(Ok).collect()))
    }

    pub fn then_turn(self, turn: Turn) -> Self {
        self.turns.lock().unwrap().push_back(turn);
        self
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "scripted-model"
    }

    async fn stream_turn(&self, request: &ProviderRequest) -> Result<EventStream, SyllabusError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.turns.lock().unwrap().pop_front();
        match next {
            Some(Turn::Events(events)) => Ok(Box::pin(stream::iter(events))),
            Some(Turn::Stall(events)) => Ok(Box::pin(
                stream::iter(events.into_iter().map(Ok)).chain(stream::pending()),
            )),
            Some(Turn::OpenError(err)) => Err(err),
            None => match &self.fallback {
                Some(events) => Ok(Box::pin(stream::iter(events.clone().into_iter().map(Ok)))),
                None => Err(SyllabusError::InvalidState("script exhausted".into())),
            },
        }
    }
}

/// Text deltas followed by `stop`.
pub fn text_turn(parts: &[&str]) -> Vec<StreamEvent> {
    let mut events: Vec<StreamEvent> = parts.iter().map(|p| StreamEvent::text(*p)).collect();
    events.push(StreamEvent::Finish(FinishReason::Stop));
    events
}

/// One tool call split into argument fragments, followed by `tool_calls`.
pub fn tool_turn(id: &str, name: &str, fragments: &[&str]) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    for (i, fragment) in fragments.iter().enumerate() {
        if i == 0 {
            events.push(StreamEvent::tool_call(0, Some(id), Some(name), *fragment));
        } else {
            events.push(StreamEvent::tool_call(0, None, None, *fragment));
        }
    }
    events.push(StreamEvent::Finish(FinishReason::ToolCalls));
    events
}
