//! Streaming tutor chat about one lesson.

use crate::engine::{Engine, EngineRun};
use crate::types::{ConversationContext, ImageBlob, Message};

const SYSTEM_PROMPT: &str = "You are a patient tutor helping a learner with the lesson below. \
Answer using the lesson material where possible, and say so when a question goes beyond it.";

/// One learner question with the conversation so far.
#[derive(Debug, Clone, Default)]
pub struct DiscussionRequest {
    pub lesson_title: String,
    pub lesson_content: String,
    /// Earlier turns of this discussion, oldest first.
    pub history: Vec<Message>,
    pub question: String,
    pub images: Vec<ImageBlob>,
}

#[derive(Debug, Clone)]
pub struct LessonDiscussion {
    engine: Engine,
}

impl LessonDiscussion {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn context_for(&self, request: &DiscussionRequest) -> ConversationContext {
        let system = format!("{SYSTEM_PROMPT}\n\nLesson: {}", request.lesson_title);
        let mut ctx =
            ConversationContext::with_system_prompt(system).with_tools(self.engine.tools().definitions());
        ctx.push_user(format!("Lesson material:\n\n{}", request.lesson_content));
        for message in &request.history {
            ctx.push(message.clone());
        }
        if request.images.is_empty() {
            ctx.push_user(request.question.clone());
        } else {
            ctx.push(Message::user_with_images(
                request.question.clone(),
                request.images.clone(),
            ));
        }
        ctx
    }

    /// Start answering. Chunks stream from the returned run; the outcome arrives separately.
    pub fn ask(&self, request: &DiscussionRequest) -> EngineRun {
        self.engine.stream(self.context_for(request))
    }
}
