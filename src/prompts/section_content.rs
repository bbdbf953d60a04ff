//! Writes one outline unit by forcing the model through a structured-output tool.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::engine::Engine;
use crate::error::SyllabusError;
use crate::tools::{FnTool, ToolParameters, ToolRegistry};
use crate::types::ConversationContext;
use crate::worker::{ContentGenerator, SectionContent, UnitRequest};

/// Tool the model must call with the finished section.
pub const PROVIDE_SECTION_CONTENT: &str = "provide_section_content";

const SYSTEM_PROMPT: &str = "You are an expert course author. Write clear, accurate, \
well-structured lesson material in Markdown. When asked for a section, submit it by \
calling the provide_section_content tool.";

#[derive(Deserialize)]
struct SectionPayload {
    content: String,
}

/// [`ContentGenerator`] backed by the engine, one conversation per unit.
#[derive(Debug, Clone)]
pub struct SectionContentScript {
    engine: Engine,
}

impl SectionContentScript {
    /// Uses `engine`'s provider and limits with a registry holding only the section tool.
    pub fn new(engine: &Engine) -> Self {
        let tools = ToolRegistry::new().with_tool(section_tool());
        Self {
            engine: engine.with_tools(Arc::new(tools)),
        }
    }

    /// Context for one unit, with the section tool forced for the first turn.
    pub fn context_for(&self, unit: &UnitRequest<'_>) -> ConversationContext {
        let mut ctx = ConversationContext::with_system_prompt(SYSTEM_PROMPT)
            .with_tools(self.engine.tools().definitions());
        ctx.push_user(unit_brief(unit));
        ctx.force_tool(PROVIDE_SECTION_CONTENT);
        ctx
    }
}

#[async_trait]
impl ContentGenerator for SectionContentScript {
    async fn generate_unit(&self, unit: UnitRequest<'_>) -> Result<SectionContent, SyllabusError> {
        let mut ctx = self.context_for(&unit);
        let responses = self.engine.get_responses(&mut ctx).await?;
        debug!(section = %unit.section.title, turns = responses.len(), "section conversation finished");

        let call = ctx.find_accepted_tool_call(PROVIDE_SECTION_CONTENT).ok_or_else(|| {
            SyllabusError::InvalidState(format!(
                "model made no accepted {PROVIDE_SECTION_CONTENT} call for section '{}'",
                unit.section.title
            ))
        })?;
        let payload: SectionPayload = serde_json::from_value(call.parsed_arguments()?)?;

        Ok(SectionContent {
            title: unit.section.title.clone(),
            content: payload.content,
        })
    }
}

fn section_tool() -> FnTool {
    FnTool::new(
        PROVIDE_SECTION_CONTENT,
        "Submit the finished content for the requested section.",
        ToolParameters::object()
            .string("content", "The section body in Markdown", true)
            .build(),
        |args| async move {
            let content = args.get_str("content")?;
            if content.trim().is_empty() {
                return Err(crate::tools::ToolError::new("content must not be empty"));
            }
            Ok("Section received.".to_string())
        },
    )
}

fn unit_brief(unit: &UnitRequest<'_>) -> String {
    let mut brief = String::new();
    let _ = writeln!(brief, "Course: {}", unit.course.course_title);
    if !unit.course.description.is_empty() {
        let _ = writeln!(brief, "{}", unit.course.description);
    }
    let _ = writeln!(brief, "\nModule: {}", unit.module.title);
    let _ = writeln!(brief, "Lesson: {}", unit.lesson.title);
    if !unit.lesson.overview.is_empty() {
        let _ = writeln!(brief, "Lesson overview: {}", unit.lesson.overview);
    }
    if !unit.previous.is_empty() {
        let _ = writeln!(brief, "\nSections already written for this lesson:");
        for done in unit.previous {
            let _ = writeln!(brief, "- {}", done.title);
        }
    }
    let _ = writeln!(brief, "\nWrite the section \"{}\".", unit.section.title);
    if !unit.section.summary.is_empty() {
        let _ = writeln!(brief, "It should cover: {}", unit.section.summary);
    }
    brief
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::{CourseOutline, LessonOutline, ModuleOutline, SectionOutline};

    #[test]
    fn brief_lists_previous_sections() {
        let course = CourseOutline {
            course_title: "Rust".into(),
            ..Default::default()
        };
        let module = ModuleOutline {
            title: "Ownership".into(),
            ..Default::default()
        };
        let lesson = LessonOutline {
            title: "Borrowing".into(),
            ..Default::default()
        };
        let section = SectionOutline {
            title: "Mutable references".into(),
            summary: "Exclusive access".into(),
        };
        let previous = vec![SectionContent {
            title: "Shared references".into(),
            content: "...".into(),
        }];
        let brief = unit_brief(&UnitRequest {
            course: &course,
            module: &module,
            lesson: &lesson,
            section: &section,
            previous: &previous,
        });
        assert!(brief.contains("- Shared references"));
        assert!(brief.contains("Write the section \"Mutable references\"."));
        assert!(brief.contains("It should cover: Exclusive access"));
    }
}
