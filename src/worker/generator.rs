//! Seam between the worker loop and the prompt scripts that write content.

use async_trait::async_trait;

use super::job::{CourseOutline, LessonOutline, ModuleOutline, SectionContent, SectionOutline};
use crate::error::SyllabusError;

/// One unit of content to write, with its place in the outline.
#[derive(Debug, Clone, Copy)]
pub struct UnitRequest<'a> {
    pub course: &'a CourseOutline,
    pub module: &'a ModuleOutline,
    pub lesson: &'a LessonOutline,
    pub section: &'a SectionOutline,
    /// Sections of this lesson already written in this attempt.
    pub previous: &'a [SectionContent],
}

/// Produces the content for a single unit.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate_unit(&self, unit: UnitRequest<'_>) -> Result<SectionContent, SyllabusError>;
}
