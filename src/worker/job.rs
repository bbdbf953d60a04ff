//! Generation jobs, course outlines, and generated content.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One course-generation request as carried on the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    #[serde(default = "Uuid::new_v4")]
    pub job_id: Uuid,
    pub course_id: Uuid,
    #[serde(rename = "course_outline")]
    pub outline: CourseOutline,
}

impl GenerationJob {
    pub fn new(course_id: Uuid, outline: CourseOutline) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            course_id,
            outline,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseOutline {
    pub course_title: String,
    #[serde(default)]
    pub description: String,
    pub modules: Vec<ModuleOutline>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleOutline {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub lessons: Vec<LessonOutline>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LessonOutline {
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub sections: Vec<SectionOutline>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionOutline {
    pub title: String,
    #[serde(default)]
    pub summary: String,
}

impl CourseOutline {
    /// Leaf units tracked by progress: sections, or one per section-less lesson.
    pub fn total_units(&self) -> usize {
        self.modules
            .iter()
            .flat_map(|m| &m.lessons)
            .map(LessonOutline::unit_count)
            .sum()
    }
}

impl LessonOutline {
    pub fn unit_count(&self) -> usize {
        self.sections.len().max(1)
    }
}

/// Fully assembled course content, written once per job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseContent {
    pub modules: Vec<ModuleContent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleContent {
    pub title: String,
    pub description: String,
    pub lessons: Vec<LessonContent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LessonContent {
    pub title: String,
    pub sections: Vec<SectionContent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionContent {
    pub title: String,
    pub content: String,
}
