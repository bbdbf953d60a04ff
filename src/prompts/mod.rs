//! Prompt scripts: small drivers that build a context, run the engine, and read the result.

pub mod lesson_discussion;
pub mod section_content;

pub use lesson_discussion::{DiscussionRequest, LessonDiscussion};
pub use section_content::{SectionContentScript, PROVIDE_SECTION_CONTENT};
