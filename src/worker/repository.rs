//! Course content storage boundary.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::job::CourseContent;

#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The course was deleted (or never existed). Retrying will not help.
    #[error("course {0} not found")]
    CourseNotFound(Uuid),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Where generation progress and finished content are written.
#[async_trait]
pub trait CourseRepository: Send + Sync {
    async fn set_generation_progress(&self, course_id: Uuid, progress: u8)
        -> Result<(), RepositoryError>;

    async fn create_course_content(
        &self,
        course_id: Uuid,
        content: &CourseContent,
    ) -> Result<(), RepositoryError>;
}

#[derive(Debug, Default)]
struct CourseRecord {
    progress: Vec<u8>,
    content: Option<CourseContent>,
    content_writes: usize,
}

/// In-memory repository. Content writes are upserts keyed by course id.
#[derive(Debug, Default)]
pub struct MemoryCourseRepository {
    courses: Mutex<HashMap<Uuid, CourseRecord>>,
}

impl MemoryCourseRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_course(&self, course_id: Uuid) {
        self.lock().entry(course_id).or_default();
    }

    pub fn delete_course(&self, course_id: Uuid) {
        self.lock().remove(&course_id);
    }

    /// Every progress value written for the course, in write order.
    pub fn progress_history(&self, course_id: Uuid) -> Vec<u8> {
        self.lock()
            .get(&course_id)
            .map(|c| c.progress.clone())
            .unwrap_or_default()
    }

    pub fn content(&self, course_id: Uuid) -> Option<CourseContent> {
        self.lock().get(&course_id).and_then(|c| c.content.clone())
    }

    pub fn content_writes(&self, course_id: Uuid) -> usize {
        self.lock().get(&course_id).map_or(0, |c| c.content_writes)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, CourseRecord>> {
        // A poisoned map is still structurally valid.
        self.courses.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CourseRepository for MemoryCourseRepository {
    async fn set_generation_progress(
        &self,
        course_id: Uuid,
        progress: u8,
    ) -> Result<(), RepositoryError> {
        let mut courses = self.lock();
        let course = courses
            .get_mut(&course_id)
            .ok_or(RepositoryError::CourseNotFound(course_id))?;
        course.progress.push(progress);
        Ok(())
    }

    async fn create_course_content(
        &self,
        course_id: Uuid,
        content: &CourseContent,
    ) -> Result<(), RepositoryError> {
        let mut courses = self.lock();
        let course = courses
            .get_mut(&course_id)
            .ok_or(RepositoryError::CourseNotFound(course_id))?;
        course.content = Some(content.clone());
        course.content_writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn content_write_is_an_upsert() {
        let repo = MemoryCourseRepository::new();
        let id = Uuid::new_v4();
        repo.create_course(id);

        let mut content = CourseContent::default();
        repo.create_course_content(id, &content).await.unwrap();
        content.modules.push(Default::default());
        repo.create_course_content(id, &content).await.unwrap();

        assert_eq!(repo.content(id), Some(content));
        assert_eq!(repo.content_writes(id), 2);
    }

    #[tokio::test]
    async fn deleted_course_is_not_found() {
        let repo = MemoryCourseRepository::new();
        let id = Uuid::new_v4();
        repo.create_course(id);
        repo.delete_course(id);
        let err = repo.set_generation_progress(id, 10).await.unwrap_err();
        assert!(matches!(err, RepositoryError::CourseNotFound(missing) if missing == id));
    }
}
