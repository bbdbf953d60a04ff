//! Course generation worker.
//!
//! Pulls [`GenerationJob`]s from a [`JobQueue`], writes every unit of the
//! outline through a [`ContentGenerator`], persists progress after each unit,
//! writes the assembled content once, and then commits the delivery.
//!
//! A missing course is final: the job is logged, committed, and dropped.
//! Every other failure leaves the delivery uncommitted so the queue hands it
//! out again; the next attempt starts over from the first unit.

pub mod generator;
pub mod job;
pub mod progress;
pub mod queue;
pub mod repository;

pub use generator::{ContentGenerator, UnitRequest};
pub use job::{
    CourseContent, CourseOutline, GenerationJob, LessonContent, LessonOutline, ModuleContent,
    ModuleOutline, SectionContent, SectionOutline,
};
pub use progress::ProgressTracker;
pub use queue::{Delivery, DeliveryHandle, JobProducer, JobQueue, MemoryQueue, QueueError};
pub use repository::{CourseRepository, MemoryCourseRepository, RepositoryError};

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{ErrorCategory, RecoverySuggestion, SyllabusError};

/// Why a job attempt failed.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("course {0} no longer exists")]
    CourseNotFound(Uuid),

    #[error("content generation failed: {0}")]
    Engine(#[from] SyllabusError),

    #[error("repository error: {0}")]
    Repository(RepositoryError),

    #[error("job timed out after {0:?}")]
    Timeout(Duration),

    #[error("job attempt panicked")]
    Panicked,

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

impl From<RepositoryError> for JobError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::CourseNotFound(id) => Self::CourseNotFound(id),
            other => Self::Repository(other),
        }
    }
}

/// What to do with a delivery after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobDisposition {
    /// Commit without content; retrying cannot succeed.
    Discard,
    /// Leave uncommitted so the queue delivers it again.
    Redeliver,
}

impl JobError {
    pub fn disposition(&self) -> JobDisposition {
        match self {
            Self::CourseNotFound(_) => JobDisposition::Discard,
            _ => JobDisposition::Redeliver,
        }
    }

    /// Category of the underlying failure, for logs.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Engine(e) => e.category(),
            Self::Timeout(_) => ErrorCategory::Timeout,
            _ => ErrorCategory::Unknown,
        }
    }

    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            Self::Engine(e) => e.recovery_suggestion(),
            Self::Timeout(_) => RecoverySuggestion::IncreaseTimeout,
            _ => RecoverySuggestion::Redeliver,
        }
    }
}

/// Terminal state of one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Discarded,
    Redelivered,
}

/// Counts of delivery outcomes over a worker's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub completed: usize,
    pub discarded: usize,
    pub redelivered: usize,
}

impl WorkerStats {
    fn record(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Completed => self.completed += 1,
            JobOutcome::Discarded => self.discarded += 1,
            JobOutcome::Redelivered => self.redelivered += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Budget for one attempt at one job.
    pub job_timeout: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(3600),
        }
    }
}

/// Processes generation jobs one at a time.
pub struct GenerationWorker {
    queue: Arc<dyn JobQueue>,
    repository: Arc<dyn CourseRepository>,
    generator: Arc<dyn ContentGenerator>,
    options: WorkerOptions,
}

impl GenerationWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        repository: Arc<dyn CourseRepository>,
        generator: Arc<dyn ContentGenerator>,
    ) -> Self {
        Self {
            queue,
            repository,
            generator,
            options: WorkerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: WorkerOptions) -> Self {
        self.options = options;
        self
    }

    /// Pull and handle jobs until `shutdown` fires or the queue closes.
    ///
    /// A job interrupted by shutdown is left uncommitted.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<WorkerStats, JobError> {
        let mut stats = WorkerStats::default();
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = self.queue.receive() => next?,
            };
            let Some(delivery) = next else {
                info!("job queue closed");
                break;
            };

            let outcome = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    warn!("shutdown during job; leaving it for redelivery");
                    stats.record(JobOutcome::Redelivered);
                    break;
                }
                outcome = self.handle_delivery(delivery) => outcome,
            };
            stats.record(outcome);
        }
        info!(
            completed = stats.completed,
            discarded = stats.discarded,
            redelivered = stats.redelivered,
            "worker stopped"
        );
        Ok(stats)
    }

    /// Run one attempt and settle its delivery handle.
    pub async fn handle_delivery(&self, delivery: Delivery) -> JobOutcome {
        let Delivery { job, handle } = delivery;
        info!(
            course_id = %job.course_id,
            job_id = %job.job_id,
            course = %job.outline.course_title,
            attempt = handle.attempt(),
            "received generation job"
        );

        let attempt = AssertUnwindSafe(self.process(&job)).catch_unwind();
        let result = match tokio::time::timeout(self.options.job_timeout, attempt).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(JobError::Panicked),
            Err(_) => Err(JobError::Timeout(self.options.job_timeout)),
        };

        match result {
            Ok(_) => {
                if let Err(e) = handle.commit().await {
                    warn!(course_id = %job.course_id, error = %e, "commit failed after content was written");
                }
                info!(course_id = %job.course_id, "course content generated");
                JobOutcome::Completed
            }
            Err(err) if err.disposition() == JobDisposition::Discard => {
                error!(course_id = %job.course_id, error = %err, "discarding generation job");
                if let Err(e) = handle.commit().await {
                    warn!(course_id = %job.course_id, error = %e, "commit failed for discarded job");
                }
                JobOutcome::Discarded
            }
            Err(err) => {
                warn!(
                    course_id = %job.course_id,
                    error = %err,
                    category = ?err.category(),
                    suggestion = ?err.recovery_suggestion(),
                    "generation attempt failed; job will be redelivered"
                );
                drop(handle);
                JobOutcome::Redelivered
            }
        }
    }

    /// Generate every unit in outline order, then write the content once.
    ///
    /// Progress below 100 is persisted after each unit; 100 is persisted after
    /// the content write, so an observer seeing 100 can read the content.
    pub async fn process(&self, job: &GenerationJob) -> Result<CourseContent, JobError> {
        let outline = &job.outline;
        let mut progress = ProgressTracker::new(outline.total_units());
        let mut content = CourseContent::default();

        for module in &outline.modules {
            let mut module_content = ModuleContent {
                title: module.title.clone(),
                description: module.description.clone(),
                lessons: Vec::with_capacity(module.lessons.len()),
            };

            for lesson in &module.lessons {
                let whole_lesson;
                let units: Vec<&SectionOutline> = if lesson.sections.is_empty() {
                    whole_lesson = SectionOutline {
                        title: lesson.title.clone(),
                        summary: lesson.overview.clone(),
                    };
                    vec![&whole_lesson]
                } else {
                    lesson.sections.iter().collect()
                };

                let mut sections = Vec::with_capacity(units.len());
                for section in units {
                    let written = self
                        .generator
                        .generate_unit(UnitRequest {
                            course: outline,
                            module,
                            lesson,
                            section,
                            previous: &sections,
                        })
                        .await?;
                    sections.push(written);

                    let percent = progress.advance();
                    debug!(
                        course_id = %job.course_id,
                        unit = progress.units_done(),
                        total = progress.total_units(),
                        percent,
                        "unit generated"
                    );
                    if !progress.is_complete() {
                        self.repository
                            .set_generation_progress(job.course_id, percent)
                            .await?;
                    }
                }

                module_content.lessons.push(LessonContent {
                    title: lesson.title.clone(),
                    sections,
                });
            }

            info!(course_id = %job.course_id, module = %module.title, "module generated");
            content.modules.push(module_content);
        }

        self.repository
            .create_course_content(job.course_id, &content)
            .await?;
        self.repository
            .set_generation_progress(job.course_id, progress.percent())
            .await?;
        Ok(content)
    }
}

impl std::fmt::Debug for GenerationWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationWorker")
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_course_is_discarded_everything_else_redelivered() {
        assert_eq!(
            JobError::CourseNotFound(Uuid::nil()).disposition(),
            JobDisposition::Discard
        );
        assert_eq!(JobError::Panicked.disposition(), JobDisposition::Redeliver);
        assert_eq!(
            JobError::Engine(SyllabusError::TurnLimitExceeded { max_turns: 2 }).disposition(),
            JobDisposition::Redeliver
        );
    }

    #[test]
    fn engine_failures_keep_their_classification() {
        let err = JobError::Engine(SyllabusError::RateLimited { retry_after_ms: Some(500) });
        assert_eq!(err.category(), ErrorCategory::RateLimit);
        assert_eq!(err.recovery_suggestion(), RecoverySuggestion::RetryWithBackoff);

        let err = JobError::Timeout(Duration::from_secs(1));
        assert_eq!(err.category(), ErrorCategory::Timeout);
        assert_eq!(err.recovery_suggestion(), RecoverySuggestion::IncreaseTimeout);

        assert_eq!(JobError::Panicked.recovery_suggestion(), RecoverySuggestion::Redeliver);
    }
}
