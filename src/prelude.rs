//! Convenience re-exports for common use.

pub use crate::config::AppConfig;
pub use crate::engine::{Engine, EngineOptions, EngineOutcome, EngineRun};
pub use crate::error::{Result, SyllabusError};
pub use crate::provider::{ModelProvider, ProviderRequest, ToolDefinition};
pub use crate::tools::{FnTool, Tool, ToolArguments, ToolError, ToolParameters, ToolRegistry};
pub use crate::types::{
    Chunk, CompletionResult, ConversationContext, FinishReason, ImageBlob, Message, Role,
    StreamEvent, ToolCallRecord,
};
pub use crate::worker::{
    CourseRepository, GenerationJob, GenerationWorker, JobProducer, JobQueue, WorkerOptions,
};
