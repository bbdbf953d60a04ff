//! Syllabus: tool-calling conversation engine and course generation worker.
//!
//! The [`engine::Engine`] runs a model against a [`types::ConversationContext`],
//! streaming text and executing requested tools until the model answers
//! without calling any. The [`worker::GenerationWorker`] consumes generation
//! jobs from a queue and uses prompt scripts built on the engine to write
//! course content unit by unit.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use syllabus::prelude::*;
//!
//! # async fn example() -> syllabus::error::Result<()> {
//! let config = AppConfig::load(None)?;
//! let provider = syllabus::provider::create_provider(&config.model)?;
//! let engine = Engine::new(Arc::from(provider), Arc::new(ToolRegistry::new()));
//!
//! let mut ctx = ConversationContext::with_system_prompt("You are concise.");
//! ctx.push_user("Hello!");
//! let responses = engine.get_responses(&mut ctx).await?;
//! println!("{}", responses.last().map_or("", |r| r.text.as_str()));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod prelude;
pub mod prompts;
pub mod provider;
pub mod tools;
pub mod types;
pub mod worker;

#[cfg(feature = "cli")]
pub mod cli;
