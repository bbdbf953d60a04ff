//! Syllabus CLI binary entry point.

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use syllabus::cli::{ChatArgs, Cli, Commands, GenerateArgs};
use syllabus::config::AppConfig;
use syllabus::engine::Engine;
use syllabus::prompts::SectionContentScript;
use syllabus::provider::create_provider;
use syllabus::tools::ToolRegistry;
use syllabus::types::ConversationContext;
use syllabus::worker::{
    CourseOutline, GenerationJob, GenerationWorker, JobProducer, MemoryCourseRepository,
    MemoryQueue,
};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => match cli.command {
            Commands::Chat(args) => handle_chat(config, args).await,
            Commands::Generate(args) => handle_generate(config, args).await,
        },
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn build_engine(config: &AppConfig, tools: ToolRegistry) -> Result<Engine, Box<dyn std::error::Error>> {
    let provider = create_provider(&config.model)?;
    Ok(Engine::new(Arc::from(provider), Arc::new(tools)).with_options(config.engine.to_options()))
}

async fn handle_chat(mut config: AppConfig, args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(model) = args.model {
        config.model.model = model;
    }
    let engine = build_engine(&config, ToolRegistry::new())?;

    let mut ctx = match args.system {
        Some(system) => ConversationContext::with_system_prompt(system),
        None => ConversationContext::new(),
    };
    ctx.push_user(args.prompt);

    let mut run = engine.stream(ctx);
    let mut stdout = std::io::stdout();
    while let Some(chunk) = run.chunks().next().await {
        print!("{}", chunk.text);
        let _ = stdout.flush();
    }
    println!();

    run.wait().await?;
    Ok(())
}

async fn handle_generate(config: AppConfig, args: GenerateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(&args.outline)?;
    let outline: CourseOutline = serde_json::from_str(&raw)?;
    let course_id = args.course_id.unwrap_or_else(Uuid::new_v4);

    let engine = build_engine(&config, ToolRegistry::new())?;
    let generator = Arc::new(SectionContentScript::new(&engine));

    let queue = Arc::new(MemoryQueue::with_max_attempts(config.worker.topic.clone(), 3));
    let repository = Arc::new(MemoryCourseRepository::new());
    repository.create_course(course_id);

    queue.enqueue(GenerationJob::new(course_id, outline)).await?;
    queue.close();

    let worker = GenerationWorker::new(queue.clone(), repository.clone(), generator)
        .with_options(config.worker.to_options());
    info!(
        topic = %config.worker.topic,
        group_id = %config.worker.group_id,
        %course_id,
        "starting generation worker"
    );

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let stats = worker.run(shutdown).await?;
    eprintln!(
        "progress: {:?} (completed {}, discarded {}, redelivered {})",
        repository.progress_history(course_id),
        stats.completed,
        stats.discarded,
        stats.redelivered
    );

    match repository.content(course_id) {
        Some(content) => {
            println!("{}", serde_json::to_string_pretty(&content)?);
            Ok(())
        }
        None => Err("no content was generated".into()),
    }
}
