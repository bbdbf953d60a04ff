//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// Syllabus CLI
#[derive(Parser, Debug)]
#[command(name = "syllabus", version, about = "Course generation engine CLI")]
pub struct Cli {
    /// Config file (defaults to syllabus.toml in the platform config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chat with the configured model, streaming the answer
    Chat(ChatArgs),
    /// Generate course content for an outline file
    Generate(GenerateArgs),
}

/// Arguments for the `chat` subcommand.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Model ID, overriding the configured one
    #[arg(short, long)]
    pub model: Option<String>,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// User prompt
    pub prompt: String,
}

/// Arguments for the `generate` subcommand.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// JSON file holding a course outline
    #[arg(short, long)]
    pub outline: PathBuf,

    /// Course ID to write content under (random if omitted)
    #[arg(long)]
    pub course_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_chat_with_system() {
        let cli = Cli::try_parse_from(["syllabus", "chat", "-s", "be brief", "hello"]).unwrap();
        match cli.command {
            Commands::Chat(args) => {
                assert_eq!(args.prompt, "hello");
                assert_eq!(args.system.as_deref(), Some("be brief"));
                assert!(args.model.is_none());
            }
            other => panic!("expected Chat, got {other:?}"),
        }
    }

    #[test]
    fn parse_generate_with_global_config() {
        let cli = Cli::try_parse_from([
            "syllabus",
            "generate",
            "--outline",
            "rust.json",
            "--config",
            "local.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("local.toml")));
        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.outline, PathBuf::from("rust.json"));
                assert!(args.course_id.is_none());
            }
            other => panic!("expected Generate, got {other:?}"),
        }
    }

    #[test]
    fn chat_requires_prompt() {
        assert!(Cli::try_parse_from(["syllabus", "chat"]).is_err());
    }
}
