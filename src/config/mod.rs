//! Configuration system (layered: env > TOML file > defaults).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::engine::EngineOptions;
use crate::error::SyllabusError;
use crate::worker::WorkerOptions;

const CONFIG_FILE_NAME: &str = "syllabus.toml";

/// Top-level application configuration.
///
/// Resolution order:
/// 1. Environment variables (`.env` is loaded first if present)
/// 2. TOML file (explicit path, else `syllabus.toml` in the platform config dir)
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelSettings,
    pub engine: EngineSettings,
    pub worker: WorkerSettings,
}

/// Which model to talk to and how.
#[derive(Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelSettings {
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Upper bound on one HTTP request, including the streamed body.
    pub request_timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            base_url: None,
            api_key: None,
            request_timeout_secs: 600,
        }
    }
}

impl fmt::Debug for ModelSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSettings")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| ".."))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl ModelSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Turn loop limits.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    pub max_turns: usize,
    pub call_timeout_secs: u64,
    pub stream_idle_timeout_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_turns: 16,
            call_timeout_secs: 300,
            stream_idle_timeout_secs: 120,
        }
    }
}

impl EngineSettings {
    pub fn to_options(&self) -> EngineOptions {
        EngineOptions::builder()
            .max_turns(self.max_turns)
            .call_timeout(Duration::from_secs(self.call_timeout_secs))
            .stream_idle_timeout(Duration::from_secs(self.stream_idle_timeout_secs))
            .build()
    }
}

/// Job queue and worker settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerSettings {
    pub topic: String,
    pub group_id: String,
    pub job_timeout_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            topic: "generate_new_course".to_string(),
            group_id: "course_generator".to_string(),
            job_timeout_secs: 3600,
        }
    }
}

impl WorkerSettings {
    pub fn to_options(&self) -> WorkerOptions {
        WorkerOptions {
            job_timeout: Duration::from_secs(self.job_timeout_secs),
        }
    }
}

impl AppConfig {
    /// Load `.env`, the TOML file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, SyllabusError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error

        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path().filter(|p| p.exists()),
        };
        let mut config = match file {
            Some(ref p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, SyllabusError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw).map_err(|e| match e {
            SyllabusError::Configuration(msg) => {
                SyllabusError::Configuration(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, SyllabusError> {
        toml::from_str(raw).map_err(|e| SyllabusError::Configuration(e.to_string()))
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SyllabusError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("SYLLABUS_MODEL") {
            self.model.model = model;
        }
        if let Some(url) = lookup("SYLLABUS_BASE_URL").or_else(|| lookup("OPENAI_BASE_URL")) {
            self.model.base_url = Some(url);
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Some(turns) = lookup("SYLLABUS_MAX_TURNS") {
            self.engine.max_turns = parse_env("SYLLABUS_MAX_TURNS", &turns)?;
        }
        if let Some(secs) = lookup("SYLLABUS_JOB_TIMEOUT_SECS") {
            self.worker.job_timeout_secs = parse_env("SYLLABUS_JOB_TIMEOUT_SECS", &secs)?;
        }
        if let Some(topic) = lookup("SYLLABUS_TOPIC") {
            self.worker.topic = topic;
        }
        if let Some(group) = lookup("SYLLABUS_GROUP_ID") {
            self.worker.group_id = group;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SyllabusError> {
    value
        .trim()
        .parse()
        .map_err(|_| SyllabusError::Configuration(format!("{key} has invalid value '{value}'")))
}

/// `syllabus.toml` in the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "syllabus")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}
