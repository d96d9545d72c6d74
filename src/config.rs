// src/config.rs
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::errors::{EvalError, Result};
use crate::inputs::{FileBlob, InputCollector, SlotKind};

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000";
pub const DEFAULT_ENDPOINT: &str = "/api/evaluate";

/// Where and how to reach the evaluation service.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_base: String,
    pub endpoint: String,
    /// Request timeout; `None` leaves it to the HTTP client.
    pub timeout_secs: Option<u64>,
}

/// Optional on-disk overrides. Every key may be omitted.
#[derive(Deserialize, Debug, Default)]
struct ConfigFile {
    api_base: Option<String>,
    endpoint: Option<String>,
    timeout_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: None,
        }
    }
}

impl ClientConfig {
    /// Defaults, then the config file (explicit path or the user config dir), then env vars.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        let file_path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path().filter(|p| p.exists()),
        };
        if let Some(file_path) = file_path {
            log::debug!("Loading client config from {}", file_path.display());
            config.apply_file(&std::fs::read_to_string(&file_path)?)?;
        }

        config.apply_env()?;
        Ok(config)
    }

    /// Defaults overlaid by environment variables only.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    fn apply_file(&mut self, contents: &str) -> Result<()> {
        let file: ConfigFile = toml::from_str(contents)?;
        if let Some(api_base) = file.api_base {
            self.api_base = api_base;
        }
        if let Some(endpoint) = file.endpoint {
            self.endpoint = endpoint;
        }
        if file.timeout_secs.is_some() {
            self.timeout_secs = file.timeout_secs;
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(api_base) = std::env::var("EVALUATOR_API_BASE") {
            self.api_base = api_base;
        }
        if let Ok(endpoint) = std::env::var("EVALUATOR_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Ok(timeout) = std::env::var("EVALUATOR_TIMEOUT_SECS") {
            self.timeout_secs = Some(parse_timeout(&timeout)?);
        }
        Ok(())
    }

    pub fn evaluate_url(&self) -> String {
        join_url(&self.api_base, &self.endpoint)
    }

    pub fn health_url(&self) -> String {
        join_url(&self.api_base, "/health")
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn parse_timeout(value: &str) -> Result<u64> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(EvalError::Config(format!(
            "EVALUATOR_TIMEOUT_SECS must be a positive integer, got '{}'",
            value
        ))),
    }
}

/// `<config dir>/exam-evaluator/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("exam-evaluator").join("config.toml"))
}

/// One material in a job file: a path, pasted text, or both.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MaterialSpec {
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub text: Option<String>,
}

/// A submission described on disk, e.g.
///
/// ```toml
/// answer_sheet = "scans/sheet.pdf"
///
/// [question_paper]
/// text = "Q1. Calculate the velocity of a car traveling 100m in 5s."
///
/// [solution_key]
/// file = "key.pdf"
/// ```
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SubmissionJob {
    #[serde(default)]
    pub answer_sheet: Option<PathBuf>,
    #[serde(default)]
    pub question_paper: MaterialSpec,
    #[serde(default)]
    pub solution_key: MaterialSpec,
}

impl SubmissionJob {
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Reads a job file; relative paths inside it resolve against its directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let job = Self::from_toml(&std::fs::read_to_string(path)?)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(job.resolve_paths(base))
    }

    pub fn resolve_paths(mut self, base: &Path) -> Self {
        let resolve = |p: PathBuf| if p.is_relative() { base.join(p) } else { p };
        self.answer_sheet = self.answer_sheet.map(resolve);
        self.question_paper.file = self.question_paper.file.map(resolve);
        self.solution_key.file = self.solution_key.file.map(resolve);
        self
    }

    /// Reads the referenced files into a fresh collector. Missing entries
    /// simply leave their slot empty.
    pub async fn load_inputs(&self) -> Result<InputCollector> {
        let mut inputs = InputCollector::new();

        if let Some(path) = &self.answer_sheet {
            inputs.set_file(SlotKind::AnswerSheet, Some(FileBlob::from_path(path).await?));
        }
        for (kind, spec) in [
            (SlotKind::QuestionPaper, &self.question_paper),
            (SlotKind::SolutionKey, &self.solution_key),
        ] {
            if let Some(path) = &spec.file {
                inputs.set_file(kind, Some(FileBlob::from_path(path).await?));
            }
            if let Some(text) = &spec.text {
                inputs.set_text(kind, text.clone());
            }
        }

        Ok(inputs)
    }
}
