//! Agent configuration stored in `agent.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::step::MAX_ITERATIONS_PER_STEP;

/// Agent configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to the values the
/// step loop was tuned with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Model turns allowed per step before it is reported as exhausted.
    pub max_iterations_per_step: u32,

    /// Truncate execution feedback sent back to the model beyond this many characters.
    pub max_feedback_chars: usize,

    pub model: ModelConfig,

    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// OpenAI-compatible API root, without the `/chat/completions` suffix.
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the bearer key.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// `low`, `medium` or `high`; omitted from requests when unset.
    pub reasoning_effort: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "openai/gpt-oss-120b".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            temperature: 0.0,
            max_tokens: 10_000,
            reasoning_effort: Some("high".to_string()),
            request_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Interpreter argv used to start the persistent Python REPL (e.g. `["python3"]`).
    pub python_command: Vec<String>,

    /// Shell used for `<bash>` blocks.
    pub bash_command: String,

    /// Wall-clock limit for a single code block.
    pub timeout_secs: u64,

    /// Truncate bash stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            python_command: vec!["python3".to_string()],
            bash_command: "bash".to_string(),
            timeout_secs: 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations_per_step: MAX_ITERATIONS_PER_STEP,
            max_feedback_chars: 20_000,
            model: ModelConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations_per_step == 0 {
            return Err(anyhow!("max_iterations_per_step must be > 0"));
        }
        if self.max_feedback_chars == 0 {
            return Err(anyhow!("max_feedback_chars must be > 0"));
        }
        if self.model.base_url.trim().is_empty() {
            return Err(anyhow!("model.base_url must be non-empty"));
        }
        if self.model.model.trim().is_empty() {
            return Err(anyhow!("model.model must be non-empty"));
        }
        if self.model.max_tokens == 0 {
            return Err(anyhow!("model.max_tokens must be > 0"));
        }
        if self.model.request_timeout_secs == 0 {
            return Err(anyhow!("model.request_timeout_secs must be > 0"));
        }
        if self.execution.python_command.is_empty()
            || self.execution.python_command[0].trim().is_empty()
        {
            return Err(anyhow!("execution.python_command must be a non-empty array"));
        }
        if self.execution.bash_command.trim().is_empty() {
            return Err(anyhow!("execution.bash_command must be non-empty"));
        }
        if self.execution.timeout_secs == 0 {
            return Err(anyhow!("execution.timeout_secs must be > 0"));
        }
        if self.execution.output_limit_bytes == 0 {
            return Err(anyhow!("execution.output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, AgentConfig::default());
        assert_eq!(cfg.max_iterations_per_step, 30);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agent.toml");
        let cfg = AgentConfig::default();
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    /// Partial files fill the rest from defaults.
    #[test]
    fn partial_file_uses_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agent.toml");
        fs::write(&path, "[execution]\ntimeout_secs = 5\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.execution.timeout_secs, 5);
        assert_eq!(cfg.execution.python_command, vec!["python3".to_string()]);
        assert_eq!(cfg.model, ModelConfig::default());
    }

    #[test]
    fn zero_limits_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agent.toml");
        fs::write(&path, "max_iterations_per_step = 0\n").expect("write");
        let err = load_config(&path).expect_err("zero iterations");
        assert!(err.to_string().contains("max_iterations_per_step"));
    }
}
