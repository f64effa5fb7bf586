//! Append-only conversation log under `<log_dir>/<run>/step_<i>/`.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

use crate::core::types::Plan;

/// Sink for every message appended to a step's conversation.
///
/// Appends are synchronous: an entry is durable before the caller issues the
/// next model request.
pub trait ConversationLog {
    /// Append a labelled message (`system`, `user`, `assistant 2`, ...).
    fn append(&mut self, label: &str, content: &str) -> Result<()>;

    /// Append one turn's reasoning trace.
    fn append_reasoning(&mut self, text: &str) -> Result<()>;
}

/// File-backed log: `messages.txt` and `reasoning.txt` in a step directory.
#[derive(Debug, Clone)]
pub struct FileConversationLog {
    dir: Option<PathBuf>,
}

impl FileConversationLog {
    pub fn new(step_dir: PathBuf) -> Self {
        Self { dir: Some(step_dir) }
    }

    /// Log that writes nothing.
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    fn append_to(&self, file_name: &str, entry: &str) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        fs::create_dir_all(dir).with_context(|| format!("create log dir {}", dir.display()))?;
        let path = dir.join(file_name);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open log {}", path.display()))?;
        file.write_all(entry.as_bytes())
            .with_context(|| format!("append log {}", path.display()))?;
        Ok(())
    }
}

impl ConversationLog for FileConversationLog {
    fn append(&mut self, label: &str, content: &str) -> Result<()> {
        self.append_to("messages.txt", &format_entry(label, content))
    }

    fn append_reasoning(&mut self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        self.append_to("reasoning.txt", &format!("{text}\n\n{}\n\n", "-".repeat(40)))
    }
}

fn format_entry(label: &str, content: &str) -> String {
    format!("===== {label} =====\n{content}\n\n")
}

/// In-memory log for tests and embedding callers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryLog {
    pub entries: Vec<(String, String)>,
    pub reasoning: Vec<String>,
}

impl InMemoryLog {
    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|(label, _)| label.as_str()).collect()
    }
}

impl ConversationLog for InMemoryLog {
    fn append(&mut self, label: &str, content: &str) -> Result<()> {
        self.entries.push((label.to_string(), content.to_string()));
        Ok(())
    }

    fn append_reasoning(&mut self, text: &str) -> Result<()> {
        if !text.trim().is_empty() {
            self.reasoning.push(text.to_string());
        }
        Ok(())
    }
}

/// One run's log directory, `<base>/<YYYYMMDD_HHMMSS>/`.
#[derive(Debug, Clone)]
pub struct RunLogDir {
    pub dir: PathBuf,
}

impl RunLogDir {
    /// Create a fresh timestamped directory under `base` and record the plan in it.
    pub fn create(base: &Path, plan: &Plan) -> Result<Self> {
        fs::create_dir_all(base).with_context(|| format!("create log base {}", base.display()))?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();

        let mut suffix = 0u32;
        let dir = loop {
            let name = if suffix == 0 {
                stamp.clone()
            } else {
                format!("{stamp}_{suffix}")
            };
            let candidate = base.join(name);
            match fs::create_dir(&candidate) {
                Ok(()) => break candidate,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("create run log dir {}", candidate.display()));
                }
            }
        };

        let plan_path = dir.join("plan.json");
        let mut buf = serde_json::to_string_pretty(plan).context("serialize plan")?;
        buf.push('\n');
        fs::write(&plan_path, buf).with_context(|| format!("write {}", plan_path.display()))?;
        Ok(Self { dir })
    }

    /// Log for the step at `index` (0-based).
    pub fn step_log(&self, index: usize) -> FileConversationLog {
        FileConversationLog::new(self.dir.join(format!("step_{index}")))
    }
}
