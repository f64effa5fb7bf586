//! Execution backends for python and bash blocks.
//!
//! The [`ExecutionBackend`] trait decouples the step loop from the actual
//! interpreter. Tests use scripted backends that apply literal assignments
//! without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{debug, info, instrument, warn};

use crate::core::blocks::BlockKind;
use crate::core::namespace::Namespace;
use crate::core::terminal_shape::ParsedCode;
use crate::io::config::ExecutionConfig;
use crate::io::process::run_command_with_timeout;
use crate::io::python::{PythonRepl, ReplFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    /// Runs in the persistent namespace.
    Python,
    /// Runs in a fresh shell; no state carries over.
    Bash,
}

impl Language {
    /// Language a code block executes in. Text and terminal blocks are not
    /// code and yield `None`.
    pub fn for_block(kind: BlockKind) -> Option<Self> {
        match kind {
            BlockKind::Python => Some(Language::Python),
            BlockKind::Bash => Some(Language::Bash),
            BlockKind::Terminal | BlockKind::Text => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Bash => "bash",
        }
    }
}

/// Outcome of one block. Every failure is text in `stderr`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// The block failed: an exception, a non-zero exit, a timeout or a lost
    /// interpreter. Warnings on `stderr` alone leave this false.
    pub raised: bool,
    /// Persistent namespace after the block ran.
    pub namespace: Namespace,
}

/// Abstraction over code execution.
pub trait ExecutionBackend {
    /// Execute `code`. Never fails: syntax, runtime, timeout and
    /// infrastructure errors are all reported through `stderr`.
    fn execute(&mut self, code: &str, language: Language) -> ExecutionResult;

    /// Parse python `code` without running it. `Err` means the parser itself
    /// was unavailable, not that the code is invalid.
    fn parse_python(&mut self, code: &str) -> Result<ParsedCode>;

    /// Current persistent namespace.
    fn namespace(&self) -> &Namespace;

    /// Wipe the persistent namespace. Only called between whole tasks.
    fn reset(&mut self) -> Result<()>;
}

/// Backend running a local Python interpreter subprocess and `bash -c`.
pub struct LocalBackend {
    config: ExecutionConfig,
    workdir: PathBuf,
    /// Spawned lazily and respawned after a crash or hard timeout.
    repl: Option<PythonRepl>,
    namespace: Namespace,
}

impl LocalBackend {
    pub fn new(config: ExecutionConfig, workdir: PathBuf) -> Self {
        Self {
            config,
            workdir,
            repl: None,
            namespace: Namespace::new(),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    fn repl(&mut self) -> Result<&mut PythonRepl> {
        if self.repl.is_none() {
            info!(workdir = %self.workdir.display(), "starting python interpreter");
            self.repl = Some(PythonRepl::spawn(
                &self.config.python_command,
                &self.workdir,
            )?);
        }
        match self.repl.as_mut() {
            Some(repl) => Ok(repl),
            None => anyhow::bail!("python interpreter unavailable"),
        }
    }

    #[instrument(skip_all, fields(code_len = code.len()))]
    fn execute_python(&mut self, code: &str) -> ExecutionResult {
        let timeout = self.timeout();
        let started = self.repl().map(|repl| repl.exec(code, timeout));
        let outcome = match started {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(err = %err, "python interpreter could not be started");
                return ExecutionResult {
                    stdout: String::new(),
                    stderr: format!("Python execution error: {err:#}"),
                    raised: true,
                    namespace: self.namespace.clone(),
                };
            }
        };

        match outcome {
            Ok(reply) => {
                self.namespace = reply.namespace.clone();
                ExecutionResult {
                    stdout: reply.stdout,
                    stderr: reply.stderr,
                    raised: reply.raised,
                    namespace: reply.namespace,
                }
            }
            Err(failure) => ExecutionResult {
                stdout: String::new(),
                stderr: self.lose_interpreter(failure),
                raised: true,
                namespace: Namespace::new(),
            },
        }
    }

    /// Drop a failed interpreter along with the namespace it held and
    /// describe the loss.
    fn lose_interpreter(&mut self, failure: ReplFailure) -> String {
        self.repl = None;
        self.namespace.clear();
        let message = match failure {
            ReplFailure::HardTimeout => format!(
                "Execution timed out after {} seconds; the interpreter was restarted and all variables were lost",
                self.config.timeout_secs
            ),
            ReplFailure::Crashed(detail) => format!(
                "Python execution error: {detail}\nThe interpreter was restarted and all variables were lost"
            ),
        };
        warn!(%message, "python interpreter lost");
        message
    }

    #[instrument(skip_all, fields(code_len = code.len()))]
    fn execute_bash(&mut self, code: &str) -> ExecutionResult {
        let mut cmd = Command::new(&self.config.bash_command);
        cmd.arg("-c").arg(code).current_dir(&self.workdir);

        let namespace = self.namespace.clone();
        let output = match run_command_with_timeout(
            cmd,
            None,
            self.timeout(),
            self.config.output_limit_bytes,
        ) {
            Ok(output) => output,
            Err(err) => {
                return ExecutionResult {
                    stdout: String::new(),
                    stderr: format!("Bash execution error: {err:#}"),
                    raised: true,
                    namespace,
                };
            }
        };

        if output.timed_out {
            return ExecutionResult {
                stdout: String::new(),
                stderr: format!("Command timed out after {} seconds", self.config.timeout_secs),
                raised: true,
                namespace,
            };
        }

        let stderr = if output.status.success() {
            String::new()
        } else {
            let text = output.stderr_text();
            if text.trim().is_empty() {
                match output.status.code() {
                    Some(code) => format!("Command exited with status {code}"),
                    None => "Command terminated by signal".to_string(),
                }
            } else {
                text
            }
        };
        debug!(exit_code = ?output.status.code(), "bash block finished");
        ExecutionResult {
            stdout: output.stdout_text(),
            stderr,
            raised: !output.status.success(),
            namespace,
        }
    }
}

impl ExecutionBackend for LocalBackend {
    fn execute(&mut self, code: &str, language: Language) -> ExecutionResult {
        match language {
            Language::Python => self.execute_python(code),
            Language::Bash => self.execute_bash(code),
        }
    }

    fn parse_python(&mut self, code: &str) -> Result<ParsedCode> {
        let parsed = self.repl()?.parse(code);
        match parsed {
            Ok(parsed) => Ok(parsed),
            Err(failure) => bail!(self.lose_interpreter(failure)),
        }
    }

    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn reset(&mut self) -> Result<()> {
        self.namespace.clear();
        let Some(repl) = self.repl.as_mut() else {
            return Ok(());
        };
        match repl.reset() {
            Ok(reply) => {
                self.namespace = reply.namespace;
                Ok(())
            }
            Err(failure) => {
                warn!(?failure, "python reset failed, dropping interpreter");
                self.repl = None;
                Ok(())
            }
        }
    }
}
