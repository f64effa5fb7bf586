//! Long-lived Python interpreter subprocess holding the persistent namespace.
//!
//! The host writes one JSON request per line (`exec`, `parse`, `reset`,
//! `snapshot`) and reads one JSON reply per line. Execution replies carry the
//! block's captured stdout and stderr plus a snapshot of the interpreter
//! globals. Replies are read on a dedicated thread so a hung interpreter can
//! be abandoned after a deadline.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::core::namespace::Namespace;
use crate::core::terminal_shape::{ParsedCode, Statement};

const REPL_RUNNER: &str = include_str!("repl_runner.py");

/// Extra time granted beyond the in-interpreter alarm before the host gives up.
const HARD_DEADLINE_GRACE: Duration = Duration::from_secs(5);

/// Alarm bounding the namespace snapshot after each request; `_SNAPSHOT_SECS` in the runner.
const SNAPSHOT_ALLOWANCE: Duration = Duration::from_secs(10);

/// Deadline for requests that run no user code.
const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);

/// Written by the runner to its stderr right before each reply.
const SYNC_MARKER: &[u8] = b"\x00repl-sync\x00";

/// How long to wait for the marker once the reply line has arrived.
const SYNC_WAIT: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ReplRequest<'a> {
    Exec { code: &'a str, timeout_secs: u64 },
    Parse { code: &'a str },
    Reset,
    Snapshot,
}

/// Reply to `exec`, `reset` and `snapshot`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplReply {
    pub stdout: String,
    pub stderr: String,
    /// The block raised (or timed out); warnings alone leave this false.
    #[serde(default)]
    pub raised: bool,
    pub namespace: Namespace,
}

#[derive(Debug, Deserialize)]
struct ParseReply {
    #[serde(default)]
    syntax_error: Option<String>,
    #[serde(default)]
    statements: Vec<Statement>,
}

impl From<ParseReply> for ParsedCode {
    fn from(reply: ParseReply) -> Self {
        match reply.syntax_error {
            Some(message) => ParsedCode::SyntaxError(message),
            None => ParsedCode::Statements(reply.statements),
        }
    }
}

/// Why a request produced no reply.
#[derive(Debug)]
pub enum ReplFailure {
    /// The interpreter blew through the hard deadline and was killed.
    HardTimeout,
    /// The interpreter died or broke the protocol; carries a description.
    Crashed(String),
}

/// Bytes written straight to the process descriptors by user code or its
/// subprocesses, filled by a drain thread.
#[derive(Default)]
struct StrayOutput {
    bytes: Mutex<Vec<u8>>,
    arrived: Condvar,
}

impl StrayOutput {
    fn append(&self, chunk: &[u8]) {
        if let Ok(mut buf) = self.bytes.lock() {
            buf.extend_from_slice(chunk);
            self.arrived.notify_all();
        }
    }

    /// Bytes up to the next sync marker; the marker is consumed. Output after
    /// it stays buffered for the following reply. Without a marker within
    /// `wait`, everything buffered so far is taken.
    fn take_through_marker(&self, wait: Duration) -> Vec<u8> {
        let Ok(buf) = self.bytes.lock() else {
            return Vec::new();
        };
        let Ok((mut buf, _)) = self
            .arrived
            .wait_timeout_while(buf, wait, |buf| find_marker(buf).is_none())
        else {
            return Vec::new();
        };
        match find_marker(&buf) {
            Some(at) => {
                let rest = buf.split_off(at + SYNC_MARKER.len());
                let mut before = std::mem::replace(&mut *buf, rest);
                before.truncate(at);
                before
            }
            None => std::mem::take(&mut *buf),
        }
    }

    /// Everything buffered, markers removed.
    fn take_all(&self) -> Vec<u8> {
        let Ok(mut buf) = self.bytes.lock() else {
            return Vec::new();
        };
        let mut taken = std::mem::take(&mut *buf);
        while let Some(at) = find_marker(&taken) {
            taken.drain(at..at + SYNC_MARKER.len());
        }
        taken
    }
}

fn find_marker(buf: &[u8]) -> Option<usize> {
    buf.windows(SYNC_MARKER.len()).position(|w| w == SYNC_MARKER)
}

pub struct PythonRepl {
    child: Child,
    stdin: ChildStdin,
    replies: Receiver<std::io::Result<String>>,
    stray: Arc<StrayOutput>,
    /// Stray output that arrived with replies to requests running no user code.
    pending: Vec<u8>,
}

impl PythonRepl {
    /// Start `command` (argv) running the REPL runner in `workdir`.
    #[instrument(skip_all, fields(program = command.first().map(String::as_str)))]
    pub fn spawn(command: &[String], workdir: &Path) -> Result<Self> {
        let Some((program, args)) = command.split_first() else {
            bail!("python command is empty");
        };
        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg("-u")
            .arg("-c")
            .arg(REPL_RUNNER)
            .current_dir(workdir)
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawn python interpreter `{program}`"))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("python stdin was not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("python stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("python stderr was not piped"))?;

        let (tx, replies) = mpsc::channel();
        thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(Ok(line)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });

        let stray = Arc::new(StrayOutput::default());
        let sink = Arc::clone(&stray);
        thread::spawn(move || drain_into(stderr, &sink));

        debug!(pid = child.id(), "python interpreter started");
        Ok(Self {
            child,
            stdin,
            replies,
            stray,
            pending: Vec::new(),
        })
    }

    /// Run `code` in the persistent globals.
    pub fn exec(&mut self, code: &str, timeout: Duration) -> Result<ReplReply, ReplFailure> {
        let request = ReplRequest::Exec {
            code,
            timeout_secs: timeout.as_secs().max(1),
        };
        let (mut reply, stray): (ReplReply, _) =
            self.round_trip(&request, timeout + SNAPSHOT_ALLOWANCE + HARD_DEADLINE_GRACE)?;
        let mut stray_bytes = std::mem::take(&mut self.pending);
        stray_bytes.extend_from_slice(&stray);
        if !stray_bytes.is_empty() {
            reply.stdout.push_str(&String::from_utf8_lossy(&stray_bytes));
        }
        Ok(reply)
    }

    /// Parse `code` without running it.
    pub fn parse(&mut self, code: &str) -> Result<ParsedCode, ReplFailure> {
        let reply: ParseReply = self.control(&ReplRequest::Parse { code })?;
        Ok(reply.into())
    }

    /// Replace the globals with a fresh namespace.
    pub fn reset(&mut self) -> Result<ReplReply, ReplFailure> {
        self.pending.clear();
        self.control(&ReplRequest::Reset)
    }

    pub fn snapshot(&mut self) -> Result<ReplReply, ReplFailure> {
        self.control(&ReplRequest::Snapshot)
    }

    fn control<T: DeserializeOwned>(&mut self, request: &ReplRequest<'_>) -> Result<T, ReplFailure> {
        let (reply, stray) = self.round_trip(request, CONTROL_TIMEOUT + SNAPSHOT_ALLOWANCE)?;
        self.pending.extend_from_slice(&stray);
        Ok(reply)
    }

    /// Send `request` and wait for its reply plus the stray output written
    /// before it.
    fn round_trip<T: DeserializeOwned>(
        &mut self,
        request: &ReplRequest<'_>,
        deadline: Duration,
    ) -> Result<(T, Vec<u8>), ReplFailure> {
        let mut line = serde_json::to_vec(request)
            .map_err(|e| ReplFailure::Crashed(format!("encode request: {e}")))?;
        line.push(b'\n');
        if let Err(e) = self.stdin.write_all(&line).and_then(|()| self.stdin.flush()) {
            return Err(self.crashed(&format!("write request: {e}")));
        }

        match self.replies.recv_timeout(deadline) {
            Ok(Ok(raw)) => {
                let reply = serde_json::from_str(raw.trim()).map_err(|e| {
                    ReplFailure::Crashed(format!("invalid reply from python interpreter: {e}"))
                })?;
                Ok((reply, self.stray.take_through_marker(SYNC_WAIT)))
            }
            Ok(Err(e)) => Err(self.crashed(&format!("read reply: {e}"))),
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    deadline_secs = deadline.as_secs(),
                    "python interpreter missed hard deadline, killing"
                );
                self.kill();
                Err(ReplFailure::HardTimeout)
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(self.crashed("python interpreter exited unexpectedly"))
            }
        }
    }

    fn crashed(&mut self, what: &str) -> ReplFailure {
        self.kill();
        // Give the stderr drain a moment to collect the dying words.
        thread::sleep(Duration::from_millis(50));
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(&self.stray.take_all());
        let stray = String::from_utf8_lossy(&bytes);
        if stray.trim().is_empty() {
            ReplFailure::Crashed(what.to_string())
        } else {
            ReplFailure::Crashed(format!("{what}\n{}", stray.trim_end()))
        }
    }

    fn kill(&mut self) {
        if let Err(e) = self.child.kill() {
            debug!(err = %e, "python interpreter already gone");
        }
        let _ = self.child.wait();
    }
}

impl Drop for PythonRepl {
    fn drop(&mut self) {
        self.kill();
    }
}

fn drain_into<R: Read>(mut reader: R, sink: &StrayOutput) {
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => sink.append(&chunk[..n]),
        }
    }
}
