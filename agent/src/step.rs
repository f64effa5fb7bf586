//! Orchestration for a single step: the bounded model/execute/validate loop.

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{debug, info, instrument, warn};

use crate::core::blocks::{BlockKind, ResponseBlock, parse_blocks};
use crate::core::classifier::{TurnKind, classify_turn};
use crate::core::types::{CompletedStep, Message, StepDescriptor, StepOutcome};
use crate::io::backend::{ExecutionBackend, ExecutionResult, Language};
use crate::io::config::AgentConfig;
use crate::io::conversation_log::ConversationLog;
use crate::io::model::ModelClient;
use crate::io::prompt::{build_system_prompt, build_user_prompt};
use crate::terminal::{TerminalVerdict, evaluate_terminal};

/// Hard cap on model turns per step.
pub const MAX_ITERATIONS_PER_STEP: u32 = 30;

/// Sent after a turn that contains neither code nor a terminal block.
pub const NO_CODE_MESSAGE: &str = "No valid code to execute. Respond with <python>...</python> or <bash>...</bash> blocks to run code.\nWhen the step is finished, you must return a <final_answer>...</final_answer> block that sets exactly two variables:\nstep_status = 'completed' or 'failed'\nfinal_answer = 'short description of the result'";

/// Limits for a single step.
#[derive(Debug, Clone)]
pub struct StepConfig {
    pub max_iterations: u32,
    /// Execution feedback longer than this (in chars) is truncated.
    pub max_feedback_chars: usize,
    /// Per-block timeout, quoted in the system prompt.
    pub timeout_secs: u64,
    /// Current date (`YYYY-MM-DD`) for the system prompt.
    pub date: String,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self::from_agent_config(&AgentConfig::default())
    }
}

impl StepConfig {
    pub fn from_agent_config(cfg: &AgentConfig) -> Self {
        Self {
            max_iterations: cfg.max_iterations_per_step,
            max_feedback_chars: cfg.max_feedback_chars,
            timeout_secs: cfg.execution.timeout_secs,
            date: Local::now().format("%Y-%m-%d").to_string(),
        }
    }
}

/// What the step works on: the global task, the step itself and prior results.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub task: &'a str,
    pub step: &'a StepDescriptor,
    pub completed: &'a [CompletedStep],
}

/// Controller states. `Terminated` and `Exhausted` end the loop.
#[derive(Debug)]
enum LoopState {
    AwaitingResponse,
    ProcessingBlocks {
        content: String,
        blocks: Vec<ResponseBlock>,
    },
    AwaitingFix(String),
    Terminated(StepOutcome),
    Exhausted,
}

/// The step conversation, mirrored into the log as it grows.
struct Conversation<'l, L: ConversationLog + ?Sized> {
    messages: Vec<Message>,
    log: &'l mut L,
}

impl<L: ConversationLog + ?Sized> Conversation<'_, L> {
    fn push(&mut self, label: &str, message: Message) -> Result<()> {
        self.log
            .append(label, &message.content)
            .with_context(|| format!("append '{label}' to conversation log"))?;
        self.messages.push(message);
        Ok(())
    }
}

/// Run one step until a terminal block is accepted or the budget runs out.
///
/// Protocol problems and execution errors become feedback for the model; only
/// model transport and conversation log failures return `Err`.
#[instrument(skip_all, fields(step = %ctx.step.description, max_iterations = config.max_iterations))]
pub fn run_step<M, B, L>(
    ctx: &StepContext<'_>,
    model: &M,
    backend: &mut B,
    log: &mut L,
    config: &StepConfig,
) -> Result<StepOutcome>
where
    M: ModelClient + ?Sized,
    B: ExecutionBackend + ?Sized,
    L: ConversationLog + ?Sized,
{
    let system = build_system_prompt(&config.date, config.timeout_secs)?;
    let user = build_user_prompt(ctx.task, ctx.step, ctx.completed)?;
    let mut conversation = Conversation {
        messages: Vec::with_capacity(2),
        log,
    };
    conversation.push("system", Message::system(system))?;
    conversation.push("user", Message::user(user))?;

    let mut iterations = 0u32;
    let mut state = LoopState::AwaitingResponse;
    loop {
        state = match state {
            LoopState::AwaitingResponse => {
                if iterations >= config.max_iterations {
                    LoopState::Exhausted
                } else {
                    iterations += 1;
                    let reply = model
                        .complete(&conversation.messages)
                        .with_context(|| format!("model request (iteration {iterations})"))?;
                    let blocks = parse_blocks(&reply.content);
                    if blocks.is_empty() {
                        debug!(iteration = iterations, "empty model turn discarded");
                        LoopState::AwaitingResponse
                    } else {
                        conversation
                            .log
                            .append_reasoning(&reply.reasoning)
                            .context("append reasoning to conversation log")?;
                        LoopState::ProcessingBlocks {
                            content: reply.content,
                            blocks,
                        }
                    }
                }
            }
            LoopState::ProcessingBlocks { content, blocks } => {
                let kind = classify_turn(&blocks);
                debug!(iteration = iterations, ?kind, blocks = blocks.len(), "processing turn");
                match kind {
                    TurnKind::Empty => LoopState::AwaitingResponse,
                    TurnKind::TextOnly => {
                        push_raw_assistant(&mut conversation, &content)?;
                        LoopState::AwaitingFix(NO_CODE_MESSAGE.to_string())
                    }
                    TurnKind::Code => {
                        run_code_blocks(&blocks, backend, &mut conversation, config)?;
                        LoopState::AwaitingResponse
                    }
                    TurnKind::TerminalOnly => {
                        push_raw_assistant(&mut conversation, &content)?;
                        match evaluate_terminal(&blocks, ctx.step, backend) {
                            TerminalVerdict::Accepted { status, answer } => {
                                LoopState::Terminated(StepOutcome {
                                    status,
                                    answer,
                                    iterations,
                                })
                            }
                            TerminalVerdict::Rejected(fix) => LoopState::AwaitingFix(fix),
                        }
                    }
                }
            }
            LoopState::AwaitingFix(fix) => {
                conversation.push("user", Message::user(fix))?;
                LoopState::AwaitingResponse
            }
            LoopState::Terminated(outcome) => {
                info!(status = outcome.status.as_str(), iterations, "step finished");
                return Ok(outcome);
            }
            LoopState::Exhausted => {
                warn!(iterations, "iteration budget exhausted");
                return Ok(StepOutcome::exhausted(iterations));
            }
        };
    }
}

fn push_raw_assistant<L: ConversationLog + ?Sized>(
    conversation: &mut Conversation<'_, L>,
    content: &str,
) -> Result<()> {
    if content.trim().is_empty() {
        return Ok(());
    }
    conversation.push("assistant", Message::assistant(content))
}

/// Execute every code block of a turn in order.
///
/// Text before a code block is merged into that block's assistant message;
/// each result follows as its own user message. Terminal blocks are skipped.
fn run_code_blocks<B, L>(
    blocks: &[ResponseBlock],
    backend: &mut B,
    conversation: &mut Conversation<'_, L>,
    config: &StepConfig,
) -> Result<()>
where
    B: ExecutionBackend + ?Sized,
    L: ConversationLog + ?Sized,
{
    let mut pending_text = String::new();
    let mut pair = 0usize;
    for block in blocks {
        if block.kind == BlockKind::Text {
            if !block.text.trim().is_empty() {
                pending_text.push_str(&block.text);
            }
            continue;
        }
        let Some(language) = Language::for_block(block.kind) else {
            continue;
        };

        let assistant = format!("{}{}", std::mem::take(&mut pending_text), block.to_message());
        conversation.push(&format!("assistant {pair}"), Message::assistant(assistant))?;

        let result = backend.execute(&block.text, language);
        debug!(
            pair,
            language = language.as_str(),
            stdout = result.stdout.len(),
            stderr = result.stderr.len(),
            "block executed"
        );
        let feedback = truncate_feedback(format_feedback(&result), config.max_feedback_chars);
        conversation.push(&format!("user {pair}"), Message::user(feedback))?;
        pair += 1;
    }

    if !pending_text.trim().is_empty() {
        conversation.push("assistant", Message::assistant(pending_text))?;
    }
    Ok(())
}

/// Render one block's result as model feedback.
pub fn format_feedback(result: &ExecutionResult) -> String {
    let mut parts = Vec::new();
    if !result.stdout.is_empty() {
        parts.push(format!("\n**STDOUT:**\n{}", result.stdout));
    }
    if !result.stderr.is_empty() {
        parts.push(format!("**STDERR:**\n{}", result.stderr));
    }
    if parts.is_empty() {
        return "Code execution result: (no output)".to_string();
    }
    format!("Code execution result:\n{}", parts.join("\n\n"))
}

/// Keep the first `limit` chars of `text`, noting how many were dropped.
pub fn truncate_feedback(text: String, limit: usize) -> String {
    let total = text.chars().count();
    if total <= limit {
        return text;
    }
    let mut kept: String = text.chars().take(limit).collect();
    kept.push_str(&format!(
        "\n... [output truncated: {} more characters]",
        total - limit
    ));
    kept
}
