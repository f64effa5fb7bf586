//! Step execution loop for a code-writing agent.
//!
//! A plan is a task split into steps with declared input and output
//! variables. Each step is a bounded conversation: the model answers with
//! `<python>`, `<bash>` or `<final_answer>` blocks, code runs against one
//! persistent namespace, and the step ends when a final answer passes the
//! terminal contract. The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (block parsing, turn
//!   classification, terminal shape, declared-type checks). No I/O.
//! - **[`io`]**: Side effects (config, prompts, plan files, model transport,
//!   interpreters, conversation logs), behind traits so tests can script them.
//!
//! Orchestration modules ([`step`], [`terminal`], [`task`]) drive core logic
//! through the I/O seams.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod step;
pub mod task;
pub mod terminal;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
