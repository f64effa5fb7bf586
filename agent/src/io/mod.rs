//! I/O helpers for the step loop: config, prompts, plans, model transport,
//! execution backends and logs.

pub mod backend;
pub mod config;
pub mod conversation_log;
pub mod model;
pub mod plan_store;
pub mod process;
pub mod prompt;
pub mod python;
