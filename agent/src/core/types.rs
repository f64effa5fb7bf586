//! Shared deterministic types for the step loop.
//!
//! These types define stable contracts between the planner input, the
//! controller, and the prompt builder. They carry no I/O and compare by value.

use serde::{Deserialize, Serialize};

/// Returned as the step answer when the iteration budget runs out.
pub const EXHAUSTED_MESSAGE: &str = "Max iterations reached without a final answer.";

/// A named variable a step consumes or must produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    /// Python type expression text, e.g. `list[dict[str, int]]` or `pd.DataFrame`.
    pub data_type: String,
    #[serde(default)]
    pub description: String,
}

impl VariableSpec {
    pub fn new(name: &str, data_type: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            description: description.to_string(),
        }
    }
}

/// One planned unit of work with its declared inputs and outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDescriptor {
    pub description: String,
    #[serde(default)]
    pub input_variables: Vec<VariableSpec>,
    #[serde(default)]
    pub output_variables: Vec<VariableSpec>,
}

/// A task together with its ordered steps, as produced by an external planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub task: String,
    pub steps: Vec<StepDescriptor>,
}

/// A finished step and the answer text it returned. Append-only history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedStep {
    pub step: StepDescriptor,
    pub result: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single role-tagged conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// How a step ended.
///
/// `Completed` and `Failed` come from an accepted terminal block; `Exhausted`
/// means the iteration budget ran out before any terminal block was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
    Exhausted,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Exhausted => "exhausted",
        }
    }
}

/// Result of running one step through the loop controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub status: StepStatus,
    /// Final answer, failure text, or [`EXHAUSTED_MESSAGE`].
    pub answer: String,
    /// Model turns consumed, including empty ones.
    pub iterations: u32,
}

impl StepOutcome {
    pub fn exhausted(iterations: u32) -> Self {
        Self {
            status: StepStatus::Exhausted,
            answer: EXHAUSTED_MESSAGE.to_string(),
            iterations,
        }
    }
}
