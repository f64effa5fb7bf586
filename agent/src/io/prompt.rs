//! Step prompt builder: the system prompt and the first user message.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::types::{CompletedStep, StepDescriptor, VariableSpec};

const STEP_SYSTEM_TEMPLATE: &str = include_str!("prompts/step_system.md");
const STEP_USER_TEMPLATE: &str = include_str!("prompts/step_user.md");

/// Completed step as shown under "Previous Steps Completed".
#[derive(Debug, Clone, Serialize)]
struct CompletedContext<'a> {
    description: &'a str,
    result: &'a str,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template("step_system", STEP_SYSTEM_TEMPLATE)
            .context("load step_system template")?;
        env.add_template("step_user", STEP_USER_TEMPLATE)
            .context("load step_user template")?;
        Ok(Self { env })
    }

    fn render_system(&self, date: &str, timeout_secs: u64) -> Result<String> {
        let template = self.env.get_template("step_system")?;
        let rendered = template.render(context! {
            date => date,
            timeout_secs => timeout_secs,
        })?;
        Ok(rendered)
    }

    fn render_user(
        &self,
        task: &str,
        step: &StepDescriptor,
        completed: &[CompletedStep],
    ) -> Result<String> {
        let completed: Vec<CompletedContext<'_>> = completed
            .iter()
            .map(|entry| CompletedContext {
                description: entry.step.description.trim(),
                result: entry.result.trim(),
            })
            .collect();
        let template = self.env.get_template("step_user")?;
        let rendered = template.render(context! {
            task => task.trim(),
            completed => completed,
            description => step.description.trim(),
            inputs => &step.input_variables,
            outputs => &step.output_variables,
        })?;
        Ok(rendered)
    }
}

/// Render the step system prompt for `date` (`YYYY-MM-DD`).
pub fn build_system_prompt(date: &str, timeout_secs: u64) -> Result<String> {
    let engine = PromptEngine::new()?;
    engine
        .render_system(date, timeout_secs)
        .context("render step system prompt")
}

/// Render the first user message of a step.
///
/// The global task is shown as context only; prior steps are numbered from 1
/// with their results; the current step's declared inputs and outputs are
/// listed as `- name (type): description` and omitted when empty.
pub fn build_user_prompt(
    task: &str,
    step: &StepDescriptor,
    completed: &[CompletedStep],
) -> Result<String> {
    let engine = PromptEngine::new()?;
    let rendered = engine
        .render_user(task, step, completed)
        .context("render step user prompt")?;
    debug!(chars = rendered.len(), "rendered step user prompt");
    Ok(rendered)
}

/// Render variables as indented `- name (type): description` lines,
/// or `None` when there are none.
pub fn format_step_variables(vars: &[VariableSpec]) -> String {
    if vars.is_empty() {
        return "None".to_string();
    }
    let lines: Vec<String> = vars
        .iter()
        .map(|var| format!("  - {} ({}): {}", var.name, var.data_type, var.description))
        .collect();
    format!("\n{}", lines.join("\n"))
}
