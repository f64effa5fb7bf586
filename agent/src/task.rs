//! Multi-step driver: runs a plan's steps in order against one namespace.

use anyhow::Result;
use tracing::{info, instrument};

use crate::core::namespace::Value;
use crate::core::types::{CompletedStep, Plan, StepOutcome, StepStatus};
use crate::io::backend::ExecutionBackend;
use crate::io::conversation_log::{FileConversationLog, RunLogDir};
use crate::io::model::ModelClient;
use crate::step::{StepConfig, StepContext, run_step};

/// Reason why `run_task` stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStop {
    /// Every step completed.
    Complete,
    /// The step at `index` declared failure.
    Failed { index: usize },
    /// The step at `index` ran out of iterations.
    Exhausted { index: usize },
}

/// One finished step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub index: usize,
    pub description: String,
    pub outcome: StepOutcome,
    /// Declared outputs as found in the namespace when the step ended.
    pub outputs: Vec<(String, Option<Value>)>,
}

/// Summary of a task run.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub reports: Vec<StepReport>,
    pub stop: TaskStop,
}

/// Run the steps of `plan` in order.
///
/// Each step sees the results of all earlier steps. The run stops after the
/// first step that fails or exhausts its budget. When `logs` is given, step
/// `i` logs to `<run>/step_<i>/`.
#[instrument(skip_all, fields(task = %plan.task, steps = plan.steps.len()))]
pub fn run_task<M, B, F>(
    plan: &Plan,
    model: &M,
    backend: &mut B,
    config: &StepConfig,
    logs: Option<&RunLogDir>,
    mut on_step: F,
) -> Result<TaskOutcome>
where
    M: ModelClient + ?Sized,
    B: ExecutionBackend + ?Sized,
    F: FnMut(&StepReport),
{
    let mut completed: Vec<CompletedStep> = Vec::with_capacity(plan.steps.len());
    let mut reports = Vec::with_capacity(plan.steps.len());

    for (index, step) in plan.steps.iter().enumerate() {
        info!(index, description = %step.description, "starting step");
        let mut log = match logs {
            Some(run) => run.step_log(index),
            None => FileConversationLog::disabled(),
        };
        let ctx = StepContext {
            task: &plan.task,
            step,
            completed: &completed,
        };
        let outcome = run_step(&ctx, model, backend, &mut log, config)?;

        let outputs = step
            .output_variables
            .iter()
            .map(|var| (var.name.clone(), backend.namespace().get(&var.name).cloned()))
            .collect();
        let report = StepReport {
            index,
            description: step.description.clone(),
            outcome,
            outputs,
        };
        on_step(&report);

        let stop = match report.outcome.status {
            StepStatus::Completed => None,
            StepStatus::Failed => Some(TaskStop::Failed { index }),
            StepStatus::Exhausted => Some(TaskStop::Exhausted { index }),
        };
        completed.push(CompletedStep {
            step: step.clone(),
            result: report.outcome.answer.clone(),
        });
        reports.push(report);
        if let Some(stop) = stop {
            return Ok(TaskOutcome { reports, stop });
        }
    }

    Ok(TaskOutcome {
        reports,
        stop: TaskStop::Complete,
    })
}
