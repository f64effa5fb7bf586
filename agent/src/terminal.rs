//! Terminal contract validation.
//!
//! Checks a terminal-only turn in order, stopping at the first failure:
//! exactly one terminal block, valid code, the two-assignment shape, an
//! execution that raises nothing, valid `step_status` / `final_answer` values
//! and, for completed steps, every declared output. Rejections are corrective
//! text for the model.

use tracing::{debug, info, instrument, warn};

use crate::core::blocks::{BlockKind, ResponseBlock};
use crate::core::namespace::{FINAL_ANSWER, Namespace, STEP_STATUS};
use crate::core::outputs::check_declared_outputs;
use crate::core::terminal_shape::{ParsedCode, check_terminal_shape};
use crate::core::types::{StepDescriptor, StepStatus};
use crate::io::backend::{ExecutionBackend, Language};

pub const EXACTLY_ONE_TERMINAL: &str = "Provide exactly one <final_answer> block that contains python assigning `step_status` ('completed' or 'failed') and `final_answer` (description).";

pub const INVALID_TERMINAL_CODE: &str = "The <final_answer> block must be valid python that sets `step_status` ('completed' or 'failed') and `final_answer` (description). Please resend a <final_answer> block with exactly those assignments.";

pub const TERMINAL_SHAPE: &str = "The <final_answer> block must contain exactly two assignment statements: one to `step_status` and one to `final_answer`, and nothing else.";

pub const TERMINAL_VALUES: &str = "Ensure <final_answer> sets both variables exactly:\nstep_status = 'completed' or 'failed'\nfinal_answer = 'description of the result'";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalVerdict {
    /// The step ends with `status` (`Completed` or `Failed`) and `answer`.
    Accepted { status: StepStatus, answer: String },
    /// Corrective message to send back to the model.
    Rejected(String),
}

/// Validate the terminal blocks of a turn that contains no code.
///
/// The terminal block is parsed first and executed at most once, only after
/// its statements passed the shape check. Namespace changes it makes are kept even when the
/// verdict is a rejection.
#[instrument(skip_all, fields(outputs = step.output_variables.len()))]
pub fn evaluate_terminal<B: ExecutionBackend + ?Sized>(
    blocks: &[ResponseBlock],
    step: &StepDescriptor,
    backend: &mut B,
) -> TerminalVerdict {
    let terminals: Vec<&ResponseBlock> = blocks
        .iter()
        .filter(|block| block.kind == BlockKind::Terminal)
        .collect();
    let [terminal] = terminals.as_slice() else {
        debug!(count = terminals.len(), "rejecting: not exactly one terminal block");
        return TerminalVerdict::Rejected(EXACTLY_ONE_TERMINAL.to_string());
    };

    let statements = match backend.parse_python(&terminal.text) {
        Ok(ParsedCode::Statements(statements)) => statements,
        Ok(ParsedCode::SyntaxError(detail)) => {
            debug!(%detail, "rejecting: terminal block is not valid code");
            return TerminalVerdict::Rejected(format!("{INVALID_TERMINAL_CODE}\n({detail})"));
        }
        Err(err) => {
            warn!(err = %err, "could not parse terminal block");
            return TerminalVerdict::Rejected(format!(
                "Checking the <final_answer> block failed:\n{err:#}\n{TERMINAL_VALUES}"
            ));
        }
    };
    if let Err(detail) = check_terminal_shape(&statements) {
        debug!(%detail, "rejecting: terminal block has the wrong shape");
        return TerminalVerdict::Rejected(format!("{TERMINAL_SHAPE}\n({detail})"));
    }

    // Warnings may land on stderr; only a raised exception rejects.
    let result = backend.execute(&terminal.text, Language::Python);
    if result.raised {
        debug!("rejecting: terminal block raised");
        return TerminalVerdict::Rejected(format!(
            "Executing the <final_answer> block failed:\n{}\n{TERMINAL_VALUES}",
            result.stderr.trim_end()
        ));
    }

    judge_namespace(&result.namespace, step)
}

/// Checks run on the namespace after the terminal block executed.
fn judge_namespace(ns: &Namespace, step: &StepDescriptor) -> TerminalVerdict {
    let status = match ns.get_str(STEP_STATUS) {
        Some("completed") => StepStatus::Completed,
        Some("failed") => StepStatus::Failed,
        _ => {
            debug!("rejecting: invalid step_status");
            return TerminalVerdict::Rejected(TERMINAL_VALUES.to_string());
        }
    };
    let answer = match ns.get_str(FINAL_ANSWER) {
        Some(answer) if !answer.is_empty() => answer.to_string(),
        _ => {
            debug!("rejecting: missing final_answer");
            return TerminalVerdict::Rejected(TERMINAL_VALUES.to_string());
        }
    };

    if status == StepStatus::Failed {
        info!("step declared failure");
        return TerminalVerdict::Accepted { status, answer };
    }

    let errors = check_declared_outputs(&step.output_variables, ns);
    if !errors.is_empty() {
        debug!(errors = errors.len(), "rejecting: declared outputs invalid");
        return TerminalVerdict::Rejected(errors.join("\n"));
    }

    info!("step completed");
    TerminalVerdict::Accepted { status, answer }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::blocks::parse_blocks;
    use crate::core::namespace::Value;
    use crate::core::types::VariableSpec;
    use crate::io::backend::LocalBackend;
    use crate::io::config::ExecutionConfig;
    use crate::test_support::{ScriptedBackend, ScriptedExec, step_with_outputs};

    fn evaluate(raw: &str, step: &StepDescriptor, backend: &mut ScriptedBackend) -> TerminalVerdict {
        evaluate_terminal(&parse_blocks(raw), step, backend)
    }

    fn accepted(status: StepStatus, answer: &str) -> TerminalVerdict {
        TerminalVerdict::Accepted {
            status,
            answer: answer.to_string(),
        }
    }

    #[test]
    fn accepts_completed_with_outputs() {
        let step = step_with_outputs(&[("result", "int")]);
        let mut backend = ScriptedBackend::new();
        backend.set("result", Value::int(4));
        let verdict = evaluate(
            "<final_answer>step_status = 'completed'\nfinal_answer = 'The result is 4'</final_answer>",
            &step,
            &mut backend,
        );
        assert_eq!(verdict, accepted(StepStatus::Completed, "The result is 4"));
        assert_eq!(backend.executed().len(), 1);
    }

    #[test]
    fn rejects_zero_or_many_terminal_blocks() {
        let step = step_with_outputs(&[]);
        let mut backend = ScriptedBackend::new();
        let block = "<final_answer>step_status = 'completed'\nfinal_answer = 'x'</final_answer>";
        let verdict = evaluate(&format!("{block}{block}"), &step, &mut backend);
        assert_eq!(verdict, TerminalVerdict::Rejected(EXACTLY_ONE_TERMINAL.to_string()));
        let verdict = evaluate("just text", &step, &mut backend);
        assert_eq!(verdict, TerminalVerdict::Rejected(EXACTLY_ONE_TERMINAL.to_string()));
        assert!(backend.executed().is_empty());
    }

    /// Shape failures never reach the backend.
    #[test]
    fn shape_and_syntax_rejections_do_not_execute() {
        let step = step_with_outputs(&[]);
        let mut backend = ScriptedBackend::new();

        let TerminalVerdict::Rejected(msg) =
            evaluate("<final_answer>step_status = 1</final_answer>", &step, &mut backend)
        else {
            panic!("single assignment must be rejected");
        };
        assert!(msg.starts_with(TERMINAL_SHAPE), "{msg}");

        let TerminalVerdict::Rejected(msg) = evaluate(
            "<final_answer>step_status = 'completed'; final_answer = 'x'; extra = 1</final_answer>",
            &step,
            &mut backend,
        ) else {
            panic!("extra statement must be rejected");
        };
        assert!(msg.starts_with(TERMINAL_SHAPE), "{msg}");

        let TerminalVerdict::Rejected(msg) = evaluate(
            "<final_answer>step_status = 'completed\nfinal_answer = 'x'</final_answer>",
            &step,
            &mut backend,
        ) else {
            panic!("syntax error must be rejected");
        };
        assert!(msg.starts_with(INVALID_TERMINAL_CODE), "{msg}");
        assert!(backend.executed().is_empty());
    }

    #[test]
    fn accepts_tuple_destructuring() {
        let step = step_with_outputs(&[]);
        let mut backend = ScriptedBackend::new();
        let verdict = evaluate(
            "<final_answer>final_answer, step_status = 'x', 'completed'</final_answer>",
            &step,
            &mut backend,
        );
        assert_eq!(verdict, accepted(StepStatus::Completed, "x"));
    }

    #[test]
    fn rejects_unknown_status_and_blank_answer() {
        let step = step_with_outputs(&[]);
        let mut backend = ScriptedBackend::new();
        let verdict = evaluate(
            "<final_answer>step_status = 'maybe'\nfinal_answer = 'a fine answer'</final_answer>",
            &step,
            &mut backend,
        );
        assert_eq!(verdict, TerminalVerdict::Rejected(TERMINAL_VALUES.to_string()));

        let verdict = evaluate(
            "<final_answer>step_status = 'completed'\nfinal_answer = ''</final_answer>",
            &step,
            &mut backend,
        );
        assert_eq!(verdict, TerminalVerdict::Rejected(TERMINAL_VALUES.to_string()));
    }

    /// A declared failure ends the step even though outputs are missing.
    #[test]
    fn failed_status_skips_output_checks() {
        let step = step_with_outputs(&[("result", "int"), ("table", "pd.DataFrame")]);
        let mut backend = ScriptedBackend::new();
        let verdict = evaluate(
            "<final_answer>step_status = 'failed'\nfinal_answer = 'source unavailable'</final_answer>",
            &step,
            &mut backend,
        );
        assert_eq!(verdict, accepted(StepStatus::Failed, "source unavailable"));
    }

    #[test]
    fn missing_and_mistyped_outputs_are_listed() {
        let step = step_with_outputs(&[("result", "int"), ("label", "str")]);
        let mut backend = ScriptedBackend::new();
        backend.set("result", Value::str("4"));
        let TerminalVerdict::Rejected(msg) = evaluate(
            "<final_answer>step_status = 'completed'\nfinal_answer = 'done'</final_answer>",
            &step,
            &mut backend,
        ) else {
            panic!("bad outputs must be rejected");
        };
        assert!(msg.contains("Error: result is str but expected literal python type: int"), "{msg}");
        assert!(msg.contains("Missing variable: label"), "{msg}");
        // The terminal assignments stay in the namespace.
        assert_eq!(backend.namespace().get_str(STEP_STATUS), Some("completed"));
    }

    #[test]
    fn object_output_accepts_none() {
        let step = StepDescriptor {
            description: "anything".to_string(),
            input_variables: Vec::new(),
            output_variables: vec![VariableSpec::new("blob", "object", "")],
        };
        let mut backend = ScriptedBackend::new();
        backend.set("blob", Value::None);
        let verdict = evaluate(
            "<final_answer>step_status = 'completed'\nfinal_answer = 'ok'</final_answer>",
            &step,
            &mut backend,
        );
        assert_eq!(verdict, accepted(StepStatus::Completed, "ok"));
    }

    /// A block that raises cannot be accepted on stale namespace values.
    #[test]
    fn execution_error_rejects_even_with_stale_values() {
        let step = step_with_outputs(&[]);
        let mut backend = ScriptedBackend::new();
        backend.set(STEP_STATUS, Value::str("completed"));
        backend.set(FINAL_ANSWER, Value::str("stale"));
        backend.push_failure("NameError: name 'undefined_name' is not defined");
        let TerminalVerdict::Rejected(msg) = evaluate(
            "<final_answer>step_status = 'completed'\nfinal_answer = undefined_name</final_answer>",
            &step,
            &mut backend,
        ) else {
            panic!("raising terminal block must be rejected");
        };
        assert!(msg.contains("NameError"), "{msg}");
    }

    /// Warnings printed while the block runs do not reject it.
    #[test]
    fn stderr_warnings_without_exception_are_accepted() {
        let step = step_with_outputs(&[]);
        let mut backend = ScriptedBackend::new();
        backend.push(ScriptedExec {
            stderr: "<block>:2: SyntaxWarning: invalid escape sequence '\\d'".to_string(),
            assign: vec![
                (STEP_STATUS.to_string(), Value::str("completed")),
                (FINAL_ANSWER.to_string(), Value::str("matched rows with \\d+")),
            ],
            ..ScriptedExec::default()
        });
        let verdict = evaluate(
            "<final_answer>step_status = 'completed'\nfinal_answer = 'matched rows with \\d+'</final_answer>",
            &step,
            &mut backend,
        );
        assert_eq!(verdict, accepted(StepStatus::Completed, "matched rows with \\d+"));
    }

    /// Invalid python is caught by the interpreter's own parser before anything runs.
    #[test]
    fn real_interpreter_parses_and_runs_terminal_blocks() {
        if !std::process::Command::new("python3")
            .arg("--version")
            .output()
            .is_ok_and(|out| out.status.success())
        {
            eprintln!("python3 not available, skipping");
            return;
        }
        let temp = tempfile::tempdir().expect("tempdir");
        let mut backend = LocalBackend::new(ExecutionConfig::default(), temp.path().to_path_buf());
        let step = step_with_outputs(&[]);

        let verdict = evaluate_terminal(
            &parse_blocks(
                "<final_answer>step_status = 'completed'\nfinal_answer = 'matched rows with \\d+ in C:\\data'</final_answer>",
            ),
            &step,
            &mut backend,
        );
        assert_eq!(
            verdict,
            accepted(StepStatus::Completed, "matched rows with \\d+ in C:\\data")
        );

        for code in [
            "step_status = 'completed' +\nfinal_answer = 'x'",
            "step_status = 'completed' 'x' 1\nfinal_answer = 'x'",
            "step_status = ur'completed'\nfinal_answer = 'x'",
            "step_status = ('a' ,, 'b')\nfinal_answer = 'x'",
        ] {
            let verdict = evaluate_terminal(
                &parse_blocks(&format!("<final_answer>{code}</final_answer>")),
                &step,
                &mut backend,
            );
            assert!(
                matches!(&verdict, TerminalVerdict::Rejected(msg) if msg.starts_with(INVALID_TERMINAL_CODE)),
                "{code:?} -> {verdict:?}"
            );
        }

        let verdict = evaluate_terminal(
            &parse_blocks("<final_answer>import os\nstep_status = 'completed'</final_answer>"),
            &step,
            &mut backend,
        );
        assert!(
            matches!(&verdict, TerminalVerdict::Rejected(msg) if msg.starts_with(TERMINAL_SHAPE)),
            "{verdict:?}"
        );
        assert!(!backend.namespace().contains("os"));
    }
}
