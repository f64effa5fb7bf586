//! Test-only helpers: scripted model turns, a scripted backend and step builders.

use std::cell::RefCell;
use std::collections::VecDeque;

use anyhow::{Result, anyhow};

use crate::core::namespace::{Namespace, Value};
use crate::core::terminal_shape::{ParsedCode, Statement, is_identifier, is_keyword};
use crate::core::types::{Message, StepDescriptor, VariableSpec};
use crate::io::backend::{ExecutionBackend, ExecutionResult, Language};
use crate::io::model::{ModelClient, ModelReply};

/// Model client that replays predetermined turns and records every request.
pub struct ScriptedModel {
    turns: RefCell<VecDeque<ModelReply>>,
    /// Returned once `turns` is drained; `None` makes further requests fail.
    fallback: Option<ModelReply>,
    conversations: RefCell<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    pub fn new<I, S>(turns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_replies(turns.into_iter().map(|content| ModelReply {
            content: content.into(),
            reasoning: String::new(),
        }))
    }

    /// Turns given as `(content, reasoning)` pairs.
    pub fn with_reasoning<'a>(turns: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self::from_replies(turns.into_iter().map(|(content, reasoning)| ModelReply {
            content: content.to_string(),
            reasoning: reasoning.to_string(),
        }))
    }

    /// A model that answers every request with `content`.
    pub fn repeating(content: &str) -> Self {
        let mut model = Self::new(Vec::<String>::new());
        model.fallback = Some(ModelReply {
            content: content.to_string(),
            reasoning: String::new(),
        });
        model
    }

    fn from_replies(replies: impl IntoIterator<Item = ModelReply>) -> Self {
        Self {
            turns: RefCell::new(replies.into_iter().collect()),
            fallback: None,
            conversations: RefCell::new(Vec::new()),
        }
    }

    /// Every conversation the model was asked to complete, in request order.
    pub fn conversations(&self) -> Vec<Vec<Message>> {
        self.conversations.borrow().clone()
    }
}

impl ModelClient for ScriptedModel {
    fn complete(&self, conversation: &[Message]) -> Result<ModelReply> {
        self.conversations.borrow_mut().push(conversation.to_vec());
        if let Some(reply) = self.turns.borrow_mut().pop_front() {
            return Ok(reply);
        }
        self.fallback
            .clone()
            .ok_or_else(|| anyhow!("scripted model has no more turns"))
    }
}

/// One scripted execution result.
#[derive(Debug, Clone, Default)]
pub struct ScriptedExec {
    pub stdout: String,
    pub stderr: String,
    pub raised: bool,
    /// Bindings applied to the namespace before the result is returned.
    pub assign: Vec<(String, Value)>,
}

/// Backend that replays scripted results, or evaluates literal assignments
/// (`name = 'text'`, `a, b = 1, None`) when no script is queued. Parsing
/// splits statements on newlines and `;` and flags unbalanced quotes.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    namespace: Namespace,
    script: VecDeque<ScriptedExec>,
    executed: Vec<(String, Language)>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value directly, as if earlier code had run.
    pub fn set(&mut self, name: &str, value: Value) {
        self.namespace.insert(name, value);
    }

    pub fn push(&mut self, exec: ScriptedExec) {
        self.script.push_back(exec);
    }

    pub fn push_output(&mut self, stdout: &str, stderr: &str) {
        self.push(ScriptedExec {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            ..ScriptedExec::default()
        });
    }

    /// Next execution raises with `stderr` and changes nothing.
    pub fn push_failure(&mut self, stderr: &str) {
        self.push(ScriptedExec {
            stderr: stderr.to_string(),
            raised: true,
            ..ScriptedExec::default()
        });
    }

    /// Code of every executed block with its language, in order.
    pub fn executed(&self) -> &[(String, Language)] {
        &self.executed
    }

    fn evaluate_literals(&mut self, code: &str) -> ExecutionResult {
        for statement in statements(code) {
            let Some((lhs, rhs)) = statement.split_once('=') else {
                return self.error(format!("cannot evaluate statement: {statement}"));
            };
            let names: Vec<&str> = lhs.split(',').map(str::trim).collect();
            let values: Vec<&str> = if names.len() == 1 {
                vec![rhs.trim()]
            } else {
                rhs.split(',').map(str::trim).collect()
            };
            if names.len() != values.len() {
                return self.error(format!("cannot unpack: {statement}"));
            }
            for (name, raw) in names.into_iter().zip(values) {
                let Some(value) = parse_literal(raw) else {
                    return self.error(format!("NameError: name '{raw}' is not defined"));
                };
                self.namespace.insert(name, value);
            }
        }
        ExecutionResult {
            namespace: self.namespace.clone(),
            ..ExecutionResult::default()
        }
    }

    fn error(&self, stderr: String) -> ExecutionResult {
        ExecutionResult {
            stdout: String::new(),
            stderr,
            raised: true,
            namespace: self.namespace.clone(),
        }
    }
}

fn statements(code: &str) -> impl Iterator<Item = &str> {
    code.split(['\n', ';']).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_statement(statement: &str) -> Statement {
    let leading = statement.split_whitespace().next().unwrap_or_default();
    let lhs = match statement.split_once('=') {
        Some((lhs, _)) if !is_keyword(leading) => lhs,
        _ => {
            return Statement::Other {
                node: "Expr".to_string(),
            };
        }
    };
    Statement::Assign {
        targets: lhs
            .split(',')
            .map(str::trim)
            .map(|name| is_identifier(name).then(|| name.to_string()))
            .collect(),
    }
}

fn parse_literal(raw: &str) -> Option<Value> {
    let quoted = |quote: char| {
        raw.strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
            .map(Value::str)
    };
    match raw {
        "None" => Some(Value::None),
        "True" => Some(Value::Bool { value: true }),
        "False" => Some(Value::Bool { value: false }),
        _ => quoted('\'')
            .or_else(|| quoted('"'))
            .or_else(|| raw.parse::<i64>().ok().map(Value::int))
            .or_else(|| raw.parse::<f64>().ok().map(|value| Value::Float { value })),
    }
}

impl ExecutionBackend for ScriptedBackend {
    fn execute(&mut self, code: &str, language: Language) -> ExecutionResult {
        self.executed.push((code.to_string(), language));
        if let Some(exec) = self.script.pop_front() {
            for (name, value) in exec.assign {
                self.namespace.insert(name, value);
            }
            return ExecutionResult {
                stdout: exec.stdout,
                stderr: exec.stderr,
                raised: exec.raised,
                namespace: self.namespace.clone(),
            };
        }
        match language {
            Language::Python => self.evaluate_literals(code),
            Language::Bash => ExecutionResult {
                namespace: self.namespace.clone(),
                ..ExecutionResult::default()
            },
        }
    }

    fn parse_python(&mut self, code: &str) -> Result<ParsedCode> {
        if let Some(bad) = statements(code).find(|s| s.matches(['\'', '"']).count() % 2 == 1) {
            return Ok(ParsedCode::SyntaxError(format!(
                "SyntaxError: unterminated string literal: {bad}"
            )));
        }
        Ok(ParsedCode::Statements(
            statements(code).map(parse_statement).collect(),
        ))
    }

    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn reset(&mut self) -> Result<()> {
        self.namespace.clear();
        Ok(())
    }
}

/// Step with the given `(name, data_type)` outputs and no inputs.
pub fn step_with_outputs(outputs: &[(&str, &str)]) -> StepDescriptor {
    StepDescriptor {
        description: "test step".to_string(),
        input_variables: Vec::new(),
        output_variables: outputs
            .iter()
            .map(|(name, data_type)| VariableSpec::new(name, data_type, ""))
            .collect(),
    }
}

/// Terminal block source for `status` and `answer`.
pub fn terminal(status: &str, answer: &str) -> String {
    format!("<final_answer>\nstep_status = '{status}'\nfinal_answer = '{answer}'\n</final_answer>")
}
