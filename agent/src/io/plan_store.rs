//! Plan loading with schema + semantic validation.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;

use crate::core::namespace::{FINAL_ANSWER, STEP_STATUS};
use crate::core::terminal_shape::is_identifier;
use crate::core::type_expr::parse_type_expr;
use crate::core::types::{Plan, VariableSpec};

const PLAN_SCHEMA: &str = include_str!("../../schemas/plan.schema.json");

/// Load and validate a plan from disk (schema + semantic checks).
pub fn load_plan(path: &Path) -> Result<Plan> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read plan {}", path.display()))?;
    parse_plan(&contents).with_context(|| format!("load plan {}", path.display()))
}

/// Validate and deserialize plan JSON text.
pub fn parse_plan(contents: &str) -> Result<Plan> {
    let value: Value = serde_json::from_str(contents).context("parse plan json")?;
    validate_schema(&value)?;
    let plan: Plan = serde_json::from_value(value).context("deserialize plan")?;
    let errors = validate_plan(&plan);
    if !errors.is_empty() {
        return Err(anyhow!("plan validation failed: {}", errors.join("; ")));
    }
    Ok(plan)
}

fn validate_schema(plan: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(PLAN_SCHEMA).context("parse plan schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(plan) {
        let messages = compiled
            .iter_errors(plan)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "plan schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

/// Semantic checks the schema cannot express.
///
/// Returns a list of stable error messages (empty on success).
pub fn validate_plan(plan: &Plan) -> Vec<String> {
    let mut errors = Vec::new();
    if plan.task.trim().is_empty() {
        errors.push("task must not be blank".to_string());
    }
    if plan.steps.is_empty() {
        errors.push("plan must contain at least one step".to_string());
    }

    for (idx, step) in plan.steps.iter().enumerate() {
        let label = format!("step {}", idx + 1);
        if step.description.trim().is_empty() {
            errors.push(format!("{label}: description must not be blank"));
        }
        for var in &step.input_variables {
            check_variable(&label, "input", var, &mut errors);
        }

        let mut seen = BTreeSet::new();
        for var in &step.output_variables {
            check_variable(&label, "output", var, &mut errors);
            if var.name == STEP_STATUS || var.name == FINAL_ANSWER {
                errors.push(format!(
                    "{label}: output '{}' collides with a reserved name",
                    var.name
                ));
            }
            if !seen.insert(var.name.as_str()) {
                errors.push(format!("{label}: duplicate output '{}'", var.name));
            }
        }
    }

    errors
}

fn check_variable(label: &str, direction: &str, var: &VariableSpec, errors: &mut Vec<String>) {
    if !is_identifier(&var.name) {
        errors.push(format!(
            "{label}: {direction} name '{}' is not a valid identifier",
            var.name
        ));
    }
    if let Err(err) = parse_type_expr(&var.data_type) {
        errors.push(format!(
            "{label}: {direction} '{}' has invalid type '{}': {err}",
            var.name, var.data_type
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "task": "2+2",
        "steps": [
            {
                "description": "compute 2+2",
                "output_variables": [
                    {"name": "result", "data_type": "int", "description": "the sum"}
                ]
            },
            {
                "description": "report",
                "input_variables": [{"name": "result", "data_type": "int"}]
            }
        ]
    }"#;

    #[test]
    fn valid_plan_loads() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("plan.json");
        fs::write(&path, VALID).expect("write");
        let plan = load_plan(&path).expect("load");
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].output_variables[0].name, "result");
        assert!(plan.steps[1].output_variables.is_empty());
        assert_eq!(plan.steps[1].input_variables[0].description, "");
    }

    #[test]
    fn schema_rejects_missing_fields() {
        let err = parse_plan(r#"{"task": "x", "steps": [{"input_variables": []}]}"#)
            .expect_err("missing description");
        assert!(err.to_string().contains("schema validation failed"), "{err}");

        let err = parse_plan(r#"{"task": "x", "steps": []}"#).expect_err("no steps");
        assert!(err.to_string().contains("schema validation failed"), "{err}");
    }

    #[test]
    fn semantic_errors_are_collected() {
        let raw = r#"{
            "task": "   ",
            "steps": [{
                "description": "s",
                "output_variables": [
                    {"name": "2bad", "data_type": "int"},
                    {"name": "dup", "data_type": "list[int"},
                    {"name": "dup", "data_type": "int"},
                    {"name": "final_answer", "data_type": "str"}
                ]
            }]
        }"#;
        let err = parse_plan(raw).expect_err("invalid plan");
        let text = err.to_string();
        assert!(text.contains("task must not be blank"), "{text}");
        assert!(text.contains("'2bad' is not a valid identifier"), "{text}");
        assert!(text.contains("has invalid type 'list[int'"), "{text}");
        assert!(text.contains("duplicate output 'dup'"), "{text}");
        assert!(text.contains("'final_answer' collides"), "{text}");
    }
}
