//! Declared-output checks run after a `completed` terminal block.

use crate::core::namespace::Namespace;
use crate::core::type_expr::resolve_type;
use crate::core::types::VariableSpec;

/// Declared type that accepts any value, `None` included.
pub const ANY_OBJECT_TYPE: &str = "object";

/// Check every declared output against the namespace.
///
/// Returns one message per problem, in declaration order (empty on success).
/// A name bound to `None` counts as present.
pub fn check_declared_outputs(outputs: &[VariableSpec], ns: &Namespace) -> Vec<String> {
    let mut errors = Vec::new();

    for var in outputs {
        let Some(value) = ns.get(&var.name) else {
            errors.push(format!("Missing variable: {}", var.name));
            continue;
        };
        if var.data_type.trim() == ANY_OBJECT_TYPE {
            continue;
        }

        let verdict = resolve_type(&var.data_type, ns).map(|matcher| matcher.matches(value));
        let detail = match verdict {
            Ok(true) => continue,
            Ok(false) => None,
            Err(err) => Some(err.to_string()),
        };
        errors.push(type_mismatch(var, value.type_name(), detail.as_deref()));
    }

    errors
}

fn type_mismatch(var: &VariableSpec, actual: &str, detail: Option<&str>) -> String {
    let expected = &var.data_type;
    let mut message = format!(
        "Error: {} is {actual} but expected literal python type: {expected}\n",
        var.name
    );
    if let Some(detail) = detail {
        message.push_str(&format!("could not resolve {expected}: {detail}\n"));
    }
    message.push_str(&format!(
        "make sure that the class {expected} exists verbatim in the current python environment, re-importing it if needed\n\
         examples of different imports: import pandas as pd VS import pandas; import numpy as np VS import numpy"
    ));
    message
}
