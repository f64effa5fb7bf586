//! Shape check for terminal blocks.
//!
//! The interpreter parses a block and reports its top-level statements. A
//! terminal block must be nothing but plain assignments binding `step_status`
//! and `final_answer`, each exactly once.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::namespace::{FINAL_ANSWER, STEP_STATUS};

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\W\d]\w*$").expect("identifier regex must compile"));

const KEYWORDS: [&str; 35] = [
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

/// Whether `name` is a valid, non-keyword identifier.
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name) && !is_keyword(name)
}

/// Top-level statement as reported by the interpreter's parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Statement {
    /// Plain `=` assignment with tuple/list targets flattened one level.
    /// `None` marks a target that is not a bare name (attribute, subscript,
    /// starred or nested).
    Assign { targets: Vec<Option<String>> },
    /// Any other statement, by AST node name (`Import`, `Expr`, `AugAssign`, ...).
    Other { node: String },
}

/// Result of parsing a block without running it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCode {
    Statements(Vec<Statement>),
    /// The block is not valid code; carries the parser's message.
    SyntaxError(String),
}

/// Check that `statements` bind exactly `step_status` and `final_answer`
/// through plain assignments and do nothing else.
///
/// Returns a description of the violation on failure.
pub fn check_terminal_shape(statements: &[Statement]) -> Result<(), String> {
    if statements.is_empty() {
        return Err("the block contains no statements".to_string());
    }
    if statements.len() > 2 {
        return Err(format!(
            "found {} statements, expected only the step_status and final_answer assignments",
            statements.len()
        ));
    }

    let mut names = Vec::new();
    for (idx, statement) in statements.iter().enumerate() {
        match statement {
            Statement::Assign { targets } => names.extend(
                targets
                    .iter()
                    .map(|target| target.as_deref().unwrap_or("<non-name target>")),
            ),
            Statement::Other { node } => {
                return Err(format!(
                    "statement {} is a {node}, not a plain assignment",
                    idx + 1
                ));
            }
        }
    }

    let mut sorted = names.clone();
    sorted.sort_unstable();
    let mut expected = vec![FINAL_ANSWER, STEP_STATUS];
    expected.sort_unstable();
    if sorted != expected {
        return Err(format!(
            "assignment targets are [{}], expected exactly {STEP_STATUS} and {FINAL_ANSWER}",
            names.join(", ")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assign(targets: &[&str]) -> Statement {
        Statement::Assign {
            targets: targets.iter().map(|t| Some((*t).to_string())).collect(),
        }
    }

    fn other(node: &str) -> Statement {
        Statement::Other {
            node: node.to_string(),
        }
    }

    #[test]
    fn accepts_two_assignments_in_either_order() {
        assert_eq!(
            check_terminal_shape(&[assign(&["step_status"]), assign(&["final_answer"])]),
            Ok(())
        );
        assert_eq!(
            check_terminal_shape(&[assign(&["final_answer"]), assign(&["step_status"])]),
            Ok(())
        );
    }

    /// `final_answer, step_status = 'x', 'completed'` covers both names.
    #[test]
    fn accepts_tuple_destructuring() {
        assert_eq!(
            check_terminal_shape(&[assign(&["final_answer", "step_status"])]),
            Ok(())
        );
    }

    #[test]
    fn rejects_single_name_and_extra_statements() {
        let err = check_terminal_shape(&[assign(&["step_status"])]).expect_err("one name");
        assert!(err.contains("[step_status]"), "{err}");

        let err = check_terminal_shape(&[
            assign(&["step_status"]),
            assign(&["final_answer"]),
            assign(&["extra"]),
        ])
        .expect_err("three statements");
        assert!(err.starts_with("found 3 statements"), "{err}");

        assert!(check_terminal_shape(&[]).is_err());
    }

    #[test]
    fn rejects_duplicate_foreign_and_non_name_targets() {
        assert!(check_terminal_shape(&[assign(&["step_status"]), assign(&["step_status"])]).is_err());
        assert!(check_terminal_shape(&[assign(&["step_status"]), assign(&["answer"])]).is_err());
        let nested = Statement::Assign {
            targets: vec![Some("step_status".to_string()), None],
        };
        let err = check_terminal_shape(&[nested]).expect_err("non-name target");
        assert!(err.contains("<non-name target>"), "{err}");
    }

    /// Chained assignment binds every target, so `a = b = x` counts both.
    #[test]
    fn chained_assignment_counts_all_targets() {
        assert_eq!(
            check_terminal_shape(&[assign(&["step_status", "final_answer"])]),
            Ok(())
        );
        assert!(
            check_terminal_shape(&[
                assign(&["step_status", "final_answer"]),
                assign(&["final_answer"]),
            ])
            .is_err()
        );
    }

    #[test]
    fn rejects_non_assignment_statements() {
        let err = check_terminal_shape(&[other("Import"), assign(&["final_answer", "step_status"])])
            .expect_err("import");
        assert_eq!(err, "statement 1 is a Import, not a plain assignment");
        assert!(check_terminal_shape(&[assign(&["step_status"]), other("AugAssign")]).is_err());
    }

    #[test]
    fn statements_decode_from_parser_reply() {
        let raw = r#"[{"kind": "assign", "targets": ["final_answer", null]}, {"kind": "other", "node": "Expr"}]"#;
        let statements: Vec<Statement> = serde_json::from_str(raw).expect("decode");
        assert_eq!(
            statements,
            vec![
                Statement::Assign {
                    targets: vec![Some("final_answer".to_string()), None]
                },
                other("Expr"),
            ]
        );
    }

    #[test]
    fn identifier_rules() {
        assert!(is_identifier("result"));
        assert!(is_identifier("_private2"));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("class"));
        assert!(!is_identifier("with-dash"));
        assert!(!is_identifier(""));
    }
}
