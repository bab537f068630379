//! Per-`CheckType` C source templates used to synthesize a minimal
//! compilable reproducer out of an [`crate::domain::report::AnomalyReport`]'s
//! `check_details` (spec §6).
//!
//! The original collector's `check_details` schema deliberately leaves the
//! field set open-ended (`marshmallow`'s `unknown = INCLUDE`), but every
//! fixture that exercises it -- the collector's own test suite and the
//! full-pipeline integration test -- shapes it as a C `expression` string
//! plus an `operands` map of variable name to literal value. The template
//! table below treats those two fields as the synthesis contract.

use regex::Regex;
use serde_json::Value;

use crate::domain::error::{DiagnosisError, Result};
use crate::domain::report::CheckType;

const ARITHMETIC_OVERFLOW: &str = "#include <stdio.h>\n\nint main(void) {\n{{operand_decls}}\n    volatile long result = {{expression}};\n    printf(\"%ld\\n\", result);\n    return 0;\n}\n";

const DIVISION_BY_ZERO: &str = "#include <stdio.h>\n\nint main(void) {\n{{operand_decls}}\n    volatile long result = {{expression}};\n    printf(\"%ld\\n\", result);\n    return 0;\n}\n";

const UNREACHABLE_CODE_EXECUTED: &str = "#include <stdio.h>\n\nint main(void) {\n{{operand_decls}}\n    if ({{expression}}) {\n        printf(\"unreachable\\n\");\n        return 1;\n    }\n    printf(\"reachable\\n\");\n    return 0;\n}\n";

const SIGN_CONVERSION: &str = "#include <stdio.h>\n\nint main(void) {\n{{operand_decls}}\n    volatile long result = {{expression}};\n    printf(\"%ld\\n\", result);\n    return 0;\n}\n";

const BOUNDS_VIOLATION: &str = "#include <stdio.h>\n\nint main(void) {\n{{operand_decls}}\n    volatile long result = {{expression}};\n    printf(\"%ld\\n\", result);\n    return 0;\n}\n";

const LOOP_BOUND_EXCEEDED: &str = "#include <stdio.h>\n\nint main(void) {\n{{operand_decls}}\n    volatile long iterations = 0;\n    for (long i = 0; {{expression}}; i++) {\n        iterations++;\n        if (iterations > 1000000) break;\n    }\n    printf(\"%ld\\n\", iterations);\n    return 0;\n}\n";

/// `None` for `PureFunctionInconsistency`: the function body under test is
/// never captured in a report, so there is nothing to template against
/// (spec.md §6).
pub fn template_for(check_type: CheckType) -> Option<&'static str> {
    match check_type {
        CheckType::ArithmeticOverflow => Some(ARITHMETIC_OVERFLOW),
        CheckType::DivisionByZero => Some(DIVISION_BY_ZERO),
        CheckType::UnreachableCodeExecuted => Some(UNREACHABLE_CODE_EXECUTED),
        CheckType::SignConversion => Some(SIGN_CONVERSION),
        CheckType::BoundsViolation => Some(BOUNDS_VIOLATION),
        CheckType::LoopBoundExceeded => Some(LOOP_BOUND_EXCEEDED),
        CheckType::PureFunctionInconsistency => None,
    }
}

/// Macro-substitutes `{{expression}}` and `{{operand_decls}}` into
/// `template` from `details` (spec.md §6: "macro-substituting operands and
/// operation symbols into a fixed per-check-type code template").
pub fn render(template: &str, details: &Value) -> Result<String> {
    let expression = details
        .get("expression")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            DiagnosisError::MalformedReport(
                "check_details is missing the required \"expression\" field".to_string(),
            )
        })?;

    let operand_decls = match details.get("operands").and_then(Value::as_object) {
        Some(operands) => operands
            .iter()
            .map(|(name, value)| format!("    volatile long {name} = {};", operand_literal(value)))
            .collect::<Vec<_>>()
            .join("\n"),
        None => String::new(),
    };

    let placeholder = Regex::new(r"\{\{(\w+)\}\}").expect("placeholder regex is a valid literal");
    let mut unknown = Vec::new();
    let rendered = placeholder
        .replace_all(template, |caps: &regex::Captures| match &caps[1] {
            "expression" => expression.to_string(),
            "operand_decls" => operand_decls.clone(),
            other => {
                unknown.push(other.to_string());
                String::new()
            }
        })
        .into_owned();

    if !unknown.is_empty() {
        return Err(DiagnosisError::MalformedReport(format!(
            "template referenced unsupported placeholder(s): {}",
            unknown.join(", ")
        )));
    }
    Ok(rendered)
}

fn operand_literal(value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
