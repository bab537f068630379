//! Synthesizes a reproducer source file from a stored anomaly report, for
//! the `analyze-report` entry point (spec §6). The engine itself never
//! stores reports; it reads exactly one and, if synthesizable, treats the
//! result as an ordinary [`crate::domain::reproducer::Reproducer`] source
//! file feeding into [`crate::stages::UbClassifier`].

pub mod templates;

use std::path::{Path, PathBuf};

use crate::domain::error::{DiagnosisError, Result};
use crate::domain::report::AnomalyReport;

/// Outcome of attempting to synthesize a compilable source file from a
/// report.
pub enum SynthesisOutcome {
    Source(PathBuf),
    /// `check_type` has no template (currently only
    /// `pure_function_inconsistency`); carries the explanatory reason the
    /// CLI surfaces directly as the diagnosis's `inconclusive` reason.
    Inconclusive(String),
}

/// Writes a `<report_id>.<ext>` source file into `out_dir`, rendered from
/// `report.check_details` via [`templates::template_for`].
pub fn synthesize_reproducer_source(report: &AnomalyReport, out_dir: &Path) -> Result<SynthesisOutcome> {
    let Some(template) = templates::template_for(report.check_type) else {
        return Ok(SynthesisOutcome::Inconclusive(format!(
            "check_type {:?} cannot be synthesized from a report alone; the function body under test is not captured",
            report.check_type
        )));
    };

    let details = report.check_details.as_ref().ok_or_else(|| {
        DiagnosisError::MalformedReport(format!(
            "report {} has check_type {:?} but no check_details to synthesize from",
            report.report_id, report.check_type
        ))
    })?;

    let source = templates::render(template, details)?;

    std::fs::create_dir_all(out_dir).map_err(|source| DiagnosisError::UnreadableSource {
        path: out_dir.display().to_string(),
        source,
    })?;
    let path = out_dir.join(format!("{}.c", report.report_id));
    std::fs::write(&path, source).map_err(|source| DiagnosisError::UnreadableSource {
        path: path.display().to_string(),
        source,
    })?;

    Ok(SynthesisOutcome::Source(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::report::{BuildInfo, CheckType, CompilerId, CompilerName, Location, OptLevelToken};
    use serde_json::json;

    fn base_report(check_type: CheckType, check_details: Option<serde_json::Value>) -> AnomalyReport {
        AnomalyReport {
            report_id: "r-test".to_string(),
            timestamp: chrono::Utc::now(),
            check_type,
            location: Location {
                file: "math.c".to_string(),
                line: 9,
                function: "f".to_string(),
            },
            compiler: CompilerId {
                name: CompilerName::Clang,
                version: "17.0.6".to_string(),
                target: None,
            },
            build_info: BuildInfo {
                optimization_level: OptLevelToken::O2,
                flags: None,
                source_hash: None,
                binary_checksum: None,
            },
            pc: None,
            stacktrace: None,
            check_details,
            system_info: None,
        }
    }

    #[test]
    fn pure_function_inconsistency_is_inconclusive_without_touching_disk() {
        let report = base_report(CheckType::PureFunctionInconsistency, None);
        let tmp = tempfile::tempdir().unwrap();
        let outcome = synthesize_reproducer_source(&report, tmp.path()).unwrap();
        assert!(matches!(outcome, SynthesisOutcome::Inconclusive(_)));
    }

    #[test]
    fn arithmetic_overflow_synthesizes_a_c_file() {
        let details = json!({"expression": "a * b", "operands": {"a": 2147483647, "b": 2}});
        let report = base_report(CheckType::ArithmeticOverflow, Some(details));
        let tmp = tempfile::tempdir().unwrap();
        let outcome = synthesize_reproducer_source(&report, tmp.path()).unwrap();
        match outcome {
            SynthesisOutcome::Source(path) => {
                assert!(path.exists());
                let contents = std::fs::read_to_string(path).unwrap();
                assert!(contents.contains("a * b"));
            }
            SynthesisOutcome::Inconclusive(_) => panic!("expected a synthesized source"),
        }
    }

    #[test]
    fn missing_check_details_is_a_malformed_report_error() {
        let report = base_report(CheckType::DivisionByZero, None);
        let tmp = tempfile::tempdir().unwrap();
        let err = synthesize_reproducer_source(&report, tmp.path()).unwrap_err();
        assert!(matches!(err, DiagnosisError::MalformedReport(_)));
    }
}
