//! Compiler invocation outcomes and test verdicts.
//!
//! These two sum types replace the original Python implementation's
//! overloaded tri-state booleans (a `None`-able boolean compared by
//! truthiness). Exhaustive matching here is what prevents a skip from being
//! silently treated as a failure, or vice versa.

use std::path::PathBuf;

use crate::domain::toolchain::ToolchainHandle;

/// Outcome of a single compiler invocation. Exactly one variant is ever
/// produced per [`crate::compile::CompileStep::compile`] call.
#[derive(Debug, Clone)]
pub enum CompileOutcome {
    /// An executable artifact was produced.
    Binary {
        path: PathBuf,
        produced_under: ToolchainHandle,
    },
    /// The compiler crashed; `stderr` matched one of the configured ICE
    /// signatures. This is a test *failure*, not a skip: the compiler bug
    /// manifested at compile time.
    InternalError { stderr: String },
    /// The compiler rejected the input cleanly (nonzero exit, no ICE
    /// signature matched). This is a *skip*: it carries no evidence about
    /// the bug under test.
    Diagnostic { stderr: String },
    /// The requested toolchain handle could not be realized.
    Unavailable,
    /// The wall-clock compile budget was exceeded.
    Timeout,
}

impl CompileOutcome {
    /// Whether this outcome counts as a genuine attempt (compile+test,
    /// ICE, or compile timeout) rather than a skip (`Diagnostic` or
    /// `Unavailable`). Per the §4.5 counting policy, only attempts move
    /// bisection boundaries.
    pub fn is_attempt(&self) -> bool {
        !matches!(
            self,
            CompileOutcome::Diagnostic { .. } | CompileOutcome::Unavailable
        )
    }

    pub fn is_skip(&self) -> bool {
        !self.is_attempt()
    }

    pub fn binary_path(&self) -> Option<&PathBuf> {
        match self {
            CompileOutcome::Binary { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Outcome of running a binary through a [`crate::oracle::TestOracle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestVerdict {
    /// The bug is absent.
    Passed,
    /// The bug is present. Covers nonzero exit, abort-trap, and explicit
    /// oracle rejection alike -- the engine does not distinguish them.
    Failed,
    /// The oracle's time budget was exceeded running the binary.
    Timeout,
}

impl TestVerdict {
    pub fn is_passed(&self) -> bool {
        matches!(self, TestVerdict::Passed)
    }

    /// `Failed` and `Timeout` are both treated as the failing side of a
    /// bisection boundary: a bug that makes the reproducer hang is still a
    /// bug.
    pub fn is_failing_side(&self) -> bool {
        !self.is_passed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_and_unavailable_are_skips() {
        assert!(CompileOutcome::Diagnostic { stderr: String::new() }.is_skip());
        assert!(CompileOutcome::Unavailable.is_skip());
    }

    #[test]
    fn internal_error_and_timeout_are_attempts() {
        assert!(CompileOutcome::InternalError { stderr: String::new() }.is_attempt());
        assert!(CompileOutcome::Timeout.is_attempt());
    }

    #[test]
    fn timeout_verdict_is_failing_side() {
        assert!(TestVerdict::Timeout.is_failing_side());
        assert!(TestVerdict::Failed.is_failing_side());
        assert!(!TestVerdict::Passed.is_failing_side());
    }
}
