//! The test oracle abstraction (spec §4.3): the sole bug definition the
//! engine consults. The engine never peeks inside a user program beyond
//! what an oracle reports.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::outcome::TestVerdict;
use crate::runner::{run_capture, RunOutcome};

/// Capability interface implemented by every concrete oracle. Replaces the
/// original implementation's duck-typed callback: the engine only ever
/// calls `judge` and never inspects an oracle's internals.
#[async_trait]
pub trait TestOracle: Send + Sync {
    async fn judge(&self, binary: &Path, time_budget: Duration) -> TestVerdict;
}

fn from_run_outcome(outcome: RunOutcome, on_success: TestVerdict) -> TestVerdict {
    match outcome {
        RunOutcome::Exited { code: Some(0), .. } => on_success,
        RunOutcome::Exited { .. } | RunOutcome::SpawnFailed => TestVerdict::Failed,
        RunOutcome::Timeout => TestVerdict::Timeout,
    }
}

/// `Passed` iff the binary exits 0 within budget.
#[derive(Debug, Clone, Default)]
pub struct ExitCodeOracle {
    /// Bytes fed to the reproducer's stdin (spec §6 `--test-input`). `None`
    /// closes stdin immediately, matching the bisector stages' own probes.
    pub stdin: Option<Vec<u8>>,
}

impl ExitCodeOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stdin(stdin: Vec<u8>) -> Self {
        Self { stdin: Some(stdin) }
    }
}

#[async_trait]
impl TestOracle for ExitCodeOracle {
    async fn judge(&self, binary: &Path, time_budget: Duration) -> TestVerdict {
        let outcome = run_capture(binary, &[], &HashMap::new(), self.stdin.as_deref(), time_budget).await;
        from_run_outcome(outcome, TestVerdict::Passed)
    }
}

/// `Passed` iff stdout byte-exactly equals `expected` within budget.
#[derive(Debug, Clone)]
pub struct ExpectedOutputOracle {
    pub expected: Vec<u8>,
    /// Bytes fed to the reproducer's stdin (spec §6 `--test-input`).
    pub stdin: Option<Vec<u8>>,
}

impl ExpectedOutputOracle {
    pub fn new(expected: Vec<u8>) -> Self {
        Self { expected, stdin: None }
    }

    pub fn with_stdin(expected: Vec<u8>, stdin: Vec<u8>) -> Self {
        Self { expected, stdin: Some(stdin) }
    }
}

#[async_trait]
impl TestOracle for ExpectedOutputOracle {
    async fn judge(&self, binary: &Path, time_budget: Duration) -> TestVerdict {
        match run_capture(binary, &[], &HashMap::new(), self.stdin.as_deref(), time_budget).await {
            RunOutcome::Exited { stdout, .. } => {
                if stdout == self.expected {
                    TestVerdict::Passed
                } else {
                    TestVerdict::Failed
                }
            }
            RunOutcome::Timeout => TestVerdict::Timeout,
            RunOutcome::SpawnFailed => TestVerdict::Failed,
        }
    }
}

/// Runs a user-supplied `TEST_COMMAND` template (spec §6) with `{binary}`
/// substituted, tokenized shell-style, executed without a shell. `Passed`
/// iff the resulting argv exits 0.
#[derive(Debug, Clone)]
pub struct ArgvTestOracle {
    /// The raw template string, already validated to contain `{binary}`
    /// (see [`crate::testcmd::validate_template`]).
    pub template: String,
    /// Bytes fed to the reproducer's stdin (spec §6 `--test-input`).
    pub stdin: Option<Vec<u8>>,
}

impl ArgvTestOracle {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            stdin: None,
        }
    }

    pub fn with_stdin(template: impl Into<String>, stdin: Vec<u8>) -> Self {
        Self {
            template: template.into(),
            stdin: Some(stdin),
        }
    }
}

#[async_trait]
impl TestOracle for ArgvTestOracle {
    async fn judge(&self, binary: &Path, time_budget: Duration) -> TestVerdict {
        let argv = match crate::testcmd::build_argv(&self.template, binary) {
            Ok(argv) if !argv.is_empty() => argv,
            _ => {
                tracing::error!(template = %self.template, "test command tokenized to an empty argv");
                return TestVerdict::Failed;
            }
        };
        let outcome = run_capture(
            Path::new(&argv[0]),
            &argv[1..].to_vec(),
            &HashMap::new(),
            self.stdin.as_deref(),
            time_budget,
        )
        .await;
        from_run_outcome(outcome, TestVerdict::Passed)
    }
}

/// Predicate oracle: wraps a caller-supplied closure. The engine never
/// inspects its internals -- useful for embedding diagcore in a host that
/// already has its own bug definition (e.g. the evaluation harness replaying
/// a historical bug by diffing against a golden trace).
pub struct PredicateOracle<F>
where
    F: Fn(&Path) -> TestVerdict + Send + Sync,
{
    predicate: F,
}

impl<F> PredicateOracle<F>
where
    F: Fn(&Path) -> TestVerdict + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

#[async_trait]
impl<F> TestOracle for PredicateOracle<F>
where
    F: Fn(&Path) -> TestVerdict + Send + Sync,
{
    async fn judge(&self, binary: &Path, _time_budget: Duration) -> TestVerdict {
        (self.predicate)(binary)
    }
}
