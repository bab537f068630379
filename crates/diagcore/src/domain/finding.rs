//! Per-stage result records and the assembled diagnosis document.

use serde::{Deserialize, Serialize};

use crate::domain::outcome::TestVerdict;

// ---------------------------------------------------------------------
// UB classifier
// ---------------------------------------------------------------------

/// Tri-state signal: a boolean that may be undetermined because its
/// prerequisite probe failed. Scoring must never treat `Unknown` as either
/// `true` or `false` -- an unset signal contributes zero weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    True,
    False,
    Unknown,
}

impl Signal {
    pub fn from_bool(b: bool) -> Self {
        if b {
            Signal::True
        } else {
            Signal::False
        }
    }
}

/// The three signals the UB classifier gathers (spec §4.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UbSignals {
    pub ubsan_clean: Signal,
    pub opt_sensitive: Signal,
    pub multi_compiler_differs: Signal,
    /// Strong variant of the cross-compiler signal: one compiler crashes
    /// at runtime while the other succeeds, rather than merely differing
    /// stdouts.
    pub multi_compiler_crash_asymmetry: Signal,
}

impl UbSignals {
    pub fn all_unknown() -> Self {
        Self {
            ubsan_clean: Signal::Unknown,
            opt_sensitive: Signal::Unknown,
            multi_compiler_differs: Signal::Unknown,
            multi_compiler_crash_asymmetry: Signal::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UbVerdict {
    CompilerBug,
    UserUb,
    Inconclusive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UbFinding {
    pub verdict: UbVerdict,
    pub confidence: f64,
    pub signals: UbSignals,
    /// Raw stderr excerpt from the sanitizer run, kept for the renderer
    /// even when the `runtime error:` marker wasn't found (e.g. a sanitizer
    /// abort under `UBSAN_OPTIONS=halt_on_error=0`, spec §9 open question).
    pub sanitizer_stderr_excerpt: Option<String>,
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------
// Version bisector
// ---------------------------------------------------------------------

/// A tested (or about-to-be-tested) version, identified by both its index
/// in the input list and its human-readable version string, so a
/// persisted finding is self-contained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRef {
    pub index: usize,
    pub version: String,
}

/// One genuine compile+test attempt recorded by the version bisector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionAttempt {
    pub index: usize,
    pub version: String,
    pub verdict: TestVerdict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Unavailable,
    Diagnostic,
}

/// One skipped probe: no evidence gathered, search boundaries unmoved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionSkip {
    pub index: usize,
    pub version: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionVerdict {
    Bisected,
    AllPass,
    AllFail,
    DiagnosticErrors,
    InsufficientCompilers,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionFinding {
    pub verdict: VersionVerdict,
    pub first_bad: Option<VersionRef>,
    pub last_good: Option<VersionRef>,
    pub attempts: Vec<VersionAttempt>,
    pub skips: Vec<VersionSkip>,
}

impl VersionFinding {
    /// Property 1 (bisector monotonicity) and property 2 (skip neutrality)
    /// expressed as a runtime check, used by the orchestrator to refuse to
    /// hand a broken finding downstream and by the test suite to assert
    /// the invariant on example findings.
    pub fn is_internally_consistent(&self) -> bool {
        match self.verdict {
            VersionVerdict::Bisected => {
                let (Some(last_good), Some(first_bad)) = (&self.last_good, &self.first_bad) else {
                    return false;
                };
                if last_good.index >= first_bad.index {
                    return false;
                }
                let tested_between = self
                    .attempts
                    .iter()
                    .any(|a| a.index > last_good.index && a.index < first_bad.index);
                !tested_between
            }
            _ => true,
        }
    }
}

// ---------------------------------------------------------------------
// Pass bisector
// ---------------------------------------------------------------------

/// One probe in the pass bisector: compiling with a prefix of the
/// optimization pipeline and judging the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassAttempt {
    pub prefix_len: usize,
    pub verdict: TestVerdict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassVerdict {
    Bisected,
    BaselineFails,
    FullPasses,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassFinding {
    pub verdict: PassVerdict,
    pub culprit_name: Option<String>,
    pub culprit_index: Option<usize>,
    pub last_good_index: Option<usize>,
    pub pipeline: Vec<String>,
    pub attempts: Vec<PassAttempt>,
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------
// Assembled diagnosis
// ---------------------------------------------------------------------

/// One stage's finding, tagged so the persisted document can carry a
/// heterogeneous `per_stage` list without losing which stage produced
/// which record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageFinding {
    Ub(UbFinding),
    Version(VersionFinding),
    Pass(PassFinding),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallVerdict {
    CompilerBug,
    UserUb,
    Inconclusive,
    /// A stage reached a first-class non-bug outcome (`all_pass`,
    /// `baseline_fails`, `full_passes`, ...) that ends the pipeline short
    /// of a bisected culprit.
    Partial,
    Cancelled,
    Error,
}

/// The assembled output of one diagnosis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnosis {
    pub reproducer_ref: String,
    pub per_stage: Vec<StageFinding>,
    pub overall_verdict: OverallVerdict,
    pub recommendation_text: String,
    pub reason: Option<String>,
}

impl Diagnosis {
    pub fn ub_finding(&self) -> Option<&UbFinding> {
        self.per_stage.iter().find_map(|s| match s {
            StageFinding::Ub(f) => Some(f),
            _ => None,
        })
    }

    pub fn version_finding(&self) -> Option<&VersionFinding> {
        self.per_stage.iter().find_map(|s| match s {
            StageFinding::Version(f) => Some(f),
            _ => None,
        })
    }

    pub fn pass_finding(&self) -> Option<&PassFinding> {
        self.per_stage.iter().find_map(|s| match s {
            StageFinding::Pass(f) => Some(f),
            _ => None,
        })
    }
}
