//! The anomaly-report wire format (spec §6).
//!
//! The ingest service owns storage, deduplication, and priority queuing of
//! these reports; the core only reads a single report at a time when
//! driving diagnosis from a live report (`analyze-report`). The dedup key
//! and priority math are reproduced here because the evaluation harness and
//! the ingest service's own tests both depend on the core's definition
//! being the single source of truth (spec §3 property 6).

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    ArithmeticOverflow,
    UnreachableCodeExecuted,
    DivisionByZero,
    PureFunctionInconsistency,
    SignConversion,
    BoundsViolation,
    LoopBoundExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompilerName {
    Clang,
    Gcc,
    Msvc,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerId {
    pub name: CompilerName,
    pub version: String,
    pub target: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub function: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptLevelToken {
    O0,
    O1,
    O2,
    O3,
    Os,
    Oz,
    #[serde(rename = "unknown")]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildInfo {
    pub optimization_level: OptLevelToken,
    #[serde(default)]
    pub flags: Option<Vec<String>>,
    #[serde(default)]
    pub source_hash: Option<String>,
    #[serde(default)]
    pub binary_checksum: Option<String>,
}

/// A runtime anomaly report, as emitted by the instrumented-production-code
/// collaborator. The core treats it as read-only input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub report_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub check_type: CheckType,
    pub location: Location,
    pub compiler: CompilerId,
    pub build_info: BuildInfo,
    #[serde(default)]
    pub pc: Option<String>,
    #[serde(default)]
    pub stacktrace: Option<Vec<String>>,
    #[serde(default)]
    pub check_details: Option<serde_json::Value>,
    #[serde(default)]
    pub system_info: Option<serde_json::Value>,
}

impl AnomalyReport {
    /// `(file, line, function-or-call-site-id, check_type, compiler_version,
    /// sorted_flags)` -- two reports with an equal key are the same bug.
    /// Flags are sorted first so `-O2 -Wall` and `-Wall -O2` collide (a
    /// detail recovered from the original implementation, see SPEC_FULL.md
    /// §E.4).
    pub fn dedup_key(&self) -> String {
        let mut flags = self.build_info.flags.clone().unwrap_or_default();
        flags.sort();
        format!(
            "{}|{}|{}|{:?}|{}|{}",
            self.location.file,
            self.location.line,
            self.location.function,
            self.check_type,
            self.compiler.version,
            flags.join(","),
        )
    }
}

/// Computes `frequency * severity_weight[check_type] * recency_factor(age)`.
///
/// `recency_buckets` is an ascending ladder of `(max_age, factor)` pairs
/// (e.g. `[(24h, 1.0), (72h, 0.9), (168h, 0.7)]`); any age past the last
/// bucket falls through to `else_factor`.
pub fn priority_score(
    frequency: u64,
    severity_weight: f64,
    age: Duration,
    recency_buckets: &[(Duration, f64)],
    else_factor: f64,
) -> f64 {
    let recency = recency_buckets
        .iter()
        .find(|(max_age, _)| age < *max_age)
        .map(|(_, factor)| *factor)
        .unwrap_or(else_factor);
    frequency as f64 * severity_weight * recency
}
