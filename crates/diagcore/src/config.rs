//! Engine-wide configuration, constructed once and passed by value through
//! the engine.
//!
//! Replaces the original implementation's module-level globals
//! (`DEFAULT_VERSIONS`, `severity_weights`, ICE-marker strings): there is no
//! process-wide singleton here, only a value every stage borrows.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::report::CheckType;
use crate::domain::toolchain::CompilerFamily;

/// Confidence weights for the six signals the UB classifier can observe
/// (spec §4.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UbWeights {
    pub sanitizer_clean: f64,
    pub sanitizer_triggered: f64,
    pub opt_sensitive: f64,
    pub cross_compiler_differs: f64,
    pub cross_compiler_crash_asymmetry: f64,
    /// Verdict threshold: confidence >= this => `compiler_bug`.
    pub compiler_bug_threshold: f64,
    /// Verdict threshold: confidence <= this => `user_ub`.
    pub user_ub_threshold: f64,
}

impl Default for UbWeights {
    fn default() -> Self {
        Self {
            sanitizer_clean: 0.3,
            sanitizer_triggered: -0.4,
            opt_sensitive: 0.2,
            cross_compiler_differs: 0.15,
            cross_compiler_crash_asymmetry: 0.25,
            compiler_bug_threshold: 0.6,
            user_ub_threshold: 0.3,
        }
    }
}

/// Which container runtime (if any) is permitted for step 2 of the
/// toolchain resolution policy (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerRuntime {
    Docker,
    Podman,
}

impl ContainerRuntime {
    pub fn binary_name(&self) -> &'static str {
        match self {
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::Podman => "podman",
        }
    }
}

/// The default, load-bearing ICE signatures from spec §4.2. Matched as
/// plain substrings against compiler stderr.
pub fn default_ice_signatures() -> Vec<String> {
    [
        "Internal compiler error",
        "PLEASE submit a bug report",
        "Assertion failed",
        "Assertion `",
        "Stack dump:",
        "UNREACHABLE executed",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_severity_weights() -> HashMap<CheckType, f64> {
    use CheckType::*;
    [
        (ArithmeticOverflow, 1.0),
        (UnreachableCodeExecuted, 1.5),
        (DivisionByZero, 1.2),
        (PureFunctionInconsistency, 1.0),
        (SignConversion, 0.8),
        (BoundsViolation, 1.3),
        (LoopBoundExceeded, 0.9),
    ]
    .into_iter()
    .collect()
}

fn default_recency_buckets() -> Vec<(Duration, f64)> {
    vec![
        (Duration::from_secs(24 * 3600), 1.0),
        (Duration::from_secs(72 * 3600), 0.9),
        (Duration::from_secs(168 * 3600), 0.7),
    ]
}

/// Replaces the original implementation's module-level `DEFAULT_VERSIONS`
/// global (spec §9 Design Notes): an ascending per-family version ladder
/// CLI entry points fall back to when the caller doesn't name an explicit
/// version list, and that `resolve_default_handle`-style helpers probe from
/// newest to oldest to find whatever is actually installed.
fn default_version_ladder() -> HashMap<CompilerFamily, Vec<String>> {
    use CompilerFamily::*;
    [
        (Clang, ["14", "15", "16", "17", "18"].map(String::from).to_vec()),
        (Gcc, ["11", "12", "13", "14"].map(String::from).to_vec()),
    ]
    .into_iter()
    .collect()
}

/// Engine-wide configuration. Constructed once (by the CLI, or by an
/// embedder) and threaded by reference through every stage -- no stage
/// mutates it and no stage reads ambient global state instead.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub ice_signatures: Vec<String>,
    pub ub_weights: UbWeights,
    pub severity_weights: HashMap<CheckType, f64>,
    /// Ascending `(max_age, factor)` ladder; ages past the last bucket fall
    /// through to `recency_else_factor`.
    pub recency_buckets: Vec<(Duration, f64)>,
    pub recency_else_factor: f64,
    pub default_timeout: Duration,
    pub oracle_timeout: Duration,
    pub allow_unversioned_fallback: bool,
    pub container_runtime: Option<ContainerRuntime>,
    pub compiler_families: Vec<CompilerFamily>,
    /// Ascending per-family version ladder consulted by CLI entry points
    /// that weren't given an explicit version (or version list) to test.
    pub default_versions: HashMap<CompilerFamily, Vec<String>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ice_signatures: default_ice_signatures(),
            ub_weights: UbWeights::default(),
            severity_weights: default_severity_weights(),
            recency_buckets: default_recency_buckets(),
            recency_else_factor: 0.5,
            default_timeout: Duration::from_secs(30),
            oracle_timeout: Duration::from_secs(10),
            allow_unversioned_fallback: false,
            container_runtime: None,
            compiler_families: vec![CompilerFamily::Clang, CompilerFamily::Gcc],
            default_versions: default_version_ladder(),
        }
    }
}

/// On-disk override layer loaded from an optional `--config` TOML file and
/// merged onto [`EngineConfig::default`]. Only the handful of settings that
/// make sense to tune without a recompile are exposed here; the rest
/// (weights, buckets) keep their literal spec defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfigOverrides {
    pub default_timeout_secs: Option<u64>,
    pub oracle_timeout_secs: Option<u64>,
    pub allow_unversioned_fallback: Option<bool>,
    pub container_runtime: Option<ContainerRuntime>,
}

impl EngineConfig {
    pub fn with_overrides(mut self, overrides: EngineConfigOverrides) -> Self {
        if let Some(secs) = overrides.default_timeout_secs {
            self.default_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = overrides.oracle_timeout_secs {
            self.oracle_timeout = Duration::from_secs(secs);
        }
        if let Some(allow) = overrides.allow_unversioned_fallback {
            self.allow_unversioned_fallback = allow;
        }
        if overrides.container_runtime.is_some() {
            self.container_runtime = overrides.container_runtime;
        }
        self
    }
}
