//! Domain models for the diagnosis engine.
//!
//! Canonical definitions for the core entities the engine passes between
//! stages:
//! - [`reproducer`]: the immutable input bundle the orchestrator owns
//! - [`toolchain`]: version-pinned compiler handles
//! - [`outcome`]: the two sum types (`CompileOutcome`, `TestVerdict`) that
//!   replace the original implementation's overloaded tri-state booleans
//! - [`finding`]: per-stage result records and the assembled `Diagnosis`
//! - [`report`]: the ingest-side `AnomalyReport` shape the core reads when
//!   driving diagnosis from a stored report

pub mod error;
pub mod finding;
pub mod outcome;
pub mod report;
pub mod reproducer;
pub mod toolchain;

pub use error::{DiagnosisError, Result};
pub use finding::{
    Diagnosis, OverallVerdict, PassFinding, PassVerdict, StageFinding, UbFinding, UbSignals,
    UbVerdict, VersionFinding, VersionVerdict,
};
pub use outcome::{CompileOutcome, TestVerdict};
pub use report::{AnomalyReport, BuildInfo, CheckType, CompilerId, Location};
pub use reproducer::{Language, OptimizationLevel, Reproducer};
pub use toolchain::{CompilerFamily, Resolution, ToolchainHandle};
