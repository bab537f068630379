//! diagcore
//!
//! A miscompilation diagnosis engine: given a reproducer and a bug
//! definition, decides whether a failure is undefined behavior in user code
//! or a genuine compiler defect, and if the latter, bisects it down to a
//! compiler version and then to a single optimization pass.
//!
//! The three stages -- [`stages::UbClassifier`], [`stages::VersionBisector`],
//! and [`stages::PassBisector`] -- each operate independently and are also
//! composed end-to-end by [`orchestrator::Orchestrator`].

pub mod cancel;
pub mod compile;
pub mod config;
pub mod domain;
pub mod ingest;
pub mod oracle;
pub mod orchestrator;
pub mod pipeline;
pub mod provider;
pub mod runner;
pub mod stages;
pub mod testcmd;

pub use cancel::CancellationToken;
pub use compile::CompileStep;
pub use config::EngineConfig;
pub use domain::error::{DiagnosisError, Result};
pub use domain::finding::{Diagnosis, OverallVerdict};
pub use domain::outcome::{CompileOutcome, TestVerdict};
pub use domain::reproducer::{Language, OptimizationLevel, Reproducer};
pub use domain::toolchain::{CompilerFamily, Resolution, ToolchainHandle};
pub use oracle::{ArgvTestOracle, ExitCodeOracle, ExpectedOutputOracle, PredicateOracle, TestOracle};
pub use orchestrator::{FullPipelineRequest, Orchestrator};
pub use provider::ToolchainProvider;
pub use stages::{PassBisector, UbClassifier, VersionBisector};

/// diagcore version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
