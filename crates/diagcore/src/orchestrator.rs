//! Sequences the three diagnostic stages and assembles the final
//! [`Diagnosis`] (spec §4.7).
//!
//! State machine: three states `{Ub, Version, Pass}` plus a terminal
//! `Done`. Transitions are monotonic forward -- the orchestrator never
//! retries a stage, and never passes data backward to an earlier one.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::domain::finding::{Diagnosis, OverallVerdict, PassVerdict, StageFinding, UbVerdict, VersionVerdict};
use crate::domain::reproducer::{OptimizationLevel, Reproducer};
use crate::domain::toolchain::{CompilerFamily, ToolchainHandle};
use crate::provider::ToolchainProvider;
use crate::stages::{PassBisector, UbClassifier, VersionBisector};

/// Everything the orchestrator needs to drive one end-to-end diagnosis,
/// gathered up front so each stage can be spawned onto its own task.
pub struct FullPipelineRequest {
    pub reproducer: Reproducer,
    pub ub_primary: ToolchainHandle,
    pub ub_secondary: Option<ToolchainHandle>,
    pub version_family: CompilerFamily,
    pub versions: Vec<String>,
    pub version_flags: Vec<String>,
    pub pass_opt_level: OptimizationLevel,
    pub work_dir: PathBuf,
}

enum StageOutcome<T> {
    Done(T),
    Panicked(String),
    Cancelled,
}

pub struct Orchestrator {
    config: Arc<EngineConfig>,
}

impl Orchestrator {
    pub fn new(config: EngineConfig) -> Self {
        Self { config: Arc::new(config) }
    }

    pub async fn run(&self, request: FullPipelineRequest, cancel: CancellationToken) -> Diagnosis {
        let reproducer_ref = request.reproducer.source().display().to_string();
        let mut per_stage: Vec<StageFinding> = Vec::new();

        // --- Stage: UB classification --------------------------------------
        let ub_finding = {
            let config = Arc::clone(&self.config);
            let reproducer = request.reproducer.clone();
            let primary = request.ub_primary.clone();
            let secondary = request.ub_secondary.clone();
            let work_dir = request.work_dir.join("ub");
            let fut = async move {
                let classifier = UbClassifier::new(&config);
                classifier.classify(&reproducer, &primary, secondary.as_ref(), &work_dir).await
            };
            match run_stage(fut, &cancel).await {
                StageOutcome::Done(finding) => finding,
                StageOutcome::Panicked(reason) => return error_diagnosis(reproducer_ref, per_stage, reason),
                StageOutcome::Cancelled => return cancelled_diagnosis(reproducer_ref, per_stage),
            }
        };

        let ub_verdict = ub_finding.verdict;
        per_stage.push(StageFinding::Ub(ub_finding));
        info!(?ub_verdict, "ub stage complete");

        match ub_verdict {
            UbVerdict::UserUb => {
                return Diagnosis {
                    reproducer_ref,
                    per_stage,
                    overall_verdict: OverallVerdict::UserUb,
                    recommendation_text: recommend_user_ub(),
                    reason: None,
                };
            }
            UbVerdict::Inconclusive => {
                return Diagnosis {
                    reproducer_ref,
                    per_stage,
                    overall_verdict: OverallVerdict::Inconclusive,
                    recommendation_text: recommend_inconclusive(),
                    reason: None,
                };
            }
            UbVerdict::CompilerBug => {}
        }

        // --- Stage: version bisection ---------------------------------------
        let version_finding = {
            let config = Arc::clone(&self.config);
            let reproducer = request.reproducer.clone();
            let family = request.version_family;
            let versions = request.versions.clone();
            let flags = request.version_flags.clone();
            let work_dir = request.work_dir.join("version");
            let fut = async move {
                let bisector = VersionBisector::new(&config);
                bisector.bisect(&reproducer, family, &versions, &flags, &work_dir).await
            };
            match run_stage(fut, &cancel).await {
                StageOutcome::Done(finding) => finding,
                StageOutcome::Panicked(reason) => return error_diagnosis(reproducer_ref, per_stage, reason),
                StageOutcome::Cancelled => return cancelled_diagnosis(reproducer_ref, per_stage),
            }
        };

        if !version_finding.is_internally_consistent() {
            error!("version finding failed its own internal-consistency check");
            per_stage.push(StageFinding::Version(version_finding));
            return Diagnosis {
                reproducer_ref,
                per_stage,
                overall_verdict: OverallVerdict::Error,
                recommendation_text: "internal invariant violated".to_string(),
                reason: Some("version finding violated the monotonicity invariant".to_string()),
            };
        }

        let version_verdict = version_finding.verdict;
        let first_bad = version_finding.first_bad.clone();
        per_stage.push(StageFinding::Version(version_finding));
        info!(?version_verdict, "version stage complete");

        if version_verdict != VersionVerdict::Bisected {
            let overall = if version_verdict == VersionVerdict::Error {
                OverallVerdict::Error
            } else {
                OverallVerdict::Partial
            };
            return Diagnosis {
                reproducer_ref,
                per_stage,
                overall_verdict: overall,
                recommendation_text: recommend_version(version_verdict),
                reason: None,
            };
        }

        let Some(first_bad) = first_bad else {
            return error_diagnosis(
                reproducer_ref,
                per_stage,
                "bisected verdict carried no first_bad index".to_string(),
            );
        };

        let provider = ToolchainProvider::new(&self.config);
        let Some(first_bad_handle) = provider.resolve(request.version_family, &first_bad.version).await else {
            warn!(version = %first_bad.version, "could not re-resolve the bisected first_bad toolchain");
            return error_diagnosis(
                reproducer_ref,
                per_stage,
                format!("first_bad toolchain {} vanished before pass bisection", first_bad.version),
            );
        };

        // --- Stage: pass bisection, pinned to first_bad_handle --------------
        let pass_finding = {
            let config = Arc::clone(&self.config);
            let reproducer = request.reproducer.clone();
            let opt_level = request.pass_opt_level;
            let work_dir = request.work_dir.join("pass");
            let fut = async move {
                let bisector = PassBisector::new(&config);
                bisector.bisect(&reproducer, &first_bad_handle, opt_level, &work_dir).await
            };
            match run_stage(fut, &cancel).await {
                StageOutcome::Done(finding) => finding,
                StageOutcome::Panicked(reason) => return error_diagnosis(reproducer_ref, per_stage, reason),
                StageOutcome::Cancelled => return cancelled_diagnosis(reproducer_ref, per_stage),
            }
        };

        let pass_verdict = pass_finding.verdict;
        per_stage.push(StageFinding::Pass(pass_finding));
        info!(?pass_verdict, "pass stage complete");

        let overall_verdict = match pass_verdict {
            PassVerdict::Bisected => OverallVerdict::CompilerBug,
            PassVerdict::BaselineFails | PassVerdict::FullPasses => OverallVerdict::Partial,
            PassVerdict::Error => OverallVerdict::Error,
        };

        Diagnosis {
            reproducer_ref,
            per_stage,
            overall_verdict,
            recommendation_text: recommend_pass(pass_verdict),
            reason: None,
        }
    }
}

/// Spawns `fut` onto its own task and races it against cancellation. A
/// panic inside the stage surfaces as `Panicked` rather than unwinding
/// through the orchestrator; cancellation aborts the task outright.
async fn run_stage<T>(fut: impl std::future::Future<Output = T> + Send + 'static, cancel: &CancellationToken) -> StageOutcome<T>
where
    T: Send + 'static,
{
    let handle = tokio::spawn(fut);
    tokio::select! {
        joined = handle => match joined {
            Ok(value) => StageOutcome::Done(value),
            Err(join_err) if join_err.is_cancelled() => StageOutcome::Cancelled,
            Err(join_err) => StageOutcome::Panicked(format!("stage task panicked: {join_err}")),
        },
        _ = cancel.cancelled() => StageOutcome::Cancelled,
    }
}

fn error_diagnosis(reproducer_ref: String, per_stage: Vec<StageFinding>, reason: String) -> Diagnosis {
    Diagnosis {
        reproducer_ref,
        per_stage,
        overall_verdict: OverallVerdict::Error,
        recommendation_text: "the engine could not complete diagnosis".to_string(),
        reason: Some(reason),
    }
}

fn cancelled_diagnosis(reproducer_ref: String, per_stage: Vec<StageFinding>) -> Diagnosis {
    Diagnosis {
        reproducer_ref,
        per_stage,
        overall_verdict: OverallVerdict::Cancelled,
        recommendation_text: "diagnosis was cancelled before completion".to_string(),
        reason: None,
    }
}

fn recommend_user_ub() -> String {
    "The sanitizer and/or cross-compiler signals point to undefined behavior in the \
     reproducer itself, not a compiler defect. Review the ubsan stderr excerpt before \
     filing a compiler bug."
        .to_string()
}

fn recommend_inconclusive() -> String {
    "Signals were insufficient to distinguish a compiler bug from user UB. Consider \
     supplying an expected-output oracle or a second compiler family to sharpen the \
     cross-compiler signal."
        .to_string()
}

fn recommend_version(verdict: VersionVerdict) -> String {
    match verdict {
        VersionVerdict::AllPass => "No available compiler version reproduces the failure.".to_string(),
        VersionVerdict::AllFail => {
            "Every available compiler version reproduces the failure; the regression predates \
             the oldest version tested."
                .to_string()
        }
        VersionVerdict::DiagnosticErrors => {
            "Every probed version rejected the reproducer outright; this looks like an \
             actionable front-end issue in the reproducer, not a version regression."
                .to_string()
        }
        VersionVerdict::InsufficientCompilers => {
            "No requested compiler version could be resolved locally or via container image."
                .to_string()
        }
        VersionVerdict::Error | VersionVerdict::Bisected => String::new(),
    }
}

fn recommend_pass(verdict: PassVerdict) -> String {
    match verdict {
        PassVerdict::Bisected => {
            "Bisection identified the culprit optimization pass. Try disabling it via the \
             compiler's pass-skip flag to confirm, then file the regression against that pass."
                .to_string()
        }
        PassVerdict::BaselineFails => {
            "The unoptimized baseline already fails; this is not an optimizer regression -- \
             likely user UB or a code-generation issue independent of the optimizer."
                .to_string()
        }
        PassVerdict::FullPasses => {
            "The full pipeline passes under this configuration; the bug does not reproduce \
             here."
                .to_string()
        }
        PassVerdict::Error => "Pass bisection could not proceed; see the finding's reason.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_stage_reports_cancellation_distinctly_from_panic() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = run_stage(
            async {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                42
            },
            &cancel,
        )
        .await;
        assert!(matches!(outcome, StageOutcome::Cancelled));
    }

    #[tokio::test]
    async fn run_stage_returns_done_on_normal_completion() {
        let cancel = CancellationToken::new();
        let outcome = run_stage(async { 7 }, &cancel).await;
        assert!(matches!(outcome, StageOutcome::Done(7)));
    }

    #[tokio::test]
    async fn run_stage_converts_panics_to_panicked_outcome() {
        let cancel = CancellationToken::new();
        let outcome = run_stage(
            async {
                panic!("boom");
                #[allow(unreachable_code)]
                0
            },
            &cancel,
        )
        .await;
        assert!(matches!(outcome, StageOutcome::Panicked(_)));
    }
}
