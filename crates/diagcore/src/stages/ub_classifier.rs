//! Stage 1: classify whether an anomaly is undefined behavior in user code
//! or a compiler bug (spec §4.4).
//!
//! Three independent signals are gathered, each over its own bounded
//! sub-budget, and folded into a confidence score. The classifier never
//! feeds an unset/failed signal into scoring -- an `Unknown` signal
//! contributes zero weight, and a failed baseline short-circuits straight
//! to `inconclusive` at neutral confidence rather than guessing.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::compile::CompileStep;
use crate::config::EngineConfig;
use crate::domain::finding::{Signal, UbFinding, UbSignals, UbVerdict};
use crate::domain::outcome::CompileOutcome;
use crate::domain::reproducer::{OptimizationLevel, Reproducer};
use crate::domain::toolchain::ToolchainHandle;
use crate::runner::{run_capture, RunOutcome};

const MAX_EXCERPT_LINES: usize = 20;
const RUNTIME_ERROR_MARKER: &str = "runtime error:";

pub struct UbClassifier<'a> {
    config: &'a EngineConfig,
    compile: CompileStep<'a>,
}

impl<'a> UbClassifier<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self {
            config,
            compile: CompileStep::new(config),
        }
    }

    /// Classify `reproducer`, compiling under `primary`. `secondary`, when
    /// present, is a toolchain handle from a *different* compiler family
    /// (spec's "two unrelated compiler families") used for the
    /// cross-compiler signal.
    pub async fn classify(
        &self,
        reproducer: &Reproducer,
        primary: &ToolchainHandle,
        secondary: Option<&ToolchainHandle>,
        work_dir: &Path,
    ) -> UbFinding {
        info!(version = %primary.version, "ub classification starting");

        let sanitizer = self.sanitizer_signal(reproducer, primary, work_dir).await;

        let o0_dir = work_dir.join("opt-o0");
        let o0 = self
            .compile
            .compile(
                primary,
                reproducer.source(),
                &[OptimizationLevel::O0.flag().to_string()],
                &o0_dir,
                self.config.default_timeout,
            )
            .await;
        let o0_binary = o0.binary_path().cloned();
        let o0_run = match &o0_binary {
            Some(path) => Some(run_capture(path, &[], &HashMap::new(), reproducer.stdin(), self.config.oracle_timeout).await),
            None => None,
        };

        let baseline_established = o0_run
            .as_ref()
            .is_some_and(|run| matches!(run, RunOutcome::Exited { code: Some(0), .. }));

        if !baseline_established {
            warn!("ub classifier baseline (O0) could not be established; short-circuiting");
            return UbFinding {
                verdict: UbVerdict::Inconclusive,
                confidence: 0.5,
                signals: UbSignals {
                    ubsan_clean: sanitizer.0,
                    opt_sensitive: Signal::Unknown,
                    multi_compiler_differs: Signal::Unknown,
                    multi_compiler_crash_asymmetry: Signal::Unknown,
                },
                sanitizer_stderr_excerpt: sanitizer.1,
                reason: Some("baseline (O0) compile or run did not succeed".to_string()),
            };
        }

        let opt_sensitive = self
            .opt_sensitivity_signal(reproducer, primary, &o0_run.unwrap(), work_dir)
            .await;

        let (cross_differs, cross_crash) = match secondary {
            Some(secondary) => self.cross_compiler_signal(reproducer, primary, secondary, work_dir).await,
            None => (Signal::Unknown, Signal::Unknown),
        };

        let signals = UbSignals {
            ubsan_clean: sanitizer.0,
            opt_sensitive,
            multi_compiler_differs: cross_differs,
            multi_compiler_crash_asymmetry: cross_crash,
        };

        let confidence = self.score(&signals);
        let verdict = if confidence >= self.config.ub_weights.compiler_bug_threshold {
            UbVerdict::CompilerBug
        } else if confidence <= self.config.ub_weights.user_ub_threshold {
            UbVerdict::UserUb
        } else {
            UbVerdict::Inconclusive
        };

        info!(?verdict, confidence, "ub classification complete");

        UbFinding {
            verdict,
            confidence,
            signals,
            sanitizer_stderr_excerpt: sanitizer.1,
            reason: None,
        }
    }

    /// `ubsan_clean = true` iff the sanitized binary runs to completion
    /// without the `runtime error:` marker on stderr. A failed sanitizer
    /// compile yields `Unknown`, never `clean`.
    async fn sanitizer_signal(
        &self,
        reproducer: &Reproducer,
        handle: &ToolchainHandle,
        work_dir: &Path,
    ) -> (Signal, Option<String>) {
        let dir = work_dir.join("sanitizer");
        let outcome = self
            .compile
            .compile(
                handle,
                reproducer.source(),
                &["-fsanitize=undefined".to_string(), "-O0".to_string()],
                &dir,
                self.config.default_timeout,
            )
            .await;

        let Some(binary) = outcome.binary_path().cloned() else {
            debug!("sanitizer compile did not produce a binary; signal unknown");
            return (Signal::Unknown, sanitizer_compile_excerpt(&outcome));
        };

        let mut env = HashMap::new();
        env.insert("UBSAN_OPTIONS".to_string(), "print_stacktrace=1".to_string());

        match run_capture(&binary, &[], &env, reproducer.stdin(), self.config.oracle_timeout).await {
            RunOutcome::Exited { stderr, .. } => {
                let stderr = String::from_utf8_lossy(&stderr).to_string();
                let clean = !stderr.contains(RUNTIME_ERROR_MARKER);
                (Signal::from_bool(clean), Some(truncate_excerpt(&stderr)))
            }
            RunOutcome::Timeout | RunOutcome::SpawnFailed => (Signal::Unknown, None),
        }
    }

    /// `opt_sensitive`, computed against an already-established O0 baseline.
    async fn opt_sensitivity_signal(
        &self,
        reproducer: &Reproducer,
        handle: &ToolchainHandle,
        o0_run: &RunOutcome,
        work_dir: &Path,
    ) -> Signal {
        let o2_dir = work_dir.join("opt-o2");
        let o2 = self
            .compile
            .compile(
                handle,
                reproducer.source(),
                &[OptimizationLevel::O2.flag().to_string()],
                &o2_dir,
                self.config.default_timeout,
            )
            .await;
        let o2_run = match o2.binary_path() {
            Some(path) => Some(run_capture(path, &[], &HashMap::new(), reproducer.stdin(), self.config.oracle_timeout).await),
            None => None,
        };

        if let Some(expected) = &reproducer.expected_output {
            let o0_matches = matches!(o0_run, RunOutcome::Exited { stdout, .. } if stdout == expected);
            if !o0_matches {
                return Signal::False;
            }
            let o2_diverges = match (&o2, &o2_run) {
                (CompileOutcome::InternalError { .. }, _) => true,
                (_, None) => true, // O2 failed to compile (Diagnostic/Unavailable/Timeout-at-compile)
                (_, Some(RunOutcome::Timeout)) => true,
                (_, Some(RunOutcome::SpawnFailed)) => true,
                (_, Some(RunOutcome::Exited { stdout, .. })) => stdout != expected,
            };
            Signal::from_bool(o2_diverges)
        } else {
            match (o0_run, o2_run) {
                (
                    RunOutcome::Exited { stdout: a, .. },
                    Some(RunOutcome::Exited { stdout: b, .. }),
                ) => Signal::from_bool(a != &b),
                _ => Signal::False,
            }
        }
    }

    /// Cross-compiler signal: compile at O2 with `primary` and `secondary`.
    /// Compile failures on either side are *not* a signal (front-end
    /// differences aren't optimizer bugs).
    async fn cross_compiler_signal(
        &self,
        reproducer: &Reproducer,
        primary: &ToolchainHandle,
        secondary: &ToolchainHandle,
        work_dir: &Path,
    ) -> (Signal, Signal) {
        let flags = vec![OptimizationLevel::O2.flag().to_string()];
        let a_dir = work_dir.join("cross-a");
        let b_dir = work_dir.join("cross-b");

        let a = self
            .compile
            .compile(primary, reproducer.source(), &flags, &a_dir, self.config.default_timeout)
            .await;
        let b = self
            .compile
            .compile(secondary, reproducer.source(), &flags, &b_dir, self.config.default_timeout)
            .await;

        let (Some(a_bin), Some(b_bin)) = (a.binary_path(), b.binary_path()) else {
            debug!("cross-compiler signal skipped: one side failed to compile");
            return (Signal::Unknown, Signal::Unknown);
        };

        let a_run = run_capture(a_bin, &[], &HashMap::new(), reproducer.stdin(), self.config.oracle_timeout).await;
        let b_run = run_capture(b_bin, &[], &HashMap::new(), reproducer.stdin(), self.config.oracle_timeout).await;

        match (&a_run, &b_run) {
            (RunOutcome::Exited { code: ac, stdout: a_out, .. }, RunOutcome::Exited { code: bc, stdout: b_out, .. }) => {
                let a_ok = *ac == Some(0);
                let b_ok = *bc == Some(0);
                if a_ok != b_ok {
                    (Signal::Unknown, Signal::True)
                } else if a_ok && b_ok {
                    (Signal::from_bool(a_out != b_out), Signal::False)
                } else {
                    // both crash: not the asymmetric case, no reliable signal
                    (Signal::Unknown, Signal::Unknown)
                }
            }
            _ => (Signal::Unknown, Signal::Unknown),
        }
    }

    fn score(&self, signals: &UbSignals) -> f64 {
        let w = &self.config.ub_weights;
        let mut confidence = 0.5;

        confidence += match signals.ubsan_clean {
            Signal::True => w.sanitizer_clean,
            Signal::False => w.sanitizer_triggered,
            Signal::Unknown => 0.0,
        };
        if signals.opt_sensitive == Signal::True {
            confidence += w.opt_sensitive;
        }
        if signals.multi_compiler_differs == Signal::True {
            confidence += w.cross_compiler_differs;
        }
        if signals.multi_compiler_crash_asymmetry == Signal::True {
            confidence += w.cross_compiler_crash_asymmetry;
        }

        confidence.clamp(0.0, 1.0)
    }
}

fn sanitizer_compile_excerpt(outcome: &CompileOutcome) -> Option<String> {
    match outcome {
        CompileOutcome::InternalError { stderr } | CompileOutcome::Diagnostic { stderr } => {
            Some(truncate_excerpt(stderr))
        }
        _ => None,
    }
}

fn truncate_excerpt(text: &str) -> String {
    text.lines().take(MAX_EXCERPT_LINES).collect::<Vec<_>>().join("\n")
}
