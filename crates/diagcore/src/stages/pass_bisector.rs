//! Stage 3: bisect the optimization-pass pipeline of a specific compiler
//! version to find the shortest pipeline prefix whose application produces
//! a failing binary (spec §4.6).
//!
//! Always runs against the `first_bad` handle identified by the version
//! bisector -- bisecting with a different compiler's pass pipeline would be
//! meaningless, since pipelines are both version- and source-dependent.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::compile::{kill_process_group, CompileStep};
use crate::config::EngineConfig;
use crate::domain::finding::{PassAttempt, PassFinding, PassVerdict};
use crate::domain::outcome::TestVerdict;
use crate::domain::reproducer::{OptimizationLevel, Reproducer};
use crate::domain::toolchain::ToolchainHandle;
use crate::pipeline::extract_pipeline;
use crate::provider::ToolchainProvider;

pub struct PassBisector<'a> {
    config: &'a EngineConfig,
    compile: CompileStep<'a>,
}

impl<'a> PassBisector<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self {
            config,
            compile: CompileStep::new(config),
        }
    }

    pub async fn bisect(
        &self,
        reproducer: &Reproducer,
        handle: &ToolchainHandle,
        opt_level: OptimizationLevel,
        work_dir: &Path,
    ) -> PassFinding {
        info!(version = %handle.version, ?opt_level, "pass bisection starting");

        let Some(optimizer_driver) =
            ToolchainProvider::resolve_auxiliary("opt", &handle.version, self.config.allow_unversioned_fallback)
        else {
            warn!("optimizer driver unavailable for this version; refusing to bisect with a mismatched toolchain");
            return error_finding("mismatched_toolchain: no version-matched optimizer driver available");
        };

        let ir_dir = work_dir.join("ir");
        let Some(baseline_ir) = self.emit_ir(handle, reproducer.source(), &ir_dir).await else {
            return error_finding("failed to emit unoptimized intermediate representation");
        };

        let Some(pipeline) =
            extract_pipeline(&optimizer_driver, &baseline_ir, opt_level.flag(), self.config.default_timeout).await
        else {
            return error_finding("optimizer driver did not produce a non-empty pipeline dump");
        };
        debug!(len = pipeline.len(), "extracted optimization pipeline");

        let n = pipeline.len();
        let mut attempts = Vec::new();

        // --- Bookends ---------------------------------------------------
        let baseline_dir = work_dir.join("prefix-0");
        let baseline_outcome = self
            .compile
            .compile(
                handle,
                reproducer.source(),
                &[OptimizationLevel::O0.flag().to_string()],
                &baseline_dir,
                self.config.default_timeout,
            )
            .await;
        let baseline_verdict = match baseline_outcome.binary_path() {
            Some(path) => reproducer.oracle.judge(path, self.config.oracle_timeout).await,
            None => TestVerdict::Failed,
        };
        attempts.push(PassAttempt { prefix_len: 0, verdict: baseline_verdict });

        if baseline_verdict.is_failing_side() {
            info!("baseline (prefix 0) already fails the oracle; aborting pass bisection");
            return PassFinding {
                verdict: PassVerdict::BaselineFails,
                culprit_name: None,
                culprit_index: None,
                last_good_index: None,
                pipeline,
                attempts,
                reason: None,
            };
        }

        let full_dir = work_dir.join(format!("prefix-{n}"));
        let full_outcome = self
            .compile
            .compile(handle, reproducer.source(), &[opt_level.flag().to_string()], &full_dir, self.config.default_timeout)
            .await;
        let full_verdict = match full_outcome.binary_path() {
            Some(path) => reproducer.oracle.judge(path, self.config.oracle_timeout).await,
            None => TestVerdict::Failed,
        };
        attempts.push(PassAttempt { prefix_len: n, verdict: full_verdict });

        if full_verdict.is_passed() {
            info!("full pipeline (prefix {n}) passes the oracle; bug does not reproduce here");
            return PassFinding {
                verdict: PassVerdict::FullPasses,
                culprit_name: None,
                culprit_index: None,
                last_good_index: None,
                pipeline,
                attempts,
                reason: None,
            };
        }

        // --- Prefix bisection --------------------------------------------
        let mut lo = 0usize;
        let mut hi = n;

        while hi > lo + 1 {
            let mid = lo + (hi - lo) / 2;
            let verdict = self
                .probe_prefix(handle, &optimizer_driver, &baseline_ir, &pipeline, mid, reproducer, work_dir)
                .await;
            attempts.push(PassAttempt { prefix_len: mid, verdict });
            if verdict.is_passed() {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        let culprit_name = pipeline.get(lo).cloned();
        info!(culprit_index = lo, ?culprit_name, "pass bisection complete");

        PassFinding {
            verdict: PassVerdict::Bisected,
            culprit_name,
            culprit_index: Some(lo),
            last_good_index: Some(lo),
            pipeline,
            attempts,
            reason: None,
        }
    }

    /// Emit unoptimized LLVM IR for `source` under `handle`. This is the
    /// substrate both pipeline extraction and every interior prefix probe
    /// run against.
    async fn emit_ir(&self, handle: &ToolchainHandle, source: &Path, out_dir: &Path) -> Option<PathBuf> {
        let Some(executable) = handle.executable() else {
            return None;
        };
        if std::fs::create_dir_all(out_dir).is_err() {
            return None;
        }
        let ir_path = out_dir.join("baseline.ll");

        let mut cmd = tokio::process::Command::new(executable);
        cmd.arg(source)
            .arg("-O0")
            .arg("-emit-llvm")
            .arg("-S")
            .arg("-o")
            .arg(&ir_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.config.default_timeout, cmd.output()).await.ok()?.ok()?;
        if output.status.success() && ir_path.exists() {
            Some(ir_path)
        } else {
            None
        }
    }

    /// Run the optimizer driver with `pipeline[0..prefix_len]`, then hand the
    /// optimized IR to the code generator (the same compiler executable) to
    /// produce a binary, then judge it.
    #[allow(clippy::too_many_arguments)]
    async fn probe_prefix(
        &self,
        handle: &ToolchainHandle,
        optimizer_driver: &Path,
        baseline_ir: &Path,
        pipeline: &[String],
        prefix_len: usize,
        reproducer: &Reproducer,
        work_dir: &Path,
    ) -> TestVerdict {
        let probe_dir = work_dir.join(format!("prefix-{prefix_len}"));
        if std::fs::create_dir_all(&probe_dir).is_err() {
            return TestVerdict::Failed;
        }

        let optimized_ir = probe_dir.join("optimized.ll");
        let passes = pipeline[..prefix_len].join(",");

        let mut opt_cmd = tokio::process::Command::new(optimizer_driver);
        opt_cmd
            .arg(baseline_ir)
            .arg(format!("-passes={passes}"))
            .arg("-S")
            .arg("-o")
            .arg(&optimized_ir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let opt_output = match tokio::time::timeout(self.config.default_timeout, opt_cmd.output()).await {
            Ok(Ok(output)) => output,
            _ => return TestVerdict::Failed,
        };
        if !opt_output.status.success() || !optimized_ir.exists() {
            // Pass-dependency violation or other optimizer rejection:
            // conservative -- the bug manifests earlier than this broken
            // configuration.
            debug!(prefix_len, "optimizer driver rejected this prefix");
            return TestVerdict::Failed;
        }

        let Some(executable) = handle.executable() else {
            return TestVerdict::Failed;
        };
        let binary_path = probe_dir.join("a.out");
        let mut codegen_cmd = tokio::process::Command::new(executable);
        codegen_cmd
            .arg(&optimized_ir)
            .arg("-O0")
            .arg("-o")
            .arg(&binary_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            codegen_cmd.process_group(0);
        }

        let mut child = match codegen_cmd.spawn() {
            Ok(child) => child,
            Err(_) => return TestVerdict::Failed,
        };
        let pid = child.id();
        let codegen_output = match tokio::time::timeout(self.config.default_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(_)) => return TestVerdict::Failed,
            Err(_elapsed) => {
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                return TestVerdict::Timeout;
            }
        };
        if !codegen_output.status.success() {
            return TestVerdict::Failed;
        }

        reproducer.oracle.judge(&binary_path, self.config.oracle_timeout).await
    }
}

fn error_finding(reason: &str) -> PassFinding {
    PassFinding {
        verdict: PassVerdict::Error,
        culprit_name: None,
        culprit_index: None,
        last_good_index: None,
        pipeline: Vec::new(),
        attempts: Vec::new(),
        reason: Some(reason.to_string()),
    }
}
