//! Single compiler invocation: the black-box boundary between the engine
//! and an external toolchain.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{ContainerRuntime, EngineConfig};
use crate::domain::outcome::CompileOutcome;
use crate::domain::toolchain::{Resolution, ToolchainHandle};

/// Invokes one toolchain on one input with one flag vector.
pub struct CompileStep<'a> {
    config: &'a EngineConfig,
}

impl<'a> CompileStep<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Compile `source` under `handle` with `flags`, writing the artifact
    /// into `out_dir`, bounded by `timeout`.
    pub async fn compile(
        &self,
        handle: &ToolchainHandle,
        source: &Path,
        flags: &[String],
        out_dir: &Path,
        timeout: Duration,
    ) -> CompileOutcome {
        if let Err(err) = std::fs::create_dir_all(out_dir) {
            warn!(error = %err, "failed to create compile output directory");
            return CompileOutcome::Unavailable;
        }

        match &handle.resolution {
            Resolution::Local { executable } => {
                self.compile_local(handle, executable, source, flags, out_dir, timeout).await
            }
            Resolution::Containerized { image, runtime } => {
                self.compile_containerized(handle, *runtime, image, source, flags, out_dir, timeout).await
            }
        }
    }

    async fn compile_local(
        &self,
        handle: &ToolchainHandle,
        executable: &Path,
        source: &Path,
        flags: &[String],
        out_dir: &Path,
        timeout: Duration,
    ) -> CompileOutcome {
        let out_path = out_dir.join("a.out");

        let mut cmd = tokio::process::Command::new(executable);
        cmd.arg(source)
            .args(flags)
            .arg("-o")
            .arg(&out_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(error = %err, executable = %executable.display(), "compiler spawn failed");
                return CompileOutcome::Unavailable;
            }
        };
        let pid = child.id();

        let waited = tokio::time::timeout(timeout, child.wait_with_output()).await;

        let output = match waited {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                warn!(error = %err, "compiler process I/O error");
                return CompileOutcome::Unavailable;
            }
            Err(_elapsed) => {
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                return CompileOutcome::Timeout;
            }
        };

        if output.status.success() {
            return CompileOutcome::Binary {
                path: out_path,
                produced_under: handle.clone(),
            };
        }

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if self.matches_ice_signature(&stderr) {
            debug!(version = %handle.version, "compiler internal error detected");
            CompileOutcome::InternalError { stderr }
        } else {
            CompileOutcome::Diagnostic { stderr }
        }
    }

    /// Runs the compiler inside `image` via `{docker,podman} run`, bind-mounting
    /// the source's directory read-only at `/src` and the output directory at
    /// `/out` so the produced artifact lands back on the host at the same
    /// `out_dir.join("a.out")` path a local compile would use.
    async fn compile_containerized(
        &self,
        handle: &ToolchainHandle,
        runtime: ContainerRuntime,
        image: &str,
        source: &Path,
        flags: &[String],
        out_dir: &Path,
        timeout: Duration,
    ) -> CompileOutcome {
        let Some(source_dir) = source.parent().filter(|p| !p.as_os_str().is_empty()) else {
            warn!("source path has no parent directory to mount");
            return CompileOutcome::Unavailable;
        };
        let Some(source_name) = source.file_name().and_then(|n| n.to_str()) else {
            warn!("source path has no utf-8 file name");
            return CompileOutcome::Unavailable;
        };

        let out_path = out_dir.join("a.out");
        let stem = handle.family.executable_stem();

        let mut cmd = tokio::process::Command::new(runtime.binary_name());
        cmd.arg("run")
            .arg("--rm")
            .arg("-v")
            .arg(format!("{}:/src:ro", source_dir.display()))
            .arg("-v")
            .arg(format!("{}:/out", out_dir.display()))
            .arg(image)
            .arg(stem)
            .arg(format!("/src/{source_name}"))
            .args(flags)
            .arg("-o")
            .arg("/out/a.out")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(error = %err, runtime = runtime.binary_name(), "container launcher spawn failed");
                return CompileOutcome::Unavailable;
            }
        };
        let pid = child.id();

        let waited = tokio::time::timeout(timeout, child.wait_with_output()).await;

        let output = match waited {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                warn!(error = %err, "container launcher I/O error");
                return CompileOutcome::Unavailable;
            }
            Err(_elapsed) => {
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                return CompileOutcome::Timeout;
            }
        };

        if output.status.success() {
            return CompileOutcome::Binary {
                path: out_path,
                produced_under: handle.clone(),
            };
        }

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if self.matches_ice_signature(&stderr) {
            debug!(version = %handle.version, "compiler internal error detected");
            CompileOutcome::InternalError { stderr }
        } else {
            CompileOutcome::Diagnostic { stderr }
        }
    }

    fn matches_ice_signature(&self, stderr: &str) -> bool {
        self.config
            .ice_signatures
            .iter()
            .any(|sig| stderr.contains(sig.as_str()))
    }
}

/// Signals an entire process group rather than just the direct child: a
/// compiler may fork an integrated assembler or an LTO worker, and those
/// must not outlive the timeout either.
#[cfg(unix)]
pub(crate) fn kill_process_group(pid: u32) {
    let _ = std::process::Command::new("kill")
        .args(["-KILL", &format!("-{pid}")])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

#[cfg(not(unix))]
pub(crate) fn kill_process_group(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::toolchain::CompilerFamily;
    use std::time::Duration as StdDuration;

    fn sh_handle() -> ToolchainHandle {
        ToolchainHandle {
            family: CompilerFamily::Clang,
            version: "0".to_string(),
            resolution: Resolution::Local {
                executable: which::which("true").unwrap_or_else(|_| "/bin/true".into()),
            },
        }
    }

    #[tokio::test]
    async fn ice_signature_matching_is_substring_based() {
        let config = EngineConfig::default();
        let step = CompileStep::new(&config);
        assert!(step.matches_ice_signature("clang: PLEASE submit a bug report to..."));
        assert!(!step.matches_ice_signature("error: use of undeclared identifier 'x'"));
    }

    #[tokio::test]
    async fn a_containerized_compile_with_an_unmountable_source_path_is_unavailable() {
        // A bare relative filename has no parent directory to bind-mount at
        // `/src`; the container path refuses rather than guessing one, the
        // same way the local path refuses on an unreadable executable.
        let config = EngineConfig::default();
        let step = CompileStep::new(&config);
        let tmp = tempfile::tempdir().unwrap();
        let handle = ToolchainHandle {
            family: CompilerFamily::Clang,
            version: "999".to_string(),
            resolution: Resolution::Containerized {
                image: "clang:999".to_string(),
                runtime: crate::config::ContainerRuntime::Docker,
            },
        };
        let outcome = step
            .compile(&handle, Path::new("repro.c"), &[], tmp.path(), StdDuration::from_secs(1))
            .await;
        assert!(matches!(outcome, CompileOutcome::Unavailable));
    }

    #[tokio::test]
    async fn spawn_failure_on_a_nonexistent_executable_is_unavailable() {
        let config = EngineConfig::default();
        let step = CompileStep::new(&config);
        let tmp = tempfile::tempdir().unwrap();
        let handle = ToolchainHandle {
            family: CompilerFamily::Clang,
            version: "0".to_string(),
            resolution: Resolution::Local {
                executable: "/nonexistent/compiler-binary".into(),
            },
        };
        let outcome = step
            .compile(&handle, Path::new("repro.c"), &[], tmp.path(), StdDuration::from_secs(1))
            .await;
        assert!(matches!(outcome, CompileOutcome::Unavailable));
        let _ = sh_handle();
    }
}
