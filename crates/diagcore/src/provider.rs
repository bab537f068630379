//! Resolves a version token to a concrete [`ToolchainHandle`].

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{ContainerRuntime, EngineConfig};
use crate::domain::toolchain::{CompilerFamily, Resolution, ToolchainHandle};

/// Resolution policy (spec §4.1):
/// 1. Probe `compiler-V`, then `compiler-major`. First hit wins.
/// 2. If a container runtime is configured, probe for image `family:major`.
/// 3. Otherwise `Unavailable`. A plain unversioned `compiler` executable
///    never satisfies a versioned request.
pub struct ToolchainProvider<'a> {
    config: &'a EngineConfig,
}

impl<'a> ToolchainProvider<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Resolve `family` at `version` to a handle, or `None` if neither a
    /// local executable nor (when permitted) a container image can be
    /// found.
    pub async fn resolve(&self, family: CompilerFamily, version: &str) -> Option<ToolchainHandle> {
        if let Some(executable) = Self::probe_local(family, version) {
            debug!(?family, version, path = %executable.display(), "resolved local toolchain");
            return Some(ToolchainHandle {
                family,
                version: version.to_string(),
                resolution: Resolution::Local { executable },
            });
        }

        if let Some(runtime) = self.config.container_runtime {
            if let Some(image) = Self::probe_container(runtime, family, version).await {
                debug!(?family, version, image, "resolved containerized toolchain");
                return Some(ToolchainHandle {
                    family,
                    version: version.to_string(),
                    resolution: Resolution::Containerized { image, runtime },
                });
            }
        }

        warn!(?family, version, "toolchain unavailable");
        None
    }

    /// Try `{stem}-{version}` then `{stem}-{major}`. Never falls back to a
    /// bare `{stem}` -- that would silently substitute an unrelated
    /// version.
    fn probe_local(family: CompilerFamily, version: &str) -> Option<PathBuf> {
        let stem = family.executable_stem();
        let major = version.split('.').next().unwrap_or(version);

        for candidate in [format!("{stem}-{version}"), format!("{stem}-{major}")] {
            if let Ok(path) = which::which(&candidate) {
                return Some(path);
            }
        }
        None
    }

    /// Reports availability based on image presence, pulling under a bounded
    /// timeout when the image isn't already present locally (spec §4.1 step
    /// 2). The pull itself is serialized behind a process-wide mutex so
    /// concurrent diagnoses don't race each other pulling the same tag (spec
    /// §5's shared-resource policy) -- the image is re-checked after the
    /// mutex is acquired in case a diagnosis ahead of us already finished.
    async fn probe_container(runtime: ContainerRuntime, family: CompilerFamily, version: &str) -> Option<String> {
        let major = version.split('.').next().unwrap_or(version);
        let image = format!("{}:{}", family.executable_stem(), major);

        if Self::image_present(runtime, &image).await {
            return Some(image);
        }

        let _guard = pull_mutex().lock().await;
        if Self::image_present(runtime, &image).await {
            return Some(image);
        }

        info!(image, runtime = runtime.binary_name(), "pulling container image");
        let pulled = tokio::time::timeout(
            Duration::from_secs(300),
            tokio::process::Command::new(runtime.binary_name())
                .args(["pull", &image])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status(),
        )
        .await;

        match pulled {
            Ok(Ok(status)) if status.success() => Some(image),
            Ok(Ok(status)) => {
                warn!(image, code = ?status.code(), "container image pull failed");
                None
            }
            Ok(Err(err)) => {
                warn!(image, error = %err, "container runtime spawn failed during pull");
                None
            }
            Err(_elapsed) => {
                warn!(image, "container image pull timed out");
                None
            }
        }
    }

    async fn image_present(runtime: ContainerRuntime, image: &str) -> bool {
        let status = tokio::time::timeout(
            Duration::from_secs(30),
            tokio::process::Command::new(runtime.binary_name())
                .args(["image", "inspect", image])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status(),
        )
        .await;
        matches!(status, Ok(Ok(status)) if status.success())
    }

    /// For auxiliary tools (optimizer driver, code generator): the
    /// versioned executable is tried first; the unversioned one is
    /// accepted only when it is absent *and* the caller explicitly allows
    /// the fallback -- pass bisection proceeds at the caller's own risk
    /// (spec §4.1, §9 open question on mismatched toolchains).
    pub fn resolve_auxiliary(stem: &str, version: &str, allow_fallback: bool) -> Option<PathBuf> {
        let major = version.split('.').next().unwrap_or(version);
        for candidate in [format!("{stem}-{version}"), format!("{stem}-{major}")] {
            if let Ok(path) = which::which(&candidate) {
                return Some(path);
            }
        }
        if allow_fallback {
            which::which(stem).ok()
        } else {
            None
        }
    }
}

/// Serializes container image pulls across every diagnosis running in this
/// process -- the cross-diagnosis mutex spec §5 calls for.
fn pull_mutex() -> &'static Mutex<()> {
    static PULL_MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
    PULL_MUTEX.get_or_init(|| Mutex::new(()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_local_never_accepts_bare_stem_for_a_versioned_request() {
        // `which("clang-999999")` and `which("clang-999999999")` must both
        // fail; a real `clang` on the test machine's PATH must not leak in.
        let found = ToolchainProvider::probe_local(CompilerFamily::Clang, "999999.0.0");
        assert!(found.is_none());
    }

    #[test]
    fn resolve_auxiliary_without_fallback_refuses_bare_stem() {
        let found = ToolchainProvider::resolve_auxiliary("opt", "999999", false);
        assert!(found.is_none());
    }
}
