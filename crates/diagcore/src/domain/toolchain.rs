//! Toolchain resolution: mapping a version token to a concrete,
//! version-pinned invocation.

use std::path::PathBuf;

/// Compiler family. Used to pick "two unrelated compiler families" for the
/// UB classifier's cross-compiler signal (spec §4.4) and to tag
/// [`ToolchainHandle`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompilerFamily {
    Clang,
    Gcc,
}

impl CompilerFamily {
    /// The executable name stem this family is probed under, e.g.
    /// `clang-17` for `Clang` at version `17`.
    pub fn executable_stem(&self) -> &'static str {
        match self {
            CompilerFamily::Clang => "clang",
            CompilerFamily::Gcc => "gcc",
        }
    }
}

/// How a [`ToolchainHandle`] was realized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A versioned executable found on `PATH`, e.g. `clang-17`.
    Local { executable: PathBuf },
    /// A container image tag that can be (or has been) pulled, plus the
    /// runtime it was resolved through -- compiling under the handle shells
    /// out to that same runtime rather than guessing one.
    Containerized { image: String, runtime: crate::config::ContainerRuntime },
}

/// Opaque reference to a compiler+opt+codegen triple, tagged by a canonical
/// version (major.minor.patch or major-only).
///
/// Every invocation routed through a handle executes exactly the version it
/// was resolved for. Handles never silently promote to an unrelated version
/// -- falling back to an unversioned tool when a specific version was
/// requested is a correctness bug (spec §4.1, property P5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainHandle {
    pub family: CompilerFamily,
    pub version: String,
    pub resolution: Resolution,
}

impl ToolchainHandle {
    pub fn major_version(&self) -> &str {
        self.version.split('.').next().unwrap_or(&self.version)
    }

    pub fn executable(&self) -> Option<&PathBuf> {
        match &self.resolution {
            Resolution::Local { executable } => Some(executable),
            Resolution::Containerized { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn major_version_splits_on_dot() {
        let handle = ToolchainHandle {
            family: CompilerFamily::Clang,
            version: "17.0.6".to_string(),
            resolution: Resolution::Local {
                executable: PathBuf::from("/usr/bin/clang-17"),
            },
        };
        assert_eq!(handle.major_version(), "17");
    }

    #[test]
    fn major_version_only_token_passes_through() {
        let handle = ToolchainHandle {
            family: CompilerFamily::Gcc,
            version: "13".to_string(),
            resolution: Resolution::Containerized {
                image: "gcc:13".to_string(),
                runtime: crate::config::ContainerRuntime::Docker,
            },
        };
        assert_eq!(handle.major_version(), "13");
        assert!(handle.executable().is_none());
    }
}
