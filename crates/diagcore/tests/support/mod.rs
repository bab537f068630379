//! Shared scaffolding for the integration suite: a fake toolchain good
//! enough to drive the bisectors' search logic without a real `clang` or
//! `gcc` on the test machine.
//!
//! Every "compiler" here is a `/bin/sh` script satisfying the same
//! contract `CompileStep`/`emit_ir`/`probe_prefix` drive a real compiler
//! through: the last argument is always the `-o <path>` target, and
//! success means writing an executable (or, for the optimizer driver, a
//! pipeline listing on stdout) to that target.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Serializes the handful of tests that mutate the process-wide `PATH`
/// so toolchain discovery (`which`) sees a consistent view.
pub static PATH_LOCK: Mutex<()> = Mutex::new(());

/// Restores the previous `PATH` on drop, even if the test panics.
pub struct PathOverride {
    original: Option<String>,
}

impl PathOverride {
    /// Prepends `dir` to `PATH` for the lifetime of the returned guard.
    pub fn prepend(dir: &Path) -> Self {
        let original = std::env::var("PATH").ok();
        let joined = match &original {
            Some(existing) => format!("{}:{}", dir.display(), existing),
            None => dir.display().to_string(),
        };
        std::env::set_var("PATH", joined);
        Self { original }
    }
}

impl Drop for PathOverride {
    fn drop(&mut self) {
        match &self.original {
            Some(value) => std::env::set_var("PATH", value),
            None => std::env::remove_var("PATH"),
        }
    }
}

#[cfg(unix)]
fn write_executable(path: &Path, contents: &str) {
    std::fs::write(path, contents).expect("writing fake toolchain script");
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).expect("chmod fake toolchain script");
}

/// A compiler stand-in: writes a tiny self-identifying executable to
/// whatever path it is asked to emit (the final `-o <path>` / IR / binary
/// target), regardless of which compile step invoked it. The `-fsanitize=`
/// flag toggles between "clean" and "ubsan-triggered" output so the UB
/// classifier's sanitizer signal can be exercised.
#[cfg(unix)]
pub fn fake_compiler(dir: &Path, name: &str) -> PathBuf {
    std::fs::create_dir_all(dir).expect("creating fake toolchain dir");
    let path = dir.join(name);
    write_executable(
        &path,
        r#"#!/bin/sh
out=""
sanitize=0
for arg in "$@"; do
  case "$arg" in
    -fsanitize=*) sanitize=1 ;;
  esac
  out="$arg"
done
if [ "$sanitize" = "1" ]; then
  printf '#!/bin/sh\necho "runtime error: detected undefined behavior" 1>&2\nexit 1\n' > "$out"
else
  printf '#!/bin/sh\necho ok\nexit 0\n' > "$out"
fi
chmod +x "$out"
exit 0
"#,
    );
    path
}

/// A compiler stand-in whose produced binary always exits 0 (passes the
/// default exit-code oracle).
#[cfg(unix)]
pub fn fake_compiler_always_pass(dir: &Path, name: &str) -> PathBuf {
    std::fs::create_dir_all(dir).expect("creating fake toolchain dir");
    let path = dir.join(name);
    write_executable(
        &path,
        r#"#!/bin/sh
out=""
for arg in "$@"; do out="$arg"; done
printf '#!/bin/sh\nexit 0\n' > "$out"
chmod +x "$out"
exit 0
"#,
    );
    path
}

/// A compiler stand-in whose produced binary always exits 1 (fails the
/// default exit-code oracle), though the compile step itself succeeds.
#[cfg(unix)]
pub fn fake_compiler_always_fail(dir: &Path, name: &str) -> PathBuf {
    std::fs::create_dir_all(dir).expect("creating fake toolchain dir");
    let path = dir.join(name);
    write_executable(
        &path,
        r#"#!/bin/sh
out=""
for arg in "$@"; do out="$arg"; done
printf '#!/bin/sh\nexit 1\n' > "$out"
chmod +x "$out"
exit 0
"#,
    );
    path
}

/// A compiler stand-in that rejects everything as an internal compiler
/// error, matching one of `default_ice_signatures()`.
#[cfg(unix)]
pub fn fake_compiler_ice(dir: &Path, name: &str) -> PathBuf {
    std::fs::create_dir_all(dir).expect("creating fake toolchain dir");
    let path = dir.join(name);
    write_executable(
        &path,
        r#"#!/bin/sh
echo "clang: PLEASE submit a bug report to the vendor" 1>&2
exit 1
"#,
    );
    path
}

/// A compiler stand-in that sleeps well past any test's patience before
/// doing anything, so a pre-cancelled token is guaranteed to win the race
/// against the stage that invokes it.
#[cfg(unix)]
pub fn fake_compiler_slow(dir: &Path, name: &str) -> PathBuf {
    std::fs::create_dir_all(dir).expect("creating fake toolchain dir");
    let path = dir.join(name);
    write_executable(
        &path,
        r#"#!/bin/sh
sleep 5
out=""
for arg in "$@"; do out="$arg"; done
printf '#!/bin/sh\nexit 0\n' > "$out"
chmod +x "$out"
exit 0
"#,
    );
    path
}

/// An optimizer-driver stand-in: prints a fixed, non-empty pass pipeline
/// to stdout regardless of its arguments, satisfying
/// `pipeline::extract_pipeline`'s only requirements.
#[cfg(unix)]
pub fn fake_optimizer_driver(dir: &Path, name: &str) -> PathBuf {
    std::fs::create_dir_all(dir).expect("creating fake toolchain dir");
    let path = dir.join(name);
    write_executable(
        &path,
        r#"#!/bin/sh
echo "instcombine,simplifycfg,gvn"
exit 0
"#,
    );
    path
}

/// Writes `source.c` (a body is irrelevant to every fake compiler above,
/// but `CompileStep` reads the path for its own bookkeeping) into `dir`.
pub fn sample_source(dir: &Path) -> PathBuf {
    let path = dir.join("repro.c");
    std::fs::write(&path, "int main(void) { return 0; }\n").expect("writing sample reproducer source");
    path
}
