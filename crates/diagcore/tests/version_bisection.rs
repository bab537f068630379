//! Exercises `VersionBisector` against a fake `clang-N` toolchain ladder
//! reachable only through `PATH`, covering the numbered scenarios for
//! compiler-version regression search.

mod support;

use std::sync::Arc;

use diagcore::{CompilerFamily, EngineConfig, ExitCodeOracle, Language, OptimizationLevel, Reproducer, VersionBisector};

use support::{fake_compiler_always_fail, fake_compiler_always_pass, fake_compiler_ice, sample_source, PathOverride, PATH_LOCK};

fn reproducer(source: &std::path::Path) -> Reproducer {
    Reproducer::new(source.to_path_buf(), Language::C, OptimizationLevel::O2, Arc::new(ExitCodeOracle::new()))
}

#[tokio::test]
async fn regression_at_a_known_version_bisects_to_it() {
    let _guard = PATH_LOCK.lock().unwrap();
    let bin_dir = tempfile::tempdir().unwrap();
    let _path = PathOverride::prepend(bin_dir.path());

    // v1..v3 pass, v4..v6 fail.
    for v in ["1", "2", "3"] {
        fake_compiler_always_pass(bin_dir.path(), &format!("clang-{v}"));
    }
    for v in ["4", "5", "6"] {
        fake_compiler_always_fail(bin_dir.path(), &format!("clang-{v}"));
    }

    let work = tempfile::tempdir().unwrap();
    let source = sample_source(work.path());
    let config = EngineConfig::default();
    let bisector = VersionBisector::new(&config);
    let versions: Vec<String> = ["1", "2", "3", "4", "5", "6"].map(String::from).to_vec();

    let finding = bisector
        .bisect(&reproducer(&source), CompilerFamily::Clang, &versions, &["-O2".to_string()], work.path())
        .await;

    assert!(finding.is_internally_consistent());
    assert_eq!(finding.verdict, diagcore::domain::finding::VersionVerdict::Bisected);
    assert_eq!(finding.first_bad.as_ref().unwrap().version, "4");
    assert_eq!(finding.last_good.as_ref().unwrap().version, "3");
    assert!(finding.attempts.len() <= 4);
}

#[tokio::test]
async fn unavailable_versions_are_skipped_not_attempted() {
    let _guard = PATH_LOCK.lock().unwrap();
    let bin_dir = tempfile::tempdir().unwrap();
    let _path = PathOverride::prepend(bin_dir.path());

    // Same underlying truth as above (v1-v3 pass, v4-v6 fail), but v3 and
    // v4 are never installed.
    fake_compiler_always_pass(bin_dir.path(), "clang-1");
    fake_compiler_always_pass(bin_dir.path(), "clang-2");
    fake_compiler_always_fail(bin_dir.path(), "clang-5");
    fake_compiler_always_fail(bin_dir.path(), "clang-6");

    let work = tempfile::tempdir().unwrap();
    let source = sample_source(work.path());
    let config = EngineConfig::default();
    let bisector = VersionBisector::new(&config);
    let versions: Vec<String> = ["1", "2", "3", "4", "5", "6"].map(String::from).to_vec();

    let finding = bisector
        .bisect(&reproducer(&source), CompilerFamily::Clang, &versions, &["-O2".to_string()], work.path())
        .await;

    assert!(finding.is_internally_consistent());
    assert_eq!(finding.verdict, diagcore::domain::finding::VersionVerdict::Bisected);
    assert_eq!(finding.last_good.as_ref().unwrap().version, "2");
    assert_eq!(finding.first_bad.as_ref().unwrap().version, "5");
    assert!(finding.skips.iter().any(|s| s.version == "3"));
    assert!(finding.skips.iter().any(|s| s.version == "4"));
    assert!(!finding.attempts.iter().any(|a| a.version == "3" || a.version == "4"));
}

#[tokio::test]
async fn every_available_compiler_passing_reports_all_pass() {
    let _guard = PATH_LOCK.lock().unwrap();
    let bin_dir = tempfile::tempdir().unwrap();
    let _path = PathOverride::prepend(bin_dir.path());

    for v in ["1", "2", "3", "4"] {
        fake_compiler_always_pass(bin_dir.path(), &format!("clang-{v}"));
    }

    let work = tempfile::tempdir().unwrap();
    let source = sample_source(work.path());
    let config = EngineConfig::default();
    let bisector = VersionBisector::new(&config);
    let versions: Vec<String> = ["1", "2", "3", "4"].map(String::from).to_vec();

    let finding = bisector
        .bisect(&reproducer(&source), CompilerFamily::Clang, &versions, &["-O2".to_string()], work.path())
        .await;

    assert_eq!(finding.verdict, diagcore::domain::finding::VersionVerdict::AllPass);
    assert!(finding.first_bad.is_none());
    assert_eq!(finding.last_good.as_ref().unwrap().version, "4");
}

#[tokio::test]
async fn an_internal_compiler_error_counts_as_an_attempt_not_a_skip() {
    let _guard = PATH_LOCK.lock().unwrap();
    let bin_dir = tempfile::tempdir().unwrap();
    let _path = PathOverride::prepend(bin_dir.path());

    // Kept to a 3-version ladder so the ICE at v3 is the only failing
    // side the search observes; a passing version *after* an isolated ICE
    // would violate the monotonicity the binary search assumes.
    fake_compiler_always_pass(bin_dir.path(), "clang-1");
    fake_compiler_always_pass(bin_dir.path(), "clang-2");
    fake_compiler_ice(bin_dir.path(), "clang-3");

    let work = tempfile::tempdir().unwrap();
    let source = sample_source(work.path());
    let config = EngineConfig::default();
    let bisector = VersionBisector::new(&config);
    let versions: Vec<String> = ["1", "2", "3"].map(String::from).to_vec();

    let finding = bisector
        .bisect(&reproducer(&source), CompilerFamily::Clang, &versions, &["-O2".to_string()], work.path())
        .await;

    assert_eq!(finding.verdict, diagcore::domain::finding::VersionVerdict::Bisected);
    assert_eq!(finding.first_bad.as_ref().unwrap().version, "3");
    assert_eq!(finding.last_good.as_ref().unwrap().version, "2");
    assert!(finding.attempts.iter().any(|a| a.version == "3"));
    assert!(!finding.skips.iter().any(|s| s.version == "3"));
}
