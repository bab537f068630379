//! Exercises `UbClassifier` against a fake compiler whose sanitizer build
//! reports a `runtime error:` marker, covering the UB short-circuit
//! scenario: the classifier alone should call it `user_ub` at low
//! confidence, with no bisector ever invoked downstream (verified at the
//! orchestrator level in `full_pipeline.rs`).

mod support;

use std::sync::Arc;

use diagcore::domain::finding::UbVerdict;
use diagcore::domain::toolchain::Resolution;
use diagcore::{CompilerFamily, EngineConfig, ExitCodeOracle, Language, OptimizationLevel, Reproducer, ToolchainHandle, UbClassifier};

use support::{fake_compiler, sample_source};

fn reproducer(source: &std::path::Path) -> Reproducer {
    Reproducer::new(source.to_path_buf(), Language::C, OptimizationLevel::O0, Arc::new(ExitCodeOracle::new()))
}

fn handle(executable: std::path::PathBuf) -> ToolchainHandle {
    ToolchainHandle {
        family: CompilerFamily::Clang,
        version: "17".to_string(),
        resolution: Resolution::Local { executable },
    }
}

#[tokio::test]
async fn a_sanitizer_runtime_error_short_circuits_to_user_ub() {
    let bin_dir = tempfile::tempdir().unwrap();
    let compiler = fake_compiler(bin_dir.path(), "clang-17");

    let work = tempfile::tempdir().unwrap();
    let source = sample_source(work.path());
    let config = EngineConfig::default();
    let classifier = UbClassifier::new(&config);

    let finding = classifier.classify(&reproducer(&source), &handle(compiler), None, work.path()).await;

    assert_eq!(finding.verdict, UbVerdict::UserUb);
    assert!(finding.confidence <= config.ub_weights.user_ub_threshold);
    assert!(finding
        .sanitizer_stderr_excerpt
        .as_ref()
        .is_some_and(|excerpt| excerpt.contains("runtime error:")));
}
