//! `diagctl`: command-line front end for the miscompilation diagnosis engine
//! (spec §6).
//!
//! Five subcommands, each a thin driver over one or more `diagcore` stages.
//! Per the engine's error-handling design (spec §7): a bad argument or an
//! unreadable input is an *input error* -- printed to stderr, exit code 1,
//! nothing on stdout. Everything else, including an environment gap like
//! "no compiler available", is a first-class diagnosis -- a JSON document
//! on stdout, exit code 0. stderr otherwise carries human-readable
//! `tracing` progress; stdout is reserved for the final result block.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};

use diagcore::config::{EngineConfig, EngineConfigOverrides};
use diagcore::domain::report::{AnomalyReport, CompilerName};
use diagcore::ingest::{synthesize_reproducer_source, SynthesisOutcome};
use diagcore::oracle::{ArgvTestOracle, ExitCodeOracle, ExpectedOutputOracle, TestOracle};
use diagcore::orchestrator::{FullPipelineRequest, Orchestrator};
use diagcore::provider::ToolchainProvider;
use diagcore::stages::{PassBisector, UbClassifier, VersionBisector};
use diagcore::{CancellationToken, CompilerFamily, Language, OptimizationLevel, Reproducer, ToolchainHandle};

#[derive(Parser)]
#[command(name = "diagctl")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Diagnose miscompilations: UB classification, compiler-version bisection, pass bisection", long_about = None)]
struct Cli {
    /// Emit debug-level progress on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit stderr progress as JSON lines instead of plain text
    #[arg(long, global = true)]
    json: bool,

    /// Optional TOML file overriding a handful of EngineConfig settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a reproducer as undefined behavior or a compiler bug (spec §4.4).
    UbDetect {
        source: PathBuf,
        /// Bytes fed to the reproducer's stdin across every probe
        #[arg(long)]
        test_input: Option<String>,
        /// Expected stdout; compared byte-exactly at each optimization level
        #[arg(long)]
        expected_output: Option<String>,
        /// Primary compiler family to classify under
        #[arg(long, value_enum, default_value = "clang")]
        compiler: CompilerFamilyArg,
        /// Specific version to use instead of the newest one found on PATH
        #[arg(long)]
        version: Option<String>,
    },

    /// Bisect an ordered list of compiler versions (spec §4.5).
    VersionBisect {
        source: PathBuf,
        /// Template containing the literal token `{binary}`
        test_command: String,
        #[arg(long, value_enum, default_value = "o2")]
        optimization_level: OptLevelArg,
        #[arg(long, value_enum, default_value = "clang")]
        compiler: CompilerFamilyArg,
        /// Override the configured version ladder, ascending release order
        #[arg(long, value_delimiter = ',')]
        versions: Vec<String>,
    },

    /// Bisect the optimization-pass pipeline of one compiler version (spec §4.6).
    PassBisect {
        source: PathBuf,
        test_command: String,
        #[arg(long, value_enum, default_value = "o2")]
        optimization_level: OptLevelArg,
        #[arg(long, value_enum, default_value = "clang")]
        compiler: CompilerFamilyArg,
        /// Defaults to the newest version of `--compiler` found on PATH
        #[arg(long)]
        compiler_version: Option<String>,
    },

    /// Drive UB classification from a stored anomaly report (spec §6).
    AnalyzeReport { report_json: PathBuf },

    /// Run the full three-stage cascade (spec §4.7).
    FullPipeline {
        source: PathBuf,
        test_command: String,
        #[arg(long, value_enum, default_value = "o2")]
        optimization_level: OptLevelArg,
        #[arg(long)]
        test_input: Option<String>,
        #[arg(long)]
        expected_output: Option<String>,
        #[arg(long, value_enum, default_value = "clang")]
        compiler: CompilerFamilyArg,
        #[arg(long, value_delimiter = ',')]
        versions: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompilerFamilyArg {
    Clang,
    Gcc,
}

impl From<CompilerFamilyArg> for CompilerFamily {
    fn from(value: CompilerFamilyArg) -> Self {
        match value {
            CompilerFamilyArg::Clang => CompilerFamily::Clang,
            CompilerFamilyArg::Gcc => CompilerFamily::Gcc,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OptLevelArg {
    O0,
    O1,
    O2,
    O3,
}

impl From<OptLevelArg> for OptimizationLevel {
    fn from(value: OptLevelArg) -> Self {
        match value {
            OptLevelArg::O0 => OptimizationLevel::O0,
            OptLevelArg::O1 => OptimizationLevel::O1,
            OptLevelArg::O2 => OptimizationLevel::O2,
            OptLevelArg::O3 => OptimizationLevel::O3,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);

    let overrides = load_overrides(cli.config.as_deref())?;
    let config = EngineConfig::default().with_overrides(overrides);

    let result = match cli.command {
        Commands::UbDetect { source, test_input, expected_output, compiler, version } => {
            cmd_ub_detect(&config, &source, test_input.as_deref(), expected_output.as_deref(), compiler.into(), version.as_deref()).await
        }
        Commands::VersionBisect { source, test_command, optimization_level, compiler, versions } => {
            cmd_version_bisect(&config, &source, &test_command, optimization_level.into(), compiler.into(), versions).await
        }
        Commands::PassBisect { source, test_command, optimization_level, compiler, compiler_version } => {
            cmd_pass_bisect(&config, &source, &test_command, optimization_level.into(), compiler.into(), compiler_version.as_deref()).await
        }
        Commands::AnalyzeReport { report_json } => cmd_analyze_report(&config, &report_json).await,
        Commands::FullPipeline { source, test_command, optimization_level, test_input, expected_output, compiler, versions } => {
            cmd_full_pipeline(
                &config,
                &source,
                &test_command,
                optimization_level.into(),
                test_input.as_deref(),
                expected_output.as_deref(),
                compiler.into(),
                versions,
            )
            .await
        }
    }?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_overrides(path: Option<&Path>) -> Result<EngineConfigOverrides> {
    let Some(path) = path else {
        return Ok(EngineConfigOverrides::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
}

fn infer_language(source: &Path) -> Language {
    match source.extension().and_then(|ext| ext.to_str()) {
        Some("cpp") | Some("cc") | Some("cxx") | Some("hpp") | Some("hh") => Language::Cpp,
        _ => Language::C,
    }
}

/// Builds the (source, oracle) bundle every stage operates on. `test_command`
/// takes priority over a plain exit-code oracle; `expected_output` overrides
/// both, matching the spec's implicit oracle-selection precedence (an
/// explicit byte-exact expectation is the strongest bug definition
/// available).
fn build_reproducer(
    source: &Path,
    default_opt: OptimizationLevel,
    test_input: Option<&str>,
    expected_output: Option<&str>,
    test_command: Option<&str>,
) -> Result<Reproducer> {
    if !source.exists() {
        bail!("source file not found: {}", source.display());
    }
    let language = infer_language(source);
    let stdin = test_input.map(|s| s.as_bytes().to_vec());

    let oracle: Arc<dyn TestOracle> = if let Some(expected) = expected_output {
        let bytes = expected.as_bytes().to_vec();
        match &stdin {
            Some(input) => Arc::new(ExpectedOutputOracle::with_stdin(bytes, input.clone())),
            None => Arc::new(ExpectedOutputOracle::new(bytes)),
        }
    } else if let Some(template) = test_command {
        diagcore::testcmd::validate_template(template).context("invalid TEST_COMMAND")?;
        match &stdin {
            Some(input) => Arc::new(ArgvTestOracle::with_stdin(template.to_string(), input.clone())),
            None => Arc::new(ArgvTestOracle::new(template.to_string())),
        }
    } else {
        match &stdin {
            Some(input) => Arc::new(ExitCodeOracle::with_stdin(input.clone())),
            None => Arc::new(ExitCodeOracle::new()),
        }
    };

    let mut reproducer = Reproducer::new(source.to_path_buf(), language, default_opt, oracle);
    if let Some(expected) = expected_output {
        reproducer = reproducer.with_expected_output(expected.as_bytes().to_vec());
    }
    if let Some(input) = stdin {
        reproducer = reproducer.with_stdin_input(input);
    }
    Ok(reproducer)
}

/// Probes a family's configured version ladder from newest to oldest,
/// returning the first one actually resolvable. Used whenever the caller
/// didn't name an exact version -- "use whatever's installed" is the only
/// sane default since spec.md's CLI surface doesn't expose a version flag
/// on every subcommand.
async fn resolve_newest_available(
    provider: &ToolchainProvider<'_>,
    config: &EngineConfig,
    family: CompilerFamily,
) -> Option<ToolchainHandle> {
    let ladder = config.default_versions.get(&family)?;
    for version in ladder.iter().rev() {
        if let Some(handle) = provider.resolve(family, version).await {
            return Some(handle);
        }
    }
    None
}

fn env_gap(stage_key: &str, reason: impl Into<String>) -> Value {
    json!({
        "verdict": "error",
        "reason": reason.into(),
        stage_key: Value::Null,
        "recommendation": "resolve the environment gap (install the requested compiler version, \
            or enable a container runtime) and retry",
    })
}

async fn cmd_ub_detect(
    config: &EngineConfig,
    source: &Path,
    test_input: Option<&str>,
    expected_output: Option<&str>,
    family: CompilerFamily,
    version: Option<&str>,
) -> Result<Value> {
    let reproducer = build_reproducer(source, OptimizationLevel::O0, test_input, expected_output, None)?;
    let provider = ToolchainProvider::new(config);

    let primary = match version {
        Some(v) => provider.resolve(family, v).await,
        None => resolve_newest_available(&provider, config, family).await,
    };
    let Some(primary) = primary else {
        return Ok(env_gap("ub_detection", format!("no usable {family:?} toolchain found")));
    };

    let secondary_family = config.compiler_families.iter().find(|f| **f != family).copied();
    let secondary = match secondary_family {
        Some(f) => resolve_newest_available(&provider, config, f).await,
        None => None,
    };

    let work_dir = tempfile::tempdir().context("creating scratch working directory")?;
    let classifier = UbClassifier::new(config);
    let finding = classifier.classify(&reproducer, &primary, secondary.as_ref(), work_dir.path()).await;

    Ok(json!({
        "verdict": finding.verdict,
        "ub_detection": finding,
        "recommendation": recommend_ub(finding.verdict),
    }))
}

async fn cmd_version_bisect(
    config: &EngineConfig,
    source: &Path,
    test_command: &str,
    opt_level: OptimizationLevel,
    family: CompilerFamily,
    versions_override: Vec<String>,
) -> Result<Value> {
    let reproducer = build_reproducer(source, opt_level, None, None, Some(test_command))?;

    let versions = if versions_override.is_empty() {
        config.default_versions.get(&family).cloned().unwrap_or_default()
    } else {
        versions_override
    };
    if versions.is_empty() {
        bail!("no compiler versions configured for {family:?}; pass --versions");
    }

    let flags = vec![opt_level.flag().to_string()];
    let work_dir = tempfile::tempdir().context("creating scratch working directory")?;
    let bisector = VersionBisector::new(config);
    let finding = bisector.bisect(&reproducer, family, &versions, &flags, work_dir.path()).await;

    Ok(json!({
        "verdict": finding.verdict,
        "version_bisection": finding,
        "recommendation": recommend_version(finding.verdict),
    }))
}

async fn cmd_pass_bisect(
    config: &EngineConfig,
    source: &Path,
    test_command: &str,
    opt_level: OptimizationLevel,
    family: CompilerFamily,
    compiler_version: Option<&str>,
) -> Result<Value> {
    let reproducer = build_reproducer(source, opt_level, None, None, Some(test_command))?;
    let provider = ToolchainProvider::new(config);

    let handle = match compiler_version {
        Some(v) => provider.resolve(family, v).await,
        None => resolve_newest_available(&provider, config, family).await,
    };
    let Some(handle) = handle else {
        return Ok(env_gap("pass_bisection", format!("no usable {family:?} toolchain found")));
    };

    let work_dir = tempfile::tempdir().context("creating scratch working directory")?;
    let bisector = PassBisector::new(config);
    let finding = bisector.bisect(&reproducer, &handle, opt_level, work_dir.path()).await;

    Ok(json!({
        "verdict": finding.verdict,
        "pass_bisection": finding,
        "recommendation": recommend_pass(finding.verdict),
    }))
}

/// `CompilerName::Msvc`/`Unknown` have no `CompilerFamily` counterpart here
/// (spec's family set is the clang/gcc pair used for the cross-compiler
/// signal) -- fall back to the configured default family rather than
/// refusing outright.
fn family_for_report(name: CompilerName, config: &EngineConfig) -> CompilerFamily {
    match name {
        CompilerName::Clang => CompilerFamily::Clang,
        CompilerName::Gcc => CompilerFamily::Gcc,
        CompilerName::Msvc | CompilerName::Unknown => {
            config.compiler_families.first().copied().unwrap_or(CompilerFamily::Clang)
        }
    }
}

async fn cmd_analyze_report(config: &EngineConfig, report_json: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(report_json)
        .with_context(|| format!("reading report {}", report_json.display()))?;
    let report: AnomalyReport = serde_json::from_str(&text).context("malformed anomaly report JSON")?;

    let work_dir = tempfile::tempdir().context("creating scratch working directory")?;
    let synthesis = synthesize_reproducer_source(&report, work_dir.path())?;

    let source = match synthesis {
        SynthesisOutcome::Inconclusive(reason) => {
            return Ok(json!({
                "verdict": "inconclusive",
                "reason": reason,
                "recommendation": "this check_type cannot be synthesized from a report alone; \
                    reproduce from source and rerun ub-detect directly",
            }));
        }
        SynthesisOutcome::Source(path) => path,
    };

    let family = family_for_report(report.compiler.name, config);
    let provider = ToolchainProvider::new(config);
    let primary = match provider.resolve(family, &report.compiler.version).await {
        Some(handle) => handle,
        None => match resolve_newest_available(&provider, config, family).await {
            Some(handle) => handle,
            None => return Ok(env_gap("ub_detection", format!("no usable {family:?} toolchain found"))),
        },
    };

    let secondary_family = config.compiler_families.iter().find(|f| **f != family).copied();
    let secondary = match secondary_family {
        Some(f) => resolve_newest_available(&provider, config, f).await,
        None => None,
    };

    let oracle: Arc<dyn TestOracle> = Arc::new(ExitCodeOracle::new());
    let reproducer = Reproducer::new(source, Language::C, OptimizationLevel::O0, oracle);

    let classifier = UbClassifier::new(config);
    let ub_work_dir = work_dir.path().join("ub");
    let finding = classifier.classify(&reproducer, &primary, secondary.as_ref(), &ub_work_dir).await;

    Ok(json!({
        "verdict": finding.verdict,
        "ub_detection": finding,
        "recommendation": recommend_ub(finding.verdict),
    }))
}

#[allow(clippy::too_many_arguments)]
async fn cmd_full_pipeline(
    config: &EngineConfig,
    source: &Path,
    test_command: &str,
    opt_level: OptimizationLevel,
    test_input: Option<&str>,
    expected_output: Option<&str>,
    family: CompilerFamily,
    versions_override: Vec<String>,
) -> Result<Value> {
    let reproducer = build_reproducer(source, opt_level, test_input, expected_output, Some(test_command))?;

    let provider = ToolchainProvider::new(config);
    let Some(ub_primary) = resolve_newest_available(&provider, config, family).await else {
        return Ok(env_gap("version_bisection", format!("no usable {family:?} toolchain found")));
    };
    let secondary_family = config.compiler_families.iter().find(|f| **f != family).copied();
    let ub_secondary = match secondary_family {
        Some(f) => resolve_newest_available(&provider, config, f).await,
        None => None,
    };

    let versions = if versions_override.is_empty() {
        config.default_versions.get(&family).cloned().unwrap_or_default()
    } else {
        versions_override
    };
    if versions.is_empty() {
        bail!("no compiler versions configured for {family:?}; pass --versions");
    }

    let work_dir = tempfile::tempdir().context("creating scratch working directory")?;
    let request = FullPipelineRequest {
        reproducer,
        ub_primary,
        ub_secondary,
        version_family: family,
        versions,
        version_flags: vec![opt_level.flag().to_string()],
        pass_opt_level: opt_level,
        work_dir: work_dir.path().to_path_buf(),
    };

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    let orchestrator = Orchestrator::new(config.clone());
    let diagnosis = orchestrator.run(request, cancel).await;
    Ok(serde_json::to_value(diagnosis)?)
}

fn recommend_ub(verdict: diagcore::domain::finding::UbVerdict) -> &'static str {
    use diagcore::domain::finding::UbVerdict::*;
    match verdict {
        CompilerBug => "Signals point away from user code; proceed to version-bisect to localize the regression.",
        UserUb => "The sanitizer and/or cross-compiler signals point to undefined behavior in the \
            reproducer itself. Review the ubsan stderr excerpt before filing a compiler bug.",
        Inconclusive => "Signals were insufficient to distinguish a compiler bug from user UB. Consider \
            supplying an expected-output oracle or a second compiler family.",
    }
}

fn recommend_version(verdict: diagcore::domain::finding::VersionVerdict) -> &'static str {
    use diagcore::domain::finding::VersionVerdict::*;
    match verdict {
        Bisected => "Bisection localized the regression; pass-bisect the first_bad version to find the culprit pass.",
        AllPass => "No available compiler version reproduces the failure.",
        AllFail => "Every available compiler version reproduces the failure; the regression predates the oldest version tested.",
        DiagnosticErrors => "Every probed version rejected the reproducer outright; this looks like an \
            actionable front-end issue, not a version regression.",
        InsufficientCompilers => "No requested compiler version could be resolved locally or via container image.",
        Error => "Bisection could not proceed; see the finding's attempt log.",
    }
}

fn recommend_pass(verdict: diagcore::domain::finding::PassVerdict) -> &'static str {
    use diagcore::domain::finding::PassVerdict::*;
    match verdict {
        Bisected => "Bisection identified the culprit optimization pass. Try disabling it via the \
            compiler's pass-skip flag to confirm, then file the regression against that pass.",
        BaselineFails => "The unoptimized baseline already fails; this is not an optimizer regression -- \
            likely user UB or a code-generation issue independent of the optimizer.",
        FullPasses => "The full pipeline passes under this configuration; the bug does not reproduce here.",
        Error => "Pass bisection could not proceed; see the finding's reason.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_language_recognizes_cpp_extensions() {
        assert_eq!(infer_language(Path::new("repro.cpp")), Language::Cpp);
        assert_eq!(infer_language(Path::new("repro.cc")), Language::Cpp);
        assert_eq!(infer_language(Path::new("repro.c")), Language::C);
        assert_eq!(infer_language(Path::new("repro")), Language::C);
    }

    #[test]
    fn build_reproducer_rejects_a_missing_source_file() {
        let err = build_reproducer(Path::new("/nonexistent/repro.c"), OptimizationLevel::O0, None, None, None).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn load_overrides_with_no_path_is_all_defaults() {
        let overrides = load_overrides(None).unwrap();
        assert!(overrides.default_timeout_secs.is_none());
    }

    #[test]
    fn family_for_report_falls_back_to_configured_default_for_msvc() {
        let config = EngineConfig::default();
        assert_eq!(family_for_report(CompilerName::Msvc, &config), CompilerFamily::Clang);
        assert_eq!(family_for_report(CompilerName::Gcc, &config), CompilerFamily::Gcc);
    }

    #[test]
    fn env_gap_always_carries_an_error_verdict() {
        let value = env_gap("version_bisection", "no toolchain");
        assert_eq!(value["verdict"], "error");
        assert_eq!(value["reason"], "no toolchain");
    }
}
