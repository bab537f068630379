//! Domain-level error taxonomy for the diagnosis engine.

/// Errors that abort a diagnosis outright rather than being absorbed into a
/// stage finding: bad input, or a violated invariant.
///
/// Per the error-handling design, probe-level exceptional outcomes (ICE,
/// diagnostic rejection, timeout) never reach this type -- they are folded
/// into [`crate::domain::outcome::CompileOutcome`] /
/// [`crate::domain::outcome::TestVerdict`] inside a stage. Only conditions
/// that make it impossible to produce a trustworthy finding at all surface
/// here.
#[derive(Debug, thiserror::Error)]
pub enum DiagnosisError {
    #[error("source file not readable: {path}: {source}")]
    UnreadableSource {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed anomaly report: {0}")]
    MalformedReport(String),

    #[error("test command missing the {{binary}} placeholder: {0:?}")]
    MissingBinaryPlaceholder(Vec<String>),

    #[error("test command could not be tokenized: {0}")]
    InvalidTestCommand(#[from] shell_words::ParseError),

    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for operations that can fail with a [`DiagnosisError`].
pub type Result<T> = std::result::Result<T, DiagnosisError>;
