//! `TEST_COMMAND` parsing (spec §6).
//!
//! The `{binary}` placeholder is substituted literally, then the resulting
//! string is tokenized using POSIX shell-style splitting (quotes respected)
//! and executed *without* a shell interpreter -- no pipes, redirections, or
//! variable expansion. A caller who needs those writes a wrapper script and
//! passes its path instead.

use std::path::Path;

use crate::domain::error::{DiagnosisError, Result};

const PLACEHOLDER: &str = "{binary}";

/// Validates that `template` contains the `{binary}` placeholder. Call once
/// at CLI-argument-parsing time so a missing placeholder is an input error
/// (exit 1) rather than surfacing mid-bisection.
pub fn validate_template(template: &str) -> Result<()> {
    if !template.contains(PLACEHOLDER) {
        let argv = shell_words::split(template)?;
        return Err(DiagnosisError::MissingBinaryPlaceholder(argv));
    }
    Ok(())
}

/// Substitute `binary` into `template` and tokenize the result into an argv
/// vector. Assumes [`validate_template`] already confirmed the placeholder
/// is present.
pub fn build_argv(template: &str, binary: &Path) -> Result<Vec<String>> {
    let substituted = template.replace(PLACEHOLDER, &binary.display().to_string());
    Ok(shell_words::split(&substituted)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_substituted_literally() {
        let argv = build_argv("{binary} --flag value", Path::new("/tmp/a.out")).unwrap();
        assert_eq!(argv, vec!["/tmp/a.out", "--flag", "value"]);
    }

    #[test]
    fn quoted_arguments_are_respected() {
        let argv = build_argv("{binary} 'hello world'", Path::new("/tmp/a.out")).unwrap();
        assert_eq!(argv, vec!["/tmp/a.out", "hello world"]);
    }

    #[test]
    fn missing_placeholder_is_rejected() {
        let err = validate_template("./run.sh --no-binary-here").unwrap_err();
        assert!(matches!(err, DiagnosisError::MissingBinaryPlaceholder(_)));
    }

    #[test]
    fn present_placeholder_validates_cleanly() {
        assert!(validate_template("{binary} --check").is_ok());
    }
}
