//! Optimization pipeline extraction and parsing (spec §4.6 step 1).
//!
//! Pipelines are source-dependent: the same `-O2` token expands to a
//! different concrete pass sequence depending on the IR it is run against,
//! so extraction always happens against the *compiled* intermediate
//! representation of the reproducer under test, never a canned list.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use crate::compile::kill_process_group;

/// Parse a raw pipeline-print string into a flat sequence of top-level
/// tokens, splitting on commas at bracket-nesting depth 0. Nested groupings
/// (`<...>`, `(...)`, `{...}`) are preserved whole, as part of whichever
/// top-level token encloses them -- the bisector is string-oblivious about
/// what's inside.
pub fn parse_pipeline(raw: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();

    for ch in raw.trim().chars() {
        match ch {
            '<' | '(' | '{' => {
                depth += 1;
                current.push(ch);
            }
            '>' | ')' | '}' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth == 0 => {
                push_token(&mut tokens, &current);
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    push_token(&mut tokens, &current);
    tokens
}

fn push_token(tokens: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        tokens.push(trimmed.to_string());
    }
}

/// Ask `optimizer_driver` to print the exact pass pipeline it would run for
/// `opt_level_flag` against the already-compiled IR at `ir_path`. Returns
/// `None` on any process failure (spawn, nonzero exit, timeout) -- the
/// caller folds that into `PassVerdict::Error`.
pub async fn extract_pipeline(
    optimizer_driver: &Path,
    ir_path: &Path,
    opt_level_flag: &str,
    timeout: Duration,
) -> Option<Vec<String>> {
    let mut cmd = tokio::process::Command::new(optimizer_driver);
    cmd.arg(ir_path)
        .arg(format!("-passes=default<{opt_level_flag}>"))
        .arg("-print-pipeline-passes")
        .arg("-disable-output")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
            .kill_on_drop(true);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd.spawn().ok()?;
    let pid = child.id();

    let waited = tokio::time::timeout(timeout, child.wait_with_output()).await;
    let output = match waited {
        Ok(Ok(output)) => output,
        Ok(Err(_)) => return None,
        Err(_elapsed) => {
            if let Some(pid) = pid {
                kill_process_group(pid);
            }
            return None;
        }
    };

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let tokens = parse_pipeline(&stdout);
    if tokens.is_empty() {
        None
    } else {
        Some(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_top_level_tokens_on_commas() {
        let tokens = parse_pipeline("pass-a,pass-b,pass-c");
        assert_eq!(tokens, vec!["pass-a", "pass-b", "pass-c"]);
    }

    #[test]
    fn preserves_nested_groupings_as_one_token() {
        let tokens = parse_pipeline("pass-a,loop<pass-b,pass-c>,pass-d");
        assert_eq!(tokens, vec!["pass-a", "loop<pass-b,pass-c>", "pass-d"]);
    }

    #[test]
    fn handles_mixed_bracket_styles() {
        let tokens = parse_pipeline("a,(b,c),{d,e},f");
        assert_eq!(tokens, vec!["a", "(b,c)", "{d,e}", "f"]);
    }

    #[test]
    fn trims_whitespace_around_tokens() {
        let tokens = parse_pipeline(" pass-a , pass-b ");
        assert_eq!(tokens, vec!["pass-a", "pass-b"]);
    }

    #[test]
    fn empty_input_yields_empty_pipeline() {
        assert!(parse_pipeline("").is_empty());
        assert!(parse_pipeline("   ").is_empty());
    }
}
