//! Helpers for running the external poppler and tesseract tools.

use std::{process::Output, sync::LazyLock};

use regex::Regex;
use tokio::process::Command;

use crate::prelude::*;

/// A default error regex for checking command output.
static ERROR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error").expect("failed to compile regex"));

/// Poppler reconstructs damaged xref tables on its own; that complaint is a
/// warning for our purposes, not a failure.
static DOWNGRADE_TO_WARNING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)error: xref num").expect("failed to compile regex")
});

/// Does this output line report a real error?
pub fn is_error_line(line: &str) -> bool {
    ERROR_REGEX.is_match(line) && !DOWNGRADE_TO_WARNING_REGEX.is_match(line)
}

/// Run an external command and capture its output.
#[instrument(level = "trace", skip_all, fields(command_name))]
pub async fn run_command(command_name: &str, cmd: &mut Command) -> Result<Output> {
    let output = cmd
        .output()
        .await
        .with_context(|| format!("failed to run {command_name}"))?;
    check_for_command_failure(command_name, &output)?;
    Ok(output)
}

/// Report any command failures, and include any error output.
///
/// Standard error is also scanned line by line, because the poppler tools
/// sometimes report page-level errors while still exiting zero.
pub fn check_for_command_failure(command_name: &str, output: &Output) -> Result<()> {
    let stderr = String::from_utf8_lossy(&output.stderr);
    debug!(
        command_name = command_name,
        output = %stderr,
        "Standard error from command"
    );

    if output.status.success() {
        if stderr.lines().any(is_error_line) {
            return Err(anyhow!(
                "{} printed error output:\n{}",
                command_name,
                stderr,
            ));
        }
        Ok(())
    } else if let Some(exit_code) = output.status.code() {
        Err(anyhow!(
            "{} failed with exit code {} and error output:\n{}",
            command_name,
            exit_code,
            stderr,
        ))
    } else {
        Err(anyhow!(
            "{} failed with error output:\n{}",
            command_name,
            stderr,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_error_line_works() {
        assert!(is_error_line("Syntax Error: could not parse object"));
        assert!(is_error_line("ERROR: something went wrong"));
        assert!(!is_error_line("Warning: something is odd"));
        assert!(!is_error_line(
            "Internal Error: xref num 1234 not found but needed, document has changes, reconstruct aborted"
        ));
    }
}
