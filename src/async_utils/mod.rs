//! Asynchronous utilities for use with Tokio.
//!
//! We drive a handful of external command-line tools (Poppler, Tesseract) from
//! async code. The helpers for running them, and for wrapping blocking
//! iterators as streams, live here.

use std::pin::Pin;

use futures::Stream;
use tokio::process::Command;

use crate::prelude::*;

pub mod blocking_iter_streams;
pub mod io;

/// A type alias for a boxed future. This is used to make it easier to work with
/// with complex futures.
pub type BoxedFuture<Output> = Pin<Box<dyn Future<Output = Output> + Send>>;

/// A type alias for a boxed stream. This is used to make it easier to work
/// streams that return complex types.
pub type BoxedStream<Item> = Pin<Box<dyn Stream<Item = Item> + Send>>;

/// Run a command to completion, capturing its output, and fail if it fails.
///
/// `is_error_line` can be used to treat some lines of standard error as fatal
/// even when the command exits successfully.
#[instrument(level = "trace", skip(cmd, is_error_line))]
pub async fn run_command(
    command_name: &str,
    cmd: &mut Command,
    is_error_line: Option<&(dyn Fn(&str) -> bool + Sync)>,
) -> Result<std::process::Output> {
    let output = cmd
        .output()
        .await
        .with_context(|| format!("cannot run {command_name} (is it installed?)"))?;
    check_for_command_failure(command_name, &output, is_error_line)?;
    Ok(output)
}

/// Report any command failures, and include any error output.
///
/// The output of standard error and standard output will be logged at
/// appropriate levels. And standard error may be optionally checked line by
/// line to determine if the command failed.
pub fn check_for_command_failure(
    command_name: &str,
    output: &std::process::Output,
    is_error_line: Option<&(dyn Fn(&str) -> bool + Sync)>,
) -> Result<()> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    trace!(
        command_name = command_name,
        output = %stdout,
        "Standard output from command"
    );
    if !stderr.trim().is_empty() {
        debug!(
            command_name = command_name,
            output = %stderr,
            "Standard error from command",
        );
    }

    if output.status.success() {
        if let Some(is_error_line) = is_error_line
            && stderr.lines().any(is_error_line)
        {
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
    use std::{os::unix::process::ExitStatusExt as _, process::ExitStatus};

    use super::*;

    fn output(code: i32, stderr: &str) -> std::process::Output {
        std::process::Output {
            status: ExitStatus::from_raw(code << 8),
            stdout: vec![],
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[test]
    fn successful_command_passes() {
        assert!(check_for_command_failure("tool", &output(0, ""), None).is_ok());
    }

    #[test]
    fn failed_command_reports_exit_code_and_stderr() {
        let err = check_for_command_failure("tool", &output(2, "bad things"), None)
            .unwrap_err()
            .to_string();
        assert!(err.contains("exit code 2"), "{err}");
        assert!(err.contains("bad things"), "{err}");
    }

    #[test]
    fn error_lines_fail_successful_but_noisy_command() {
        let is_error: &(dyn Fn(&str) -> bool + Sync) =
            &|line: &str| line.starts_with("Syntax Error");
        let out = output(0, "Syntax Error: broken xref\n");
        assert!(check_for_command_failure("tool", &out, Some(is_error)).is_err());
        let out = output(0, "Syntax Warning: odd font\n");
        assert!(check_for_command_failure("tool", &out, Some(is_error)).is_ok());
    }
}
