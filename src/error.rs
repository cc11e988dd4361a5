//! Error markers recognized by the top-level entry point.
//!
//! A usage error is printed once, at the point it is raised, and then travels
//! up as a marker so `main` exits non-zero without printing it again.

use thiserror::Error;

/// Invalid invocation: missing flags, bad enum values, bad `--include`.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct UsageError(pub String);

/// A failure whose details have already been written to the terminal.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ReportedError(pub String);

/// Print `Error: <message>` to stderr and return the usage marker.
pub fn usage_error(message: impl Into<String>) -> anyhow::Error {
    let message = message.into();
    let trimmed = message.trim();
    if !trimmed.is_empty() {
        eprintln!("Error: {trimmed}");
    }
    UsageError(trimmed.to_string()).into()
}

/// Wrap a failure that was already reported.
pub fn reported(message: impl Into<String>) -> anyhow::Error {
    ReportedError(message.into()).into()
}

/// True when the error should not be printed again by the entry point.
pub fn is_already_reported(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|e| e.is::<UsageError>() || e.is::<ReportedError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn usage_marker_survives_context() {
        let err = Err::<(), _>(usage_error("--app is required"))
            .context("status")
            .unwrap_err();
        assert!(is_already_reported(&err));
    }

    #[test]
    fn plain_errors_are_not_reported() {
        let err = anyhow::anyhow!("boom");
        assert!(!is_already_reported(&err));
    }
}
