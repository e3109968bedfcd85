//! Error types for the Bitwarden adapter

use std::time::Duration;

/// Error from running a `bw` command
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CliError {
    #[error("failed to execute {binary}: {message}")]
    Spawn { binary: String, message: String },

    #[error("command timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{output} - {status}")]
    Failed { status: String, output: String },

    #[error("command produced no output")]
    EmptyOutput,
}

impl CliError {
    /// Diagnostic text of the failed command, used as HTTP error body
    pub fn output(&self) -> String {
        match self {
            Self::Failed { output, .. } => output.clone(),
            other => other.to_string(),
        }
    }
}

/// Error from probing `bw serve`
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error("backend returned HTTP {0}")]
    Status(u16),

    #[error("unexpected status payload: {0}")]
    Malformed(String),
}

/// Convert reqwest error to ProbeError
pub fn map_probe_error(err: reqwest::Error) -> ProbeError {
    if err.is_decode() {
        ProbeError::Malformed(err.to_string())
    } else if let Some(status) = err.status() {
        ProbeError::Status(status.as_u16())
    } else {
        // Connection refused, timeouts and the like
        ProbeError::Unreachable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_display_matches_cli_output() {
        let err = CliError::Failed {
            status: "exit status: 1".to_string(),
            output: "Invalid master password.".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid master password. - exit status: 1");
        assert_eq!(err.output(), "Invalid master password.");
    }

    #[test]
    fn test_timeout_display() {
        let err = CliError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "command timed out after 30s");
        assert_eq!(err.output(), "command timed out after 30s");
    }
}
