//! Error types for the CLI

use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Invalid argument
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Harness library error
    #[error("{0}")]
    Harness(#[from] webcompat::WebcompatError),

    /// A fleet task ended without delivering its report
    #[error("run aborted: {message}")]
    RunAborted {
        /// Error message
        message: String,
    },
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a run-aborted error
    #[must_use]
    pub fn run_aborted(message: impl Into<String>) -> Self {
        Self::RunAborted {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error() {
        let err = CliError::config("bad credentials file");
        assert!(err.to_string().contains("configuration"));
        assert!(err.to_string().contains("bad credentials file"));
    }

    #[test]
    fn test_invalid_argument_error() {
        let err = CliError::invalid_argument("unknown platform 'beos'");
        assert!(err.to_string().contains("invalid argument"));
        assert!(err.to_string().contains("beos"));
    }

    #[test]
    fn test_run_aborted_error() {
        let err = CliError::run_aborted("worker panicked");
        assert!(err.to_string().contains("run aborted"));
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cli_err: CliError = io_err.into();
        assert!(cli_err.to_string().contains("I/O"));
    }

    #[test]
    fn test_harness_error_passes_through_unprefixed() {
        let err: CliError = webcompat::WebcompatError::launch("geckodriver not on PATH").into();
        assert!(err.to_string().contains("geckodriver not on PATH"));
    }
}
