//! CLI-specific error type

use flowtest_core::error::FlowtestError;

/// CLI-specific error type.
///
/// Any of these ends the process with status 1. Test failures are never
/// errors; they are encoded in the exit code by the summary.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Logging could not be initialised.
    #[error("logging: {0}")]
    Logging(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Harness error from the flowtest crates.
    #[error("{0}")]
    Harness(#[from] FlowtestError),
}

impl CliError {
    /// Process exit status for a harness-level error.
    pub fn exit_code(&self) -> u8 {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowtest_core::error::{ConfigError, SetupError};

    #[test]
    fn test_harness_errors_exit_with_one() {
        let err: CliError = FlowtestError::from(SetupError::Workspace("denied".to_owned())).into();
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_config_error_message_is_preserved() {
        let err: CliError = FlowtestError::from(ConfigError::FileNotFound {
            path: "/nope.toml".to_owned(),
        })
        .into();
        assert!(err.to_string().contains("/nope.toml"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: CliError = io_err.into();
        assert!(matches!(err, CliError::Io(_)));
        assert_eq!(err.exit_code(), 1);
    }
}
