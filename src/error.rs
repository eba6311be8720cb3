//! Top-level error types for the command line tool.
//!
//! Library failures arrive as [`crate::bundler::Error`]; this layer adds
//! argument errors and actionable recovery suggestions.

use crate::bundler;
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, BundlerError>;

/// Main error type of the command line tool
#[derive(Error, Debug)]
pub enum BundlerError {
    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Build, signing or publishing failure
    #[error("{0}")]
    Bundler(#[from] bundler::Error),
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Missing required argument
    #[error("Missing required argument: {argument}")]
    MissingArgument {
        /// Argument name
        argument: String,
    },
}

impl BundlerError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        let BundlerError::Bundler(error) = self else {
            return vec!["Run with --help to see the accepted arguments".to_string()];
        };

        match error.root() {
            bundler::Error::Config { field, path, .. } => vec![format!(
                "Add '{}' to {}",
                field,
                path.display()
            )],
            bundler::Error::Auth { .. } => vec![
                "Set GH_TOKEN to a personal access token with the 'repo' scope".to_string(),
            ],
            bundler::Error::Publish { source: None, .. } => vec![
                "Set GH_TOKEN and a 'repository' in package.json (or pass --repository)"
                    .to_string(),
            ],
            bundler::Error::Signing(_) => vec![
                "Check CSC_LINK and CSC_KEY_PASSWORD, or set CSC_NAME to an installed identity"
                    .to_string(),
            ],
            bundler::Error::CommandFailed { command, .. } => {
                vec![format!("Make sure '{}' is installed and on PATH", command)]
            }
            bundler::Error::Timeout { .. } | bundler::Error::Aborted { .. } => {
                vec!["Check the network connection and retry".to_string()]
            }
            _ => vec!["Run with RUST_LOG=debug for details".to_string()],
        }
    }

    /// Whether retrying the same command may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            BundlerError::Bundler(error) => {
                error.is_timeout()
                    || matches!(
                        error.root(),
                        bundler::Error::Aborted { .. } | bundler::Error::Request(_)
                    )
            }
            BundlerError::Io(_) => true,
            BundlerError::Cli(_) => false,
        }
    }
}
