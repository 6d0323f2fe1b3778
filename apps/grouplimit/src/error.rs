//! CLI error handling

use std::fmt;

use grouplimit_errors::UserFacingError;

/// CLI-specific error type
#[derive(Debug)]
pub enum CliError {
    /// Configuration or library error
    Lib(grouplimit_errors::Error),
    /// Invalid command arguments
    InvalidArguments(String),
    /// A simulation worker panicked
    Worker(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Lib(e) => {
                write!(f, "{}", e.user_message())?;
                if let Some(code) = e.user_code() {
                    write!(f, "\n  Code: {code}")?;
                }
                if let Some(hint) = e.user_hint() {
                    write!(f, "\n  Hint: {hint}")?;
                }
                Ok(())
            }
            CliError::InvalidArguments(msg) => write!(f, "Invalid arguments: {msg}"),
            CliError::Worker(msg) => write!(f, "Worker failed: {msg}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Lib(e) => Some(e),
            _ => None,
        }
    }
}

impl From<grouplimit_errors::Error> for CliError {
    fn from(e: grouplimit_errors::Error) -> Self {
        CliError::Lib(e)
    }
}

impl From<grouplimit_errors::ConfigError> for CliError {
    fn from(e: grouplimit_errors::ConfigError) -> Self {
        CliError::Lib(e.into())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Lib(e.into())
    }
}
