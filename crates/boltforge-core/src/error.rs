// ABOUTME: Error types for action execution and the filesystem/shell facades.
// ABOUTME: Command and contract-validation errors stay distinct so alerts can differ.

use std::path::PathBuf;
use thiserror::Error;

/// A shell or build command failed. Carries a short header for alert titles
/// and the full captured output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{header}")]
pub struct ActionCommandError {
    pub header: String,
    pub output: String,
}

impl ActionCommandError {
    pub fn new(header: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            output: output.into(),
        }
    }
}

/// The project is not in a shape a contract build can run against.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("contract validation failed: {message}")]
pub struct ContractValidationError {
    pub message: String,
}

/// Errors raised by a [`crate::fs::FileSystem`] implementation.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("path escapes the project root: {0}")]
    OutsideRoot(PathBuf),

    #[error("invalid {encoding} content for {path}: {reason}")]
    Encoding {
        path: PathBuf,
        encoding: &'static str,
        reason: String,
    },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return FsError::NotFound(path.into());
        }
        FsError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised by a [`crate::shell::ShellFacade`] implementation.
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error while running `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {timeout_secs} seconds")]
    TimedOut { command: String, timeout_secs: u64 },

    #[error("`{0}` was aborted")]
    Aborted(String),
}

/// Everything that can fail while executing a single action.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error(transparent)]
    Command(#[from] ActionCommandError),

    #[error(transparent)]
    ContractValidation(#[from] ContractValidationError),

    #[error("invalid path `{path}`: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error(transparent)]
    Filesystem(#[from] FsError),

    #[error(transparent)]
    Shell(#[from] ShellError),

    #[error("action was aborted")]
    Aborted,

    #[error("action `{0}` is not registered")]
    NotRegistered(String),
}
