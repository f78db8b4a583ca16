//! Error types for the deployment-test helpers.

use std::path::PathBuf;
use thiserror::Error;

use crate::cypress::E2eMode;

/// Top-level error type for deployment-test operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error while touching a manifest or spawning a process.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A manifest file could not be read or written.
    #[error("failed to access {path}: {source}")]
    ManifestIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A manifest file is not valid JSON.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A manifest parsed but does not have the expected shape.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// The root manifest does not pin a dependency that must be copied.
    #[error("root package.json has no `{0}` entry in dependencies")]
    MissingDependency(String),

    /// The end-to-end test runner exited unsuccessfully.
    #[error("Cypress tests failed on {mode} (exit code: {code:?})")]
    ChildProcess { mode: E2eMode, code: Option<i32> },

    /// The availability poller exhausted its attempt budget.
    #[error("Could not connect to {url} after {attempts} attempts")]
    ResolutionTimeout { url: String, attempts: u32 },

    /// The availability poller was cancelled before it completed.
    #[error("availability check for {0} was cancelled")]
    PollCancelled(String),

    /// The source revision could not be determined.
    #[error("failed to determine source revision: {0}")]
    Startup(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for deployment-test operations.
pub type Result<T> = std::result::Result<T, Error>;
