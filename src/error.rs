//! Error kinds surfaced by the harness.
//!
//! Infrastructure failures (the emulator could not be run, an output
//! directory could not be read) are kept apart from [`HarnessError::ComparisonMismatch`],
//! which is the ordinary "test failed" outcome.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Harness error.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The emulator exited with a non-zero status (or was killed by a signal).
    #[error("command `{command}` failed with exit code {} and output: {stderr}", display_code(.exit_code))]
    EmulatorRunFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The emulator did not finish within the configured timeout and was killed.
    #[error("command `{command}` timed out after {:.1}s", .timeout.as_secs_f64())]
    EmulatorTimedOut { command: String, timeout: Duration },

    /// The emulator process could not be started at all.
    #[error("failed to spawn `{command}`: {source}")]
    EmulatorSpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// An output directory (or a file in it) could not be read.
    #[error("cannot collect outputs from {}: {source}", .path.display())]
    CollectionIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A fixture directory is incomplete or unreadable.
    #[error("invalid fixture {}: {reason}", .path.display())]
    FixtureLoad { path: PathBuf, reason: String },

    /// Refusing to overwrite an existing baseline.
    #[error("{} already exists", .path.display())]
    ExpectedOutputsExist { path: PathBuf },

    /// A scratch or persisted output directory could not be prepared.
    #[error("cannot prepare output directory {}: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generated test cases differ from the expected baseline.
    #[error(
        "fixture `{fixture}` does not match its baseline: {} missing, {} unexpected, {} mismatched",
        .missing.len(), .unexpected.len(), .mismatched.len()
    )]
    ComparisonMismatch {
        fixture: String,
        missing: Vec<PathBuf>,
        unexpected: Vec<PathBuf>,
        mismatched: Vec<PathBuf>,
    },
}

impl HarnessError {
    /// True for everything except a comparison mismatch.
    pub fn is_infrastructure(&self) -> bool {
        !matches!(self, HarnessError::ComparisonMismatch { .. })
    }

    pub(crate) fn collection(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HarnessError::CollectionIo {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn fixture(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        HarnessError::FixtureLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "<signal>".to_string(),
    }
}

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, HarnessError>;
