//! Resource execution errors.

use std::fmt;
use thiserror::Error;

use conveyor_core::RuntimeError;

/// Non-zero exit from a resource script, with the captured stderr so the
/// failure can be diagnosed without log-diving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFailure {
    pub path: String,
    pub args: Vec<String>,
    pub exit_status: i32,
    pub stderr: String,
}

impl fmt::Display for ScriptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "resource script '{} {}' failed: exit status {}\n\nstderr:\n{}",
            self.path,
            self.args.join(" "),
            self.exit_status,
            self.stderr
        )
    }
}

#[derive(Debug, Error)]
pub enum ResourceError {
    /// A signal was delivered; the container stop was attempted. One
    /// sentinel value regardless of cause, so callers can tell an abort
    /// from every other failure.
    #[error("resource operation aborted")]
    Aborted,

    #[error("{0}")]
    ScriptFailed(ScriptFailure),

    #[error("failed to encode resource request: {0}")]
    MalformedRequest(serde_json::Error),

    #[error("malformed resource response: {0}")]
    MalformedResponse(serde_json::Error),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl ResourceError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, ResourceError::Aborted)
    }
}
