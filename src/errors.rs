//! Error taxonomy for probe invocation and execution
//!
//! Setup errors (unknown probe, missing parameters, malformed targets) are
//! reported before any network work starts. Per-target failures such as a
//! refused connection or an unanswered query are never represented here:
//! they are recorded as negative outcomes inside each probe's result.

use thiserror::Error;

/// Errors surfaced by the registry, the bounded runner and the probe handlers
#[derive(Debug, Error)]
pub enum ProbeError {
    /// No probe is registered under the requested id
    #[error("probe not found: {id}")]
    ProbeNotFound { id: String },

    /// One or more required parameters were absent from the invocation
    #[error("missing required parameter: {}", .missing.join(", "))]
    MissingParameters { probe: String, missing: Vec<String> },

    /// A parameter was present but could not be interpreted
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// The target list or address could not be parsed or resolved
    #[error("invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    /// The runner was asked to admit fewer than one item at a time
    #[error("concurrency cap must be at least 1, got {cap}")]
    InvalidConcurrency { cap: usize },

    /// A per-item timeout of zero would classify every item as timed out
    #[error("per-item timeout must be greater than zero")]
    InvalidTimeout,

    /// A probe with the same id is already registered and the registry rejects duplicates
    #[error("duplicate probe id: {id}")]
    DuplicateProbe { id: String },

    /// A helper binary or privilege the probe depends on is not available
    #[error("required tool unavailable: {tool} ({reason})")]
    ToolUnavailable { tool: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProbeError {
    /// Convenience constructor used by handlers when coercing parameter values
    pub fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        ProbeError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for unparseable or unresolvable targets
    pub fn invalid_target(target: &str, reason: impl Into<String>) -> Self {
        ProbeError::InvalidTarget {
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for missing helper binaries
    pub fn tool_unavailable(tool: &str, reason: impl Into<String>) -> Self {
        ProbeError::ToolUnavailable {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the error was raised while checking the invocation itself
    pub fn is_invalid_invocation(&self) -> bool {
        matches!(
            self,
            ProbeError::ProbeNotFound { .. }
                | ProbeError::MissingParameters { .. }
                | ProbeError::InvalidParameter { .. }
        )
    }
}
