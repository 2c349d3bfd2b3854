// Error types for groove generation.
//
// Only two kinds of problem ever surface as `Err`: configuration mistakes
// caught at construction time, and operator failures escalated under
// `FailurePolicy::Strict`. Malformed candidates and physicality findings
// are reported through diagnostics instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GrooveError {
    /// An operator failed and the collector was running strict.
    #[error("operator '{operator_id}' failed in bar {bar_number}: {source}")]
    OperatorFailed {
        operator_id: String,
        bar_number: u32,
        #[source]
        source: OperatorError,
    },

    /// Invalid construction input (duplicate operator id, missing limb
    /// mapping, out-of-range threshold).
    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MIDI error: {0}")]
    Midi(String),
}

/// Failure raised by a single operator while producing candidates.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperatorError {
    /// The operator's parameters cannot be realised in this bar.
    #[error("cannot place pattern: {0}")]
    Unplaceable(String),

    #[error("{0}")]
    Failed(String),
}

/// Result type for generation operations.
pub type Result<T> = std::result::Result<T, GrooveError>;
