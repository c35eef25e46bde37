//! Error types for the Autopilot engine
//!
//! One umbrella `EngineError` with per-concern sub-enums, following the
//! `thiserror` nested-`#[from]` pattern. Guard blocks are never errors;
//! they are ordinary dispositions.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Clean cycle stop: preflight failure or insufficient sensed data.
    /// No partial decisions are recorded past this point.
    #[error("cycle aborted: {reason}")]
    Aborted {
        reason: String,
        missing: Vec<String>,
    },

    /// Persistence errors
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Language-model oracle errors
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// Executor dispatch errors (isolated per decision, never cycle-fatal)
    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// Illegal capability lifecycle transition
    #[error("invalid capability transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Abort with a reason and no missing-prerequisite list.
    pub fn aborted(reason: impl Into<String>) -> Self {
        EngineError::Aborted {
            reason: reason.into(),
            missing: Vec::new(),
        }
    }

    /// True for the clean-stop abort path (as opposed to a failure).
    pub fn is_abort(&self) -> bool {
        matches!(self, EngineError::Aborted { .. })
    }
}

/// Errors from the persistence layer. Core stays independent of the
/// concrete database driver; the store crate maps driver errors in.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Errors from the language-model oracle. `NoJsonFound` and
/// `SchemaInvalid` are distinct so callers can tell "the model said
/// nothing usable" from "the model said something malformed".
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Http(String),

    #[error("oracle returned an empty completion")]
    Empty,

    #[error("no JSON array found in oracle output")]
    NoJsonFound,

    #[error("oracle JSON failed schema validation: {0}")]
    SchemaInvalid(String),
}

/// Errors from executor dispatch
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("unknown executor: {0}")]
    Unknown(String),

    #[error("executor {0} is not implemented")]
    NotImplemented(String),

    #[error("executor call depth {depth} exceeds limit {limit}")]
    DepthExceeded { depth: u32, limit: u32 },

    #[error("executor {name} returned HTTP {status}")]
    HttpStatus { name: String, status: u16 },

    #[error("executor {name} failed: {message}")]
    Failed { name: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_is_not_a_failure() {
        let err = EngineError::aborted("insufficient_data");
        assert!(err.is_abort());
        assert!(err.to_string().contains("insufficient_data"));

        let err: EngineError = StoreError::NotFound("config".into()).into();
        assert!(!err.is_abort());
    }

    #[test]
    fn oracle_parse_failures_are_distinguishable() {
        let no_json = OracleError::NoJsonFound;
        let invalid = OracleError::SchemaInvalid("missing decision_type".into());
        assert_ne!(no_json.to_string(), invalid.to_string());
    }
}
