//! Library-level error taxonomy.
//!
//! Distinct from the `ERROR_RAISED` event payload kinds (see [`crate::event::types::ErrorKind`]),
//! which are runtime data recorded into the event log. `KernelError` covers the smaller set of
//! conditions that abort an operation outright: malformed bundles, I/O failures, replay mismatches.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("bundle is malformed: {0}")]
    MalformedBundle(String),

    #[error("replay checksum mismatch: expected {expected}, got {actual}")]
    ReplayMismatch { expected: String, actual: String },

    #[error("unknown test id: {0}")]
    UnknownTest(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl KernelError {
    /// Whether this error originates from user-supplied input (config/bundle) as opposed to
    /// an underlying system failure.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            KernelError::MalformedBundle(_) | KernelError::UnknownTest(_) | KernelError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_input_error_classification() {
        assert!(KernelError::MalformedBundle("bad".into()).is_input_error());
        assert!(KernelError::UnknownTest("nope".into()).is_input_error());
        assert!(!KernelError::ReplayMismatch {
            expected: "a".into(),
            actual: "b".into(),
        }
        .is_input_error());
    }

    #[test]
    fn display_messages() {
        let err = KernelError::ReplayMismatch {
            expected: "aa".into(),
            actual: "bb".into(),
        };
        assert!(err.to_string().contains("aa"));
        assert!(err.to_string().contains("bb"));
    }
}
