//! Core error kinds.
//!
//! Every failure the reconciliation engine can produce is one of the kinds
//! below: distinguishable programmatically, never a panic. Only
//! [`CoreError::Corruption`] and [`CoreError::Fatal`] (event-ingress loss)
//! are fatal to the process; everything else is recoverable and is attached
//! to per-UID status instead of propagated to the top.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("device busy: {0}")]
    Busy(String),

    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("settings store corrupted: {0}")]
    Corruption(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl CoreError {
    /// Whether this kind should cause the Reconciler to exit the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::Corruption(_) | CoreError::Fatal(_))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            CoreError::NotFound(_) => "NotFound",
            CoreError::Busy(_) => "Busy",
            CoreError::Unreachable(_) => "Unreachable",
            CoreError::ProtocolError(_) => "ProtocolError",
            CoreError::Corruption(_) => "Corruption",
            CoreError::BadRequest(_) => "BadRequest",
            CoreError::Transient(_) => "Transient",
            CoreError::Fatal(_) => "Fatal",
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        CoreError::Transient(format!("sqlite: {e}"))
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            CoreError::Unreachable(e.to_string())
        } else {
            CoreError::ProtocolError(e.to_string())
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_corruption_and_fatal_are_fatal() {
        assert!(CoreError::Corruption("bad schema".into()).is_fatal());
        assert!(CoreError::Fatal("ingress lost".into()).is_fatal());
        assert!(!CoreError::Busy("in use".into()).is_fatal());
        assert!(!CoreError::Unreachable("refused".into()).is_fatal());
    }

    #[test]
    fn kind_names_are_distinguishable() {
        let kinds = [
            CoreError::NotFound("x".into()),
            CoreError::Busy("x".into()),
            CoreError::Unreachable("x".into()),
            CoreError::ProtocolError("x".into()),
            CoreError::Corruption("x".into()),
            CoreError::BadRequest("x".into()),
            CoreError::Transient("x".into()),
            CoreError::Fatal("x".into()),
        ];
        let names: std::collections::HashSet<_> = kinds.iter().map(|k| k.kind_name()).collect();
        assert_eq!(names.len(), kinds.len());
    }
}
