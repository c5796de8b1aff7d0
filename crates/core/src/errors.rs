use thiserror::Error;

use crate::flows::FlowTransitionError;

/// Failure classes for a single upstream call. `SessionExpired` is the only
/// kind the executor resolves locally (one renewal + retry); everything else
/// propagates unchanged to the saga layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    SessionExpired,
    ValidationError,
    NotFound,
    TransportError,
    UpstreamFault,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub message: String,
}

impl UpstreamError {
    pub fn new(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn session_expired(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::SessionExpired, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::ValidationError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::NotFound, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::TransportError, message)
    }

    pub fn upstream_fault(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::UpstreamFault, message)
    }

    pub fn is_session_expired(&self) -> bool {
        self.kind == UpstreamErrorKind::SessionExpired
    }

    pub fn user_message(&self) -> &'static str {
        match self.kind {
            UpstreamErrorKind::SessionExpired => {
                "Your session has expired. Please sign in again."
            }
            UpstreamErrorKind::ValidationError => {
                "The request could not be processed. Check inputs and try again."
            }
            UpstreamErrorKind::NotFound => "The requested record could not be found.",
            UpstreamErrorKind::TransportError => {
                "The HR system is temporarily unreachable. Please retry shortly."
            }
            UpstreamErrorKind::UpstreamFault => {
                "The HR system reported an unexpected internal error."
            }
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("draft validation failed: {0}")]
    DraftValidation(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[cfg(test)]
mod tests {
    use crate::errors::{UpstreamError, UpstreamErrorKind};

    #[test]
    fn session_expired_is_the_only_recoverable_kind() {
        assert!(UpstreamError::session_expired("cookie rejected").is_session_expired());
        for error in [
            UpstreamError::validation("bad dates"),
            UpstreamError::not_found("no such leave"),
            UpstreamError::transport("timeout"),
            UpstreamError::upstream_fault("traceback"),
        ] {
            assert!(!error.is_session_expired());
        }
    }

    #[test]
    fn not_found_user_message_does_not_leak_record_details() {
        let error = UpstreamError::not_found("hr.leave 4411 belongs to employee 7");
        assert_eq!(error.user_message(), "The requested record could not be found.");
        assert_eq!(error.kind, UpstreamErrorKind::NotFound);
    }

    #[test]
    fn display_carries_the_diagnostic_message() {
        let error = UpstreamError::upstream_fault("odoo.exceptions.UserError: boom");
        assert_eq!(error.to_string(), "odoo.exceptions.UserError: boom");
    }
}
