//! Typed error definitions for the HBDM gateway.
//!
//! Provides [`GatewayError`] for every failure path in the connectivity layer.
//! Each variant carries an [`ErrorCategory`] decided where the failure happens,
//! so callers route on the category instead of inspecting error types.

use thiserror::Error;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Coarse failure category used by the suppression tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connection refused, timeout, TLS or proxy failure. No response was read.
    Transport,
    /// Malformed frames, undecodable payloads, unexpected message shapes.
    Protocol,
    /// The exchange answered with a non-2xx status or an error payload.
    Business,
}

/// Whether an order-placement failure of the given category is escalated to
/// the collaborator log in addition to the rejected order it causes.
///
/// Transport failures on placement stay in the diagnostics log; the rejected
/// order is the collaborator-visible signal. Failures of every other
/// operation are always escalated.
const REJECTION_REPORT_POLICY: &[(ErrorCategory, bool)] = &[
    (ErrorCategory::Transport, false),
    (ErrorCategory::Protocol, true),
    (ErrorCategory::Business, true),
];

/// Exchange error messages that are expected noise and never logged.
///
/// `"invalid pong"` comes from a race between the bare `ping`/`pong` and the
/// `op`-tagged keep-alive styles.
pub const BENIGN_ERROR_MESSAGES: &[&str] = &["invalid pong"];

impl ErrorCategory {
    /// Escalation rule for an order-placement failure of this category.
    pub fn report_on_rejection(self) -> bool {
        REJECTION_REPORT_POLICY.iter().find(|(c, _)| *c == self).is_some_and(|(_, report)| *report)
    }
}

/// Returns `true` if an exchange error message is in the benign list.
pub fn is_benign_message(msg: &str) -> bool {
    BENIGN_ERROR_MESSAGES.contains(&msg)
}

/// Domain-specific errors for the HBDM gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Network-level failure (connect, TLS, timeout, proxy).
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-2xx HTTP status.
    #[error("http status {status}: {body}")]
    Http { status: u16, body: String },

    /// The exchange returned `"status": "error"`.
    #[error("exchange error {code}: {msg}")]
    Business { code: String, msg: String },

    /// Frame or payload did not match the expected wire format.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Decompression or JSON decoding failure.
    #[error("decode error: {0}")]
    Decode(String),

    /// The request cannot be expressed on the wire (e.g. unmapped order type).
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl GatewayError {
    /// Category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) => ErrorCategory::Transport,
            Self::Http { .. } | Self::Business { .. } | Self::Unsupported(_) => {
                ErrorCategory::Business
            }
            Self::Config(_) | Self::Protocol(_) | Self::Decode(_) => ErrorCategory::Protocol,
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_order_hides_transport_cause() {
        assert!(!GatewayError::Transport("refused".into()).category().report_on_rejection());
    }

    #[test]
    fn rejected_order_reports_business_and_protocol_causes() {
        let e = GatewayError::Business { code: "1047".into(), msg: "insufficient margin".into() };
        assert_eq!(e.category(), ErrorCategory::Business);
        assert!(e.category().report_on_rejection());
        assert!(GatewayError::Decode("bad gzip".into()).category().report_on_rejection());
        let http = GatewayError::Http { status: 502, body: String::new() };
        assert_eq!(http.category(), ErrorCategory::Business);
        assert!(http.category().report_on_rejection());
    }

    #[test]
    fn invalid_pong_is_benign() {
        assert!(is_benign_message("invalid pong"));
        assert!(!is_benign_message("invalid topic"));
    }
}
