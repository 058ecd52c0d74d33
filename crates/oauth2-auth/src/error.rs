//! Error types for configuration, token endpoint calls and persistence

use std::fmt;

/// One or more required configuration fields were missing or empty.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("missing required configuration: {}", .missing.join(", "))]
pub struct ConfigurationError {
    /// Every missing field, in declaration order.
    pub missing: Vec<&'static str>,
}

/// What went wrong on a token or refresh endpoint call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenErrorKind {
    /// The per-request timeout elapsed.
    Timeout,
    /// Connection-level failure before a response arrived.
    Network,
    /// 5xx, 408 or 429 from the endpoint.
    Server,
    /// 2xx with a body that is not a valid token response.
    Malformed,
    /// `invalid_grant`: the code or refresh token is dead.
    InvalidGrant,
    /// `invalid_client` or a bare 401: the client credentials are rejected.
    InvalidClient,
    /// Any other 4xx.
    Rejected,
}

impl TokenErrorKind {
    /// Terminal kinds mean retrying with the same grant cannot succeed.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TokenErrorKind::InvalidGrant | TokenErrorKind::InvalidClient | TokenErrorKind::Rejected
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            TokenErrorKind::Timeout => "timeout",
            TokenErrorKind::Network => "network",
            TokenErrorKind::Server => "server",
            TokenErrorKind::Malformed => "malformed",
            TokenErrorKind::InvalidGrant => "invalid_grant",
            TokenErrorKind::InvalidClient => "invalid_client",
            TokenErrorKind::Rejected => "rejected",
        }
    }
}

impl fmt::Display for TokenErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Failure from the token or refresh endpoint.
///
/// Carries the raw status and body verbatim for diagnostics. `Clone` so a
/// single refresh failure can be handed to every caller that waited on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TokenError {
    pub kind: TokenErrorKind,
    /// HTTP status, absent for timeouts and connection failures.
    pub status: Option<u16>,
    /// OAuth2 `error` field from the response body, when present.
    pub error_code: Option<String>,
    /// Raw response body (empty when no response arrived).
    pub body: String,
    pub message: String,
}

impl TokenError {
    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    /// Failure with no HTTP response behind it (timeout, connection, task loss).
    pub fn without_response(kind: TokenErrorKind, message: String) -> Self {
        Self {
            kind,
            status: None,
            error_code: None,
            body: String::new(),
            message,
        }
    }
}

/// Errors from the auth crate's fallible operations outside the token
/// endpoint itself (mainly credential persistence).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_kinds() {
        assert!(TokenErrorKind::InvalidGrant.is_terminal());
        assert!(TokenErrorKind::InvalidClient.is_terminal());
        assert!(TokenErrorKind::Rejected.is_terminal());
        assert!(!TokenErrorKind::Timeout.is_terminal());
        assert!(!TokenErrorKind::Network.is_terminal());
        assert!(!TokenErrorKind::Server.is_terminal());
        assert!(!TokenErrorKind::Malformed.is_terminal());
    }

    #[test]
    fn token_error_display_is_message() {
        let err = TokenError::without_response(TokenErrorKind::Timeout, "token request timed out".into());
        assert_eq!(err.to_string(), "token request timed out");
        assert_eq!(err.kind.to_string(), "timeout");
        assert!(err.status.is_none());
    }

    #[test]
    fn configuration_error_is_wrapped_transparently() {
        let err: Error = ConfigurationError {
            missing: vec!["client_id"],
        }
        .into();
        assert_eq!(err.to_string(), "missing required configuration: client_id");
    }
}
