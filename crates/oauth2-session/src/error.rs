//! Error types for credential lifecycle operations

use oauth2_auth::{ConfigurationError, TokenError};

use crate::login::LoginAbort;

/// Errors surfaced by `CredentialManager`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The resource owner cancelled or denied the interactive flow. Not a
    /// protocol failure; the caller decides whether to try again.
    #[error("authentication cancelled: {0}")]
    AuthenticationCancelled(LoginAbort),

    #[error("token endpoint error: {0}")]
    Token(#[from] TokenError),

    #[error("not authenticated: no credential has been issued yet")]
    NotAuthenticated,

    #[error("credential expired and no refresh token is available; re-authenticate")]
    CredentialExpired,

    #[error("an authentication attempt is already in progress")]
    AuthenticationInProgress,

    #[error("already authenticated with a usable credential")]
    AlreadyAuthenticated,
}

impl Error {
    /// The underlying token endpoint failure, if any.
    pub fn token_error(&self) -> Option<&TokenError> {
        match self {
            Error::Token(err) => Some(err),
            _ => None,
        }
    }
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;
