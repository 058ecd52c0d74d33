//! Token endpoint exchange and refresh
//!
//! Both interactions are a form-encoded POST answered by a JSON token
//! response:
//! 1. Authorization code exchange (`grant_type` from the config, normally
//!    `authorization_code`) against the token endpoint
//! 2. Refresh (`grant_type=refresh_token`) against the refresh endpoint,
//!    which defaults to the token endpoint
//!
//! Failures never escape as panics or transport errors: every outcome is a
//! `Credential` or a classified `TokenError` carrying the raw status and body.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use common::Secret;

use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::constants::{DEFAULT_EXPIRES_IN_SECS, DEFAULT_TOKEN_TYPE, REFRESH_TOKEN_GRANT};
use crate::credential::Credential;
use crate::error::{TokenError, TokenErrorKind};

/// Successful token endpoint response body.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Seconds until the access token expires (delta, not absolute).
    /// Optional per RFC 6749 §5.1; `DEFAULT_EXPIRES_IN_SECS` applies when absent.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Absent when the grant or server does not issue one.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_owned()
}

/// Error response body per RFC 6749 §5.2.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Stateless token endpoint client.
///
/// Holds only the shared HTTP transport and the clock used to stamp
/// `issued_at`. Cloning is cheap and clones share the connection pool, so
/// concurrent exchanges and refreshes need no coordination here.
#[derive(Clone)]
pub struct TokenExchanger {
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl TokenExchanger {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_clock(http, Arc::new(SystemClock))
    }

    pub fn with_clock(http: reqwest::Client, clock: Arc<dyn Clock>) -> Self {
        Self { http, clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Exchange an authorization code for a credential.
    pub async fn exchange_code(
        &self,
        config: &ClientConfig,
        code: &str,
    ) -> Result<Credential, TokenError> {
        let form = [
            ("client_id", config.client_id()),
            ("client_secret", config.client_secret().expose().as_str()),
            ("grant_type", config.grant_type()),
            ("redirect_uri", config.redirect_uri()),
            ("code", code),
        ];
        self.post(config, config.token_endpoint(), &form, "token exchange")
            .await
    }

    /// Obtain a new credential with a refresh token.
    pub async fn refresh(
        &self,
        config: &ClientConfig,
        refresh_token: &str,
    ) -> Result<Credential, TokenError> {
        let form = [
            ("client_id", config.client_id()),
            ("client_secret", config.client_secret().expose().as_str()),
            ("grant_type", REFRESH_TOKEN_GRANT),
            ("refresh_token", refresh_token),
        ];
        self.post(config, config.refresh_endpoint(), &form, "token refresh")
            .await
    }

    async fn post(
        &self,
        config: &ClientConfig,
        endpoint: &str,
        form: &[(&str, &str)],
        operation: &'static str,
    ) -> Result<Credential, TokenError> {
        debug!(endpoint, operation, "posting to token endpoint");

        let response = self
            .http
            .post(endpoint)
            .timeout(config.request_timeout())
            .form(form)
            .send()
            .await
            .map_err(|e| transport_error(operation, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(operation, &e))?;

        if !status.is_success() {
            let err = classify_failure(operation, status.as_u16(), body);
            warn!(
                operation,
                status = status.as_u16(),
                kind = %err.kind,
                error_code = err.error_code.as_deref().unwrap_or(""),
                "token endpoint rejected request"
            );
            return Err(err);
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| TokenError {
            kind: TokenErrorKind::Malformed,
            status: Some(status.as_u16()),
            error_code: None,
            message: format!("invalid {operation} response: {e}"),
            body: body.clone(),
        })?;

        Ok(Credential::new(
            parsed.access_token,
            parsed.token_type,
            parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
            parsed.refresh_token.map(Secret::new),
            parsed.scope,
            self.clock.now(),
        ))
    }
}

fn transport_error(operation: &str, err: &reqwest::Error) -> TokenError {
    let kind = if err.is_timeout() {
        TokenErrorKind::Timeout
    } else {
        TokenErrorKind::Network
    };
    TokenError::without_response(kind, format!("{operation} request failed: {err}"))
}

/// Classify a non-2xx token endpoint response.
///
/// 5xx, 408 and 429 are transient. Otherwise the RFC 6749 `error` code
/// decides: `invalid_grant` and `invalid_client` are recognised, a bare 401
/// counts as `invalid_client`, and any other 4xx is `Rejected`.
pub fn classify_failure(operation: &str, status: u16, body: String) -> TokenError {
    let parsed = serde_json::from_str::<ErrorResponse>(&body).ok();
    let error_code = parsed.as_ref().map(|p| p.error.clone());

    let kind = match (status, error_code.as_deref()) {
        (408 | 429, _) | (500..=599, _) => TokenErrorKind::Server,
        (_, Some("invalid_grant")) => TokenErrorKind::InvalidGrant,
        (_, Some("invalid_client")) | (401, None) => TokenErrorKind::InvalidClient,
        (400..=499, _) => TokenErrorKind::Rejected,
        _ => TokenErrorKind::Server,
    };

    let detail = match &parsed {
        Some(ErrorResponse {
            error,
            error_description: Some(description),
        }) => format!("{error}: {description}"),
        Some(ErrorResponse { error, .. }) => error.clone(),
        None => body.clone(),
    };

    TokenError {
        kind,
        status: Some(status),
        error_code,
        message: format!("{operation} returned {status}: {detail}"),
        body,
    }
}
