//! Client configuration and its builder
//!
//! `ClientConfigBuilder` collects endpoint URLs, client credentials, scopes
//! and extra authorization parameters. `build()` validates every required
//! field at once and returns an immutable `ClientConfig`; nothing here
//! touches the network.

use std::time::Duration;

use common::Secret;

use crate::constants::{
    AUTHORIZATION_CODE_GRANT, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SCOPE_SEPARATOR,
};
use crate::error::ConfigurationError;

/// Validated OAuth2 client configuration.
///
/// Immutable once built. Share it behind an `Arc` between the manager and
/// anything else that needs to read it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    authorization_endpoint: String,
    token_endpoint: String,
    refresh_endpoint: Option<String>,
    client_id: String,
    client_secret: Secret<String>,
    redirect_uri: String,
    scopes: Vec<String>,
    scope_separator: String,
    extra_params: Vec<(String, String)>,
    grant_type: String,
    request_timeout: Duration,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    pub fn authorization_endpoint(&self) -> &str {
        &self.authorization_endpoint
    }

    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }

    /// Endpoint used for refresh requests. Falls back to the token endpoint.
    pub fn refresh_endpoint(&self) -> &str {
        self.refresh_endpoint
            .as_deref()
            .unwrap_or(&self.token_endpoint)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &Secret<String> {
        &self.client_secret
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn scope_separator(&self) -> &str {
        &self.scope_separator
    }

    /// Scopes joined with the configured separator, or `None` when no scope
    /// was requested.
    pub fn joined_scope(&self) -> Option<String> {
        if self.scopes.is_empty() {
            None
        } else {
            Some(self.scopes.join(&self.scope_separator))
        }
    }

    /// Additional authorization parameters in insertion order. Duplicate
    /// names are kept.
    pub fn extra_params(&self) -> &[(String, String)] {
        &self.extra_params
    }

    pub fn grant_type(&self) -> &str {
        &self.grant_type
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

/// Chained setter builder for `ClientConfig`.
#[derive(Debug, Default, Clone)]
pub struct ClientConfigBuilder {
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    refresh_endpoint: Option<String>,
    client_id: Option<String>,
    client_secret: Option<Secret<String>>,
    redirect_uri: Option<String>,
    scopes: Vec<String>,
    scope_separator: Option<String>,
    extra_params: Vec<(String, String)>,
    grant_type: Option<String>,
    request_timeout: Option<Duration>,
}

impl ClientConfigBuilder {
    pub fn authorization_endpoint(mut self, url: impl Into<String>) -> Self {
        self.authorization_endpoint = Some(url.into());
        self
    }

    pub fn token_endpoint(mut self, url: impl Into<String>) -> Self {
        self.token_endpoint = Some(url.into());
        self
    }

    /// Distinct endpoint for refresh requests. An empty value means "use the
    /// token endpoint".
    pub fn refresh_endpoint(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.refresh_endpoint = if url.trim().is_empty() { None } else { Some(url) };
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn client_secret(mut self, client_secret: impl Into<Secret<String>>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// Replace the whole scope list.
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Append one scope to the list.
    pub fn add_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    pub fn scope_separator(mut self, separator: impl Into<String>) -> Self {
        self.scope_separator = Some(separator.into());
        self
    }

    /// Append an extra authorization parameter. Earlier parameters with the
    /// same name are kept and all of them are sent.
    pub fn add_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.push((name.into(), value.into()));
        self
    }

    pub fn grant_type(mut self, grant_type: impl Into<String>) -> Self {
        self.grant_type = Some(grant_type.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Validate and freeze the configuration.
    ///
    /// Every missing or empty required field is reported, in declaration
    /// order, not just the first one found.
    pub fn build(self) -> Result<ClientConfig, ConfigurationError> {
        let mut missing = Vec::new();
        let authorization_endpoint =
            required(self.authorization_endpoint, "authorization_endpoint", &mut missing);
        let token_endpoint = required(self.token_endpoint, "token_endpoint", &mut missing);
        let client_id = required(self.client_id, "client_id", &mut missing);
        let client_secret = match self.client_secret {
            Some(secret) if !secret.is_blank() => Some(secret),
            _ => {
                missing.push("client_secret");
                None
            }
        };
        let redirect_uri = required(self.redirect_uri, "redirect_uri", &mut missing);

        let (
            Some(authorization_endpoint),
            Some(token_endpoint),
            Some(client_id),
            Some(client_secret),
            Some(redirect_uri),
        ) = (
            authorization_endpoint,
            token_endpoint,
            client_id,
            client_secret,
            redirect_uri,
        )
        else {
            return Err(ConfigurationError { missing });
        };

        Ok(ClientConfig {
            authorization_endpoint,
            token_endpoint,
            refresh_endpoint: self.refresh_endpoint,
            client_id,
            client_secret,
            redirect_uri,
            scopes: self.scopes,
            scope_separator: self
                .scope_separator
                .unwrap_or_else(|| DEFAULT_SCOPE_SEPARATOR.to_owned()),
            extra_params: self.extra_params,
            grant_type: self
                .grant_type
                .filter(|g| !g.trim().is_empty())
                .unwrap_or_else(|| AUTHORIZATION_CODE_GRANT.to_owned()),
            request_timeout: self
                .request_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
        })
    }
}

fn required(
    value: Option<String>,
    field: &'static str,
    missing: &mut Vec<&'static str>,
) -> Option<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Some(v),
        _ => {
            missing.push(field);
            None
        }
    }
}
