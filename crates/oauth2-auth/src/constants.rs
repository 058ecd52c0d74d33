//! OAuth2 protocol constants (RFC 6749)

/// Grant type used when none is configured.
pub const AUTHORIZATION_CODE_GRANT: &str = "authorization_code";

/// Grant type for token refresh requests.
pub const REFRESH_TOKEN_GRANT: &str = "refresh_token";

/// `response_type` for the authorization-code flow.
pub const RESPONSE_TYPE_CODE: &str = "code";

/// Scopes are joined with a single space unless configured otherwise.
pub const DEFAULT_SCOPE_SEPARATOR: &str = " ";

/// Safety margin subtracted from the declared token lifetime so that a
/// credential is refreshed before the server considers it expired.
pub const EXPIRY_BUFFER_SECS: i64 = 10;

/// Per-request timeout for token endpoint calls unless configured otherwise.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Lifetime assumed when a token response omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// `token_type` assumed when a token response omits it.
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";
