//! Authorization request URL (RFC 6749 §4.1.1)

use url::form_urlencoded;

use crate::config::ClientConfig;
use crate::constants::RESPONSE_TYPE_CODE;

/// Build the authorization URL the resource owner is sent to.
///
/// Parameter order: `client_id`, `client_secret`, `response_type=code`,
/// `redirect_uri`, then `scope` (scopes joined with the configured
/// separator, only when scopes are set), then every extra parameter in the
/// order it was added. Values are form-encoded, so reserved characters in
/// scopes or secrets survive a round trip through a query parser.
///
/// Pure and deterministic; no network access.
pub fn build_authorization_url(config: &ClientConfig) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("client_id", config.client_id())
        .append_pair("client_secret", config.client_secret().expose())
        .append_pair("response_type", RESPONSE_TYPE_CODE)
        .append_pair("redirect_uri", config.redirect_uri());

    if let Some(scope) = config.joined_scope() {
        query.append_pair("scope", &scope);
    }
    for (name, value) in config.extra_params() {
        query.append_pair(name, value);
    }

    let endpoint = config.authorization_endpoint();
    let separator = if endpoint.contains('?') {
        if endpoint.ends_with('?') || endpoint.ends_with('&') {
            ""
        } else {
            "&"
        }
    } else {
        "?"
    };
    format!("{endpoint}{separator}{}", query.finish())
}
