//! Interactive-login collaborator contract
//!
//! The manager hands an authorization URL to an `InteractiveLogin`
//! implementation and waits for a code, a cancellation or a denial. How the
//! URL is shown (embedded browser, system browser with a loopback listener,
//! device polling) is up to the implementation. `parse_redirect` turns the
//! URL the browser landed on into an outcome for implementations that
//! observe navigation.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use url::Url;

/// Result of one interactive authorization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The authorization server redirected back with a code.
    Code(String),
    /// The user abandoned the flow (closed the window, pressed Ctrl-C).
    Cancelled,
    /// The authorization server reported an error, e.g. `access_denied`.
    Denied {
        error: String,
        description: Option<String>,
    },
}

/// Why an interactive attempt produced no code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginAbort {
    Cancelled,
    Denied {
        error: String,
        description: Option<String>,
    },
}

impl fmt::Display for LoginAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginAbort::Cancelled => write!(f, "cancelled by user"),
            LoginAbort::Denied {
                error,
                description: Some(description),
            } => write!(f, "denied ({error}: {description})"),
            LoginAbort::Denied { error, .. } => write!(f, "denied ({error})"),
        }
    }
}

impl LoginOutcome {
    pub fn into_code(self) -> std::result::Result<String, LoginAbort> {
        match self {
            LoginOutcome::Code(code) => Ok(code),
            LoginOutcome::Cancelled => Err(LoginAbort::Cancelled),
            LoginOutcome::Denied { error, description } => {
                Err(LoginAbort::Denied { error, description })
            }
        }
    }

    fn denied(error: &str, description: &str) -> Self {
        LoginOutcome::Denied {
            error: error.to_owned(),
            description: Some(description.to_owned()),
        }
    }
}

/// Presents the authorization URL to the resource owner and reports back.
///
/// Uses `Pin<Box<dyn Future>>` so the manager can hold `Arc<dyn InteractiveLogin>`.
/// Implementations must resolve promptly with `Cancelled` when the user
/// abandons the flow.
pub trait InteractiveLogin: Send + Sync {
    fn authorize<'a>(
        &'a self,
        authorization_url: &'a str,
    ) -> Pin<Box<dyn Future<Output = LoginOutcome> + Send + 'a>>;
}

/// Interpret a URL the user agent navigated to.
///
/// Returns `None` while `navigated` is not the redirect URI (scheme, host,
/// port and path must match), so callers can keep watching navigation.
/// At the redirect URI:
/// - `error=...` becomes `Denied` with the optional `error_description`
/// - `code=...` becomes `Code`, unless `expected_state` is given and the
///   returned `state` differs (`Denied { error: "state_mismatch" }`)
/// - neither becomes `Denied { error: "invalid_request" }`
pub fn parse_redirect(
    redirect_uri: &str,
    navigated: &str,
    expected_state: Option<&str>,
) -> Option<LoginOutcome> {
    let expected = Url::parse(redirect_uri).ok()?;
    let actual = Url::parse(navigated).ok()?;

    let same_target = expected.scheme() == actual.scheme()
        && expected.host_str() == actual.host_str()
        && expected.port_or_known_default() == actual.port_or_known_default()
        && expected.path() == actual.path();
    if !same_target {
        return None;
    }

    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = None;
    for (name, value) in actual.query_pairs() {
        match name.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Some(LoginOutcome::Denied { error, description });
    }

    let outcome = match code {
        Some(code) if code.is_empty() => {
            LoginOutcome::denied("invalid_request", "empty authorization code")
        }
        Some(code) => match expected_state {
            Some(expected) if state.as_deref() != Some(expected) => LoginOutcome::denied(
                "state_mismatch",
                "returned state does not match the authorization request",
            ),
            _ => LoginOutcome::Code(code),
        },
        None => LoginOutcome::denied(
            "invalid_request",
            "redirect carried neither code nor error",
        ),
    };
    Some(outcome)
}
