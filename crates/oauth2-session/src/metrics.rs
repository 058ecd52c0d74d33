//! Credential lifecycle counters
//!
//! - `oauth2_refresh_total` (counter): label `outcome` = success | transient | terminal
//! - `oauth2_authentications_total` (counter): label `outcome` = success | cancelled | denied | failed
//!
//! No-ops until the embedding process installs a recorder.

use crate::login::LoginAbort;
use oauth2_auth::TokenError;

pub(crate) fn record_refresh(result: Result<(), &TokenError>) {
    let outcome = match result {
        Ok(()) => "success",
        Err(err) if err.is_terminal() => "terminal",
        Err(_) => "transient",
    };
    metrics::counter!("oauth2_refresh_total", "outcome" => outcome).increment(1);
}

pub(crate) fn record_authentication(outcome: &'static str) {
    metrics::counter!("oauth2_authentications_total", "outcome" => outcome).increment(1);
}

pub(crate) fn abort_label(abort: &LoginAbort) -> &'static str {
    match abort {
        LoginAbort::Cancelled => "cancelled",
        LoginAbort::Denied { .. } => "denied",
    }
}
