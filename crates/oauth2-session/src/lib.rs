//! OAuth2 credential lifecycle
//!
//! `CredentialManager` owns the current credential for one client
//! registration and keeps it usable for any number of concurrent callers.
//!
//! Lifecycle:
//! 1. `authenticate()` hands the authorization URL to an `InteractiveLogin`
//!    and exchanges the returned code for a credential (generation 1)
//! 2. `current()` returns the credential without suspending while it is live
//! 3. Once expired, the first reader starts one refresh; every concurrent
//!    reader of that generation shares its outcome
//! 4. A rejected refresh token is sticky until `authenticate()` runs again
//! 5. `spawn_refresh_task()` optionally refreshes ahead of expiry

pub mod error;
pub mod login;
pub mod manager;
mod metrics;
pub mod refresh;

pub use error::{Error, Result};
pub use login::{InteractiveLogin, LoginAbort, LoginOutcome, parse_redirect};
pub use manager::{CredentialManager, CredentialState};
pub use refresh::spawn_refresh_task;
