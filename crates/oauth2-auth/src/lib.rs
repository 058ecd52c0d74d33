//! OAuth2 authorization-code client: protocol layer
//!
//! Builds authorization URLs, exchanges codes and refresh tokens at the
//! token endpoint, and models the resulting credential with its expiry.
//! Holds no session state; `oauth2-session` owns the credential lifecycle.
//!
//! Flow:
//! 1. Caller assembles a `ClientConfig` with `ClientConfig::builder()`
//! 2. `build_authorization_url()` produces the URL for the resource owner
//! 3. `TokenExchanger::exchange_code()` trades the returned code for a `Credential`
//! 4. `TokenExchanger::refresh()` obtains a replacement before expiry
//! 5. `CredentialFile` optionally persists the credential between runs

pub mod authorize;
pub mod clock;
pub mod config;
pub mod constants;
pub mod credential;
pub mod error;
pub mod store;
pub mod token;

pub use authorize::build_authorization_url;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use credential::Credential;
pub use error::{ConfigurationError, Error, Result, TokenError, TokenErrorKind};
pub use store::CredentialFile;
pub use token::{TokenExchanger, TokenResponse, classify_failure};
