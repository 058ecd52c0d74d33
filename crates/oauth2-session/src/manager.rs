//! Credential lifecycle state machine
//!
//! `CredentialManager` owns the single "current credential" slot:
//!
//! - Unauthenticated → Authenticating (`authenticate()`)
//! - Authenticating → Valid (code exchanged) | Unauthenticated (cancelled, denied, exchange failed)
//! - Valid → Refreshing (a read finds the credential expired and a refresh token present)
//! - Refreshing → Valid (new generation) | Valid (transient failure, next read retries)
//!   | RefreshFailed (terminal failure)
//! - Valid → Expired (expired with no refresh token)
//! - Expired | RefreshFailed → Authenticating (`authenticate()` is the recovery path)
//!
//! Refresh is single-flight per credential generation. The first reader to
//! see an expired credential starts the refresh on a spawned task; every
//! reader of that generation, the initiator included, waits on the same
//! watch channel and receives the same outcome. Dropping a waiting reader
//! does not cancel the refresh. The slot lock is never held across an
//! await, so reads of a live credential never wait on a refresh.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};

use oauth2_auth::{
    ClientConfig, Credential, TokenError, TokenErrorKind, TokenExchanger,
    build_authorization_url,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::login::InteractiveLogin;
use crate::metrics;

type RefreshResult = std::result::Result<Arc<Credential>, TokenError>;

/// Externally observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Unauthenticated,
    Authenticating,
    /// A credential is held. It may already be past its refresh point if a
    /// refresh token is available; the next read refreshes it.
    Valid,
    Refreshing,
    /// Expired with no refresh token. Only `authenticate()` recovers.
    Expired,
    /// The refresh token was rejected. Only `authenticate()` recovers.
    RefreshFailed,
}

impl CredentialState {
    pub fn label(&self) -> &'static str {
        match self {
            CredentialState::Unauthenticated => "unauthenticated",
            CredentialState::Authenticating => "authenticating",
            CredentialState::Valid => "valid",
            CredentialState::Refreshing => "refreshing",
            CredentialState::Expired => "expired",
            CredentialState::RefreshFailed => "refresh_failed",
        }
    }
}

/// Single-flight refresh coordination for one generation.
struct Flight {
    started: AtomicBool,
    outcome: watch::Sender<Option<RefreshResult>>,
}

impl Flight {
    fn new() -> Arc<Self> {
        let (outcome, _) = watch::channel(None);
        Arc::new(Self {
            started: AtomicBool::new(false),
            outcome,
        })
    }

    fn in_progress(&self) -> bool {
        self.started.load(Ordering::Acquire) && self.outcome.borrow().is_none()
    }
}

/// Publishes the refresh outcome exactly once, even if the refresh task
/// unwinds before producing one.
struct FlightPublisher {
    flight: Arc<Flight>,
    published: bool,
}

impl FlightPublisher {
    fn publish(mut self, result: RefreshResult) {
        self.flight.outcome.send_replace(Some(result));
        self.published = true;
    }
}

impl Drop for FlightPublisher {
    fn drop(&mut self) {
        if !self.published {
            self.flight
                .outcome
                .send_replace(Some(Err(TokenError::without_response(
                    TokenErrorKind::Network,
                    "refresh task ended without an outcome".into(),
                ))));
        }
    }
}

struct Generation {
    id: u64,
    credential: Arc<Credential>,
    flight: Arc<Flight>,
}

enum Slot {
    Unauthenticated,
    Authenticating,
    Active(Generation),
    RefreshFailed { error: TokenError },
}

struct Inner {
    slot: Slot,
    last_generation: u64,
}

impl Inner {
    fn install(&mut self, credential: Arc<Credential>) -> u64 {
        self.last_generation += 1;
        self.slot = Slot::Active(Generation {
            id: self.last_generation,
            credential,
            flight: Flight::new(),
        });
        self.last_generation
    }

    fn active(&mut self, generation: u64) -> Option<&mut Generation> {
        match &mut self.slot {
            Slot::Active(g) if g.id == generation => Some(g),
            _ => None,
        }
    }
}

struct Shared {
    config: Arc<ClientConfig>,
    exchanger: TokenExchanger,
    login: Arc<dyn InteractiveLogin>,
    inner: RwLock<Inner>,
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> SystemTime {
        self.exchanger.clock().now()
    }

    /// Run one refresh for `generation` and publish the outcome to every
    /// waiter on `flight`.
    async fn refresh_generation(&self, generation: u64, refresh_token: String, flight: Arc<Flight>) {
        let publisher = FlightPublisher {
            flight: Arc::clone(&flight),
            published: false,
        };

        debug!(generation, "refreshing credential");
        let result = match self.exchanger.refresh(&self.config, &refresh_token).await {
            Ok(fresh) => {
                // A server may omit refresh_token on refresh; keep using ours.
                let fresh = Arc::new(fresh.or_refresh_token(Some(&refresh_token)));
                let installed = {
                    let mut inner = self.write();
                    if inner.active(generation).is_some() {
                        Some(inner.install(Arc::clone(&fresh)))
                    } else {
                        None
                    }
                };
                match installed {
                    Some(next) => info!(
                        previous_generation = generation,
                        generation = next,
                        expires_in = fresh.expires_in(),
                        "credential refreshed"
                    ),
                    None => debug!(
                        generation,
                        "generation superseded during refresh, not installing"
                    ),
                }
                metrics::record_refresh(Ok(()));
                Ok(fresh)
            }
            Err(err) if err.is_terminal() => {
                let mut inner = self.write();
                if inner.active(generation).is_some() {
                    inner.slot = Slot::RefreshFailed { error: err.clone() };
                }
                drop(inner);
                warn!(
                    generation,
                    kind = %err.kind,
                    error = %err,
                    "refresh token rejected, re-authentication required"
                );
                metrics::record_refresh(Err(&err));
                Err(err)
            }
            Err(err) => {
                {
                    let mut inner = self.write();
                    if let Some(current) = inner.active(generation) {
                        if Arc::ptr_eq(&current.flight, &flight) {
                            current.flight = Flight::new();
                        }
                    }
                }
                warn!(
                    generation,
                    kind = %err.kind,
                    error = %err,
                    "refresh failed transiently, next read retries"
                );
                metrics::record_refresh(Err(&err));
                Err(err)
            }
        };
        publisher.publish(result);
    }
}

/// Owns the current credential and keeps it usable.
///
/// Cheap to clone; clones share the same slot. Safe to call from any number
/// of tasks without external locking.
#[derive(Clone)]
pub struct CredentialManager {
    shared: Arc<Shared>,
}

impl CredentialManager {
    /// Create a manager in the `Unauthenticated` state.
    ///
    /// Expiry is evaluated against the exchanger's clock, the same clock
    /// that stamps `issued_at`.
    pub fn new(
        config: impl Into<Arc<ClientConfig>>,
        exchanger: TokenExchanger,
        login: Arc<dyn InteractiveLogin>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config: config.into(),
                exchanger,
                login,
                inner: RwLock::new(Inner {
                    slot: Slot::Unauthenticated,
                    last_generation: 0,
                }),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub fn state(&self) -> CredentialState {
        let now = self.shared.now();
        let inner = self.shared.read();
        match &inner.slot {
            Slot::Unauthenticated => CredentialState::Unauthenticated,
            Slot::Authenticating => CredentialState::Authenticating,
            Slot::RefreshFailed { .. } => CredentialState::RefreshFailed,
            Slot::Active(g) if g.flight.in_progress() => CredentialState::Refreshing,
            Slot::Active(g)
                if g.credential.refresh_token().is_none() && g.credential.is_expired(now) =>
            {
                CredentialState::Expired
            }
            Slot::Active(_) => CredentialState::Valid,
        }
    }

    /// Generation number of the held credential. Advances on every install
    /// (authentication, refresh, restore).
    pub fn generation(&self) -> Option<u64> {
        match &self.shared.read().slot {
            Slot::Active(g) => Some(g.id),
            _ => None,
        }
    }

    /// Run the interactive authorization-code flow.
    ///
    /// Accepted from `Unauthenticated`, `Expired` and `RefreshFailed`.
    /// Suspends for the whole interactive login plus one token request. If
    /// the login is cancelled or denied, the exchange fails, or this future
    /// is dropped, the manager is left `Unauthenticated`.
    pub async fn authenticate(&self) -> Result<Arc<Credential>> {
        self.begin_authentication()?;
        let mut attempt = AuthenticationAttempt {
            shared: &self.shared,
            completed: false,
        };

        let url = build_authorization_url(&self.shared.config);
        info!(
            client_id = self.shared.config.client_id(),
            "starting interactive authorization"
        );

        let code = match self.shared.login.authorize(&url).await.into_code() {
            Ok(code) => code,
            Err(abort) => {
                info!(reason = %abort, "interactive authorization aborted");
                metrics::record_authentication(metrics::abort_label(&abort));
                return Err(Error::AuthenticationCancelled(abort));
            }
        };

        let credential = match self
            .shared
            .exchanger
            .exchange_code(&self.shared.config, &code)
            .await
        {
            Ok(credential) => Arc::new(credential),
            Err(err) => {
                warn!(kind = %err.kind, error = %err, "authorization code exchange failed");
                metrics::record_authentication("failed");
                return Err(err.into());
            }
        };

        let generation = self.shared.write().install(Arc::clone(&credential));
        attempt.completed = true;
        info!(
            generation,
            expires_in = credential.expires_in(),
            has_refresh_token = credential.refresh_token().is_some(),
            "authenticated"
        );
        metrics::record_authentication("success");
        Ok(credential)
    }

    /// Return a usable credential, refreshing it first if it has expired.
    ///
    /// Does not suspend while the held credential is live. When a refresh
    /// is needed, suspends for one token request shared with every other
    /// concurrent reader of the same generation.
    pub async fn current(&self) -> Result<Arc<Credential>> {
        self.current_within(0).await
    }

    /// Like `current()`, but refreshes when the credential expires within
    /// `margin`. Used for proactive refresh.
    pub async fn refresh_if_expiring(&self, margin: Duration) -> Result<Arc<Credential>> {
        let margin_secs = i64::try_from(margin.as_secs()).unwrap_or(i64::MAX);
        self.current_within(margin_secs).await
    }

    /// Install a previously issued credential (for example one loaded from
    /// disk) as a new generation.
    pub fn restore(&self, credential: Credential) -> Result<Arc<Credential>> {
        let credential = Arc::new(credential);
        let mut inner = self.shared.write();
        if matches!(inner.slot, Slot::Authenticating) {
            return Err(Error::AuthenticationInProgress);
        }
        let generation = inner.install(Arc::clone(&credential));
        drop(inner);
        info!(generation, "restored credential");
        Ok(credential)
    }

    /// Drop the held credential and return to `Unauthenticated`.
    pub fn sign_out(&self) -> Result<()> {
        let mut inner = self.shared.write();
        if matches!(inner.slot, Slot::Authenticating) {
            return Err(Error::AuthenticationInProgress);
        }
        inner.slot = Slot::Unauthenticated;
        drop(inner);
        info!("signed out");
        Ok(())
    }

    fn begin_authentication(&self) -> Result<()> {
        let now = self.shared.now();
        let mut inner = self.shared.write();
        match &inner.slot {
            Slot::Authenticating => return Err(Error::AuthenticationInProgress),
            Slot::Active(g)
                if g.credential.refresh_token().is_some() || !g.credential.is_expired(now) =>
            {
                return Err(Error::AlreadyAuthenticated);
            }
            Slot::Unauthenticated | Slot::Active(_) | Slot::RefreshFailed { .. } => {}
        }
        inner.slot = Slot::Authenticating;
        Ok(())
    }

    async fn current_within(&self, margin_secs: i64) -> Result<Arc<Credential>> {
        let now = self.shared.now();
        let (generation, refresh_token, flight) = {
            let inner = self.shared.read();
            match &inner.slot {
                Slot::Unauthenticated | Slot::Authenticating => {
                    return Err(Error::NotAuthenticated);
                }
                Slot::RefreshFailed { error } => return Err(Error::Token(error.clone())),
                Slot::Active(g) => {
                    if !g.credential.expires_within(now, margin_secs) {
                        return Ok(Arc::clone(&g.credential));
                    }
                    let Some(refresh_token) = g.credential.refresh_token() else {
                        if g.credential.is_expired(now) {
                            return Err(Error::CredentialExpired);
                        }
                        return Ok(Arc::clone(&g.credential));
                    };
                    (g.id, refresh_token.to_owned(), Arc::clone(&g.flight))
                }
            }
        };

        if !flight.started.swap(true, Ordering::AcqRel) {
            let shared = Arc::clone(&self.shared);
            let task_flight = Arc::clone(&flight);
            tokio::spawn(async move {
                shared
                    .refresh_generation(generation, refresh_token, task_flight)
                    .await;
            });
        } else {
            debug!(generation, "joining in-flight refresh");
        }

        let mut outcome = flight.outcome.subscribe();
        let result = match outcome.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        result
            .unwrap_or_else(|| {
                Err(TokenError::without_response(
                    TokenErrorKind::Network,
                    "refresh coordination closed without an outcome".into(),
                ))
            })
            .map_err(Error::from)
    }
}

/// Returns the slot to `Unauthenticated` unless the attempt completed.
struct AuthenticationAttempt<'a> {
    shared: &'a Shared,
    completed: bool,
}

impl Drop for AuthenticationAttempt<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let mut inner = self.shared.write();
        if matches!(inner.slot, Slot::Authenticating) {
            inner.slot = Slot::Unauthenticated;
        }
    }
}
