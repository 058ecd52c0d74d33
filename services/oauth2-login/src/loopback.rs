//! Loopback redirect listener
//!
//! Serves the redirect URI's path on a local socket, prints the
//! authorization URL for the user to open, and resolves with the first
//! redirect that carries a code or an error. Ctrl-C or the login timeout
//! resolve as `Cancelled`.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use oauth2_session::{InteractiveLogin, LoginOutcome, parse_redirect};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use url::Url;

pub struct LoopbackLogin {
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    redirect_uri: String,
    callback_path: String,
    expected_state: Option<String>,
    timeout: Duration,
}

struct CallbackState {
    redirect_uri: String,
    expected_state: Option<String>,
    outcome: Mutex<Option<oneshot::Sender<LoginOutcome>>>,
}

impl LoopbackLogin {
    /// Bind the listener up front so a busy port fails before the user is
    /// sent to the authorization server.
    pub async fn bind(
        listen_addr: SocketAddr,
        redirect_uri: &str,
        expected_state: Option<String>,
        timeout: Duration,
    ) -> common::Result<Self> {
        let parsed = Url::parse(redirect_uri).map_err(|e| {
            common::Error::Config(format!("redirect_uri is not a valid URL: {e}"))
        })?;
        let listener = TcpListener::bind(listen_addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener: Mutex::new(Some(listener)),
            local_addr,
            redirect_uri: redirect_uri.to_owned(),
            callback_path: parsed.path().to_owned(),
            expected_state,
            timeout,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn run(&self, authorization_url: &str) -> LoginOutcome {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(listener) = listener else {
            warn!("loopback listener already consumed by an earlier attempt");
            return LoginOutcome::Denied {
                error: "server_error".into(),
                description: Some("loopback listener already used".into()),
            };
        };

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let state = Arc::new(CallbackState {
            redirect_uri: self.redirect_uri.clone(),
            expected_state: self.expected_state.clone(),
            outcome: Mutex::new(Some(outcome_tx)),
        });
        let app = Router::new()
            .route(&self.callback_path, get(callback_handler))
            .with_state(state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!(addr = %self.local_addr, path = %self.callback_path, "waiting for authorization redirect");
        eprintln!("Open this URL in your browser to authorize:\n\n    {authorization_url}\n");

        let outcome = tokio::select! {
            received = outcome_rx => received.unwrap_or(LoginOutcome::Cancelled),
            _ = tokio::signal::ctrl_c() => {
                info!("received SIGINT, cancelling login");
                LoginOutcome::Cancelled
            }
            _ = tokio::time::sleep(self.timeout) => {
                warn!(timeout_secs = self.timeout.as_secs(), "login timed out");
                LoginOutcome::Cancelled
            }
        };

        let _ = shutdown_tx.send(());
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "loopback server error"),
            Err(e) => error!(error = %e, "loopback server task panicked"),
        }
        outcome
    }
}

impl InteractiveLogin for LoopbackLogin {
    fn authorize<'a>(
        &'a self,
        authorization_url: &'a str,
    ) -> Pin<Box<dyn Future<Output = LoginOutcome> + Send + 'a>> {
        Box::pin(self.run(authorization_url))
    }
}

/// Hand the first conclusive redirect to the waiting login and tell the
/// browser how it went.
async fn callback_handler(State(state): State<Arc<CallbackState>>, uri: Uri) -> impl IntoResponse {
    let base = state
        .redirect_uri
        .split(['?', '#'])
        .next()
        .unwrap_or(&state.redirect_uri);
    let navigated = match uri.query() {
        Some(query) => format!("{base}?{query}"),
        None => base.to_owned(),
    };

    let Some(outcome) = parse_redirect(&state.redirect_uri, &navigated, state.expected_state.as_deref())
    else {
        return (StatusCode::NOT_FOUND, "Not the redirect URI.".to_string());
    };

    let (status, body) = match &outcome {
        LoginOutcome::Code(_) => (
            StatusCode::OK,
            "Authorization complete. You can close this window.".to_string(),
        ),
        LoginOutcome::Denied { error, .. } => (
            StatusCode::BAD_REQUEST,
            format!("Authorization failed: {error}"),
        ),
        LoginOutcome::Cancelled => (StatusCode::OK, "Authorization cancelled.".to_string()),
    };

    let sender = state
        .outcome
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    match sender {
        Some(sender) => {
            let _ = sender.send(outcome);
        }
        None => return (StatusCode::CONFLICT, "Authorization already handled.".to_string()),
    }
    (status, body)
}
