//! Proactive background refresh
//!
//! Periodically asks the manager to refresh a credential that expires within
//! a threshold, so request-path reads rarely pay refresh latency. The task
//! goes through the manager's single-flight path and never races readers.

use std::ops::ControlFlow;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::Error;
use crate::manager::CredentialManager;

/// Spawn a task that refreshes the credential when it expires within
/// `threshold`, checking every `interval`.
///
/// The first tick is skipped. No credential yet, or an expired credential
/// without a refresh token, skips the cycle. Transient failures are retried
/// next cycle. A terminal refresh failure ends the task.
pub fn spawn_refresh_task(
    manager: CredentialManager,
    interval: Duration,
    threshold: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if refresh_cycle(&manager, threshold).await.is_break() {
                info!("background refresh stopped");
                break;
            }
        }
    })
}

async fn refresh_cycle(manager: &CredentialManager, threshold: Duration) -> ControlFlow<()> {
    let before = manager.generation();
    match manager.refresh_if_expiring(threshold).await {
        Ok(_) => {
            let after = manager.generation();
            if after != before {
                debug!(?before, ?after, "background refresh installed new credential");
            }
            ControlFlow::Continue(())
        }
        Err(Error::NotAuthenticated | Error::CredentialExpired) => ControlFlow::Continue(()),
        Err(Error::Token(err)) if err.is_terminal() => {
            warn!(kind = %err.kind, error = %err, "refresh token rejected");
            ControlFlow::Break(())
        }
        Err(e) => {
            warn!(error = %e, "background refresh failed, will retry next cycle");
            ControlFlow::Continue(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::login::{InteractiveLogin, LoginOutcome};
    use oauth2_auth::{ClientConfig, Clock, Credential, ManualClock, TokenExchanger};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NoLogin;

    impl InteractiveLogin for NoLogin {
        fn authorize<'a>(
            &'a self,
            _authorization_url: &'a str,
        ) -> Pin<Box<dyn Future<Output = LoginOutcome> + Send + 'a>> {
            Box::pin(async { LoginOutcome::Cancelled })
        }
    }

    fn manager(server: &MockServer) -> (CredentialManager, Arc<ManualClock>) {
        let config = ClientConfig::builder()
            .authorization_endpoint(format!("{}/authorize", server.uri()))
            .token_endpoint(format!("{}/token", server.uri()))
            .client_id("abc")
            .client_secret("s3cret")
            .redirect_uri("https://app/callback")
            .build()
            .unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let exchanger = TokenExchanger::with_clock(reqwest::Client::new(), clock.clone());
        (
            CredentialManager::new(config, exchanger, Arc::new(NoLogin)),
            clock,
        )
    }

    fn credential(clock: &ManualClock, expires_in: u64, refresh: Option<&str>) -> Credential {
        Credential::new(
            "tok1",
            "Bearer",
            expires_in,
            refresh.map(Into::into),
            None,
            clock.now(),
        )
    }

    #[tokio::test]
    async fn cycle_skips_credential_outside_threshold() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        let (manager, clock) = manager(&server);
        manager
            .restore(credential(&clock, 7200, Some("rt_1")))
            .unwrap();

        let flow = refresh_cycle(&manager, Duration::from_secs(900)).await;
        assert!(flow.is_continue());
        assert_eq!(manager.generation(), Some(1));
    }

    #[tokio::test]
    async fn cycle_refreshes_credential_inside_threshold() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok2",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;
        let (manager, clock) = manager(&server);
        manager
            .restore(credential(&clock, 600, Some("rt_1")))
            .unwrap();

        let flow = refresh_cycle(&manager, Duration::from_secs(900)).await;
        assert!(flow.is_continue());
        assert_eq!(manager.generation(), Some(2));
        assert_eq!(manager.current().await.unwrap().access_token(), "tok2");
    }

    #[tokio::test]
    async fn cycle_without_credential_continues() {
        let server = MockServer::start().await;
        let (manager, clock) = manager(&server);
        assert!(refresh_cycle(&manager, Duration::from_secs(900)).await.is_continue());

        manager.restore(credential(&clock, 5, None)).unwrap();
        assert!(refresh_cycle(&manager, Duration::from_secs(900)).await.is_continue());
    }

    #[tokio::test]
    async fn transient_failure_continues() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let (manager, clock) = manager(&server);
        manager
            .restore(credential(&clock, 600, Some("rt_1")))
            .unwrap();

        assert!(refresh_cycle(&manager, Duration::from_secs(900)).await.is_continue());
        assert_eq!(manager.generation(), Some(1));
    }

    #[tokio::test]
    async fn terminal_failure_stops_task() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;
        let (manager, clock) = manager(&server);
        manager
            .restore(credential(&clock, 600, Some("rt_dead")))
            .unwrap();

        let handle = spawn_refresh_task(
            manager.clone(),
            Duration::from_millis(20),
            Duration::from_secs(900),
        );
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("task should stop on terminal failure")
            .unwrap();
    }
}
