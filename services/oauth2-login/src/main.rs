//! OAuth2 login CLI
//!
//! Obtains and maintains a credential for one client registration:
//! - `login` (default): interactive authorization-code flow through a
//!   loopback redirect listener, then saves the credential file
//! - `token`: loads the credential file, refreshes it when expired, and
//!   prints the access token to stdout

mod config;
mod loopback;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use oauth2_auth::{CredentialFile, TokenExchanger};
use oauth2_session::{CredentialManager, InteractiveLogin, LoginOutcome};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::loopback::LoopbackLogin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Login,
    Token,
}

/// Parse `[--config PATH] [login|token]`.
fn parse_args(args: &[String]) -> Result<(Option<&str>, Command)> {
    let mut config_path = None;
    let mut command = None;
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config requires a path")?;
                config_path = Some(path.as_str());
            }
            "login" if command.is_none() => command = Some(Command::Login),
            "token" if command.is_none() => command = Some(Command::Token),
            other => {
                anyhow::bail!("unexpected argument: {other} (usage: oauth2-login [--config PATH] [login|token])")
            }
        }
    }
    Ok((config_path, command.unwrap_or(Command::Login)))
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr; stdout carries the token for `token`
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let (cli_config_path, command) = parse_args(&args)?;

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let http = reqwest::Client::new();
    let file = CredentialFile::new(&config.storage.credential_file);

    match command {
        Command::Login => login(&config, http, &file).await,
        Command::Token => token(&config, http, &file).await,
    }
}

async fn login(config: &Config, http: reqwest::Client, file: &CredentialFile) -> Result<()> {
    let state = uuid::Uuid::new_v4().as_simple().to_string();
    let client = config.client_config(Some(&state))?;

    let loopback = LoopbackLogin::bind(
        config.login.listen_addr,
        client.redirect_uri(),
        Some(state),
        Duration::from_secs(config.login.timeout_secs),
    )
    .await
    .with_context(|| format!("failed to bind loopback listener on {}", config.login.listen_addr))?;

    let manager = CredentialManager::new(client, TokenExchanger::new(http), Arc::new(loopback));
    let credential = manager.authenticate().await.context("authentication failed")?;

    file.save(&credential)
        .await
        .with_context(|| format!("failed to save credential to {}", file.path().display()))?;

    info!(
        path = %file.path().display(),
        token_type = credential.token_type(),
        expires_in = credential.expires_in(),
        has_refresh_token = credential.refresh_token().is_some(),
        scope = credential.scope().unwrap_or(""),
        "credential saved"
    );
    Ok(())
}

async fn token(config: &Config, http: reqwest::Client, file: &CredentialFile) -> Result<()> {
    let client = config.client_config(None)?;
    let stored = file
        .load()
        .await
        .with_context(|| format!("failed to read {}", file.path().display()))?
        .with_context(|| {
            format!(
                "no credential at {}; run `oauth2-login login` first",
                file.path().display()
            )
        })?;

    let manager = CredentialManager::new(client, TokenExchanger::new(http), Arc::new(Unattended));
    let restored = manager.restore(stored)?;
    let current = manager
        .current()
        .await
        .context("stored credential is no longer usable")?;

    if !Arc::ptr_eq(&restored, &current) {
        file.save(&current)
            .await
            .with_context(|| format!("failed to save credential to {}", file.path().display()))?;
        info!(generation = manager.generation(), "refreshed credential saved");
    }

    println!("{}", current.access_token());
    Ok(())
}

/// `token` never starts the interactive flow.
struct Unattended;

impl InteractiveLogin for Unattended {
    fn authorize<'a>(
        &'a self,
        _authorization_url: &'a str,
    ) -> Pin<Box<dyn Future<Output = LoginOutcome> + Send + 'a>> {
        Box::pin(async { LoginOutcome::Cancelled })
    }
}
