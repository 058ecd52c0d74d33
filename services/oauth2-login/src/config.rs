//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The client secret is taken from OAUTH2_CLIENT_SECRET, then
//! client_secret_file, then an inline client_secret.

use common::Secret;
use oauth2_auth::ClientConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub client: ClientSection,
    #[serde(default)]
    pub login: LoginSection,
    #[serde(default)]
    pub storage: StorageSection,
}

/// Client registration and endpoints
#[derive(Debug, Deserialize)]
pub struct ClientSection {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub refresh_endpoint: Option<String>,
    pub client_id: String,
    #[serde(default, rename = "client_secret")]
    inline_secret: Option<String>,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file holding the client secret (alternative to OAUTH2_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub scope_separator: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub params: Vec<ExtraParam>,
}

/// Extra authorization request parameter
#[derive(Debug, Clone, Deserialize)]
pub struct ExtraParam {
    pub name: String,
    pub value: String,
}

/// Loopback listener for the interactive login
#[derive(Debug, Deserialize)]
pub struct LoginSection {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_login_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_credential_file")]
    pub credential_file: PathBuf,
}

impl Default for LoginSection {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            timeout_secs: default_login_timeout(),
        }
    }
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            credential_file: default_credential_file(),
        }
    }
}

fn default_request_timeout() -> u64 {
    oauth2_auth::constants::DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8765))
}

fn default_login_timeout() -> u64 {
    300
}

fn default_credential_file() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn require_http_url(field: &str, value: &str) -> common::Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        return Ok(());
    }
    Err(common::Error::Config(format!(
        "{field} must start with http:// or https://, got: {value}"
    )))
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        require_http_url(
            "client.authorization_endpoint",
            &config.client.authorization_endpoint,
        )?;
        require_http_url("client.token_endpoint", &config.client.token_endpoint)?;
        if let Some(ref refresh) = config.client.refresh_endpoint {
            require_http_url("client.refresh_endpoint", refresh)?;
        }

        if config.client.timeout_secs == 0 {
            return Err(common::Error::Config(
                "client.timeout_secs must be greater than 0".into(),
            ));
        }
        if config.login.timeout_secs == 0 {
            return Err(common::Error::Config(
                "login.timeout_secs must be greater than 0".into(),
            ));
        }

        if let Ok(secret) = std::env::var("OAUTH2_CLIENT_SECRET") {
            config.client.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.client.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.client.client_secret = Some(Secret::new(secret));
            }
        } else if let Some(secret) = config.client.inline_secret.take() {
            config.client.client_secret = Some(Secret::new(secret));
        }
        config.client.inline_secret = None;

        Ok(config)
    }

    /// Resolve config file path from CLI arg or OAUTH2_LOGIN_CONFIG env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("OAUTH2_LOGIN_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from("oauth2-login.toml")
    }

    /// Assemble the client registration, appending a `state` parameter when
    /// one is given.
    pub fn client_config(&self, state: Option<&str>) -> common::Result<ClientConfig> {
        let client = &self.client;
        let mut builder = ClientConfig::builder()
            .authorization_endpoint(client.authorization_endpoint.as_str())
            .token_endpoint(client.token_endpoint.as_str())
            .client_id(client.client_id.as_str())
            .redirect_uri(client.redirect_uri.as_str())
            .scopes(client.scopes.iter().cloned())
            .request_timeout(Duration::from_secs(client.timeout_secs));

        if let Some(ref refresh) = client.refresh_endpoint {
            builder = builder.refresh_endpoint(refresh.as_str());
        }
        if let Some(ref secret) = client.client_secret {
            builder = builder.client_secret(secret.clone());
        }
        if let Some(ref separator) = client.scope_separator {
            builder = builder.scope_separator(separator.as_str());
        }
        for param in &client.params {
            builder = builder.add_param(param.name.as_str(), param.value.as_str());
        }
        if let Some(state) = state {
            builder = builder.add_param("state", state);
        }

        builder
            .build()
            .map_err(|e| common::Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that mutate environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn valid_toml() -> &'static str {
        r#"
[client]
authorization_endpoint = "https://auth.example/authorize"
token_endpoint = "https://auth.example/token"
client_id = "abc"
client_secret = "inline-secret"
redirect_uri = "http://127.0.0.1:8765/callback"
scopes = ["read", "write"]

[[client.params]]
name = "access_type"
value = "offline"
"#
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("oauth2-login.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn load_valid_config_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());
        unsafe { remove_env("OAUTH2_CLIENT_SECRET") };

        let config = Config::load(&path).unwrap();
        assert_eq!(config.client.client_id, "abc");
        assert_eq!(config.client.timeout_secs, 30);
        assert_eq!(config.client.params.len(), 1);
        assert_eq!(config.login.listen_addr, default_listen_addr());
        assert_eq!(config.login.timeout_secs, 300);
        assert_eq!(config.storage.credential_file, PathBuf::from("credentials.json"));
        assert_eq!(
            config.client.client_secret.as_ref().unwrap().expose(),
            "inline-secret"
        );
    }

    #[test]
    fn load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/oauth2-login.toml"));
        assert!(matches!(result, Err(common::Error::Io(_))));
    }

    #[test]
    fn load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "not valid {{{{ toml");
        assert!(matches!(Config::load(&path), Err(common::Error::Toml(_))));
    }

    #[test]
    fn secret_from_env_wins_over_file_and_inline() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let secret_path = dir.path().join("client_secret");
        std::fs::write(&secret_path, "file-secret\n").unwrap();
        let contents = format!(
            "{}\nclient_secret_file = \"{}\"\n",
            valid_toml().replace("[[client.params]]\nname = \"access_type\"\nvalue = \"offline\"\n", ""),
            secret_path.display()
        );
        let path = write_config(&dir, &contents);

        unsafe { set_env("OAUTH2_CLIENT_SECRET", "env-secret") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env("OAUTH2_CLIENT_SECRET") };
        assert_eq!(
            config.client.client_secret.as_ref().unwrap().expose(),
            "env-secret"
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.client.client_secret.as_ref().unwrap().expose(),
            "file-secret"
        );
    }

    #[test]
    fn missing_secret_file_is_an_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[client]
authorization_endpoint = "https://auth.example/authorize"
token_endpoint = "https://auth.example/token"
client_id = "abc"
client_secret_file = "/nonexistent/client_secret"
redirect_uri = "http://127.0.0.1:8765/callback"
"#,
        );
        unsafe { remove_env("OAUTH2_CLIENT_SECRET") };

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("client_secret_file"), "got: {err}");
    }

    #[test]
    fn endpoint_without_scheme_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            &valid_toml().replace("https://auth.example/token", "auth.example/token"),
        );

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(
            err.contains("client.token_endpoint must start with http"),
            "got: {err}"
        );
    }

    #[test]
    fn zero_timeouts_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, &format!("{}\n[login]\ntimeout_secs = 0\n", valid_toml()));
        assert!(Config::load(&path).is_err());

        let path = write_config(
            &dir,
            &valid_toml().replace("client_id = \"abc\"", "client_id = \"abc\"\ntimeout_secs = 0"),
        );
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn client_config_carries_params_and_state() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());
        unsafe { remove_env("OAUTH2_CLIENT_SECRET") };

        let config = Config::load(&path).unwrap();
        let client = config.client_config(Some("st-1")).unwrap();
        assert_eq!(
            client.extra_params(),
            &[
                ("access_type".to_string(), "offline".to_string()),
                ("state".to_string(), "st-1".to_string()),
            ]
        );
        assert_eq!(client.joined_scope().as_deref(), Some("read write"));
        assert_eq!(client.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn client_config_reports_missing_secret() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            &valid_toml().replace("client_secret = \"inline-secret\"\n", ""),
        );
        unsafe { remove_env("OAUTH2_CLIENT_SECRET") };

        let config = Config::load(&path).unwrap();
        let err = config.client_config(None).unwrap_err().to_string();
        assert!(err.contains("client_secret"), "got: {err}");
    }

    #[test]
    fn resolve_path_precedence() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("OAUTH2_LOGIN_CONFIG") };
        assert_eq!(Config::resolve_path(None), PathBuf::from("oauth2-login.toml"));

        unsafe { set_env("OAUTH2_LOGIN_CONFIG", "/env/path.toml") };
        assert_eq!(Config::resolve_path(None), PathBuf::from("/env/path.toml"));
        assert_eq!(
            Config::resolve_path(Some("/cli/wins.toml")),
            PathBuf::from("/cli/wins.toml")
        );
        unsafe { remove_env("OAUTH2_LOGIN_CONFIG") };
    }
}
