use oauth2_token_types::{ClientIdentity, ScopeSet, TokenError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Public client id of GNOME Evolution, which Office365 tenants commonly allow.
pub const DEFAULT_CLIENT_ID: &str = "20460e5d-ce91-49af-a3a5-70b6be7486d1";

/// IMAP access on Office365.
pub const DEFAULT_SCOPE: &str = "https://outlook.office.com/IMAP.AccessAsUser.All";

/// Native-client redirect target. No local listener is run, so the user copies
/// the final URL from the browser instead.
pub const DEFAULT_REDIRECT_URI: &str =
    "https://login.microsoftonline.com/common/oauth2/nativeclient";

pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com/common";

/// Prefix for environment overrides, e.g. `OAUTH2_TOKEN_CLIENT_ID`.
pub const ENV_PREFIX: &str = "OAUTH2_TOKEN_";

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}
fn default_scopes() -> Vec<String> {
    vec![DEFAULT_SCOPE.to_string()]
}
fn default_redirect_uri() -> String {
    DEFAULT_REDIRECT_URI.to_string()
}
fn default_authority() -> String {
    DEFAULT_AUTHORITY.to_string()
}
fn default_level() -> String {
    "info".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive (defaults to `info`). `RUST_LOG` takes precedence.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Client (application) id.
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Client secret, for confidential clients only.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Requested scopes, in order.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Token cache file. Without it nothing is persisted between runs.
    #[serde(default)]
    pub cache: Option<PathBuf>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// Identity provider base URL; endpoints hang off `{authority}/oauth2/v2.0/`.
    #[serde(default = "default_authority")]
    pub authority: String,
    /// Try to open the authorization URL in the system browser.
    #[serde(default)]
    pub open_browser: bool,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            client_secret: None,
            scopes: default_scopes(),
            cache: None,
            redirect_uri: default_redirect_uri(),
            authority: default_authority(),
            open_browser: false,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Parses configuration from a YAML string, merged with defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the YAML is invalid or extraction fails.
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::string(yaml))
            .extract()
    }

    /// Loads defaults, then the optional YAML file, then `OAUTH2_TOKEN_*`
    /// environment variables, each layer overriding the previous one.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file cannot be read or a value fails to parse.
    #[allow(clippy::result_large_err)]
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Env, Format as _, Serialized, Yaml},
        };
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            if !path.is_file() {
                return Err(figment::Error::from(format!(
                    "config file {} not found",
                    path.display()
                )));
            }
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract()
    }

    /// Fail fast on settings that would make any acquisition pointless.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Config`] for an empty client id or scope list.
    pub fn validate(&self) -> Result<(), TokenError> {
        self.client_identity()?;
        self.scope_set()?;
        if self.redirect_uri.trim().is_empty() {
            return Err(TokenError::Config("no redirect_uri configured".into()));
        }
        if self.authority.trim().is_empty() {
            return Err(TokenError::Config("no authority configured".into()));
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`TokenError::Config`] if the client id is empty.
    pub fn client_identity(&self) -> Result<ClientIdentity, TokenError> {
        ClientIdentity::new(self.client_id.clone(), self.client_secret.clone())
    }

    /// # Errors
    ///
    /// Returns [`TokenError::Config`] if no scope is configured.
    pub fn scope_set(&self) -> Result<ScopeSet, TokenError> {
        ScopeSet::new(self.scopes.iter().cloned())
    }
}
