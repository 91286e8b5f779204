// Configuration: where the secrets live, which API to talk to and the
// OAuth2 client registration read from the secrets artifact.

use crate::error::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Full read/write access to the operator's drive. Changing the scope
/// requires deleting the cached token.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

pub const DEFAULT_SECRET_DIR: &str = "../gsecret";
pub const DEFAULT_API_URL: &str = "https://www.googleapis.com";

const CREDENTIALS_FILE: &str = "credentials.json";
const TOKEN_FILE: &str = "token.json";

/// Directory holding the client secrets artifact and the token cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretDir(PathBuf);

impl SecretDir {
    /// Build from a user supplied path. A leading `~/` is expanded to the
    /// home directory when one is known.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let expanded = match (path.strip_prefix("~"), dirs::home_dir()) {
            (Ok(rest), Some(home)) => home.join(rest),
            _ => path.to_path_buf(),
        };
        SecretDir(expanded)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.0.join(CREDENTIALS_FILE)
    }

    pub fn token_path(&self) -> PathBuf {
        self.0.join(TOKEN_FILE)
    }
}

/// Process-level settings, resolved once at startup and passed down.
#[derive(Clone, Debug)]
pub struct Settings {
    pub secret_dir: SecretDir,
    pub api_url: Url,
}

impl Settings {
    pub fn new(secret_dir: SecretDir, api_url: Url) -> Self {
        Settings {
            secret_dir,
            api_url,
        }
    }

    /// Read `GDRIVE_SECRET_DIR` and `GDRIVE_API_URL`, falling back to
    /// `../gsecret` and the public Google endpoint.
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret_dir =
            std::env::var("GDRIVE_SECRET_DIR").unwrap_or_else(|_| DEFAULT_SECRET_DIR.into());
        let api_url = std::env::var("GDRIVE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());
        Ok(Settings {
            secret_dir: SecretDir::new(secret_dir),
            api_url: parse_url("api", &api_url)?,
        })
    }
}

/// OAuth2 client registration. Immutable once loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: Url,
    pub token_url: Url,
    pub redirect_url: String,
    pub scopes: Vec<String>,
}

/// Shape of a Google client secrets download. Exactly one of the two
/// sections is expected, depending on the application type.
#[derive(Deserialize)]
struct ClientSecrets {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

#[derive(Deserialize)]
struct ClientSecret {
    client_id: String,
    client_secret: String,
    auth_uri: String,
    token_uri: String,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

impl OAuthConfig {
    /// Load the secrets artifact from disk.
    pub fn load(path: &Path, scopes: &[&str]) -> Result<Self, ConfigError> {
        let data = fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(path, &data, scopes)
    }

    /// Parse secrets already in memory. `path` only labels errors.
    pub fn from_json(path: &Path, data: &[u8], scopes: &[&str]) -> Result<Self, ConfigError> {
        let secrets: ClientSecrets =
            serde_json::from_slice(data).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let secret = secrets
            .installed
            .or(secrets.web)
            .ok_or_else(|| ConfigError::MissingClient {
                path: path.to_path_buf(),
            })?;

        let redirect_url = secret
            .redirect_uris
            .into_iter()
            .next()
            .ok_or_else(|| ConfigError::MissingRedirect {
                path: path.to_path_buf(),
            })?;

        Ok(OAuthConfig {
            client_id: secret.client_id,
            client_secret: secret.client_secret,
            auth_url: parse_url("authorization", &secret.auth_uri)?,
            token_url: parse_url("token", &secret.token_uri)?,
            redirect_url,
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        })
    }
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        name,
        value: value.to_string(),
        source,
    })
}
