// OAuth2 token value and its on-disk cache.
//
// The cache holds a single token at a fixed path. Writes replace the whole
// file; there is no locking, the last writer wins.

use crate::error::TokenCacheError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Tokens are considered expired this long before the provider says so,
/// leaving room for the request to reach the server.
const EXPIRY_DELTA_SECS: i64 = 10;

/// Access token plus the data needed to renew it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Token {
    /// Expiry instant, if the token has a meaningful one. The zero time
    /// (`0001-01-01T00:00:00Z`) written by some clients means "never".
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiry.filter(|at| at.timestamp() > ZERO_TIME_SECS)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(at) => at - Duration::seconds(EXPIRY_DELTA_SECS) < now,
            None => false,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Authorization scheme derived from `token_type`.
    pub fn scheme(&self) -> &str {
        let kind = self.token_type.as_str();
        if kind.is_empty() || kind.eq_ignore_ascii_case("bearer") {
            "Bearer"
        } else if kind.eq_ignore_ascii_case("mac") {
            "MAC"
        } else if kind.eq_ignore_ascii_case("basic") {
            "Basic"
        } else {
            kind
        }
    }

    /// Value for the `Authorization` request header.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.scheme(), self.access_token)
    }
}

/// Seconds between the Unix epoch and `0001-01-01T00:00:00Z`.
const ZERO_TIME_SECS: i64 = -62_135_596_800;

/// Reads and writes the cached token at a fixed location.
#[derive(Clone, Debug)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TokenStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Token, TokenCacheError> {
        let data = fs::read(&self.path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => TokenCacheError::NotFound {
                path: self.path.clone(),
            },
            _ => TokenCacheError::Read {
                path: self.path.clone(),
                source,
            },
        })?;
        let token = serde_json::from_slice(&data).map_err(|source| TokenCacheError::Decode {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "loaded cached token");
        Ok(token)
    }

    /// Replace the cache with `token`. The file is readable and writable by
    /// the owner only.
    pub fn save(&self, token: &Token) -> Result<(), TokenCacheError> {
        let data = serde_json::to_vec(token).map_err(TokenCacheError::Encode)?;
        let write_err = |source| TokenCacheError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path).map_err(write_err)?;
        file.write_all(&data).map_err(write_err)?;
        file.write_all(b"\n").map_err(write_err)?;
        debug!(path = %self.path.display(), "saved token");
        Ok(())
    }
}
