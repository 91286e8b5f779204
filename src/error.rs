// Error taxonomy shared by every layer of the crate.
//
// Each component returns its own error type; `Error` is the union the
// dispatcher hands back to `main`, which is the only place that decides
// to terminate the process.

use reqwest::StatusCode;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The secrets artifact could not be read or understood.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to read client secret file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to parse client secret file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("client secret file {} has neither an \"installed\" nor a \"web\" section", .path.display())]
    MissingClient { path: PathBuf },

    #[error("client secret file {} has no redirect URL", .path.display())]
    MissingRedirect { path: PathBuf },

    #[error("invalid {name} URL {value:?}")]
    InvalidUrl {
        name: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
}

/// The token cache is missing, unreadable or corrupt. Recoverable by
/// running the authorization flow again.
#[derive(Error, Debug)]
pub enum TokenCacheError {
    #[error("no cached token at {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("unable to read cached token {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cached token {} is not a valid token", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unable to encode token")]
    Encode(#[source] serde_json::Error),

    #[error("unable to cache oauth token to {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Consent or token exchange failed. Needs fresh operator input to recover.
#[derive(Error, Debug)]
pub enum AuthorizationError {
    #[error("unable to read authorization code")]
    Prompt(#[source] io::Error),

    #[error("authorization code is empty")]
    EmptyCode,

    #[error("token endpoint rejected the request ({status}): {message}")]
    Rejected { status: StatusCode, message: String },

    #[error("token endpoint returned an unreadable response")]
    MalformedResponse(#[source] serde_json::Error),

    #[error("unable to reach token endpoint")]
    Transport(#[from] TransportError),
}

/// A remote call failed.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("remote call failed ({status}): {message}")]
    Status { status: StatusCode, message: String },

    #[error("unable to decode response")]
    Decode(#[source] serde_json::Error),

    #[error("unable to read response body")]
    Body(#[source] io::Error),

    #[error("invalid header value")]
    InvalidCredential(#[from] reqwest::header::InvalidHeaderValue),

    #[error("unable to refresh access token")]
    Refresh(#[source] Box<AuthorizationError>),
}

/// The command line did not describe a runnable operation.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum UsageError {
    #[error("command {0:?} not allowed")]
    UnknownCommand(String),

    #[error("{command}: missing required argument {flag}")]
    MissingArgument {
        command: &'static str,
        flag: &'static str,
    },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    TokenCache(#[from] TokenCacheError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{}", .path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn local_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// Process exit status for this error: 2 for usage mistakes, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Usage(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
