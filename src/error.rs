//! Error types for configuration, remote transport and the sync run

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Problems with the configuration file; always fatal before any rotation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot find config file '{}'", .0.display())]
    Missing(PathBuf),

    #[error("cannot read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse config file '{}': {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid value for '{key}': {message}")]
    Invalid { key: &'static str, message: String },
}

/// Transport-level failure reported by a remote client.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {url} returned HTTP {status}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
    },

    #[error("invalid url: {0}")]
    Url(String),

    #[error("malformed multistatus response: {0}")]
    Xml(String),

    #[error("local i/o error: {0}")]
    Io(#[from] io::Error),

    /// Scripted failure used by in-memory remotes.
    #[error("{0}")]
    Other(String),
}

/// Errors that end (or, for listings, are recovered during) a sync run.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("cannot connect to {protocol}://{host} as '{username}' after {attempts} attempts: {last}")]
    ConnectionFailed {
        protocol: String,
        host: String,
        username: String,
        attempts: u32,
        last: String,
    },

    #[error("cannot list '{path}': {source}")]
    ListingFailed {
        path: String,
        #[source]
        source: RemoteError,
    },

    #[error("giving up on '{remote}' after {attempts} attempts: {source}")]
    TransferExhausted {
        remote: String,
        local: PathBuf,
        attempts: u32,
        #[source]
        source: RemoteError,
    },

    #[error("backup rotation failed at '{}': {source}", path.display())]
    RotationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{context} '{}': {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl MirrorError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        MirrorError::Io {
            context,
            path: path.into(),
            source,
        }
    }
}
