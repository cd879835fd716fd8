//! Error types for every stage of an acquisition.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialFormatError {
    #[error("arl token is empty")]
    Empty,

    #[error("arl token appears too short ({len} chars, should be ~192)")]
    TooShort { len: usize },

    #[error("arl token contains invalid characters (should be alphanumeric only)")]
    InvalidCharacters,
}

#[derive(Debug, Error)]
pub enum AuthenticationError {
    #[error("arl token is invalid or expired: {0}")]
    InvalidCredential(String),

    #[error("unexpected service error during login: {0}")]
    Unexpected(String),

    #[error("no api token in user data response")]
    MissingApiToken,

    #[error("login request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("api token expired: {0}")]
    TokenExpired(String),

    #[error("track not found: {0}")]
    NotFound(String),

    #[error("malformed track data: {0}")]
    Malformed(String),

    #[error("track is not available for streaming/download")]
    Restricted,

    #[error("track request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("no download url validated ({tried} candidates tried) and no preview available")]
    Exhausted { tried: usize },
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("download request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("download stalled: no data for {secs}s")]
    Stalled { secs: u64 },

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("cannot build block cipher: {0}")]
    InvalidKey(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("no arl token configured (set DEEZER_ARL_TOKEN or `arl` in the config file)")]
    MissingCredential,

    #[error("arl token validation failed: {0}")]
    Credential(#[from] CredentialFormatError),

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("track id cannot be empty")]
    Empty,

    #[error("track id must be numeric: {0}")]
    NotNumeric(String),

    #[error("could not extract track id from url: {0}")]
    NoTrackInUrl(String),

    #[error("failed to resolve short link: {0}")]
    ShortLink(#[from] reqwest::Error),
}

/// Failure of one pipeline run, tagged by the stage that produced it.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
