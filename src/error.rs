//! Error types for the authentication gateway

use std::io;

use thiserror::Error;

use crate::directory::DirectoryError;
use crate::keys::KeyError;
use crate::oauth::FlowError;
use crate::token::TokenError;

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key store / key material error
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Token signing or verification error
    #[error(transparent)]
    Token(#[from] TokenError),

    /// OAuth login flow error
    #[error(transparent)]
    Flow(#[from] FlowError),

    /// Directory lookup error
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
