use std::path::PathBuf;

use thiserror::Error;

use crate::directive::DirectiveError;

#[derive(Error, Debug)]
pub enum SluiceError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parsing error: {0}")]
    FeedParse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid action: {0}")]
    Directive(#[from] DirectiveError),

    #[error("Configuration not found: {0}")]
    ConfigurationNotFound(i64),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Plugin is not active: {0}")]
    PluginInactive(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("Already running, lock file exists: {}", .0.display())]
    LockHeld(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SluiceError>;
