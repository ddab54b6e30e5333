use std::error::Error as StdError;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum TributaryError {
    #[error("Couldn't connect to server: {0}")]
    Network(String),

    #[error("Untrusted certificate: {0}")]
    Tls(String),

    #[error("Access forbidden, check username and password")]
    Auth,

    #[error("News app not found at this address: {0}")]
    NotFound(String),

    #[error("Server is not compatible: {0}")]
    Compatibility(String),

    #[error("HTTP error {status}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Server { status: u16, message: Option<String> },

    #[error("Invalid state: {0}")]
    State(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Feed not found: {0}")]
    FeedNotFound(i64),

    #[error("Item not found: {0}")]
    ItemNotFound(i64),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TributaryError {
    /// Transient failures are reported without blocking the user.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TributaryError::Network(_) | TributaryError::Server { .. }
        )
    }
}

/// Error body returned by the server on failed requests.
#[derive(Deserialize)]
struct ErrorMessage {
    message: Option<String>,
}

impl From<ApiError> for TributaryError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Transport(e) => classify_transport(e),
            ApiError::Status { status, body } => classify_status(status, &body),
            ApiError::Decode(e) => TributaryError::Json(e),
            ApiError::InvalidUrl(e) => TributaryError::InvalidUrl(e),
            ApiError::Rejected(msg) => TributaryError::State(msg),
        }
    }
}

fn classify_transport(err: reqwest::Error) -> TributaryError {
    if let Some(status) = err.status() {
        return classify_status(status, "");
    }

    let chain = error_chain(&err);
    if chain.contains("certificate") || chain.contains("UnknownIssuer") {
        return TributaryError::Tls(chain);
    }
    if err.is_connect() || err.is_timeout() || err.is_request() {
        return TributaryError::Network(chain);
    }
    if err.is_decode() {
        return TributaryError::Compatibility(chain);
    }
    TributaryError::Network(chain)
}

fn classify_status(status: StatusCode, body: &str) -> TributaryError {
    match status.as_u16() {
        401 => TributaryError::Auth,
        403 | 404 => TributaryError::NotFound(status.to_string()),
        405 => TributaryError::Compatibility("News app version is too old".into()),
        code => TributaryError::Server {
            status: code,
            message: serde_json::from_str::<ErrorMessage>(body)
                .ok()
                .and_then(|m| m.message),
        },
    }
}

fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

pub type Result<T> = std::result::Result<T, TributaryError>;
