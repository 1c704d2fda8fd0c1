//! Error types for the acceptance harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("browser unavailable: {0}")]
    BrowserLaunch(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("timeout waiting for: {0}")]
    Timeout(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("admin credentials not configured")]
    MissingAdminCredentials,

    #[error("unexpected response from {endpoint}: {reason}")]
    UnexpectedResponse { endpoint: String, reason: String },

    #[error("invalid locator '{0}'")]
    InvalidLocator(String),

    #[error("run interrupted")]
    Interrupted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Common(#[from] newsteps_qa_common::Error),
}

pub type HarnessResult<T> = Result<T, HarnessError>;
