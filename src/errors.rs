use std::path::PathBuf;

use thiserror::Error;

/// Why a single GET did not produce a usable body.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("timed out fetching {url}")]
    Timeout { url: String },
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
    #[error("cannot build a URL from '{reference}': {reason}")]
    Url { reference: String, reason: String },
}

impl FetchError {
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout { url: url.to_string() }
        } else if let Some(status) = err.status() {
            FetchError::Status { url: url.to_string(), status: status.as_u16() }
        } else {
            FetchError::Transport { url: url.to_string(), reason: err.to_string() }
        }
    }
}

/// Hard validation failures of the file utilities; these abort the invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("no usable CSV files in {0:?}")]
    NoInput(PathBuf),
    #[error("{path:?} is empty")]
    EmptyFile { path: PathBuf },
    #[error("{path:?} is missing required column '{column}'")]
    MissingColumn { path: PathBuf, column: String },
    #[error("unrecognised value '{value}' in {path:?}: {reason}")]
    BadValue {
        path: PathBuf,
        value: String,
        reason: String,
    },
    #[error("unknown compression codec '{0}'")]
    UnknownCompression(String),
}
