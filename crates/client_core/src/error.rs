//! Error types returned across the client core seams.

use shared::error::{ApiException, ErrorCode};
use thiserror::Error;

use crate::dispatcher::DispatchToken;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("cannot dispatch {tag} in the middle of dispatching {active}")]
    Reentrant {
        tag: &'static str,
        active: &'static str,
    },
    #[error("dispatch callback {token} failed handling {tag}: {source}")]
    Callback {
        token: DispatchToken,
        tag: &'static str,
        source: anyhow::Error,
    },
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("invalid server url '{url}': {reason}")]
    InvalidServerUrl { url: String, reason: String },
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },
    #[error("unexpected response body from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Api(#[from] ApiException),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl ActionError {
    pub fn api_code(&self) -> Option<ErrorCode> {
        match self {
            ActionError::Api(exception) => Some(exception.code),
            _ => None,
        }
    }

    /// True when the server could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        match self {
            ActionError::Transport { source, .. } => source.is_connect() || source.is_timeout(),
            _ => false,
        }
    }
}
