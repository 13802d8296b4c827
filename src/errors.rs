//! Errors raised while assembling an engine run

use std::path::PathBuf;

use action_flow::FlowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SoulFlowError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid surface fixture: {0}")]
    Surface(#[source] serde_json::Error),

    #[error("invalid element descriptor: {0}")]
    Descriptor(#[source] serde_json::Error),

    #[error(transparent)]
    Workflow(#[from] FlowError),

    #[error("invalid remote host url `{url}`: {reason}")]
    RemoteUrl { url: String, reason: String },

    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}

impl SoulFlowError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SoulFlowError::Read {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = SoulFlowError> = std::result::Result<T, E>;
