use thiserror::Error;

use kindwatch_core::{ReconcileError, TransportError};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid client configuration: {0}")]
    Config(String),

    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
