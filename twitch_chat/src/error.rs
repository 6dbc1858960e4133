use std::sync::Arc;

use thiserror::Error;

use crate::tmi::parse;

#[derive(Error, Clone, Debug)]
pub enum Error {
    #[error("Timed out while connecting")]
    ConnectionTimeout,
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Timed out while joining {0}")]
    JoinTimeout(String),
    #[error("Timed out waiting for a response to '{0}'")]
    CommandTimeout(String),
    #[error("Encountered an error while parsing: {0}")]
    Parse(#[from] parse::Error),
    #[error("{0}")]
    Chat(String),
    #[error("'{command}' was rejected with {event}")]
    Rejected { command: String, event: String },
    #[error("WebSocket error: {0}")]
    WebSocket(Arc<tokio_tungstenite::tungstenite::Error>),
    #[error("Send queue closed")]
    QueueClosed,
    #[error("Disconnected")]
    Disconnected,
    #[error("API request failed: {0}")]
    Api(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
