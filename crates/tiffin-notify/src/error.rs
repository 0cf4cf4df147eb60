use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid broker configuration: {0}")]
    InvalidConfig(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("broker handshake failed: {0}")]
    Handshake(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
