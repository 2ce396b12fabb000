//! Error types for the protocol server.

use std::io;

use thiserror::Error;

/// Setup failures. Per-connection I/O errors never surface here; they close
/// the client and the server goes back to listening.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("failed to read listener address: {0}")]
    LocalAddr(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
