//! Error types for the socket server and client.

use nix::errno::Errno;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire error: {0}")]
    Wire(#[from] matmul_types::Error),

    #[error("worker pool error: {0}")]
    Pool(#[from] matrix_mul::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("server error {code}: {message}")]
    Server { code: i32, message: String },

    #[error("connection closed")]
    ConnectionClosed,
}

impl Error {
    /// The errno value sent back to clients in a failed response.
    pub fn os_error(&self) -> i32 {
        match self {
            Error::Io(e) => e.raw_os_error().unwrap_or(Errno::EIO as i32),
            Error::Wire(_) => Errno::EINVAL as i32,
            Error::Pool(e) => e.os_error(),
            Error::Join(_) => Errno::EIO as i32,
            Error::Server { code, .. } => *code,
            Error::ConnectionClosed => Errno::EPIPE as i32,
        }
    }
}
