//! Error types for worker pool operations.

use std::io;

use nix::errno::Errno;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Acquiring an OS resource (pipe, process, reaping) failed.
    #[error("{op} failed: {source}")]
    Resource {
        op: &'static str,
        #[source]
        source: Errno,
    },

    /// A pipe to or from a worker failed mid-protocol.
    #[error("{op} on worker {worker} (pid {pid}) failed: {failure}")]
    Channel {
        op: &'static str,
        worker: usize,
        pid: i32,
        #[source]
        failure: ChannelFailure,
    },

    /// The pool was used in a state that does not allow the call.
    #[error("misuse: {0}")]
    Misuse(&'static str),

    #[error("matrix dimension mismatch: A is {0}x{1}, B is {2}x{3}, C is {4}x{5}")]
    DimensionMismatch(usize, usize, usize, usize, usize, usize),

    #[error("matrix dimensions must be positive")]
    EmptyMatrix,

    #[error("trace write failed: {0}")]
    Trace(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum ChannelFailure {
    #[error("peer closed the channel")]
    PeerClosed,

    #[error("{0}")]
    Io(io::Error),

    #[error("worker acknowledged with pid {0}")]
    BadAck(i32),
}

impl From<io::Error> for ChannelFailure {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof | io::ErrorKind::WriteZero => ChannelFailure::PeerClosed,
            _ => ChannelFailure::Io(err),
        }
    }
}

impl Error {
    /// The errno value reported through the C interface.
    pub fn os_error(&self) -> i32 {
        match self {
            Error::Resource { source, .. } => *source as i32,
            Error::Channel { failure, .. } => match failure {
                ChannelFailure::PeerClosed => Errno::EPIPE as i32,
                ChannelFailure::Io(e) => e.raw_os_error().unwrap_or(Errno::EIO as i32),
                ChannelFailure::BadAck(_) => Errno::EPROTO as i32,
            },
            Error::Misuse(_) | Error::DimensionMismatch(..) | Error::EmptyMatrix => {
                Errno::EINVAL as i32
            }
            Error::Trace(e) => e.raw_os_error().unwrap_or(Errno::EIO as i32),
        }
    }

    /// Returns `true` for failures that leave the pool unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Resource { .. } | Error::Channel { .. } | Error::Trace(_)
        )
    }
}
