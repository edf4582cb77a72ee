//! Errors reported by `boardcom`.
//!
//! The protocol engine only ever produces [`Error::Transport`],
//! [`Error::ProtocolTimeout`], [`Error::Protocol`] and
//! [`Error::RemoteExecution`]. The filesystem layer is the only place where
//! remote error text gets classified into the more specific variants.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::files::literal::DecodeError;

/// Shorthand for results carrying a `boardcom` [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The physical link failed (write/read error, unplugged device, closed
    /// connection). Fatal to the session.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// An expected sentinel or byte count did not arrive in time.
    #[error("timed out waiting for {expected}")]
    ProtocolTimeout {
        /// Printable description of what was expected.
        expected: String,
        /// Whatever was received before giving up.
        received: Vec<u8>,
    },

    /// Bytes were received that violate the expected framing, or an engine
    /// operation was attempted in the wrong interpreter mode.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The board ran the submitted program but it raised.
    #[error("remote execution failed:\n{message}")]
    RemoteExecution {
        /// The verbatim error stream of the remote program.
        message: String,
        /// Whatever the program printed before failing.
        stdout: Vec<u8>,
    },

    #[error("no such file on the board: {0}")]
    RemoteFileNotFound(String),

    #[error("directory already exists: {0}")]
    DirectoryExists(String),

    #[error("no such directory on the board: {0}")]
    DirectoryNotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("directory is not empty: {0}")]
    DirectoryNotEmpty(String),

    /// A reply from the board could not be decoded.
    #[error("malformed reply from the board: {0}")]
    MalformedReply(#[from] DecodeError),

    #[error("invalid board address: `{0}`")]
    InvalidAddress(String),

    /// The firmware refused the requested reset mode.
    #[error("reset mode not supported: {0}")]
    ResetUnsupported(String),

    /// The session was cancelled while waiting on the board.
    #[error("interrupted")]
    Interrupted,

    #[error("could not access `{}`: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Build a [`Error::ProtocolTimeout`] for a sentinel byte sequence.
    pub(crate) fn timeout(expected: &[u8], received: Vec<u8>) -> Self {
        Error::ProtocolTimeout {
            expected: format!("`{}`", escape(expected)),
            received,
        }
    }

    /// `true` when the error means the link to the board went away or went
    /// silent, which is the expected outcome of a hard reset.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::ProtocolTimeout { .. })
    }
}

impl From<serialport::Error> for Error {
    fn from(error: serialport::Error) -> Self {
        Error::Transport(error.into())
    }
}

/// Printable rendering of wire bytes for error messages.
pub(crate) fn escape(bytes: &[u8]) -> String {
    bytes
        .iter()
        .flat_map(|b| std::ascii::escape_default(*b))
        .map(char::from)
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn timeout_escapes_control_bytes() {
    let error = Error::timeout(b"raw REPL\r\n>\x04", vec![]);
    assert_eq!(error.to_string(), "timed out waiting for `raw REPL\\r\\n>\\x04`");
}

#[test]
fn disconnects() {
    assert!(Error::Transport(io::ErrorKind::BrokenPipe.into()).is_disconnect());
    assert!(Error::timeout(b"OK", vec![]).is_disconnect());
    assert!(!Error::Protocol("desync".into()).is_disconnect());
    assert!(!Error::RemoteFileNotFound("/a".into()).is_disconnect());
}
