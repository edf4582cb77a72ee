//! The interpreter mode tracked by the protocol engine.

use std::fmt;

use crate::{Error, Result};

/// Which execution mode the interpreter is believed to be in.
///
/// Only [`RawRepl`](super::RawRepl) changes it, and every engine operation
/// checks it before touching the wire.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ReplMode {
    /// Nothing is known: fresh connection, or a program submitted without
    /// waiting for its output may still be running.
    Unknown,
    /// The normal line-editing prompt (`>>>`).
    Friendly,
    /// Raw mode, submissions are written in one piece.
    Raw,
    /// Raw mode on a firmware that accepted raw-paste submissions.
    RawPasteSupported,
}
impl ReplMode {
    pub fn is_raw(self) -> bool {
        matches!(self, ReplMode::Raw | ReplMode::RawPasteSupported)
    }

    /// Fail with a protocol error unless in one of the raw modes.
    pub(crate) fn require_raw(self, operation: &str) -> Result<()> {
        if self.is_raw() {
            Ok(())
        } else {
            Err(Error::Protocol(format!(
                "`{}` requires raw mode but the interpreter is in {} mode",
                operation, self
            )))
        }
    }
}
impl fmt::Display for ReplMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplMode::Unknown => "unknown",
            ReplMode::Friendly => "friendly",
            ReplMode::Raw => "raw",
            ReplMode::RawPasteSupported => "raw-paste",
        };
        f.write_str(name)
    }
}

#[test]
fn raw_modes() {
    assert!(ReplMode::Raw.is_raw());
    assert!(ReplMode::RawPasteSupported.is_raw());
    assert!(!ReplMode::Friendly.is_raw());
    assert!(!ReplMode::Unknown.is_raw());
}

#[test]
fn preconditions() {
    assert!(ReplMode::Raw.require_raw("exec").is_ok());
    let error = ReplMode::Friendly.require_raw("exec").unwrap_err();
    assert_eq!(
        error.to_string(),
        "protocol error: `exec` requires raw mode but the interpreter is in friendly mode"
    );
}
