//! Classification of the `OSError`s raised by the programs run on the board.
//!
//! Depending on the port and version, MicroPython reports OS errors as
//! `OSError: [Errno 2] ENOENT`, `OSError: 2` or `OSError: -2`. The errno name
//! is matched first, the number otherwise.

use crate::Error;

/// The OS error conditions the filesystem layer tells apart.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum Errno {
    NotFound,
    Exists,
    IsADirectory,
    NotADirectory,
    Access,
    NotEmpty,
}

const ERRNOS: &[(Errno, &str, i32)] = &[
    (Errno::NotFound, "ENOENT", 2),
    (Errno::Exists, "EEXIST", 17),
    (Errno::IsADirectory, "EISDIR", 21),
    (Errno::NotADirectory, "ENOTDIR", 20),
    (Errno::Access, "EACCES", 13),
    (Errno::Access, "EPERM", 1),
    (Errno::NotEmpty, "ENOTEMPTY", 39),
];

/// Find the `OSError` in a remote traceback.
pub(crate) fn os_error(traceback: &str) -> Option<Errno> {
    let line = traceback
        .lines()
        .rev()
        .find(|line| line.trim_start().starts_with("OSError:"))?;
    let detail = line.trim_start()["OSError:".len()..].trim();

    if let Some(&(errno, _, _)) = ERRNOS
        .iter()
        .find(|(_, name, _)| detail.split(|c: char| !c.is_ascii_alphanumeric()).any(|word| word == *name))
    {
        return Some(errno);
    }

    let number = detail
        .trim_start_matches("[Errno")
        .trim_start()
        .split(|c: char| !(c.is_ascii_digit() || c == '-'))
        .next()?
        .parse::<i32>()
        .ok()?
        .abs();
    ERRNOS
        .iter()
        .find(|(_, _, code)| *code == number)
        .map(|&(errno, _, _)| errno)
}

/// Turn a [`Error::RemoteExecution`] into the specific error picked by
/// `classify`, if any. Every other error is returned unchanged.
pub(crate) fn classify<F>(error: Error, classify: F) -> Error
where
    F: FnOnce(Errno) -> Option<Error>,
{
    let specific = match &error {
        Error::RemoteExecution { message, .. } => os_error(message).and_then(classify),
        _ => None,
    };
    specific.unwrap_or(error)
}
