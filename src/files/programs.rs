//! The programs sent to the board for each filesystem operation.
//!
//! Paths are embedded as given, the programs never change the working
//! directory. Every file opened is closed before the program returns.

use super::literal::{encode_bytes, encode_str};

const IMPORT_OS: &str = "\
try:
    import os
except ImportError:
    import uos as os
";

/// Print the content of `path`, hex encoded, `chunk_size` bytes at a time.
pub(crate) fn get(path: &str, chunk_size: usize) -> String {
    format!(
        "\
import sys
try:
    import ubinascii as binascii
except ImportError:
    import binascii
with open({path}, 'rb') as f:
    while True:
        b = f.read({chunk_size})
        if not b:
            break
        sys.stdout.write(binascii.hexlify(b))
",
        path = encode_str(path),
        chunk_size = chunk_size
    )
}

/// Open (truncate) `path` for writing, as global `f`.
pub(crate) fn open_write(path: &str) -> String {
    format!("f = open({}, 'wb')", encode_str(path))
}

pub(crate) fn write_chunk(chunk: &[u8]) -> String {
    format!("f.write({})", encode_bytes(chunk))
}

pub(crate) fn close() -> &'static str {
    "f.close()"
}

/// Print the entries of directory `path` as a list of `(name, kind, size)`
/// tuples, `kind` being `'d'` or `'f'`. Sizes are only looked up in long
/// format; directories always report 0.
pub(crate) fn list(path: &str, long_format: bool) -> String {
    format!(
        "\
{import_os}_long = {long}
_path = {path}
def _entry(name, mode, size):
    if mode & 0x4000:
        return (name, 'd', 0)
    if _long and size is None:
        size = os.stat(_path.rstrip('/') + '/' + name)[6]
    return (name, 'f', size or 0)
try:
    _it = [_entry(e[0], e[1], e[3] if len(e) > 3 else None) for e in os.ilistdir(_path)]
except AttributeError:
    _it = [_entry(n, os.stat(_path.rstrip('/') + '/' + n)[0], None) for n in os.listdir(_path)]
print(_it)
",
        import_os = IMPORT_OS,
        long = if long_format { "True" } else { "False" },
        path = encode_str(path)
    )
}

pub(crate) fn mkdir(path: &str) -> String {
    format!("{}os.mkdir({})", IMPORT_OS, encode_str(path))
}

pub(crate) fn remove(path: &str) -> String {
    format!("{}os.remove({})", IMPORT_OS, encode_str(path))
}

pub(crate) fn rmdir(path: &str) -> String {
    format!("{}os.rmdir({})", IMPORT_OS, encode_str(path))
}
