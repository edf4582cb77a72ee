//! Byte sequences of the MicroPython raw REPL protocol. These are dictated by
//! the firmware and must match byte for byte.

/// Two `Ctrl-C` to stop whatever program is running.
pub(crate) const INTERRUPT: &[u8] = b"\r\x03\x03";
/// `Ctrl-A` switches to raw mode.
pub(crate) const ENTER_RAW: &[u8] = b"\r\x01";
/// `Ctrl-B` goes back to the friendly prompt.
pub(crate) const EXIT_RAW: &[u8] = b"\r\x02";
/// Printed on entry to raw mode, followed by the prompt.
pub(crate) const RAW_BANNER: &[u8] = b"raw REPL; CTRL-B to exit\r\n";
pub(crate) const RAW_BANNER_PROMPT: &[u8] = b"raw REPL; CTRL-B to exit\r\n>";
/// `Ctrl-D` on an empty raw submission soft reboots the interpreter.
pub(crate) const SOFT_REBOOT: &[u8] = b"\x04";
pub(crate) const SOFT_REBOOT_BANNER: &[u8] = b"soft reboot\r\n";
/// Terminates a submission, and each of the output streams.
pub(crate) const EOT: u8 = 0x04;
/// Acknowledgement of a plain raw submission.
pub(crate) const ACK: &[u8] = b"OK";
/// The raw mode prompt, printed whenever a new submission is accepted.
pub(crate) const PROMPT: &[u8] = b">";

/// Request a raw-paste submission.
pub(crate) const RAW_PASTE_REQUEST: &[u8] = b"\x05A\x01";
/// Raw-paste understood but not supported.
pub(crate) const RAW_PASTE_REFUSED: &[u8] = b"R\x00";
/// Raw-paste supported, followed by the flow control window size.
pub(crate) const RAW_PASTE_ACCEPTED: &[u8] = b"R\x01";
/// Sent by the board each time another window worth of data may be written.
pub(crate) const RAW_PASTE_WINDOW_INC: u8 = 0x01;
/// What the banner looks like after the first two bytes were taken as a
/// raw-paste reply by a firmware that doesn't know about raw-paste.
pub(crate) const RAW_BANNER_TAIL: &[u8] = b"w REPL; CTRL-B to exit\r\n>";

/// Maximum slice written at once in plain raw mode.
pub(crate) const WRITE_SLICE: usize = 256;
