//! Boardcom manages the filesystem of MicroPython and CircuitPython boards and
//! runs code on them, over a serial port or a telnet connection, with nothing
//! but the interpreter's own REPL on the other side.
//!
//! The interactive prompt of the interpreter echoes everything, mixes program
//! output with prompts and has no notion of message boundaries. Boardcom puts
//! it in *raw mode*, where each program is submitted as one block and its
//! output and errors come back clearly delimited, and builds everything else
//! on top of that:
//!
//! * [`transport`]: the byte stream to the board, serial or telnet.
//! * [`raw_repl`]: the protocol engine. It tracks the interpreter mode
//!   ([`ReplMode`]), recovers from whatever state the board was left in and
//!   executes programs with rolling read timeouts.
//! * [`files`]: file transfers, directory listing and creation, removal and
//!   script execution, each implemented as a small program run on the board
//!   whose printed reply is decoded back.
//! * [`Board`]: the session tying these together, which always releases the
//!   connection and leaves the board at its friendly prompt.
//!
//! Failures are reported through the single [`Error`] type. Remote Python
//! exceptions are kept verbatim, except for the `OSError`s the filesystem
//! operations know how to classify.

mod board;
mod error;
pub mod files;
pub mod raw_repl;
mod settings;
pub mod transport;
mod utils;

pub use board::{Board, ResetMode};
pub use error::{Error, Result};
pub use files::{Entry, EntryKind, Files};
pub use raw_repl::{ExecOutput, RawRepl, ReplMode};
pub use settings::{
    DataBits, FlowControl, Parity, Settings, SettingsBuilder, StopBits, DEFAULT_CHUNK_SIZE,
};
pub use transport::{Address, Transport};
pub use utils::{available_ports, find_terminal, invoke_terminal, select_port, SUPPORTED_TERMINALS};
