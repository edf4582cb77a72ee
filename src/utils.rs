//! Helper functions to deal with serial ports, wire dumps and terminal
//! programs.

mod dump;
mod ports;
mod terminal;

pub(crate) use dump::trace_bytes;
pub(crate) use ports::open_and_setup_port;
pub use ports::{available_ports, select_port};
pub use terminal::{find_terminal, invoke_terminal, SUPPORTED_TERMINALS};
