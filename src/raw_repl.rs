//! The raw REPL protocol engine.
//!
//! MicroPython's interactive prompt echoes everything and has no message
//! boundaries. Its *raw* mode does: a program is submitted in one piece,
//! terminated by `Ctrl-D`, acknowledged with `OK`, and its standard output and
//! standard error come back each terminated by `Ctrl-D`. [`RawRepl`] drives a
//! [`Transport`](crate::Transport) through that protocol:
//!
//! ```text
//!                 enter_raw_repl()
//!   Unknown ---------------------------.
//!      ^                               v
//!      |  exec_raw_no_follow()   .-----------.  first submission   .-------------------.
//!      '-------------------------|    Raw    |-------------------->| RawPasteSupported |
//!                                '-----------'  (firmware says so) '-------------------'
//!      .----------.                    |                                     |
//!      | Friendly |<-------------------'-------------------------------------'
//!      '----------'     exit_raw_repl()
//! ```
//!
//! **Example** - Running code on a board:
//! ```no_run
//! use boardcom::{transport, Address, RawRepl, SettingsBuilder};
//!
//! # fn main() -> boardcom::Result<()> {
//! let settings = SettingsBuilder::new().address("/dev/ttyUSB0").finalize();
//! let address = Address::parse("/dev/ttyUSB0")?;
//! let mut repl = RawRepl::new(transport::open(&address, &settings)?, &settings);
//! repl.enter_raw_repl()?;
//! let answer = repl.eval("6 * 7")?;
//! assert_eq!(answer, b"42");
//! repl.exit_raw_repl()?;
//! # Ok(())
//! # }
//! ```

mod engine;
mod mode;
mod wire;

pub use engine::{ExecOutput, RawRepl};
pub use mode::ReplMode;
