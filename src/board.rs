//! The board session: one connection to one board, from open to close.
//!
//! A [`Board`] owns the transport (through its [`RawRepl`] engine) and makes
//! sure it is released on every path, explicitly with [`Board::close`] or
//! when dropped. The interpreter is left at its friendly prompt on the way
//! out.

use std::{
    fmt,
    sync::{atomic::AtomicBool, Arc},
};

use log::{debug, info, warn};

use crate::{
    transport::{self, Address, Transport},
    Error, ExecOutput, Files, RawRepl, ReplMode, Result, Settings,
};

/// Defines `on_next_reset(mode)`, returning an empty string when the mode
/// was accepted or the reason why it was not, and `reset()`.
const RESET_HELPERS: &str = "\
def on_next_reset(x):
    try:
        import microcontroller
    except:
        if x == 'NORMAL': return ''
        return 'Reset mode only supported on CircuitPython'
    try:
        microcontroller.on_next_reset(getattr(microcontroller.RunMode, x))
    except ValueError as e:
        return str(e)
    return ''
def reset():
    try:
        import microcontroller
    except:
        import machine as microcontroller
    microcontroller.reset()
";

/// How to restart the board.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ResetMode {
    /// Soft reboot of the interpreter, ending at the prompt.
    Soft,
    /// Hard reset, running the boot scripts.
    Normal,
    /// Hard reset into safe mode: no user code, filesystem writable over USB
    /// (CircuitPython).
    SafeMode,
    /// Hard reset into the bootloader (CircuitPython).
    Bootloader,
}
impl ResetMode {
    /// The `microcontroller.RunMode` member selecting this mode.
    pub fn run_mode(self) -> &'static str {
        match self {
            ResetMode::Soft => "SOFT",
            ResetMode::Normal => "NORMAL",
            ResetMode::SafeMode => "SAFE_MODE",
            ResetMode::Bootloader => "BOOTLOADER",
        }
    }
}

pub struct Board {
    repl: RawRepl,
    address: Address,
    settings: Settings,
    closed: bool,
}
impl Board {
    /// Connect to the board at the address in `settings`.
    pub fn open(settings: Settings) -> Result<Board> {
        let address = settings
            .address
            .as_deref()
            .ok_or_else(|| Error::InvalidAddress(String::new()))
            .and_then(Address::parse)?;
        debug!("opening {:?}", address);
        let transport = transport::open(&address, &settings)?;
        info!("Connected to {}", address);
        Ok(Board::with_transport(transport, address, settings))
    }

    /// Build a session over an already opened transport.
    pub fn with_transport(
        transport: Box<dyn Transport>,
        address: Address,
        settings: Settings,
    ) -> Board {
        Board {
            repl: RawRepl::new(transport, &settings),
            address,
            settings,
            closed: false,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn endpoint(&self) -> &str {
        self.repl.endpoint()
    }

    pub fn is_telnet(&self) -> bool {
        self.address.is_network()
    }

    pub fn mode(&self) -> ReplMode {
        self.repl.mode()
    }

    /// Cancel pending operations once `flag` is set, see
    /// [`RawRepl::cancel_on`].
    pub fn cancel_on(&mut self, flag: Arc<AtomicBool>) {
        self.repl.cancel_on(flag);
    }

    /// The protocol engine, for anything the session doesn't wrap.
    pub fn repl(&mut self) -> &mut RawRepl {
        &mut self.repl
    }

    pub fn enter_raw_repl(&mut self) -> Result<()> {
        self.repl.enter_raw_repl()
    }

    pub fn exit_raw_repl(&mut self) -> Result<()> {
        self.repl.exit_raw_repl()
    }

    pub fn exec_raw(&mut self, code: impl AsRef<[u8]>) -> Result<ExecOutput> {
        self.repl.exec_raw(code)
    }

    pub fn exec_raw_no_follow(&mut self, code: impl AsRef<[u8]>) -> Result<()> {
        self.repl.exec_raw_no_follow(code)
    }

    pub fn exec_(&mut self, code: impl AsRef<[u8]>) -> Result<Vec<u8>> {
        self.repl.exec_(code)
    }

    pub fn eval(&mut self, expression: &str) -> Result<Vec<u8>> {
        self.repl.eval(expression)
    }

    /// The filesystem of the board, transferring `chunk_size` bytes at a time
    /// as configured.
    pub fn files(&mut self) -> Files<'_> {
        Files::new(&mut self.repl, self.settings.chunk_size)
    }

    /// Restart the board.
    ///
    /// A soft reset keeps the session usable. Any other mode drops the
    /// connection and closes the session: open a new one once the board is
    /// back.
    pub fn reset(&mut self, mode: ResetMode) -> Result<()> {
        info!("Resetting {} ({})", self.endpoint(), mode.run_mode());
        self.repl.enter_raw_repl()?;
        if mode == ResetMode::Soft {
            return self.repl.exit_raw_repl();
        }

        self.repl.exec_(RESET_HELPERS)?;
        let refusal = self
            .repl
            .eval(&format!("on_next_reset('{}')", mode.run_mode()))?;
        if !refusal.is_empty() {
            return Err(Error::ResetUnsupported(
                String::from_utf8_lossy(&refusal).into_owned(),
            ));
        }

        // The board may reset before acknowledging.
        match self.repl.exec_raw_no_follow("reset()") {
            Err(e @ Error::Protocol(_)) => debug!("board went away: {}", e),
            Err(e) if e.is_disconnect() => debug!("board went away: {}", e),
            result => result?,
        }
        self.closed = true;
        if let Err(e) = self.repl.close() {
            debug!("closing after reset: {}", e);
        }
        Ok(())
    }

    /// Leave raw mode and close the connection. Errors are logged, not
    /// reported; closing again does nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.repl.mode().is_raw() {
            if let Err(e) = self.repl.exit_raw_repl() {
                warn!("could not leave raw mode: {}", e);
            }
        }
        if let Err(e) = self.repl.close() {
            warn!("could not close {}: {}", self.address, e);
        }
        debug!("closed {}", self.address);
    }
}
impl Drop for Board {
    fn drop(&mut self) {
        self.close();
    }
}
impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Board")
            .field("address", &self.address)
            .field("repl", &self.repl)
            .field("closed", &self.closed)
            .finish()
    }
}

#[test]
fn run_modes() {
    assert_eq!(ResetMode::Normal.run_mode(), "NORMAL");
    assert_eq!(ResetMode::SafeMode.run_mode(), "SAFE_MODE");
    assert_eq!(ResetMode::Bootloader.run_mode(), "BOOTLOADER");
}
