use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use log::{debug, info, trace, warn};
use retry::{delay::NoDelay, retry, OperationResult};

use super::{mode::ReplMode, wire::*};
use crate::{error::escape, utils::trace_bytes, Error, Result, Settings, Transport};

/// Longest single wait on the transport, so that deadlines get checked
/// regularly.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

// =============================================================================
// Public Interface
// =============================================================================

/// The output of one program executed in raw mode.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ExecOutput {
    /// Everything the program printed.
    pub stdout: Vec<u8>,
    /// The traceback, when the program raised.
    pub stderr: Vec<u8>,
}

/// The raw REPL protocol engine. Owns the transport and the interpreter mode.
///
/// Every operation reads only what belongs to it: bytes received after the
/// end of a response stay buffered and are skipped by the next submission
/// while it waits for the raw prompt.
pub struct RawRepl {
    transport: Box<dyn Transport>,
    mode: ReplMode,
    /// Received and not consumed yet.
    rx: Vec<u8>,
    /// Whether the firmware accepts raw-paste, once known.
    paste_support: Option<bool>,
    cancel: Option<Arc<AtomicBool>>,

    raw_delay: Duration,
    read_timeout: Duration,
    exec_ceiling: Option<Duration>,
    write_pause: Duration,
    soft_reset: bool,
    raw_paste: bool,
}
impl RawRepl {
    pub fn new(transport: Box<dyn Transport>, settings: &Settings) -> Self {
        RawRepl {
            transport,
            mode: ReplMode::Unknown,
            rx: Vec::new(),
            paste_support: None,
            cancel: None,
            raw_delay: settings.raw_delay,
            read_timeout: settings.read_timeout,
            exec_ceiling: settings.exec_ceiling,
            write_pause: settings.write_pause,
            soft_reset: settings.soft_reset,
            raw_paste: settings.raw_paste,
        }
    }

    /// The mode the interpreter is believed to be in.
    pub fn mode(&self) -> ReplMode {
        self.mode
    }

    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    pub fn is_network(&self) -> bool {
        self.transport.is_network()
    }

    /// Watch `flag` while waiting on the board. Once it is set, the running
    /// program is interrupted, raw mode is left and the pending operation
    /// fails with [`Error::Interrupted`].
    pub fn cancel_on(&mut self, flag: Arc<AtomicBool>) {
        self.cancel = Some(flag);
    }

    /// Put the interpreter in raw mode, from any mode.
    ///
    /// Interrupts whatever is running, throws away pending input and waits
    /// for the raw mode banner, which skips any garbage still coming in. When
    /// the banner doesn't show up in time, this is tried once more before
    /// failing with [`Error::ProtocolTimeout`].
    pub fn enter_raw_repl(&mut self) -> Result<()> {
        if !self.raw_delay.is_zero() {
            debug!("waiting {:?} before entering raw mode", self.raw_delay);
            thread::sleep(self.raw_delay);
        }

        let result = retry(NoDelay.take(1), || match self.try_enter_raw_repl() {
            Ok(()) => OperationResult::Ok(()),
            Err(e @ Error::ProtocolTimeout { .. }) => {
                warn!("{}, interrupting again", e);
                OperationResult::Retry(e)
            }
            Err(e) => OperationResult::Err(e),
        });
        match result {
            Ok(()) => {
                info!("Entered {} mode on {}", self.mode, self.endpoint());
                Ok(())
            }
            Err(retry::Error::Operation { error, .. }) => Err(error),
            Err(retry::Error::Internal(message)) => Err(Error::Protocol(message)),
        }
    }

    /// Go back to the friendly prompt, from any mode. The board does not
    /// confirm this, so nothing is read.
    pub fn exit_raw_repl(&mut self) -> Result<()> {
        self.write(EXIT_RAW)?;
        self.mode = ReplMode::Friendly;
        debug!("left raw mode");
        Ok(())
    }

    /// Execute `code` and collect its output and error streams.
    ///
    /// Requires raw mode. The read timeout is rolling: long running programs
    /// are fine as long as they keep printing. Any failure other than a mode
    /// precondition or a cancellation leaves the interpreter in
    /// [`ReplMode::Unknown`].
    pub fn exec_raw(&mut self, code: impl AsRef<[u8]>) -> Result<ExecOutput> {
        self.mode.require_raw("exec_raw")?;
        let result = self.submit(code.as_ref()).and_then(|_| self.follow());
        match result {
            Err(Error::Interrupted) | Ok(_) => {}
            Err(_) => self.mode = ReplMode::Unknown,
        }
        result
    }

    /// Submit `code` for execution without waiting for it to finish.
    ///
    /// Requires raw mode. The program keeps running on the board, so the mode
    /// becomes [`ReplMode::Unknown`]: raw mode has to be entered again, which
    /// interrupts it, before anything else can be executed.
    pub fn exec_raw_no_follow(&mut self, code: impl AsRef<[u8]>) -> Result<()> {
        self.mode.require_raw("exec_raw_no_follow")?;
        let result = self.submit(code.as_ref());
        if !matches!(result, Err(Error::Interrupted)) {
            self.mode = ReplMode::Unknown;
        }
        result
    }

    /// Execute `code`, failing with [`Error::RemoteExecution`] when it raised.
    pub fn exec_(&mut self, code: impl AsRef<[u8]>) -> Result<Vec<u8>> {
        let output = self.exec_raw(code)?;
        if output.stderr.is_empty() {
            Ok(output.stdout)
        } else {
            Err(Error::RemoteExecution {
                message: String::from_utf8_lossy(&output.stderr).into_owned(),
                stdout: output.stdout,
            })
        }
    }

    /// Print `expression` on the board and return what was printed, without
    /// surrounding whitespace.
    pub fn eval(&mut self, expression: &str) -> Result<Vec<u8>> {
        let stdout = self.exec_(format!("print({})", expression))?;
        Ok(trim_ascii(&stdout).to_vec())
    }

    /// Close the transport. The engine is unusable afterwards.
    pub fn close(&mut self) -> Result<()> {
        self.mode = ReplMode::Unknown;
        self.rx.clear();
        self.transport.close()?;
        Ok(())
    }
}
impl fmt::Debug for RawRepl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawRepl")
            .field("endpoint", &self.transport.endpoint())
            .field("mode", &self.mode)
            .field("paste_support", &self.paste_support)
            .field("pending", &self.rx.len())
            .finish()
    }
}

// =============================================================================
// Private stuff
// =============================================================================

impl RawRepl {
    fn try_enter_raw_repl(&mut self) -> Result<()> {
        self.mode = ReplMode::Unknown;
        debug!("interrupting any running program");
        self.write(INTERRUPT)?;
        self.flush_input()?;

        self.write(ENTER_RAW)?;
        if self.soft_reset {
            self.read_until(RAW_BANNER_PROMPT, Some(self.deadline()))?;
            debug!("soft rebooting");
            self.write(SOFT_REBOOT)?;
            self.read_until(SOFT_REBOOT_BANNER, Some(self.deadline()))?;
        }
        // The prompt following the banner is left for the next submission.
        self.read_until(RAW_BANNER, Some(self.deadline()))?;

        self.mode = if self.paste_support == Some(true) {
            ReplMode::RawPasteSupported
        } else {
            ReplMode::Raw
        };
        Ok(())
    }

    /// Wait for the prompt, then send `code` and get it acknowledged.
    fn submit(&mut self, code: &[u8]) -> Result<()> {
        // An empty submission would soft reboot the board.
        let code = if code.is_empty() { &b"\n"[..] } else { code };
        debug!("submitting {} bytes in {} mode", code.len(), self.mode);
        trace!("program:\n{}", String::from_utf8_lossy(code));

        let skipped = self.read_until(PROMPT, Some(self.deadline()))?;
        if skipped.len() > PROMPT.len() {
            debug!(
                "skipped `{}` before the prompt",
                escape(&skipped[..skipped.len() - PROMPT.len()])
            );
        }

        if self.raw_paste && self.paste_support != Some(false) && self.paste(code)? {
            return Ok(());
        }

        for slice in code.chunks(WRITE_SLICE) {
            self.write(slice)?;
            if !self.write_pause.is_zero() {
                thread::sleep(self.write_pause);
            }
        }
        self.write(&[EOT])?;
        // Silence here means the submission was not taken.
        let ack = match self.read_exact(ACK.len()) {
            Ok(ack) => ack,
            Err(Error::ProtocolTimeout { received, .. }) => received,
            Err(e) => return Err(e),
        };
        if ack != ACK {
            return Err(Error::Protocol(format!(
                "could not exec command, the board replied `{}`",
                escape(&ack)
            )));
        }
        Ok(())
    }

    /// Try a raw-paste submission. Returns `false`, with nothing submitted,
    /// when the firmware doesn't do raw-paste.
    fn paste(&mut self, code: &[u8]) -> Result<bool> {
        self.write(RAW_PASTE_REQUEST)?;
        let reply = self.read_exact(2)?;
        if reply == RAW_PASTE_ACCEPTED {
            if self.paste_support.is_none() {
                info!("Firmware supports raw-paste submissions");
            }
            self.paste_support = Some(true);
            self.mode = ReplMode::RawPasteSupported;
            self.paste_write(code)?;
            return Ok(true);
        }

        if reply == RAW_PASTE_REFUSED {
            debug!("raw-paste refused by the firmware");
        } else {
            // Older firmware took the request as input: its Ctrl-A entered
            // raw mode again and the reply is the beginning of the banner.
            debug!("firmware doesn't know raw-paste");
            self.read_until(RAW_BANNER_TAIL, Some(self.deadline()))?;
        }
        self.paste_support = Some(false);
        self.mode = ReplMode::Raw;
        Ok(false)
    }

    /// Write `code` within the flow control window announced by the board.
    fn paste_write(&mut self, code: &[u8]) -> Result<()> {
        let window = self.read_exact(2)?;
        let window = usize::from(u16::from_le_bytes([window[0], window[1]]));
        if window == 0 {
            return Err(Error::Protocol(
                "the board announced an empty raw-paste window".into(),
            ));
        }
        trace!("raw-paste window is {} bytes", window);

        let mut remaining = window;
        let mut sent = 0;
        while sent < code.len() {
            while remaining == 0 || self.input_pending()? {
                match self.read_exact(1)?[0] {
                    RAW_PASTE_WINDOW_INC => remaining += window,
                    EOT => {
                        debug!("the board ended the raw-paste early");
                        self.write(&[EOT])?;
                        return Ok(());
                    }
                    other => {
                        return Err(Error::Protocol(format!(
                            "unexpected `{}` during raw-paste",
                            escape(&[other])
                        )))
                    }
                }
            }
            let count = remaining.min(code.len() - sent);
            self.write(&code[sent..sent + count])?;
            remaining -= count;
            sent += count;
        }
        self.write(&[EOT])?;
        self.read_until(&[EOT], Some(self.deadline()))?;
        Ok(())
    }

    /// Read the output and error streams of the submitted program.
    fn follow(&mut self) -> Result<ExecOutput> {
        let deadline = self.exec_ceiling.map(|ceiling| Instant::now() + ceiling);
        let mut stdout = self.read_until(&[EOT], deadline)?;
        stdout.pop();
        let mut stderr = self.read_until(&[EOT], deadline)?;
        stderr.pop();
        debug!(
            "program printed {} bytes, {} bytes of errors",
            stdout.len(),
            stderr.len()
        );
        Ok(ExecOutput { stdout, stderr })
    }

    /// Read up to and including `ending`, returning everything read.
    ///
    /// Fails when nothing was received for longer than the read timeout, or
    /// when the optional hard `deadline` is reached.
    fn read_until(&mut self, ending: &[u8], deadline: Option<Instant>) -> Result<Vec<u8>> {
        let mut searched = 0;
        let mut last_progress = Instant::now();
        loop {
            if let Some(end) = find(&self.rx, ending, searched) {
                return Ok(self.rx.drain(..end).collect());
            }
            searched = self.rx.len().saturating_sub(ending.len() - 1);

            let now = Instant::now();
            let idle = now.duration_since(last_progress);
            let expired = deadline.map_or(false, |deadline| now >= deadline);
            if idle >= self.read_timeout || expired {
                debug!(
                    "gave up waiting for `{}` after {:?}",
                    escape(ending),
                    idle
                );
                return Err(Error::timeout(ending, std::mem::take(&mut self.rx)));
            }

            let mut wait = (self.read_timeout - idle).min(POLL_INTERVAL);
            if let Some(deadline) = deadline {
                wait = wait.min(deadline - now);
            }
            if self.receive(wait)? > 0 {
                last_progress = Instant::now();
            }
        }
    }

    /// Read exactly `count` bytes.
    fn read_exact(&mut self, count: usize) -> Result<Vec<u8>> {
        let mut last_progress = Instant::now();
        while self.rx.len() < count {
            let idle = last_progress.elapsed();
            if idle >= self.read_timeout {
                return Err(Error::ProtocolTimeout {
                    expected: format!("{} bytes", count),
                    received: std::mem::take(&mut self.rx),
                });
            }
            if self.receive((self.read_timeout - idle).min(POLL_INTERVAL))? > 0 {
                last_progress = Instant::now();
            }
        }
        Ok(self.rx.drain(..count).collect())
    }

    /// `true` when something was received and not consumed yet, without
    /// waiting.
    fn input_pending(&mut self) -> Result<bool> {
        if self.rx.is_empty() {
            self.receive(Duration::from_millis(0))?;
        }
        Ok(!self.rx.is_empty())
    }

    fn receive(&mut self, timeout: Duration) -> Result<usize> {
        if self
            .cancel
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::SeqCst))
        {
            return Err(self.abort());
        }
        let mut buffer = [0u8; 1024];
        let count = self.transport.read(&mut buffer, timeout)?;
        trace_bytes("rx", &buffer[..count]);
        self.rx.extend_from_slice(&buffer[..count]);
        Ok(count)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        trace_bytes("tx", data);
        self.transport.write_all(data)?;
        Ok(())
    }

    /// Stop whatever runs on the board and go back to the friendly prompt.
    fn abort(&mut self) -> Error {
        warn!("interrupted, stopping the board");
        self.rx.clear();
        if let Err(e) = self.write(INTERRUPT).and_then(|_| self.write(EXIT_RAW)) {
            debug!("could not stop the board: {}", e);
        }
        self.mode = ReplMode::Friendly;
        Error::Interrupted
    }

    fn flush_input(&mut self) -> Result<()> {
        if !self.rx.is_empty() {
            debug!("dropping {} buffered bytes", self.rx.len());
        }
        self.rx.clear();
        self.transport.discard_input()?;
        Ok(())
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.read_timeout
    }
}

/// Position right after the first `needle` in `haystack[from..]`.
fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|position| from + position + needle.len())
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |position| position + 1);
    &bytes[start..end]
}

// =============================================================================
// Unit Tests
// =============================================================================
