//! Telnet transport for boards exposing their REPL over the network.
//!
//! Only the subset of telnet needed to talk to a MicroPython telnet server is
//! implemented: option negotiation is stripped from the input and never
//! answered, `IAC` bytes in the output are doubled, and the board's login
//! prompt is answered with the configured credentials.

use std::{
    collections::VecDeque,
    fmt,
    io::{self, Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    thread,
    time::{Duration, Instant},
};

use log::{debug, info};

use super::{closed, Transport};
use crate::{utils::trace_bytes, Error, Result, Settings};

const IAC: u8 = 255;
const SB: u8 = 250;
const SE: u8 = 240;
const WILL: u8 = 251;
const DONT: u8 = 254;

/// Longest time spent throwing away input, for boards that never stop
/// printing.
const DISCARD_LIMIT: Duration = Duration::from_millis(100);

/// A board reachable through a telnet server.
pub struct TelnetTransport {
    endpoint: String,
    /// `None` once closed.
    stream: Option<TcpStream>,
    filter: IacFilter,
    /// Data bytes already stripped of telnet commands, not yet handed out.
    pending: VecDeque<u8>,
}
impl TelnetTransport {
    /// Connect to `host:port` and log in.
    pub fn connect(host: &str, port: u16, settings: &Settings) -> Result<Self> {
        let endpoint = format!("{}:{}", host, port);
        let mut last_error = io::Error::new(io::ErrorKind::NotFound, "no address resolved");
        let mut connected = None;
        for address in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&address, settings.read_timeout) {
                Ok(stream) => {
                    connected = Some(stream);
                    break;
                }
                Err(e) => {
                    debug!("could not connect to {}: {}", address, e);
                    last_error = e;
                }
            }
        }
        let stream = connected.ok_or(last_error)?;
        stream.set_nodelay(true)?;
        info!("Connected to {}", endpoint);

        let mut transport = TelnetTransport {
            endpoint,
            stream: Some(stream),
            filter: IacFilter::Data,
            pending: VecDeque::new(),
        };
        transport.login(
            &settings.telnet_user,
            &settings.telnet_password,
            settings.read_timeout,
        )?;
        Ok(transport)
    }

    fn login(&mut self, user: &str, password: &str, timeout: Duration) -> Result<()> {
        self.expect(b"Login as:", timeout)?;
        self.write_all(format!("{}\r\n", user).as_bytes())?;
        self.expect(b"Password:", timeout)?;
        // The telnet server drops input sent before its prompt is flushed.
        thread::sleep(Duration::from_millis(200));
        self.write_all(format!("{}\r\n", password).as_bytes())?;
        self.expect(b"for more information.", timeout)?;
        info!("Logged in to {} as `{}`", self.endpoint, user);
        Ok(())
    }

    /// Read until `ending` shows up in the stream.
    fn expect(&mut self, ending: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut data = Vec::new();
        loop {
            if data.windows(ending.len()).any(|w| w == ending) {
                return Ok(data);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::timeout(ending, data));
            }
            let mut buffer = [0u8; 128];
            let count = self.read(&mut buffer, deadline - now)?;
            data.extend_from_slice(&buffer[..count]);
        }
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream.as_mut().ok_or_else(closed)
    }
}
impl Transport for TelnetTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn is_network(&self) -> bool {
        true
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut escaped = Vec::with_capacity(data.len());
        for &byte in data {
            if byte == IAC {
                escaped.push(IAC);
            }
            escaped.push(byte);
        }
        self.stream()?.write_all(&escaped)
    }

    fn read(&mut self, buffer: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if self.pending.is_empty() {
            let stream = self.stream()?;
            stream.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
            let mut raw = [0u8; 512];
            let count = match stream.read(&mut raw) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        "connection closed by the board",
                    ))
                }
                Ok(count) => count,
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    return Ok(0)
                }
                Err(e) => return Err(e),
            };
            trace_bytes("telnet rx", &raw[..count]);
            for &byte in &raw[..count] {
                if let Some(byte) = self.filter.feed(byte) {
                    self.pending.push_back(byte);
                }
            }
        }
        let count = buffer.len().min(self.pending.len());
        for (slot, byte) in buffer.iter_mut().zip(self.pending.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.pending.clear();
        let deadline = Instant::now() + DISCARD_LIMIT;
        let mut buffer = [0u8; 512];
        let mut discarded = 0;
        while Instant::now() < deadline {
            match self.read(&mut buffer, Duration::from_millis(1))? {
                0 => break,
                count => discarded += count,
            }
        }
        self.pending.clear();
        if discarded > 0 {
            debug!("discarded {} bytes from {}", discarded, self.endpoint);
        }
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(stream) = self.stream.take() {
            debug!("closing telnet connection to {}", self.endpoint);
            // The board may already be gone, e.g. after a hard reset.
            let _ = stream.shutdown(Shutdown::Both);
        }
        Ok(())
    }
}
impl fmt::Debug for TelnetTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelnetTransport")
            .field("endpoint", &self.endpoint)
            .field("open", &self.stream.is_some())
            .finish()
    }
}

/// Incremental telnet command stripper. Commands may be split across reads.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum IacFilter {
    Data,
    Command,
    Negotiation,
    Subnegotiation,
    SubnegotiationIac,
}
impl IacFilter {
    /// Feed one received byte, getting back the data byte it carries, if any.
    fn feed(&mut self, byte: u8) -> Option<u8> {
        let (next, output) = match (*self, byte) {
            (IacFilter::Data, IAC) => (IacFilter::Command, None),
            (IacFilter::Data, _) => (IacFilter::Data, Some(byte)),
            (IacFilter::Command, IAC) => (IacFilter::Data, Some(IAC)),
            (IacFilter::Command, WILL..=DONT) => (IacFilter::Negotiation, None),
            (IacFilter::Command, SB) => (IacFilter::Subnegotiation, None),
            (IacFilter::Command, _) => (IacFilter::Data, None),
            (IacFilter::Negotiation, _) => (IacFilter::Data, None),
            (IacFilter::Subnegotiation, IAC) => (IacFilter::SubnegotiationIac, None),
            (IacFilter::Subnegotiation, _) => (IacFilter::Subnegotiation, None),
            (IacFilter::SubnegotiationIac, SE) => (IacFilter::Data, None),
            (IacFilter::SubnegotiationIac, _) => (IacFilter::Subnegotiation, None),
        };
        *self = next;
        output
    }
}
