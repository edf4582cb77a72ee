//! Byte stream transports carrying the REPL protocol.
//!
//! A board is reached either through a local serial device or over a telnet
//! connection (WiPy and friends). The protocol engine only sees the
//! [`Transport`] trait; the kind of stream is decided once, when the address
//! is parsed.
//!
//! **Example** - Classifying addresses:
//! ```
//! use boardcom::Address;
//!
//! assert!(!Address::parse("/dev/ttyACM0").unwrap().is_network());
//! assert!(Address::parse("192.168.4.1").unwrap().is_network());
//! assert!(Address::parse("wipy.local:2323").unwrap().is_network());
//! ```

mod serial;
mod telnet;

use std::{
    fmt, io,
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use crate::{Error, Result, Settings};

pub use serial::SerialTransport;
pub use telnet::TelnetTransport;

/// Default telnet port when the address only names a host.
pub const TELNET_PORT: u16 = 23;

// =============================================================================
// Public Interface
// =============================================================================

/// A half-duplex byte stream to the board.
///
/// Implementations own exactly one stream. Once [`close`](Transport::close)d,
/// every read and write fails with [`io::ErrorKind::NotConnected`]; closing
/// again is a no-op.
pub trait Transport: Send {
    /// The endpoint identifier (device path or `host:port`).
    fn endpoint(&self) -> &str;

    /// `true` for network transports.
    fn is_network(&self) -> bool {
        false
    }

    /// Write all bytes to the stream.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read whatever is available, waiting at most `timeout` for the first
    /// byte. Returns `Ok(0)` when the timeout expires and nothing was
    /// received.
    fn read(&mut self, buffer: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Throw away everything pending in the input buffer.
    fn discard_input(&mut self) -> io::Result<()>;

    /// Close the stream.
    fn close(&mut self) -> io::Result<()>;
}

/// Where the board lives.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Address {
    /// A local serial device, e.g. `/dev/ttyUSB0` or `COM4`.
    Serial(String),
    /// A telnet endpoint.
    Telnet { host: String, port: u16 },
}
impl Address {
    /// Classify an address string.
    ///
    /// IP addresses (with or without a port) and `host:port` pairs are telnet
    /// endpoints; everything else is taken as a serial device path.
    pub fn parse(address: &str) -> Result<Address> {
        let address = address.trim();
        if address.is_empty() {
            return Err(Error::InvalidAddress(address.into()));
        }
        if let Ok(ip) = address.parse::<IpAddr>() {
            return Ok(Address::Telnet {
                host: ip.to_string(),
                port: TELNET_PORT,
            });
        }
        if let Ok(socket) = address.parse::<SocketAddr>() {
            return Ok(Address::Telnet {
                host: socket.ip().to_string(),
                port: socket.port(),
            });
        }
        if let Some((host, port)) = address.rsplit_once(':') {
            let looks_like_path = host.contains('/') || host.contains('\\');
            if !looks_like_path {
                if host.is_empty() {
                    return Err(Error::InvalidAddress(address.into()));
                }
                let port = port
                    .parse::<u16>()
                    .map_err(|_| Error::InvalidAddress(address.into()))?;
                return Ok(Address::Telnet {
                    host: host.into(),
                    port,
                });
            }
        }
        Ok(Address::Serial(address.into()))
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Address::Telnet { .. })
    }
}
impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Serial(path) => write!(f, "{}", path),
            Address::Telnet { host, port } => write!(f, "{}:{}", host, port),
        }
    }
}

/// Open the transport matching `address`.
pub fn open(address: &Address, settings: &Settings) -> Result<Box<dyn Transport>> {
    match address {
        Address::Serial(path) => Ok(Box::new(SerialTransport::open(path, settings)?)),
        Address::Telnet { host, port } => {
            Ok(Box::new(TelnetTransport::connect(host, *port, settings)?))
        }
    }
}

/// Error returned by transports used after `close()`.
pub(crate) fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "transport is closed")
}

// =============================================================================
// Unit Tests
// =============================================================================
