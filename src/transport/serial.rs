//! Serial port transport, built on the `serialport` crate.

use std::{fmt, io, time::Duration};

use log::debug;
use serialport::{ClearBuffer, SerialPort};

use super::{closed, Transport};
use crate::{utils::open_and_setup_port, Result, Settings};

/// A board connected to a local serial device.
pub struct SerialTransport {
    name: String,
    /// `None` once closed.
    port: Option<Box<dyn SerialPort>>,
}
impl SerialTransport {
    /// Open and configure the serial device at `path`, retrying while the
    /// device is not ready yet.
    pub fn open(path: &str, settings: &Settings) -> Result<Self> {
        let port = open_and_setup_port(path, settings)?;
        Ok(Self::from_port(path, port))
    }

    /// Wrap an already open and configured port.
    pub fn from_port(name: impl Into<String>, port: Box<dyn SerialPort>) -> Self {
        SerialTransport {
            name: name.into(),
            port: Some(port),
        }
    }

    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or_else(closed)
    }
}
impl Transport for SerialTransport {
    fn endpoint(&self) -> &str {
        &self.name
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let port = self.port()?;
        port.write_all(data)?;
        port.flush()
    }

    fn read(&mut self, buffer: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let port = self.port()?;
        port.set_timeout(timeout)?;
        match port.read(buffer) {
            Ok(count) => Ok(count),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.port()?.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if self.port.take().is_some() {
            debug!("closed serial port {}", self.name);
        }
        Ok(())
    }
}
impl fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.port {
            Some(port) => f
                .debug_struct("SerialTransport")
                .field("port", &port.name())
                .field("baud_rate", &port.baud_rate())
                .field("data_bits", &port.data_bits())
                .field("parity", &port.parity())
                .field("stop_bits", &port.stop_bits())
                .field("flow_control", &port.flow_control())
                .finish(),
            None => f.debug_tuple("SerialTransport").field(&self.name).finish(),
        }
    }
}
