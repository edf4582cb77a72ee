//! Settings related to the board connection, the raw REPL protocol engine and
//! file transfers.
//!
//! Use the [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
//! pattern to set the configurable values.

use std::time::Duration;

pub use serialport::{DataBits, FlowControl, Parity, StopBits};

/// Default number of file bytes sent to the board per submission.
pub const DEFAULT_CHUNK_SIZE: usize = 32;

// =============================================================================
// Public Interface
// =============================================================================

/// Groups all settings used by `boardcom` and acts as a
/// [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
/// for the settings.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Settings {
    /// The board address: a serial device path, or an IP address / `host:port`
    /// for boards reachable over telnet.
    pub address: Option<String>,
    /// The baud rate in symbols-per-second (serial only).
    pub baud_rate: u32,
    /// Number of bits used to represent a character sent on the line.
    pub data_bits: DataBits,
    /// The type of signalling to use for controlling data transfer.
    pub flow_control: FlowControl,
    /// The type of parity to use for error checking.
    pub parity: Parity,
    /// Number of bits to use to signal the end of a character.
    pub stop_bits: StopBits,
    /// How many more times opening the serial port is attempted, one second
    /// apart, before giving up.
    pub open_retries: usize,

    /// Delay before entering raw mode, for boards that reset when the port is
    /// opened.
    pub raw_delay: Duration,
    /// Rolling read timeout: an operation fails when nothing at all was
    /// received for that long.
    pub read_timeout: Duration,
    /// Optional hard ceiling on the total duration of one execution, however
    /// chatty the running program is.
    pub exec_ceiling: Option<Duration>,
    /// Pause between consecutive 256 byte slices written in plain raw mode.
    pub write_pause: Duration,
    /// Soft reboot the interpreter right after entering raw mode.
    pub soft_reset: bool,
    /// Use the flow-controlled raw-paste submission when the firmware
    /// supports it.
    pub raw_paste: bool,

    /// Number of file bytes sent per submission during `put`. Bounded by the
    /// interpreter's input buffer, not by the transport.
    pub chunk_size: usize,

    /// Telnet login user name.
    pub telnet_user: String,
    /// Telnet login password.
    pub telnet_password: String,

    /// Restrict creation of `Settings` instances unless through the
    /// `SettingsBuilder`.
    #[doc(hidden)]
    _private_use_builder: (),
}

/// The builder for the `Settings` values.
///
/// All values are optional and have default values that will be used if not
/// explicitly set.
///
/// **Example**
///
/// ```
/// use boardcom::SettingsBuilder;
///
/// let settings = SettingsBuilder::new().address("/dev/ttyUSB0").finalize();
/// assert_eq!(settings.baud_rate, 115_200);
/// ```
pub struct SettingsBuilder {
    settings: Settings,
}
impl SettingsBuilder {
    /// Start building the settings using default values and no board
    /// address.
    pub fn new() -> Self {
        SettingsBuilder {
            settings: Settings {
                address: None,
                baud_rate: 115_200,
                data_bits: DataBits::Eight,
                flow_control: FlowControl::None,
                parity: Parity::None,
                stop_bits: StopBits::One,
                open_retries: 3,
                raw_delay: Duration::from_secs(0),
                read_timeout: Duration::from_secs(10),
                exec_ceiling: None,
                write_pause: Duration::from_millis(10),
                soft_reset: true,
                raw_paste: true,
                chunk_size: DEFAULT_CHUNK_SIZE,
                telnet_user: "micro".into(),
                telnet_password: "python".into(),
                _private_use_builder: (),
            },
        }
    }

    /// Set the board address (serial device path or network endpoint)
    pub fn address<'a>(mut self, address: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.address = Some(address.into().as_ref().to_owned());
        self
    }

    /// Set the baud rate in symbols-per-second
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.settings.baud_rate = baud_rate;
        self
    }

    /// Set the number of bits used to represent a character sent on the line
    pub fn data_bits(mut self, data_bits: DataBits) -> Self {
        self.settings.data_bits = data_bits;
        self
    }

    /// Set the type of signalling to use for controlling data transfer
    pub fn flow_control(mut self, flow_control: FlowControl) -> Self {
        self.settings.flow_control = flow_control;
        self
    }

    /// Set the type of parity to use for error checking
    pub fn parity(mut self, parity: Parity) -> Self {
        self.settings.parity = parity;
        self
    }

    /// Set the number of bits to use to signal the end of a character
    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.settings.stop_bits = stop_bits;
        self
    }

    /// Set how many more times opening the serial port is attempted
    pub fn open_retries(mut self, open_retries: usize) -> Self {
        self.settings.open_retries = open_retries;
        self
    }

    /// Set the delay preceding raw mode entry
    pub fn raw_delay(mut self, raw_delay: Duration) -> Self {
        self.settings.raw_delay = raw_delay;
        self
    }

    /// Set the rolling read timeout
    pub fn read_timeout(mut self, read_timeout: Duration) -> Self {
        self.settings.read_timeout = read_timeout;
        self
    }

    /// Set the hard ceiling on the duration of one execution
    pub fn exec_ceiling(mut self, exec_ceiling: Option<Duration>) -> Self {
        self.settings.exec_ceiling = exec_ceiling;
        self
    }

    /// Set the pause between slices written in plain raw mode
    pub fn write_pause(mut self, write_pause: Duration) -> Self {
        self.settings.write_pause = write_pause;
        self
    }

    /// Enable or disable the soft reboot after entering raw mode
    pub fn soft_reset(mut self, soft_reset: bool) -> Self {
        self.settings.soft_reset = soft_reset;
        self
    }

    /// Enable or disable raw-paste submissions
    pub fn raw_paste(mut self, raw_paste: bool) -> Self {
        self.settings.raw_paste = raw_paste;
        self
    }

    /// Set the transfer chunk size; zero is bumped to one byte
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.settings.chunk_size = chunk_size.max(1);
        self
    }

    /// Set the telnet login credentials
    pub fn telnet_login<'a>(
        mut self,
        user: impl Into<std::borrow::Cow<'a, str>>,
        password: impl Into<std::borrow::Cow<'a, str>>,
    ) -> Self {
        self.settings.telnet_user = user.into().into_owned();
        self.settings.telnet_password = password.into().into_owned();
        self
    }

    pub fn finalize(self) -> Settings {
        self.settings
    }
}
impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn all_default() {
    let settings = SettingsBuilder::new().finalize();
    assert_eq!(
        settings,
        Settings {
            address: None,
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            parity: Parity::None,
            stop_bits: StopBits::One,
            open_retries: 3,
            raw_delay: Duration::from_secs(0),
            read_timeout: Duration::from_secs(10),
            exec_ceiling: None,
            write_pause: Duration::from_millis(10),
            soft_reset: true,
            raw_paste: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            telnet_user: "micro".into(),
            telnet_password: "python".into(),
            _private_use_builder: (),
        }
    )
}

#[test]
fn address() {
    let settings = SettingsBuilder::new().address("/dev/ttyUSB0").finalize();
    assert_eq!(settings.address.unwrap(), "/dev/ttyUSB0");
}

#[test]
fn baud_rate() {
    let baud_rate = 9_600;
    let settings = SettingsBuilder::new().baud_rate(baud_rate).finalize();
    assert_eq!(settings.baud_rate, baud_rate);
}

#[test]
fn parity() {
    let parity = Parity::Even;
    let settings = SettingsBuilder::new().parity(parity).finalize();
    assert_eq!(settings.parity, parity);
}

#[test]
fn raw_delay() {
    let settings = SettingsBuilder::new()
        .raw_delay(Duration::from_millis(1500))
        .finalize();
    assert_eq!(settings.raw_delay, Duration::from_millis(1500));
}

#[test]
fn timeouts() {
    let settings = SettingsBuilder::new()
        .read_timeout(Duration::from_secs(2))
        .exec_ceiling(Some(Duration::from_secs(60)))
        .finalize();
    assert_eq!(settings.read_timeout, Duration::from_secs(2));
    assert_eq!(settings.exec_ceiling, Some(Duration::from_secs(60)));
}

#[test]
fn chunk_size_is_never_zero() {
    let settings = SettingsBuilder::new().chunk_size(0).finalize();
    assert_eq!(settings.chunk_size, 1);
    let settings = SettingsBuilder::new().chunk_size(256).finalize();
    assert_eq!(settings.chunk_size, 256);
}

#[test]
fn telnet_login() {
    let settings = SettingsBuilder::new()
        .telnet_login("admin", "secret")
        .finalize();
    assert_eq!(settings.telnet_user, "admin");
    assert_eq!(settings.telnet_password, "secret");
}
