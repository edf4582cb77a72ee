//! Serial port device manipulation.

use console::{style, Term};
use log::{debug, info, warn};
use serialport::{SerialPort, SerialPortType};

use crate::Settings;

//==============================================================================
// Public Interface
//==============================================================================

/// Enumerates the serial devices on the system. USB devices get their
/// manufacturer and product appended, separated from the path by `": "`.
pub fn available_ports() -> Vec<String> {
    let mut found = vec![];
    match serialport::available_ports() {
        Ok(ports) => {
            for p in ports {
                match p.port_type {
                    // USB ports give us more info about the connected serial
                    // controller
                    SerialPortType::UsbPort(info) => {
                        let extended_name = format!(
                            "{}: ({} / {})",
                            p.port_name,
                            info.manufacturer.as_ref().map_or("", String::as_str),
                            info.product.as_ref().map_or("", String::as_str)
                        );
                        found.push(extended_name);
                    }
                    // We're also interested in the other devices, such as
                    // virtual ports for testing
                    _ => {
                        found.push(p.port_name);
                    }
                }
            }
        }
        Err(ref e) => {
            info!("error: {}", e.to_string());
        }
    }
    found
}

/// Present the list of connected serial devices to the user to interactively
/// select one.
///
/// Returns `None` when there is no device to choose from or when the user
/// cancelled the selection.
pub fn select_port() -> Option<String> {
    let ports = available_ports();
    if ports.is_empty() {
        println!("{}", style("[BC] 🔌 No serial port found").yellow());
        return None;
    }

    use dialoguer::{theme::ColorfulTheme, Select};

    let term = Term::buffered_stderr();
    let theme = ColorfulTheme::default();

    let mut select = Select::with_theme(&theme);
    select.with_prompt("Select the port the board is connected to");
    for item in &ports {
        select.item(item);
    }

    match select.default(0).interact_on_opt(&term) {
        Ok(Some(index)) => {
            let selected = port_path(&ports[index]);
            println!("[BC] 👍 Using serial port {}", style(&selected).green());
            Some(selected)
        }
        Ok(None) => {
            debug!("port selection cancelled");
            None
        }
        Err(ref e) => {
            info!("error: {}", e.to_string());
            None
        }
    }
}

pub(crate) fn open_and_setup_port(
    path: &str,
    settings: &Settings,
) -> Result<Box<dyn SerialPort>, serialport::Error> {
    use retry::{delay, retry_with_index};

    let result = retry_with_index(
        delay::Fixed::from_millis(1000).take(settings.open_retries),
        |index| -> Result<Box<dyn SerialPort>, serialport::Error> {
            debug!("Trying to connect {} ({})", path, index);
            serialport::new(path, settings.baud_rate)
                .data_bits(settings.data_bits)
                .stop_bits(settings.stop_bits)
                .parity(settings.parity)
                .flow_control(settings.flow_control)
                .open()
        },
    );
    match result {
        Ok(mut port) => {
            // Configure the port again with the values in `settings`, some
            // platforms ignore the builder values on `open`.
            port.set_baud_rate(settings.baud_rate)?;
            port.set_data_bits(settings.data_bits)?;
            port.set_stop_bits(settings.stop_bits)?;
            port.set_parity(settings.parity)?;
            port.set_flow_control(settings.flow_control)?;

            let baud_rate = port.baud_rate()?;
            info!("Connected to {} at {} baud", path, baud_rate);
            debug!("data_bits    : {:#?}", port.data_bits()?);
            debug!("stop_bits    : {:#?}", port.stop_bits()?);
            debug!("parity       : {:#?}", port.parity()?);
            debug!("flow control : {:#?}", port.flow_control()?);

            if baud_rate != settings.baud_rate {
                warn!(
                    "{} runs at {} baud instead of the requested {}",
                    path, baud_rate, settings.baud_rate
                );
            }
            Ok(port)
        }
        Err(err) => match err {
            retry::Error::Operation {
                error,
                total_delay,
                tries,
            } => {
                info!(
                    "Failed to open the port after {:?} and {} tries: {}",
                    total_delay, tries, error,
                );
                Err(error)
            }
            retry::Error::Internal(_) => {
                info!("Internal retry error while opening port");
                Err(serialport::Error::new(
                    serialport::ErrorKind::Unknown,
                    "internal error while retrying to open the port",
                ))
            }
        },
    }
}

//==============================================================================
// Private stuff
//==============================================================================

/// Strip the USB description appended by [`available_ports`].
fn port_path(item: &str) -> String {
    match item.find(": (") {
        Some(end) => item[..end].into(),
        None => item.into(),
    }
}

#[test]
fn port_path_strips_usb_description() {
    assert_eq!(
        port_path("/dev/ttyACM0: (MicroPython / Board in FS mode)"),
        "/dev/ttyACM0"
    );
    assert_eq!(port_path("/dev/pts/3"), "/dev/pts/3");
    assert_eq!(port_path("COM4: (FTDI / FT232R)"), "COM4");
}
