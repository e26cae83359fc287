// src/drivers/serial.rs
use std::io::{BufReader, Write};
use std::time::Duration;
use serialport::{ClearBuffer, SerialPort, SerialPortType};
use crate::drivers::line::LineSource;
use crate::drivers::{ChannelConfig, StreamError};
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
/// Byte that tells the firmware to start streaming frames.
const START_COMMAND: &[u8] = b"1";
const READ_TIMEOUT: Duration = Duration::from_secs(1);
pub type SerialSource = LineSource<BufReader<Box<dyn SerialPort>>>;
/// Opens the port synchronously, flushes stale input and starts the stream.
pub fn open_serial(
    port_name: &str,
    baud_rate: u32,
    config: ChannelConfig,
    stall_timeout: Duration,
) -> Result<SerialSource, StreamError> {
    log::info!("opening serial port {port_name} at {baud_rate} baud");
    let mut port = serialport::new(port_name, baud_rate)
        .timeout(READ_TIMEOUT)
        .open()
        .map_err(|err| StreamError::connection(format!("failed to open {port_name}: {err}")))?;
    port.clear(ClearBuffer::Input)?;
    port.write_all(START_COMMAND)
        .map_err(|err| StreamError::connection(format!("failed to start {port_name}: {err}")))?;
    port.flush()?;
    Ok(LineSource::new(
        BufReader::new(port),
        config,
        format!("serial {port_name}"),
        stall_timeout,
    ))
}
/// First USB serial adapter on the machine, if any.
pub fn find_usb_port() -> Option<String> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(err) => {
            log::warn!("could not enumerate serial ports: {err}");
            return None;
        }
    };
    ports
        .into_iter()
        .find(|port| {
            matches!(port.port_type, SerialPortType::UsbPort(_))
                || port.port_name.to_uppercase().contains("USB")
        })
        .map(|port| port.port_name)
}
