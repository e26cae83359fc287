// src/drivers/tcp.rs
use std::io::BufReader;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use crate::drivers::line::LineSource;
use crate::drivers::{ChannelConfig, StreamError};
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const READ_TIMEOUT: Duration = Duration::from_secs(1);
pub type TcpSource = LineSource<BufReader<TcpStream>>;
/// Connects to a `host:port` that streams the same line protocol as the serial link.
pub fn connect_tcp(
    address: &str,
    config: ChannelConfig,
    stall_timeout: Duration,
) -> Result<TcpSource, StreamError> {
    log::info!("connecting to {address}");
    let addrs = address
        .to_socket_addrs()
        .map_err(|err| StreamError::connection(format!("cannot resolve {address}: {err}")))?;
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => {
                stream.set_read_timeout(Some(READ_TIMEOUT))?;
                stream.set_nodelay(true)?;
                log::info!("connected to {addr}");
                return Ok(LineSource::new(
                    BufReader::new(stream),
                    config,
                    format!("tcp {address}"),
                    stall_timeout,
                ));
            }
            Err(err) => {
                log::debug!("connect to {addr} failed: {err}");
                last_err = Some(err);
            }
        }
    }
    Err(StreamError::connection(match last_err {
        Some(err) => format!("cannot connect to {address}: {err}"),
        None => format!("{address} resolved to no addresses"),
    }))
}
