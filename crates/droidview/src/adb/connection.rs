//! Wire client for the ADB host protocol
//!
//! Speaks the framed text protocol of the local ADB server over TCP:
//! 4-hex-digit length-prefixed requests, `OKAY`/`FAIL` status tokens, and
//! raw byte streams for shell and device services. One connection is bound
//! to at most one device transport; the server drops the stream after most
//! commands, so callers either opt into automatic reconnection or reconnect
//! themselves.

use crate::config::TransportConfig;
use crate::error::{DroidError, Result};
use regex::Regex;
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use tracing::{debug, warn};

/// Host protocol version this client expects from the local ADB server.
pub const ADB_SERVER_VERSION: u32 = 41;

const OKAY: &[u8; 4] = b"OKAY";
const FAIL: &[u8; 4] = b"FAIL";

/// One entry from the host device list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub serial: String,
    pub state: String,
}

/// Frame a request for the host protocol: 4-hex-digit length prefix plus
/// the payload itself.
pub(crate) fn frame_request(command: &str) -> String {
    format!("{:04x}{}", command.len(), command)
}

fn map_io(err: std::io::Error, what: &str) -> DroidError {
    match err.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            DroidError::Timeout(format!("{} timed out", what))
        }
        _ => DroidError::Io(err),
    }
}

/// Match a device selector against the host device list.
///
/// Selector resolution: exact serial (which covers `ip:port` serials), then
/// a regular expression when it matches exactly one device.
pub(crate) fn match_selector(entries: &[DeviceEntry], selector: &str) -> Result<String> {
    if let Some(entry) = entries.iter().find(|e| e.serial == selector) {
        return Ok(entry.serial.clone());
    }
    if let Ok(re) = Regex::new(selector) {
        let matches: Vec<&DeviceEntry> =
            entries.iter().filter(|e| re.is_match(&e.serial)).collect();
        match matches.len() {
            1 => return Ok(matches[0].serial.clone()),
            0 => {}
            n => {
                return Err(DroidError::DeviceNotFound(format!(
                    "selector {:?} is ambiguous: {} devices match",
                    selector, n
                )))
            }
        }
    }
    Err(DroidError::DeviceNotFound(format!(
        "no device matches selector {:?} among {} connected",
        selector,
        entries.len()
    )))
}

/// Connection to the local ADB server
pub struct AdbConnection {
    config: TransportConfig,
    socket: Option<TcpStream>,
    serial: Option<String>,
}

impl AdbConnection {
    /// Open a connection to the ADB server and perform the version
    /// handshake. Fails with `VersionMismatch` if the server speaks a
    /// different protocol version.
    pub fn connect(config: TransportConfig) -> Result<Self> {
        let mut conn = Self {
            config,
            socket: None,
            serial: None,
        };
        conn.reopen()?;
        conn.check_version()?;
        Ok(conn)
    }

    /// Serial of the bound transport, if any.
    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Close the socket. Any later command fails with `NotConnected` until
    /// `reconnect` is called.
    pub fn close(&mut self) {
        self.socket = None;
    }

    fn open_socket(&self) -> Result<TcpStream> {
        let addr = (self.config.host.as_str(), self.config.port);
        let stream = TcpStream::connect(addr).map_err(|e| {
            DroidError::Connection(format!(
                "cannot reach ADB server at {}:{}: {}",
                self.config.host, self.config.port, e
            ))
        })?;
        stream
            .set_read_timeout(self.config.socket_timeout)
            .map_err(DroidError::Io)?;
        stream
            .set_write_timeout(self.config.socket_timeout)
            .map_err(DroidError::Io)?;
        Ok(stream)
    }

    fn reopen(&mut self) -> Result<()> {
        self.socket = Some(self.open_socket()?);
        Ok(())
    }

    fn socket_mut(&mut self) -> Result<&mut TcpStream> {
        self.socket.as_mut().ok_or(DroidError::NotConnected)
    }

    /// Send a framed request and consume the status token.
    fn request(&mut self, command: &str) -> Result<()> {
        debug!(command, "adb request");
        let framed = frame_request(command);
        let socket = self.socket_mut()?;
        socket
            .write_all(framed.as_bytes())
            .map_err(|e| map_io(e, "request write"))?;
        self.read_status()
    }

    fn read_status(&mut self) -> Result<()> {
        let socket = self.socket_mut()?;
        let mut status = [0u8; 4];
        socket
            .read_exact(&mut status)
            .map_err(|e| map_io(e, "status read"))?;
        if &status == OKAY {
            Ok(())
        } else if &status == FAIL {
            let message = self.read_hex_block()?;
            Err(DroidError::Protocol(message))
        } else {
            Err(DroidError::Protocol(format!(
                "unexpected status token {:?}",
                String::from_utf8_lossy(&status)
            )))
        }
    }

    /// Read one length-prefixed block: 4 hex digits, then that many bytes.
    fn read_hex_block(&mut self) -> Result<String> {
        let socket = self.socket_mut()?;
        let mut len_buf = [0u8; 4];
        socket
            .read_exact(&mut len_buf)
            .map_err(|e| map_io(e, "length prefix read"))?;
        let len_str = std::str::from_utf8(&len_buf)
            .map_err(|_| DroidError::Protocol(format!("malformed length prefix {:?}", len_buf)))?;
        let len = usize::from_str_radix(len_str, 16).map_err(|_| {
            DroidError::Protocol(format!("malformed length prefix {:?}", len_str))
        })?;
        let mut payload = vec![0u8; len];
        socket
            .read_exact(&mut payload)
            .map_err(|e| map_io(e, "payload read"))?;
        Ok(String::from_utf8(payload)?)
    }

    /// Read the raw byte stream until the server closes the connection.
    fn read_to_eof(&mut self) -> Result<Vec<u8>> {
        let socket = self.socket_mut()?;
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match socket.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => data.extend_from_slice(&buf[..n]),
                Err(e) => return Err(map_io(e, "stream read")),
            }
        }
        Ok(data)
    }

    pub(crate) fn read_exact_raw(&mut self, len: usize) -> Result<Vec<u8>> {
        let socket = self.socket_mut()?;
        let mut payload = vec![0u8; len];
        socket
            .read_exact(&mut payload)
            .map_err(|e| map_io(e, "raw read"))?;
        Ok(payload)
    }

    /// Query the server protocol version. Consumes the connection and
    /// reopens it.
    pub fn host_version(&mut self) -> Result<u32> {
        self.request("host:version")?;
        let payload = self.read_hex_block()?;
        let version = u32::from_str_radix(&payload, 16)
            .map_err(|_| DroidError::Protocol(format!("malformed version {:?}", payload)))?;
        self.reopen()?;
        Ok(version)
    }

    fn check_version(&mut self) -> Result<()> {
        let actual = self.host_version()?;
        if actual != ADB_SERVER_VERSION {
            return Err(DroidError::VersionMismatch {
                expected: ADB_SERVER_VERSION,
                actual,
            });
        }
        Ok(())
    }

    /// List the devices the server knows about. Consumes the connection and
    /// reopens it.
    pub fn devices(&mut self) -> Result<Vec<DeviceEntry>> {
        self.request("host:devices")?;
        let payload = self.read_hex_block()?;
        self.reopen()?;
        let entries = payload
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some(serial), Some(state)) => Some(DeviceEntry {
                        serial: serial.to_string(),
                        state: state.to_string(),
                    }),
                    _ => {
                        warn!(line, "skipping malformed device list line");
                        None
                    }
                }
            })
            .collect();
        Ok(entries)
    }

    /// Bind this connection to one device. All later commands are scoped to
    /// it, except the host-level ones. Returns the resolved serial.
    pub fn bind_transport(&mut self, selector: &str) -> Result<String> {
        let entries = self.devices()?;
        let serial = match_selector(&entries, selector)?;
        self.request(&format!("host:transport:{}", serial))?;
        self.serial = Some(serial.clone());
        debug!(serial, "transport bound");
        Ok(serial)
    }

    fn require_transport(&self) -> Result<String> {
        self.serial
            .clone()
            .ok_or_else(|| DroidError::Protocol("no transport bound; call bind_transport first".to_string()))
    }

    /// Reopen the socket and rebind the previously bound transport.
    pub fn reconnect(&mut self) -> Result<()> {
        self.reopen()?;
        if let Some(serial) = self.serial.clone() {
            self.request(&format!("host:transport:{}", serial))?;
        }
        Ok(())
    }

    fn finish_command(&mut self) -> Result<()> {
        self.socket = None;
        if self.config.reconnect_after_command {
            self.reconnect()?;
        }
        Ok(())
    }

    /// Run a shell command on the bound device and capture its output to
    /// EOF. The server closes the stream afterwards; with
    /// `reconnect_after_command` the connection is reestablished, otherwise
    /// the next command fails with `NotConnected`.
    pub fn shell(&mut self, command: &str) -> Result<String> {
        self.require_transport()?;
        self.request(&format!("shell:{}", command))?;
        let output = self.read_to_eof()?;
        self.finish_command()?;
        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    /// Open an interactive shell on the bound device and hand the raw
    /// bidirectional stream to the caller. A distinct mode from `shell`,
    /// not an overload: no capture, no framing, the caller owns the socket.
    pub fn interactive_shell(&mut self) -> Result<TcpStream> {
        self.require_transport()?;
        self.request("shell:")?;
        let stream = self.socket.take().ok_or(DroidError::NotConnected)?;
        if self.config.reconnect_after_command {
            self.reconnect()?;
        }
        Ok(stream)
    }

    /// Issue a device service request (e.g. `framebuffer:`) on the bound
    /// transport, leaving the socket positioned at the service payload.
    pub(crate) fn start_service(&mut self, service: &str) -> Result<()> {
        self.require_transport()?;
        self.request(service)
    }

    /// Run a host-serial command (e.g. port forwarding) for the bound
    /// device. Consumes the connection and reopens it.
    pub fn host_serial_command(&mut self, command: &str) -> Result<()> {
        let serial = self.require_transport()?;
        self.request(&format!("host-serial:{}:{}", serial, command))?;
        self.socket = None;
        self.reconnect()
    }

    /// Mark the socket consumed after a raw service read; reconnection is
    /// the caller's choice for those.
    pub(crate) fn mark_consumed(&mut self) {
        self.socket = None;
    }
}

impl std::fmt::Debug for AdbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdbConnection")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("serial", &self.serial)
            .field("connected", &self.socket.is_some())
            .finish()
    }
}
