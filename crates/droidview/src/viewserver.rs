//! Client for the forwarded on-device view server
//!
//! After a local port is forwarded to the device service, this client
//! speaks its trivial text protocol: newline-terminated commands, replies
//! terminated by a `DONE` (or `DONE.`) line. Reads are blocking with an
//! optional watchdog timeout.

use crate::adb::AdbDevice;
use crate::config::DumpServiceConfig;
use crate::error::{DroidError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::TcpStream;
use tracing::debug;

lazy_static! {
    static ref RE_SERVICE_CALL_RESULT: Regex =
        Regex::new(r"Result: Parcel\(00000000 0000000([01])").unwrap();
}

fn map_io(err: std::io::Error, what: &str) -> DroidError {
    match err.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            DroidError::Timeout(format!("{} timed out", what))
        }
        _ => DroidError::Io(err),
    }
}

fn is_done_marker(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed == "DONE" || trimmed == "DONE."
}

/// Client for the view-server dump protocol on a forwarded local port
#[derive(Debug, Clone)]
pub struct ViewServerClient {
    host: String,
    config: DumpServiceConfig,
}

impl ViewServerClient {
    pub fn new(config: DumpServiceConfig) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            config,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    fn connect(&self) -> Result<TcpStream> {
        let stream = TcpStream::connect((self.host.as_str(), self.config.local_port))
            .map_err(|e| {
                DroidError::Connection(format!(
                    "cannot reach view server at {}:{}: {}",
                    self.host, self.config.local_port, e
                ))
            })?;
        stream
            .set_read_timeout(self.config.watchdog_timeout)
            .map_err(DroidError::Io)?;
        Ok(stream)
    }

    /// List the windows the view server knows about, as a map from window
    /// id to owning component name.
    pub fn list(&self) -> Result<HashMap<u32, String>> {
        let mut stream = self.connect()?;
        stream
            .write_all(b"list\n")
            .map_err(|e| map_io(e, "list write"))?;
        let reader = BufReader::new(stream);
        let mut windows = HashMap::new();
        for line in reader.lines() {
            let line = line.map_err(|e| map_io(e, "list read"))?;
            if is_done_marker(&line) {
                break;
            }
            let (id_str, name) = line
                .trim()
                .split_once(' ')
                .ok_or_else(|| DroidError::parse("malformed window list line", line.clone()))?;
            let id = u32::from_str_radix(id_str, 16)
                .map_err(|_| DroidError::parse("malformed window id", line.clone()))?;
            windows.insert(id, name.to_string());
        }
        debug!(count = windows.len(), "view server windows");
        Ok(windows)
    }

    /// Dump one window (or all windows, id `-1`) and return the raw
    /// multi-line text, without the trailing `DONE` marker.
    pub fn dump(&self, selector: &str) -> Result<String> {
        let id = self.resolve_window_id(selector)?;
        let mut stream = self.connect()?;
        let command = if id == -1 {
            "dump -1\n".to_string()
        } else {
            format!("dump {:x}\n", id)
        };
        stream
            .write_all(command.as_bytes())
            .map_err(|e| map_io(e, "dump write"))?;
        let reader = BufReader::new(stream);
        let mut text = String::new();
        for line in reader.lines() {
            let line = line.map_err(|e| map_io(e, "dump read"))?;
            if is_done_marker(&line) {
                break;
            }
            text.push_str(&line);
            text.push('\n');
        }
        Ok(text)
    }

    /// Resolve a window selector: exact owner-name match, then base-10,
    /// then base-16, in that priority order. `-1` selects every window.
    fn resolve_window_id(&self, selector: &str) -> Result<i64> {
        if selector == "-1" {
            return Ok(-1);
        }
        let windows = self.list()?;
        if let Some((id, _)) = windows.iter().find(|(_, name)| name.as_str() == selector) {
            return Ok(*id as i64);
        }
        if let Ok(id) = selector.parse::<i64>() {
            return Ok(id);
        }
        if let Ok(id) = i64::from_str_radix(selector.trim_start_matches("0x"), 16) {
            return Ok(id);
        }
        Err(DroidError::ViewNotFound {
            attribute: "window".to_string(),
            value: selector.to_string(),
            root: "view server".to_string(),
        })
    }
}

fn parse_service_call_bool(output: &str) -> Result<bool> {
    RE_SERVICE_CALL_RESULT
        .captures(output)
        .map(|caps| &caps[1] == "1")
        .ok_or_else(|| DroidError::parse("unexpected service call reply", output.trim().to_string()))
}

/// Probe whether the on-device view server is running.
pub fn is_view_server_running(device: &mut AdbDevice) -> Result<bool> {
    let output = device.shell("service call window 3")?;
    parse_service_call_bool(&output)
}

/// Ask the window manager to start the view server on the given port.
pub fn start_view_server(device: &mut AdbDevice, port: u16) -> Result<bool> {
    let output = device.shell(&format!("service call window 1 i32 {}", port))?;
    parse_service_call_bool(&output)
}

/// Ask the window manager to stop the view server.
pub fn stop_view_server(device: &mut AdbDevice) -> Result<bool> {
    let output = device.shell("service call window 2")?;
    parse_service_call_bool(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    fn spawn_server(
        replies: Vec<(&'static str, &'static str)>,
    ) -> (u16, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            for (expected, reply) in replies {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                assert_eq!(line.trim_end(), expected);
                let mut stream = stream;
                stream.write_all(reply.as_bytes()).unwrap();
            }
        });
        (port, handle)
    }

    fn client(port: u16) -> ViewServerClient {
        ViewServerClient::new(
            DumpServiceConfig::new()
                .with_local_port(port)
                .with_watchdog_timeout(Some(Duration::from_secs(5))),
        )
    }

    #[test]
    fn test_list_parses_hex_ids_until_done() {
        let (port, server) = spawn_server(vec![("list", "0001 com.example\nDONE\n")]);
        let windows = client(port).list().unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows.get(&1).unwrap(), "com.example");
        server.join().unwrap();
    }

    #[test]
    fn test_list_malformed_line_is_a_parse_error() {
        let (port, server) = spawn_server(vec![("list", "not-a-window\nDONE\n")]);
        let err = client(port).list().unwrap_err();
        assert!(matches!(err, DroidError::Parse { .. }));
        server.join().unwrap();
    }

    #[test]
    fn test_dump_all_windows_strips_done_marker() {
        let (port, server) = spawn_server(vec![(
            "dump -1",
            "FrameLayout@44c06bf0 mLeft=1,0\nDONE.\n",
        )]);
        let text = client(port).dump("-1").unwrap();
        assert_eq!(text, "FrameLayout@44c06bf0 mLeft=1,0\n");
        server.join().unwrap();
    }

    #[test]
    fn test_dump_resolves_selector_by_name_first() {
        let (port, server) = spawn_server(vec![
            ("list", "b74b2fb0 com.example/.Main\nDONE\n"),
            ("dump b74b2fb0", "some dump\nDONE\n"),
        ]);
        let text = client(port).dump("com.example/.Main").unwrap();
        assert_eq!(text, "some dump\n");
        server.join().unwrap();
    }

    #[test]
    fn test_dump_selector_falls_back_to_base10_then_base16() {
        let (port, server) = spawn_server(vec![
            ("list", "00ff other\nDONE\n"),
            ("dump c", "ten\nDONE\n"),
        ]);
        // "12" is no window name, parses base-10 to 12 = 0xc
        let text = client(port).dump("12").unwrap();
        assert_eq!(text, "ten\n");
        server.join().unwrap();

        let (port, server) = spawn_server(vec![
            ("list", "00ff other\nDONE\n"),
            ("dump ff", "hex\nDONE\n"),
        ]);
        let text = client(port).dump("0xff").unwrap();
        assert_eq!(text, "hex\n");
        server.join().unwrap();
    }

    #[test]
    fn test_watchdog_aborts_stuck_dump() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            // accept but never reply
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(400));
            drop(stream);
        });
        let client = ViewServerClient::new(
            DumpServiceConfig::new()
                .with_local_port(port)
                .with_watchdog_timeout(Some(Duration::from_millis(50))),
        );
        let err = client.list().unwrap_err();
        assert!(matches!(err, DroidError::Timeout(_)));
        server.join().unwrap();
    }

    #[test]
    fn test_parse_service_call_reply() {
        assert!(parse_service_call_bool("Result: Parcel(00000000 00000001   '........')").unwrap());
        assert!(!parse_service_call_bool("Result: Parcel(00000000 00000000   '........')").unwrap());
        assert!(parse_service_call_bool("garbage").is_err());
    }
}
