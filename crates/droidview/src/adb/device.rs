//! Device-scoped operations on a bound ADB transport
//!
//! Wraps an [`AdbConnection`] bound to one device: cached build properties,
//! display metrics, input injection, activity starts, lock-state checks and
//! port forwarding.

use crate::adb::connection::AdbConnection;
use crate::config::TransportConfig;
use crate::error::{DroidError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, warn};

lazy_static! {
    static ref RE_GETPROP_LINE: Regex = Regex::new(r"^\[(.+?)\]:\s*\[(.*)\]\s*$").unwrap();
    static ref RE_UNRESTRICTED_SCREEN: Regex =
        Regex::new(r"mUnrestrictedScreen=\(\d+,\d+\)\s+(\d+)x(\d+)").unwrap();
    static ref RE_SCREEN_ON: Regex = Regex::new(r"mScreenOnFully=(true|false)").unwrap();
    static ref RE_DISPLAY_POWER: Regex = Regex::new(r"Display Power: state=(ON|OFF)").unwrap();
    static ref RE_LOCK_SCREEN: Regex =
        Regex::new(r"(?:mShowingLockscreen|mDreamingLockscreen|keyguardShowing)=(true|false)")
            .unwrap();
}

/// Substrings in `am start` output that mark a failed launch. The shell
/// exit status is not reliably reported over the transport, so the combined
/// output is scanned instead.
const START_ACTIVITY_FAILURES: &[&str] = &[
    "Error:",
    "Error type",
    "Exception:",
    "Unable to resolve intent",
    "Activity not started",
];

/// Keycode sent to wake a sleeping device.
const KEYCODE_POWER: &str = "26";

/// `input touchscreen swipe` grew its duration argument in SDK 18; plain
/// `input swipe` appeared in 16. Anything older cannot drag at all.
const DRAG_MIN_SDK: u32 = 16;
const DRAG_DURATION_MIN_SDK: u32 = 18;

pub(crate) fn parse_properties(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| {
            RE_GETPROP_LINE.captures(line.trim()).map(|caps| {
                (
                    caps.get(1).map_or("", |m| m.as_str()).to_string(),
                    caps.get(2).map_or("", |m| m.as_str()).to_string(),
                )
            })
        })
        .collect()
}

pub(crate) fn escape_input_text(text: &str) -> String {
    // `input text` treats a space as an argument separator; %s is its
    // documented escape. Quotes and backslashes go through the shell once
    // more and need their own escaping.
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(' ', "%s")
}

pub(crate) fn drag_command(
    sdk: u32,
    (x0, y0): (i32, i32),
    (x1, y1): (i32, i32),
    duration_ms: u32,
) -> Result<String> {
    if sdk < DRAG_MIN_SDK {
        return Err(DroidError::Unsupported {
            operation: "drag".to_string(),
            required: DRAG_MIN_SDK,
            actual: sdk,
        });
    }
    if sdk < DRAG_DURATION_MIN_SDK {
        Ok(format!("input swipe {} {} {} {}", x0, y0, x1, y1))
    } else {
        Ok(format!(
            "input touchscreen swipe {} {} {} {} {}",
            x0, y0, x1, y1, duration_ms
        ))
    }
}

pub(crate) fn scan_activity_output(output: &str) -> Result<()> {
    for marker in START_ACTIVITY_FAILURES {
        if output.contains(marker) {
            return Err(DroidError::CommandFailed(format!(
                "am start failed: {}",
                output.trim()
            )));
        }
    }
    Ok(())
}

/// A device bound over the ADB host protocol
pub struct AdbDevice {
    conn: AdbConnection,
    serial: String,
    properties: HashMap<String, String>,
}

impl AdbDevice {
    /// Connect to the ADB server, bind the device matching `selector` and
    /// cache its build properties.
    pub fn connect(selector: &str, config: TransportConfig) -> Result<Self> {
        let mut conn = AdbConnection::connect(config)?;
        let serial = conn.bind_transport(selector)?;
        let output = conn.shell("getprop")?;
        if !conn.is_connected() {
            // bootstrap needs a live transport regardless of the
            // reconnect-after-command setting
            conn.reconnect()?;
        }
        let properties = parse_properties(&output);
        debug!(serial, props = properties.len(), "device bound");
        Ok(Self {
            conn,
            serial,
            properties,
        })
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Cached build property, as reported at connect time.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn sdk_version(&self) -> u32 {
        self.property("ro.build.version.sdk")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| {
                warn!(serial = %self.serial, "device did not report an SDK version");
                0
            })
    }

    pub fn release(&self) -> Option<&str> {
        self.property("ro.build.version.release")
    }

    pub fn is_secure(&self) -> bool {
        self.property("ro.secure") == Some("1")
    }

    pub fn is_debuggable(&self) -> bool {
        self.property("ro.debuggable") == Some("1")
    }

    pub fn is_emulator(&self) -> bool {
        self.property("ro.kernel.qemu") == Some("1")
    }

    /// Run a shell command on the device and capture its output.
    pub fn shell(&mut self, command: &str) -> Result<String> {
        self.conn.shell(command)
    }

    /// Open an interactive shell and hand the raw stream to the caller.
    pub fn interactive_shell(&mut self) -> Result<std::net::TcpStream> {
        self.conn.interactive_shell()
    }

    /// Get a device property. The pseudo-keys `display.width`,
    /// `display.height` and `display.density` are derived from the window
    /// manager; everything else is a plain `getprop`.
    pub fn get_property(&mut self, key: &str) -> Result<String> {
        match key {
            "display.width" => Ok(self.display_size()?.0.to_string()),
            "display.height" => Ok(self.display_size()?.1.to_string()),
            "display.density" => {
                let out = self.shell("getprop ro.sf.lcd_density")?;
                Ok(out.trim().to_string())
            }
            _ => {
                let out = self.shell(&format!("getprop {}", key))?;
                Ok(out.trim().to_string())
            }
        }
    }

    /// Screen size scraped from the window-manager dump.
    pub fn display_size(&mut self) -> Result<(u32, u32)> {
        let dump = self.shell("dumpsys window")?;
        let caps = RE_UNRESTRICTED_SCREEN.captures(&dump).ok_or_else(|| {
            DroidError::parse(
                "window manager dump reports no mUnrestrictedScreen",
                dump.lines().next().unwrap_or("").to_string(),
            )
        })?;
        let width = caps[1].parse().unwrap_or(0);
        let height = caps[2].parse().unwrap_or(0);
        Ok((width, height))
    }

    /// Press a key, by symbolic name or numeric keycode.
    pub fn press(&mut self, keycode: &str) -> Result<()> {
        self.shell(&format!("input keyevent {}", keycode))?;
        Ok(())
    }

    /// Tap the screen at the given coordinates.
    pub fn touch(&mut self, x: i32, y: i32) -> Result<()> {
        self.shell(&format!("input tap {} {}", x, y))?;
        Ok(())
    }

    /// Type text into the focused view.
    pub fn type_text(&mut self, text: &str) -> Result<()> {
        let escaped = escape_input_text(text);
        self.shell(&format!("input text \"{}\"", escaped))?;
        Ok(())
    }

    /// Drag from one point to another over the given duration. The input
    /// command syntax changed across releases; devices older than SDK 16
    /// cannot drag.
    pub fn drag(&mut self, start: (i32, i32), end: (i32, i32), duration_ms: u32) -> Result<()> {
        let command = drag_command(self.sdk_version(), start, end, duration_ms)?;
        self.shell(&command)?;
        Ok(())
    }

    /// Start an activity and scan the combined output for failures.
    pub fn start_activity(
        &mut self,
        component: &str,
        flags: Option<&str>,
        uri: Option<&str>,
    ) -> Result<()> {
        let mut command = String::from("am start");
        if let Some(flags) = flags {
            command.push(' ');
            command.push_str(flags);
        }
        command.push_str(&format!(" -n {}", component));
        if let Some(uri) = uri {
            command.push(' ');
            command.push_str(uri);
        }
        let output = self.shell(&command)?;
        scan_activity_output(&output)
    }

    /// Whether the screen is fully on.
    pub fn is_screen_on(&mut self) -> Result<bool> {
        let policy = self.shell("dumpsys window policy")?;
        if let Some(caps) = RE_SCREEN_ON.captures(&policy) {
            return Ok(&caps[1] == "true");
        }
        let power = self.shell("dumpsys power")?;
        if let Some(caps) = RE_DISPLAY_POWER.captures(&power) {
            return Ok(&caps[1] == "ON");
        }
        warn!(serial = %self.serial, "cannot determine screen state, assuming on");
        Ok(true)
    }

    /// Whether a lockscreen is showing.
    pub fn is_locked(&mut self) -> Result<bool> {
        let policy = self.shell("dumpsys window policy")?;
        Ok(RE_LOCK_SCREEN
            .captures_iter(&policy)
            .any(|caps| &caps[1] == "true"))
    }

    /// Wake the device if the screen is off.
    pub fn wake(&mut self) -> Result<()> {
        if !self.is_screen_on()? {
            self.press(KEYCODE_POWER)?;
        }
        Ok(())
    }

    /// Forward a local TCP port to a device TCP port through the host
    /// protocol.
    pub fn forward(&mut self, local: u16, remote: u16) -> Result<()> {
        self.conn
            .host_serial_command(&format!("forward:tcp:{};tcp:{}", local, remote))
    }

    /// The raw window-manager window list, consumed by coordinate
    /// resolution.
    pub fn window_dump(&mut self) -> Result<String> {
        self.shell("dumpsys window windows")
    }

    /// Close the underlying connection. Later commands fail with
    /// `NotConnected`.
    pub fn close(&mut self) {
        self.conn.close();
    }

    pub(crate) fn connection_mut(&mut self) -> &mut AdbConnection {
        &mut self.conn
    }
}

impl std::fmt::Debug for AdbDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdbDevice")
            .field("serial", &self.serial)
            .field("sdk", &self.sdk_version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_properties() {
        let output = "[ro.build.version.sdk]: [19]\n[ro.secure]: [1]\n[ro.product.model]: [Nexus 5]\nnoise line\n";
        let props = parse_properties(output);
        assert_eq!(props.get("ro.build.version.sdk").unwrap(), "19");
        assert_eq!(props.get("ro.secure").unwrap(), "1");
        assert_eq!(props.get("ro.product.model").unwrap(), "Nexus 5");
        assert_eq!(props.len(), 3);
    }

    #[test]
    fn test_escape_input_text() {
        assert_eq!(escape_input_text("hello world"), "hello%sworld");
        assert_eq!(escape_input_text("say \"hi\""), "say%s\\\"hi\\\"");
    }

    #[test]
    fn test_drag_command_branches_on_sdk() {
        assert!(matches!(
            drag_command(15, (0, 0), (10, 10), 500),
            Err(DroidError::Unsupported { required: 16, .. })
        ));
        assert_eq!(
            drag_command(17, (0, 0), (10, 10), 500).unwrap(),
            "input swipe 0 0 10 10"
        );
        assert_eq!(
            drag_command(19, (0, 0), (10, 10), 500).unwrap(),
            "input touchscreen swipe 0 0 10 10 500"
        );
    }

    #[test]
    fn test_scan_activity_output() {
        assert!(scan_activity_output("Starting: Intent { cmp=com.example/.Main }\n").is_ok());
        let err = scan_activity_output(
            "Starting: Intent { cmp=com.example/.Main }\nError type 3\nError: Activity class does not exist.\n",
        )
        .unwrap_err();
        assert!(matches!(err, DroidError::CommandFailed(_)));
    }

    #[test]
    fn test_unrestricted_screen_pattern() {
        let dump = "  mUnrestrictedScreen=(0,0) 1080x1920\n";
        let caps = RE_UNRESTRICTED_SCREEN.captures(dump).unwrap();
        assert_eq!(&caps[1], "1080");
        assert_eq!(&caps[2], "1920");
    }
}
