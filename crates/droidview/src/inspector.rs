//! High-level UI inspector
//!
//! Ties a bound device, a dump backend, the parsers and the coordinate
//! resolver together. A hierarchy must be dumped explicitly before any
//! query; UI changes are asynchronous relative to input events, so callers
//! decide when to re-dump. Every dump rebuilds the tree and the window
//! list from scratch.

use crate::adb::AdbDevice;
use crate::config::DumpServiceConfig;
use crate::coords::{self, WindowManagerState};
use crate::error::{DroidError, Result};
use crate::parse::{line, xml};
use crate::query::{self, AttrMatch, NodeFormatter};
use crate::tree::{Backend, NodeId, ViewTree};
use crate::viewserver::{self, ViewServerClient};
use regex::Regex;
use tracing::{debug, warn};

/// Minimum SDK for the instrumentation XML backend.
const UIAUTOMATOR_MIN_SDK: u32 = 16;

/// Which dump backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendPreference {
    /// Instrumentation XML when the SDK supports it, else the view server.
    #[default]
    Auto,
    ViewServer,
    UiAutomator,
}

/// Explicit inspector configuration, threaded through the constructor.
#[derive(Debug, Clone)]
pub struct InspectorConfig {
    pub backend: BackendPreference,
    pub dump_service: DumpServiceConfig,
    /// Start the on-device view server and forward the local port when the
    /// view-server backend is chosen.
    pub setup_view_server: bool,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::default(),
            dump_service: DumpServiceConfig::default(),
            setup_view_server: true,
        }
    }
}

impl InspectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendPreference) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_dump_service(mut self, config: DumpServiceConfig) -> Self {
        self.dump_service = config;
        self
    }

    pub fn with_setup_view_server(mut self, setup: bool) -> Self {
        self.setup_view_server = setup;
        self
    }
}

/// Resolve the backend from the preference and the device traits. The view
/// server is unusable on secure non-debuggable builds; the XML dump needs
/// SDK 16.
fn choose_backend(
    preference: BackendPreference,
    sdk: u32,
    secure: bool,
    debuggable: bool,
    serial: &str,
) -> Result<Backend> {
    let view_server_usable = !secure || debuggable;
    let uiautomator_usable = sdk >= UIAUTOMATOR_MIN_SDK;
    match preference {
        BackendPreference::Auto => {
            if uiautomator_usable {
                Ok(Backend::UiAutomator)
            } else if view_server_usable {
                Ok(Backend::ViewServer)
            } else {
                Err(DroidError::SecureDevice(serial.to_string()))
            }
        }
        BackendPreference::ViewServer => {
            if view_server_usable {
                Ok(Backend::ViewServer)
            } else {
                Err(DroidError::SecureDevice(serial.to_string()))
            }
        }
        BackendPreference::UiAutomator => {
            if uiautomator_usable {
                Ok(Backend::UiAutomator)
            } else {
                Err(DroidError::Unsupported {
                    operation: "uiautomator dump".to_string(),
                    required: UIAUTOMATOR_MIN_SDK,
                    actual: sdk,
                })
            }
        }
    }
}

/// UI inspector for one device
pub struct ViewInspector {
    device: AdbDevice,
    config: InspectorConfig,
    backend: Backend,
    view_server: Option<ViewServerClient>,
    tree: Option<ViewTree>,
    windows: WindowManagerState,
}

impl ViewInspector {
    /// Bootstrap an inspector: verify the device is not locked, choose the
    /// backend and, for the view server, bring the forwarded service up.
    pub fn new(mut device: AdbDevice, config: InspectorConfig) -> Result<Self> {
        let sdk = device.sdk_version();
        if device.is_locked()? && device.is_secure() && !device.is_debuggable() {
            return Err(DroidError::SecureDevice(device.serial().to_string()));
        }
        let backend = choose_backend(
            config.backend,
            sdk,
            device.is_secure(),
            device.is_debuggable(),
            device.serial(),
        )?;
        debug!(serial = device.serial(), sdk, ?backend, "inspector ready");
        let mut inspector = Self {
            device,
            config,
            backend,
            view_server: None,
            tree: None,
            windows: WindowManagerState::default(),
        };
        if backend == Backend::ViewServer {
            inspector.setup_view_server()?;
        }
        Ok(inspector)
    }

    fn setup_view_server(&mut self) -> Result<()> {
        let service = self.config.dump_service.clone();
        if self.config.setup_view_server {
            if !viewserver::is_view_server_running(&mut self.device)? {
                viewserver::start_view_server(&mut self.device, service.remote_port)?;
            }
            self.device.forward(service.local_port, service.remote_port)?;
        }
        self.view_server = Some(ViewServerClient::new(service));
        Ok(())
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn device(&self) -> &AdbDevice {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut AdbDevice {
        &mut self.device
    }

    /// Dump every window and rebuild the tree.
    pub fn dump(&mut self) -> Result<&ViewTree> {
        self.dump_window("-1")
    }

    /// Dump one window (view-server backend) and rebuild the tree. The
    /// instrumentation backend always dumps the whole screen.
    pub fn dump_window(&mut self, window: &str) -> Result<&ViewTree> {
        let sdk = self.device.sdk_version();
        let mut tree = match self.backend {
            Backend::ViewServer => {
                let client = self.view_server.as_ref().ok_or_else(|| {
                    DroidError::Connection("view server not set up".to_string())
                })?;
                let text = client.dump(window)?;
                line::parse(&text, sdk)?
            }
            Backend::UiAutomator => {
                if window != "-1" {
                    warn!(window, "instrumentation dump covers the whole screen; selector ignored");
                }
                let raw = self.device.shell("uiautomator dump /dev/tty")?;
                xml::parse(xml::strip_dump_noise(&raw))?
            }
        };
        self.windows = match self.device.window_dump() {
            Ok(dump) => coords::parse_window_dump(&dump, sdk),
            Err(e) => {
                warn!(error = %e, "window dump failed, resolving with zero offsets");
                WindowManagerState::default()
            }
        };
        coords::resolve_tree(&mut tree, &self.windows);
        Ok(self.tree.insert(tree))
    }

    /// The current tree. Fails fast until the first dump.
    pub fn tree(&self) -> Result<&ViewTree> {
        self.tree.as_ref().ok_or(DroidError::NotDumped)
    }

    /// Window list of the last dump.
    pub fn windows(&self) -> &WindowManagerState {
        &self.windows
    }

    pub fn find_view_by_id(&self, id: &str) -> Result<NodeId> {
        let tree = self.tree()?;
        query::find_by_id_or_raise(tree, tree.root(), id)
    }

    pub fn find_view_with_text(&self, text: &str) -> Result<NodeId> {
        let tree = self.tree()?;
        query::find_with_text_or_raise(tree, tree.root(), AttrMatch::Exact(text))
    }

    pub fn find_view_with_text_matching(&self, pattern: &Regex) -> Result<NodeId> {
        let tree = self.tree()?;
        query::find_with_text_or_raise(tree, tree.root(), AttrMatch::Pattern(pattern))
    }

    pub fn find_view_with_content_description(&self, description: &str) -> Result<NodeId> {
        let tree = self.tree()?;
        query::find_with_content_description_or_raise(
            tree,
            tree.root(),
            AttrMatch::Exact(description),
        )
    }

    pub fn views_containing_point(&self, point: (i32, i32)) -> Result<Vec<NodeId>> {
        Ok(query::views_containing_point(self.tree()?, point))
    }

    /// Render the current tree with the given formatter.
    pub fn traverse(&self, formatter: NodeFormatter) -> Result<String> {
        let tree = self.tree()?;
        Ok(query::traverse(tree, tree.root(), formatter))
    }

    /// Tap the center of a view from the current dump.
    pub fn touch_view(&mut self, id: NodeId) -> Result<()> {
        let center = {
            let tree = self.tree.as_ref().ok_or(DroidError::NotDumped)?;
            tree.center(id).ok_or_else(|| {
                DroidError::CommandFailed("view has no resolved bounds".to_string())
            })?
        };
        self.device.touch(center.0, center.1)
    }
}
