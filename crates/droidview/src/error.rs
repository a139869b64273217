/// Error types for device transport, dump parsing and view queries
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DroidError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("ADB server protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("Not connected")]
    NotConnected,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("Parse error: {message} in {fragment:?}")]
    Parse { message: String, fragment: String },

    #[error("View not found: {attribute}={value}, searched from {root}")]
    ViewNotFound {
        attribute: String,
        value: String,
        root: String,
    },

    #[error("{operation} requires SDK version {required}, device reports {actual}")]
    Unsupported {
        operation: String,
        required: u32,
        actual: u32,
    },

    #[error("Device {0} is secure and locked; no dump backend usable")]
    SecureDevice(String),

    #[error("No hierarchy dumped yet; call dump() first")]
    NotDumped,

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl DroidError {
    /// Build a ParseError carrying the offending raw fragment.
    pub fn parse(message: impl Into<String>, fragment: impl Into<String>) -> Self {
        DroidError::Parse {
            message: message.into(),
            fragment: fragment.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DroidError>;
