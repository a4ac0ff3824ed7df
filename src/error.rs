use std::fmt;

/// Main error type for the Magpie resource server
#[derive(Debug)]
pub enum MagpieError {
    /// Configuration or CLI argument errors
    Config(String),

    /// Malformed frames or unexpected message shapes
    Protocol(String),

    /// Peer dialing and socket errors
    Transport(String),

    /// System I/O errors
    Io(std::io::Error),

    /// Serialization/deserialization errors
    Serialization(SerializationError),

    /// Internal lock poisoning or concurrency errors
    Concurrency(String),
}

/// Serialization related errors
#[derive(Debug)]
pub enum SerializationError {
    /// JSON serialization/deserialization errors
    Json(serde_json::Error),
}

impl fmt::Display for MagpieError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MagpieError::Config(msg) => write!(f, "Configuration error: {}", msg),
            MagpieError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            MagpieError::Transport(msg) => write!(f, "Transport error: {}", msg),
            MagpieError::Io(err) => write!(f, "I/O error: {}", err),
            MagpieError::Serialization(err) => write!(f, "Serialization error: {}", err),
            MagpieError::Concurrency(msg) => write!(f, "Concurrency error: {}", msg),
        }
    }
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializationError::Json(err) => write!(f, "JSON: {}", err),
        }
    }
}

impl std::error::Error for MagpieError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MagpieError::Io(err) => Some(err),
            MagpieError::Serialization(SerializationError::Json(err)) => Some(err),
            _ => None,
        }
    }
}

impl std::error::Error for SerializationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SerializationError::Json(err) => Some(err),
        }
    }
}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, MagpieError>;

impl MagpieError {
    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            MagpieError::Config(_) => "configuration_error",
            MagpieError::Protocol(_) => "protocol_error",
            MagpieError::Transport(_) => "transport_error",
            MagpieError::Io(_) => "io_error",
            MagpieError::Serialization(_) => "serialization_error",
            MagpieError::Concurrency(_) => "concurrency_error",
        }
    }
}

// Conversions from common error types
impl From<std::io::Error> for MagpieError {
    fn from(err: std::io::Error) -> Self {
        MagpieError::Io(err)
    }
}

impl From<serde_json::Error> for MagpieError {
    fn from(err: serde_json::Error) -> Self {
        MagpieError::Serialization(SerializationError::Json(err))
    }
}

impl From<tokio::time::error::Elapsed> for MagpieError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        MagpieError::Transport("Socket operation timed out".to_string())
    }
}

/// Failures reported to clients as `{"response":"error"}` frames.
///
/// The `Display` text of each variant is the exact `errorMessage` put on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandError {
    MalformedRequest,
    InvalidCommand,
    MissingResource,
    InvalidResource,
    CannotPublish,
    CannotRemove,
    MissingResourceOrSecret,
    IncorrectSecret,
    CannotShare,
    MissingTemplate,
    InvalidTemplate,
    /// FETCH target has no registry entry for its (channel, uri)
    NoMatchingResource,
    /// FETCH target is registered but its backing file is gone
    ResourceMissing,
    InvalidServerList,
}

impl CommandError {
    pub fn message(&self) -> &'static str {
        match self {
            CommandError::MalformedRequest => "missing or incorrect type for command",
            CommandError::InvalidCommand => "invalid command",
            CommandError::MissingResource => "missing resource",
            CommandError::InvalidResource => "invalid resource",
            CommandError::CannotPublish => "cannot publish resource",
            CommandError::CannotRemove => "cannot remove resource",
            CommandError::MissingResourceOrSecret => "missing resource and/or secret",
            CommandError::IncorrectSecret => "incorrect secret",
            CommandError::CannotShare => "cannot share resource",
            CommandError::MissingTemplate => "missing resourceTemplate",
            CommandError::InvalidTemplate => "invalid resourceTemplate",
            CommandError::NoMatchingResource => "uri or channel doesn't correspond",
            CommandError::ResourceMissing => "resource doesn't exist",
            CommandError::InvalidServerList => "missing or invalid server list",
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for CommandError {}

// Helper macros for common error construction patterns
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::MagpieError::Config($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::MagpieError::Config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! protocol_error {
    ($msg:expr) => {
        $crate::error::MagpieError::Protocol($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::MagpieError::Protocol(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! transport_error {
    ($msg:expr) => {
        $crate::error::MagpieError::Transport($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::MagpieError::Transport(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! concurrency_error {
    ($msg:expr) => {
        $crate::error::MagpieError::Concurrency($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::MagpieError::Concurrency(format!($fmt, $($arg)*))
    };
}
