use std::fmt;
use std::sync::Arc;

use ian_packets::{PacketError, ParseFailure, Version};

/// Errors that can occur while driving a connection.
#[derive(Debug, thiserror::Error)]
pub enum IfaceError {
    /// Connecting to the server failed.
    #[error("transport error: {0}")]
    Transport(#[from] ian_transport::TransportError),

    /// Packet-level error.
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// Listener registration was rejected.
    #[error("listener error: {0}")]
    Listener(#[from] ian_listener::ListenerError),

    /// The interface has stopped and cannot be used again.
    #[error("interface stopped: {0}")]
    Stopped(DisconnectCause),

    /// `start` was called outside a tokio runtime.
    #[error("no tokio runtime available to start the interface")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, IfaceError>;

/// Why a connection ended.
#[derive(Debug, Clone)]
pub enum DisconnectCause {
    /// `stop` or `dispose` was called.
    LocalDisconnect,
    /// The server closed the connection.
    RemoteDisconnect,
    /// A packet payload could not be decoded.
    PacketParseError(Arc<ParseFailure>),
    /// The byte stream broke the preamble rules, so packet boundaries are
    /// lost.
    FramingError(Arc<PacketError>),
    /// The socket failed while reading or writing.
    IoError(Arc<PacketError>),
    /// The server announced a version outside the supported range.
    UnsupportedServerVersion(Version),
    /// A listener panicked or some other unexpected failure.
    UnknownError(String),
}

impl DisconnectCause {
    /// Whether the connection ended because of a failure.
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::LocalDisconnect | Self::RemoteDisconnect)
    }

    /// Short machine-readable name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LocalDisconnect => "local_disconnect",
            Self::RemoteDisconnect => "remote_disconnect",
            Self::PacketParseError(_) => "packet_parse_error",
            Self::FramingError(_) => "framing_error",
            Self::IoError(_) => "io_error",
            Self::UnsupportedServerVersion(_) => "unsupported_server_version",
            Self::UnknownError(_) => "unknown_error",
        }
    }
}

impl fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalDisconnect => f.write_str("disconnected locally"),
            Self::RemoteDisconnect => f.write_str("server closed the connection"),
            Self::PacketParseError(failure) => write!(f, "{failure}"),
            Self::FramingError(err) => write!(f, "malformed packet stream: {err}"),
            Self::IoError(err) => write!(f, "{err}"),
            Self::UnsupportedServerVersion(version) => {
                write!(f, "unsupported server version {version}")
            }
            Self::UnknownError(message) => write!(f, "unexpected error: {message}"),
        }
    }
}

impl From<PacketError> for DisconnectCause {
    fn from(err: PacketError) -> Self {
        match err {
            PacketError::ConnectionClosed => Self::RemoteDisconnect,
            PacketError::Io(_) => Self::IoError(Arc::new(err)),
            PacketError::IllegalHeader(_)
            | PacketError::IllegalLength(_)
            | PacketError::PayloadTooLarge { .. }
            | PacketError::UnknownOrigin(_)
            | PacketError::OriginMismatch { .. }
            | PacketError::NonEmptyPadding(_)
            | PacketError::LengthDiscrepancy { .. } => Self::FramingError(Arc::new(err)),
            PacketError::AlreadyStarted(_)
            | PacketError::NotStarted
            | PacketError::InvalidString(_) => Self::UnknownError(err.to_string()),
        }
    }
}
