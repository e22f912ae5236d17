use std::time::Duration;

/// Errors that can occur while establishing a transport connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The host/port pair could not be parsed or resolved to any address.
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// No address answered within the connect timeout.
    #[error("timed out connecting to {address} after {timeout:?}")]
    Timeout { address: String, timeout: Duration },

    /// Every resolved address refused or failed the connection.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    /// An I/O error occurred while configuring the stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
