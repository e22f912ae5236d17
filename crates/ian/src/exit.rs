use std::fmt;
use std::io;

use ian_iface::{DisconnectCause, IfaceError};
use ian_packets::PacketError;
use ian_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PROTOCOL_ERROR: i32 = 4;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::InvalidAddress { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        TransportError::Timeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        TransportError::Connect { source, .. } | TransportError::Io(source) => {
            io_error(context, source)
        }
    }
}

pub fn packet_error(context: &str, err: PacketError) -> CliError {
    match err {
        PacketError::Io(source) => io_error(context, source),
        PacketError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        PacketError::PayloadTooLarge { .. } | PacketError::InvalidString(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        PacketError::AlreadyStarted(_) | PacketError::NotStarted => {
            CliError::new(INTERNAL, format!("{context}: {err}"))
        }
        other => CliError::new(PROTOCOL_ERROR, format!("{context}: {other}")),
    }
}

pub fn iface_error(context: &str, err: IfaceError) -> CliError {
    match err {
        IfaceError::Transport(err) => transport_error(context, err),
        IfaceError::Packet(err) => packet_error(context, err),
        IfaceError::Stopped(cause) => disconnect_error(context, &cause),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn disconnect_error(context: &str, cause: &DisconnectCause) -> CliError {
    let code = match cause {
        DisconnectCause::LocalDisconnect => SUCCESS,
        DisconnectCause::RemoteDisconnect => FAILURE,
        DisconnectCause::PacketParseError(_) => DATA_INVALID,
        DisconnectCause::FramingError(_) => DATA_INVALID,
        DisconnectCause::IoError(_) => TRANSPORT_ERROR,
        DisconnectCause::UnsupportedServerVersion(_) => PROTOCOL_ERROR,
        DisconnectCause::UnknownError(_) => INTERNAL,
    };
    CliError::new(code, format!("{context}: {cause}"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ian_packets::Version;

    use super::*;

    #[test]
    fn transport_errors_map_to_codes() {
        let refused = TransportError::Connect {
            address: "127.0.0.1:2010".into(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(transport_error("connect", refused).code, TRANSPORT_ERROR);

        let timeout = TransportError::Timeout {
            address: "10.0.0.1:2010".into(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(transport_error("connect", timeout).code, TIMEOUT);

        let invalid = TransportError::InvalidAddress {
            address: ":x".into(),
            reason: "bad port".into(),
        };
        assert_eq!(transport_error("connect", invalid).code, USAGE);
    }

    #[test]
    fn disconnect_causes_map_to_codes() {
        let unsupported = DisconnectCause::UnsupportedServerVersion(Version::new(2, 0, 0));
        let err = disconnect_error("probe", &unsupported);
        assert_eq!(err.code, PROTOCOL_ERROR);
        assert!(err.message.contains("2.0.0"));
        assert_eq!(
            disconnect_error("probe", &DisconnectCause::RemoteDisconnect).code,
            FAILURE
        );

        let framing = DisconnectCause::from(PacketError::IllegalHeader(0x1234_5678));
        assert_eq!(disconnect_error("listen", &framing).code, DATA_INVALID);
        let reset = DisconnectCause::from(PacketError::Io(io::Error::from(
            io::ErrorKind::ConnectionReset,
        )));
        assert_eq!(disconnect_error("listen", &reset).code, TRANSPORT_ERROR);
    }
}
