use std::time::Duration;

use ian_iface::{ArtemisNetworkInterface, Disconnect, DisconnectCause, InterfaceConfig};
use ian_packets::builtin::{VersionPacket, WelcomePacket};
use ian_transport::parse_address;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::cmd::{parse_timeout, runtime, ProbeArgs};
use crate::exit::{
    disconnect_error, iface_error, transport_error, CliError, CliResult, INTERNAL,
    PROTOCOL_ERROR, SUCCESS, TIMEOUT,
};
use crate::output::{print_probe, OutputFormat, ProbeOutput};

enum Handshake {
    Version(VersionPacket),
    Welcome(String),
    Closed(DisconnectCause),
}

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_timeout(&args.timeout)?;
    let (host, port) =
        parse_address(&args.address).map_err(|err| transport_error("invalid address", err))?;

    let out = runtime()?.block_on(probe(&host, port, timeout))?;
    print_probe(&out, format);
    Ok(if out.supported { SUCCESS } else { PROTOCOL_ERROR })
}

async fn probe(host: &str, port: u16, timeout: Duration) -> CliResult<ProbeOutput> {
    let config = InterfaceConfig {
        connect_timeout: timeout,
        ..InterfaceConfig::default()
    };
    let iface = ArtemisNetworkInterface::connect(host, port, config)
        .await
        .map_err(|err| iface_error("connect failed", err))?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let sender = tx.clone();
    iface.on(move |packet: &VersionPacket| {
        let _ = sender.send(Handshake::Version(packet.clone()));
    });
    let sender = tx.clone();
    iface.on(move |packet: &WelcomePacket| {
        let _ = sender.send(Handshake::Welcome(packet.message.clone()));
    });
    iface.on(move |event: &Disconnect| {
        let _ = tx.send(Handshake::Closed(event.cause.clone()));
    });
    iface
        .start()
        .map_err(|err| iface_error("start failed", err))?;

    let deadline = Instant::now() + timeout;
    let outcome = await_handshake(&mut rx, deadline).await;
    iface.dispose().await;

    let address = format!("{host}:{port}");
    match outcome? {
        Outcome::Accepted { version, welcome } => Ok(ProbeOutput {
            address,
            server_version: version.version.to_string(),
            legacy_version: Some(version.legacy_version),
            supported: true,
            welcome,
        }),
        Outcome::Rejected(version) => Ok(ProbeOutput {
            address,
            server_version: version.to_string(),
            legacy_version: None,
            supported: false,
            welcome: None,
        }),
    }
}

enum Outcome {
    Accepted {
        version: VersionPacket,
        welcome: Option<String>,
    },
    Rejected(ian_packets::Version),
}

/// Wait for both the version and the welcome. The welcome is optional once
/// the version has arrived; the deadline or a disconnect ends the wait.
async fn await_handshake(
    rx: &mut UnboundedReceiver<Handshake>,
    deadline: Instant,
) -> CliResult<Outcome> {
    let mut version = None;
    let mut welcome = None;

    loop {
        if let (Some(_), Some(_)) = (&version, &welcome) {
            break;
        }
        match timeout_at(deadline, rx.recv()).await {
            Ok(Some(Handshake::Version(packet))) => {
                debug!(version = %packet.version, "version received");
                version = Some(packet);
            }
            Ok(Some(Handshake::Welcome(message))) => welcome = Some(message),
            Ok(Some(Handshake::Closed(DisconnectCause::UnsupportedServerVersion(v)))) => {
                return Ok(Outcome::Rejected(v));
            }
            Ok(Some(Handshake::Closed(cause))) => {
                if version.is_some() {
                    break;
                }
                return Err(disconnect_error("connection closed before handshake", &cause));
            }
            Ok(None) => return Err(CliError::new(INTERNAL, "listener channel closed")),
            Err(_) => {
                if version.is_some() {
                    break;
                }
                return Err(CliError::new(TIMEOUT, "timed out waiting for version handshake"));
            }
        }
    }

    match version {
        Some(version) => Ok(Outcome::Accepted { version, welcome }),
        None => Err(CliError::new(INTERNAL, "handshake ended without a version")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ian_packets::Version;

    use super::*;

    fn version_packet() -> VersionPacket {
        VersionPacket {
            unknown: 0,
            legacy_version: 2.0,
            version: Version::new(2, 7, 1),
        }
    }

    #[tokio::test]
    async fn waits_for_version_and_welcome() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(Handshake::Welcome("hi".into())).unwrap();
        tx.send(Handshake::Version(version_packet())).unwrap();

        let deadline = Instant::now() + Duration::from_secs(1);
        match await_handshake(&mut rx, deadline).await.unwrap() {
            Outcome::Accepted { version, welcome } => {
                assert_eq!(version.version, Version::new(2, 7, 1));
                assert_eq!(welcome.as_deref(), Some("hi"));
            }
            Outcome::Rejected(_) => panic!("expected accepted handshake"),
        }
    }

    #[tokio::test]
    async fn version_alone_is_enough_at_deadline() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(Handshake::Version(version_packet())).unwrap();

        let deadline = Instant::now() + Duration::from_millis(50);
        let outcome = await_handshake(&mut rx, deadline).await.unwrap();
        assert!(matches!(outcome, Outcome::Accepted { welcome: None, .. }));
        drop(tx);
    }

    #[tokio::test]
    async fn unsupported_version_is_reported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(Handshake::Closed(DisconnectCause::UnsupportedServerVersion(
            Version::new(2, 1, 0),
        )))
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(1);
        let outcome = await_handshake(&mut rx, deadline).await.unwrap();
        assert!(matches!(outcome, Outcome::Rejected(v) if v == Version::new(2, 1, 0)));
    }

    #[tokio::test]
    async fn times_out_without_version() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Handshake>();
        let deadline = Instant::now() + Duration::from_millis(20);
        let err = await_handshake(&mut rx, deadline).await.err().unwrap();
        assert_eq!(err.code, TIMEOUT);
        drop(tx);
    }

    #[tokio::test]
    async fn remote_close_before_version_fails() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(Handshake::Closed(DisconnectCause::RemoteDisconnect))
            .unwrap();
        let deadline = Instant::now() + Duration::from_secs(1);
        let err = await_handshake(&mut rx, deadline).await.err().unwrap();
        assert_eq!(err.code, crate::exit::FAILURE);
    }
}
