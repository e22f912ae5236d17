use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Default bound on resolving and connecting to a server.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect to an Artemis server.
///
/// Resolution and every connection attempt share one `timeout` budget. Each
/// resolved address is tried in turn; the last connect error is reported if
/// none succeeds. Nagle's algorithm is disabled on the returned stream since
/// the protocol sends many small packets.
pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let address = format!("{host}:{port}");
    if host.trim().is_empty() {
        return Err(TransportError::InvalidAddress {
            address,
            reason: "host must not be empty".to_string(),
        });
    }

    match tokio::time::timeout(timeout, connect_any(host, port, &address)).await {
        Ok(result) => {
            let stream = result?;
            stream.set_nodelay(true)?;
            info!(%address, "connected to server");
            Ok(stream)
        }
        Err(_) => Err(TransportError::Timeout { address, timeout }),
    }
}

async fn connect_any(host: &str, port: u16, address: &str) -> Result<TcpStream> {
    let candidates: Vec<_> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|err| TransportError::InvalidAddress {
            address: address.to_string(),
            reason: err.to_string(),
        })?
        .collect();

    if candidates.is_empty() {
        return Err(TransportError::InvalidAddress {
            address: address.to_string(),
            reason: "host resolved to no addresses".to_string(),
        });
    }

    let mut last_err = None;
    for candidate in candidates {
        debug!(%candidate, "attempting connection");
        match TcpStream::connect(candidate).await {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                debug!(%candidate, error = %err, "connection attempt failed");
                last_err = Some(err);
            }
        }
    }

    Err(TransportError::Connect {
        address: address.to_string(),
        source: last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no address attempted")
        }),
    })
}
