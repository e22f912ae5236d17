//! TCP transport for the Artemis bridge simulator protocol.
//!
//! This is the lowest layer of IAN. It resolves a server address, opens a
//! TCP connection under a bounded timeout and hands the connected
//! [`tokio::net::TcpStream`] to the layers above.

pub mod address;
pub mod error;
pub mod tcp;

pub use address::{parse_address, DEFAULT_PORT};
pub use error::{Result, TransportError};
pub use tcp::{connect, DEFAULT_CONNECT_TIMEOUT};
