//! Connection driver for Artemis servers.
//!
//! [`ArtemisNetworkInterface`] owns a connection and runs its read, write,
//! packet dispatch and event dispatch loops on the tokio runtime. Listeners
//! registered on it receive decoded packets and connection events
//! ([`ConnectionSuccess`], [`Disconnect`], [`HeartbeatLost`],
//! [`HeartbeatRegained`]).

pub mod config;
pub mod error;
pub mod event;
pub mod heartbeat;
pub mod interface;

pub use config::{InterfaceConfig, DEFAULT_POLL_INTERVAL, MIN_VERSION};
pub use error::{DisconnectCause, IfaceError, Result};
pub use event::{ConnectionSuccess, Disconnect, HeartbeatLost, HeartbeatRegained};
pub use heartbeat::{
    HeartbeatConfig, HeartbeatManager, DEFAULT_HEARTBEAT_TIMEOUT, DEFAULT_SEND_INTERVAL,
};
pub use interface::{ArtemisNetworkInterface, ConnectionState};
