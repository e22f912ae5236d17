use ian_listener::{listener_argument, ArgumentCategory};

use crate::error::DisconnectCause;

/// The connection is up and its loops are running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSuccess {
    pub message: String,
}
listener_argument!(ConnectionSuccess, ArgumentCategory::ConnectionEvent);

/// The connection ended. Always the last event of a connection.
#[derive(Debug, Clone)]
pub struct Disconnect {
    pub cause: DisconnectCause,
}
listener_argument!(Disconnect, ArgumentCategory::ConnectionEvent);

/// The server stopped sending heartbeats during a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatLost;
listener_argument!(HeartbeatLost, ArgumentCategory::ConnectionEvent);

/// Server heartbeats resumed after being lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatRegained;
listener_argument!(HeartbeatRegained, ArgumentCategory::ConnectionEvent);
