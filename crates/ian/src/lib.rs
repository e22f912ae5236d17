//! Client protocol engine for the Artemis spaceship bridge simulator.
//!
//! IAN frames and parses the game's binary TCP protocol, dispatches decoded
//! packets to typed listeners and drives a client connection with its read,
//! write, heartbeat and dispatch loops.
//!
//! # Crate Structure
//!
//! - [`transport`]: address parsing and TCP connect with a bounded timeout
//! - [`listener`]: typed listener functions and the copy-on-write registry
//! - [`packets`]: preamble codec, payload readers and writers, core packets
//! - [`iface`]: the connection driver and its events
//!
//! ```no_run
//! use ian::iface::{ArtemisNetworkInterface, Disconnect, InterfaceConfig};
//! use ian::packets::builtin::WelcomePacket;
//!
//! # async fn run() -> ian::iface::Result<()> {
//! let iface = ArtemisNetworkInterface::connect("127.0.0.1", 2010, InterfaceConfig::default()).await?;
//! iface.on(|welcome: &WelcomePacket| println!("{}", welcome.message));
//! iface.on(|event: &Disconnect| println!("disconnected: {}", event.cause));
//! iface.start()?;
//! # Ok(())
//! # }
//! ```

/// Re-export transport types.
pub mod transport {
    pub use ian_transport::*;
}

/// Re-export listener types.
pub mod listener {
    pub use ian_listener::*;
}

/// Re-export packet types.
pub mod packets {
    pub use ian_packets::*;
}

/// Re-export connection driver types.
pub mod iface {
    pub use ian_iface::*;
}
