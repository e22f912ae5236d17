use std::fmt;

use ian_listener::ListenerArgument;

use crate::error::{PacketError, PayloadError};
use crate::payload::PayloadReader;
use crate::writer::PayloadWriter;

/// A packet received from the server.
///
/// Implement [`DecodePacket`] and invoke [`server_packet!`](crate::server_packet)
/// rather than implementing this by hand.
pub trait ServerPacket: ListenerArgument {
    /// The packet type hash from the preamble.
    fn packet_type(&self) -> u32;

    /// View as a listener argument for dispatch.
    fn as_argument(&self) -> &dyn ListenerArgument;
}

impl dyn ServerPacket {
    /// Downcast to a concrete packet type.
    pub fn downcast_ref<T: ServerPacket>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: ServerPacket>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// A server packet that can be decoded from a payload.
pub trait DecodePacket: ServerPacket + Sized {
    /// The packet type hash this packet is sent under.
    const PACKET_TYPE: u32;

    /// The first payload byte, when several packets share a type.
    const SUBTYPE: Option<u8> = None;

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, PayloadError>;
}

/// A packet sent from the client to the server.
pub trait ClientPacket: Send + Sync + fmt::Debug {
    fn packet_type(&self) -> u32;

    /// Write the payload. The writer is already started with
    /// [`packet_type`](Self::packet_type).
    fn write_payload(&self, writer: &mut PayloadWriter) -> Result<(), PacketError>;
}

/// Implement [`ServerPacket`] (and its listener argument plumbing) for a
/// type implementing [`DecodePacket`].
#[macro_export]
macro_rules! server_packet {
    ($ty:ty) => {
        $crate::__listener::listener_argument!($ty, $crate::__listener::ArgumentCategory::Packet);

        impl $crate::ServerPacket for $ty {
            fn packet_type(&self) -> u32 {
                <$ty as $crate::DecodePacket>::PACKET_TYPE
            }

            fn as_argument(&self) -> &dyn $crate::__listener::ListenerArgument {
                self
            }
        }
    };
}
