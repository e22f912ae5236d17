//! Binary packet framing, decoding and encoding for the Artemis protocol.
//!
//! Every packet on the wire starts with a 24-byte little-endian preamble:
//! - the magic header `0xDEADBEEF`
//! - the total packet length
//! - the origin (1 = server, 2 = client)
//! - four bytes of zero padding
//! - the remaining byte count, `(length - 24) + 4`
//! - the packet type hash
//!
//! followed by a type-specific payload. Optional payload fields are gated
//! by a [`BitField`] whose layout depends on the negotiated [`Version`].

pub mod bitfield;
pub mod builtin;
pub mod codec;
pub mod error;
pub mod packet;
pub mod parse;
pub mod payload;
pub mod protocol;
pub mod reader;
pub mod version;
pub mod writer;

pub use bitfield::BitField;
pub use codec::{
    decode_packet, encode_packet, Origin, PacketConfig, RawPacket, DEFAULT_MAX_PAYLOAD, HEADER,
    PREAMBLE_SIZE,
};
pub use error::{PacketError, ParseFailure, PayloadError, Result};
pub use packet::{ClientPacket, DecodePacket, ServerPacket};
pub use parse::ParseResult;
pub use payload::{Bit, BoolState, PayloadReader, UnknownProperty};
pub use protocol::{PacketFactory, Protocol, ProtocolRegistry};
pub use reader::PacketReader;
pub use version::{ParseVersionError, Version};
pub use writer::{PacketWriter, PayloadWriter};

#[doc(hidden)]
pub use ian_listener as __listener;
