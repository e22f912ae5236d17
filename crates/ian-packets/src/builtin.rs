//! Packets the connection itself depends on: the version handshake, the
//! welcome greeting, heartbeats and game start/over.

use crate::error::{PacketError, PayloadError};
use crate::packet::{ClientPacket, DecodePacket};
use crate::payload::PayloadReader;
use crate::protocol::ProtocolRegistry;
use crate::server_packet;
use crate::version::Version;
use crate::writer::PayloadWriter;

/// Packet type hashes shared by every protocol version.
pub mod packet_type {
    pub const CONNECTED: u32 = 0xe548_e74a;
    pub const PLAIN_TEXT_GREETING: u32 = 0x6d04_b3da;
    pub const HEARTBEAT: u32 = 0xf582_1226;
    pub const START_GAME: u32 = 0x3de6_6711;
    pub const SIMPLE_EVENT: u32 = 0xf754_c8fe;
    pub const OBJECT_BIT_STREAM: u32 = 0x8080_3df9;
}

/// `SIMPLE_EVENT` subtype announcing the end of a game.
pub const GAME_OVER_SUBTYPE: u8 = 0x06;

/// Sent by the server right after connecting, announcing its version.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionPacket {
    pub unknown: i32,
    /// The version as a single float, as sent by old servers.
    pub legacy_version: f32,
    pub version: Version,
}

impl DecodePacket for VersionPacket {
    const PACKET_TYPE: u32 = packet_type::CONNECTED;

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, PayloadError> {
        let unknown = reader.read_int()?;
        let legacy_version = reader.read_float()?;

        // Servers older than 2.1 send only the float.
        let version = if reader.remaining() >= 12 {
            Version::new(
                read_component(reader, "major")?,
                read_component(reader, "minor")?,
                read_component(reader, "patch")?,
            )
        } else {
            legacy(legacy_version)?
        };

        Ok(Self {
            unknown,
            legacy_version,
            version,
        })
    }
}
server_packet!(VersionPacket);

fn read_component(reader: &mut PayloadReader<'_>, field: &'static str) -> Result<u32, PayloadError> {
    let value = reader.read_int()?;
    u32::try_from(value).map_err(|_| PayloadError::InvalidValue {
        field,
        value: value.into(),
    })
}

fn legacy(value: f32) -> Result<Version, PayloadError> {
    if !value.is_finite() || value < 0.0 {
        return Err(PayloadError::InvalidValue {
            field: "legacy version",
            value: value as i64,
        });
    }
    let major = value.trunc();
    let minor = ((value - major) * 10.0).round();
    Ok(Version::new(major as u32, minor as u32, 0))
}

/// Plain text greeting sent after the version handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WelcomePacket {
    pub message: String,
}

impl DecodePacket for WelcomePacket {
    const PACKET_TYPE: u32 = packet_type::PLAIN_TEXT_GREETING;

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, PayloadError> {
        Ok(Self {
            message: reader.read_ascii_string()?,
        })
    }
}
server_packet!(WelcomePacket);

/// Keep-alive sent periodically by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatPacket;

impl DecodePacket for HeartbeatPacket {
    const PACKET_TYPE: u32 = packet_type::HEARTBEAT;

    fn decode(_reader: &mut PayloadReader<'_>) -> Result<Self, PayloadError> {
        Ok(Self)
    }
}
server_packet!(HeartbeatPacket);

/// Keep-alive sent periodically by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientHeartbeatPacket;

impl ClientPacket for ClientHeartbeatPacket {
    fn packet_type(&self) -> u32 {
        packet_type::HEARTBEAT
    }

    fn write_payload(&self, _writer: &mut PayloadWriter) -> Result<(), PacketError> {
        Ok(())
    }
}

/// A game has started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameStartPacket {
    pub difficulty: i32,
    pub game_type: i32,
}

impl DecodePacket for GameStartPacket {
    const PACKET_TYPE: u32 = packet_type::START_GAME;

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, PayloadError> {
        Ok(Self {
            difficulty: reader.read_int()?,
            game_type: reader.read_int()?,
        })
    }
}
server_packet!(GameStartPacket);

/// The current game has ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameOverPacket;

impl DecodePacket for GameOverPacket {
    const PACKET_TYPE: u32 = packet_type::SIMPLE_EVENT;
    const SUBTYPE: Option<u8> = Some(GAME_OVER_SUBTYPE);

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, PayloadError> {
        let subtype = reader.read_int()?;
        if subtype != i32::from(GAME_OVER_SUBTYPE) {
            return Err(PayloadError::InvalidValue {
                field: "simple event subtype",
                value: subtype.into(),
            });
        }
        Ok(Self)
    }
}
server_packet!(GameOverPacket);

impl ProtocolRegistry {
    /// The packets every connection needs. The version handshake is
    /// decoded whether or not anyone listens for it.
    pub fn core() -> Self {
        Self::new()
            .with_required::<VersionPacket>()
            .with::<WelcomePacket>()
            .with::<HeartbeatPacket>()
            .with::<GameStartPacket>()
            .with::<GameOverPacket>()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use bytes::{BufMut, Bytes, BytesMut};

    use super::*;
    use crate::protocol::Protocol;

    fn decode<P: DecodePacket>(payload: &[u8]) -> Result<P, PayloadError> {
        let mut rejected = HashSet::new();
        let mut reader = PayloadReader::new(
            Bytes::copy_from_slice(payload),
            Version::LATEST,
            &mut rejected,
        );
        P::decode(&mut reader)
    }

    #[test]
    fn version_packet() {
        let mut buf = BytesMut::new();
        buf.put_i32_le(0);
        buf.put_f32_le(2.7);
        buf.put_i32_le(2);
        buf.put_i32_le(7);
        buf.put_i32_le(1);

        let packet: VersionPacket = decode(&buf).unwrap();
        assert_eq!(packet.version, Version::new(2, 7, 1));
        assert_eq!(packet.legacy_version, 2.7);
    }

    #[test]
    fn version_packet_legacy_float_only() {
        let mut buf = BytesMut::new();
        buf.put_i32_le(0);
        buf.put_f32_le(1.7);

        let packet: VersionPacket = decode(&buf).unwrap();
        assert_eq!(packet.version, Version::new(1, 7, 0));
    }

    #[test]
    fn version_packet_rejects_negative_components() {
        let mut buf = BytesMut::new();
        buf.put_i32_le(0);
        buf.put_f32_le(2.7);
        buf.put_i32_le(2);
        buf.put_i32_le(-7);
        buf.put_i32_le(1);

        let err = decode::<VersionPacket>(&buf).unwrap_err();
        assert!(matches!(
            err,
            PayloadError::InvalidValue {
                field: "minor",
                value: -7
            }
        ));
    }

    #[test]
    fn welcome_and_game_packets() {
        let mut buf = BytesMut::new();
        buf.put_i32_le(7);
        buf.put_slice(b"Welcome");
        let welcome: WelcomePacket = decode(&buf).unwrap();
        assert_eq!(welcome.message, "Welcome");

        let mut buf = BytesMut::new();
        buf.put_i32_le(5);
        buf.put_i32_le(2);
        let start: GameStartPacket = decode(&buf).unwrap();
        assert_eq!(
            start,
            GameStartPacket {
                difficulty: 5,
                game_type: 2
            }
        );

        assert!(decode::<GameOverPacket>(&6i32.to_le_bytes()).is_ok());
        assert!(decode::<GameOverPacket>(&7i32.to_le_bytes()).is_err());
        assert!(decode::<HeartbeatPacket>(&[]).is_ok());
    }

    #[test]
    fn core_protocol_lookup() {
        let core = ProtocolRegistry::core();
        assert!(core
            .factory(packet_type::CONNECTED, 0)
            .unwrap()
            .is_required());
        assert!(core.factory(packet_type::SIMPLE_EVENT, GAME_OVER_SUBTYPE).is_some());
        assert!(core.factory(packet_type::SIMPLE_EVENT, 0x00).is_none());
        assert!(core.factory(packet_type::OBJECT_BIT_STREAM, 0x01).is_none());
        assert!(!core.factory(packet_type::HEARTBEAT, 0).unwrap().is_required());
    }
}
