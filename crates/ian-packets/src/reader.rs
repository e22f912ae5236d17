use std::collections::HashSet;
use std::sync::Arc;

use bytes::BytesMut;
use ian_listener::{ArgumentCategory, ListenerRegistry};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use crate::builtin::VersionPacket;
use crate::codec::{decode_packet, PacketConfig, RawPacket};
use crate::error::{PacketError, ParseFailure, Result};
use crate::parse::ParseResult;
use crate::payload::PayloadReader;
use crate::protocol::Protocol;
use crate::version::Version;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads and decodes packets from any `AsyncRead` stream.
///
/// Handles partial reads internally. Packets nobody listens for are
/// consumed without being decoded, unless their factory is required.
pub struct PacketReader<R> {
    inner: R,
    buf: BytesMut,
    config: PacketConfig,
    protocol: Arc<dyn Protocol>,
    listeners: ListenerRegistry,
    version: Version,
    rejected: HashSet<i32>,
}

impl<R: AsyncRead + Unpin> PacketReader<R> {
    /// Create a new packet reader with default configuration.
    pub fn new(inner: R, protocol: Arc<dyn Protocol>, listeners: ListenerRegistry) -> Self {
        Self::with_config(inner, protocol, listeners, PacketConfig::default())
    }

    /// Create a new packet reader with explicit configuration.
    pub fn with_config(
        inner: R,
        protocol: Arc<dyn Protocol>,
        listeners: ListenerRegistry,
        config: PacketConfig,
    ) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            protocol,
            listeners,
            version: Version::LATEST,
            rejected: HashSet::new(),
        }
    }

    /// Read the next packet and decide what to do with it.
    ///
    /// Framing problems, I/O errors and end of stream are returned as `Err`.
    /// Payload decode errors come back as [`ParseResult::Fail`], since the
    /// stream is still positioned on a packet boundary.
    ///
    /// Cancel safe: bytes already read stay buffered for the next call.
    pub async fn read_packet(&mut self) -> Result<ParseResult> {
        let raw = self.read_raw().await?;
        Ok(self.parse(raw))
    }

    /// Read the next framed packet without decoding its payload.
    ///
    /// Returns `Err(PacketError::ConnectionClosed)` when EOF is reached.
    pub async fn read_raw(&mut self) -> Result<RawPacket> {
        loop {
            if let Some(packet) = decode_packet(&mut self.buf, &self.config)? {
                return Ok(packet);
            }

            self.buf.reserve(READ_CHUNK_SIZE);
            let read = self.inner.read_buf(&mut self.buf).await?;
            if read == 0 {
                return Err(PacketError::ConnectionClosed);
            }
        }
    }

    /// Decode a framed packet if anyone needs it.
    pub fn parse(&mut self, raw: RawPacket) -> ParseResult {
        let subtype = raw.subtype();
        let Some(factory) = self.protocol.factory(raw.packet_type, subtype) else {
            debug!(
                packet_type = format_args!("0x{:08x}", raw.packet_type),
                subtype,
                len = raw.payload.len(),
                "no factory for packet, skipping"
            );
            return ParseResult::Skip;
        };

        let mut result = ParseResult::processing();
        result.add_listeners(
            self.listeners
                .listening_for(factory.type_id(), ArgumentCategory::Packet),
        );
        if !result.is_interesting() && !factory.is_required() {
            trace!(packet = factory.name(), "no listeners, skipping");
            return ParseResult::Skip;
        }

        let mut payload = PayloadReader::new(raw.payload.clone(), self.version, &mut self.rejected);
        let packet = match factory.decode(&mut payload) {
            Ok(packet) => packet,
            Err(source) => {
                return ParseResult::Fail(Box::new(ParseFailure {
                    packet_type: raw.packet_type,
                    subtype,
                    payload: raw.payload,
                    source,
                }));
            }
        };
        if !payload.is_empty() {
            trace!(
                packet = factory.name(),
                remaining = payload.remaining(),
                "payload bytes left after decode"
            );
        }

        if let Some(handshake) = packet.downcast_ref::<VersionPacket>() {
            debug!(version = %handshake.version, "server version received");
            self.version = handshake.version;
        }

        result.into_success(packet)
    }

    /// Protocol version used to decode payloads.
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// Stop ignoring updates for object `id`. Returns whether it was rejected.
    pub fn accept_object(&mut self, id: i32) -> bool {
        self.rejected.remove(&id)
    }

    /// IDs of objects whose updates are ignored.
    pub fn rejected_objects(&self) -> &HashSet<i32> {
        &self.rejected
    }

    pub fn clear_rejected_objects(&mut self) {
        self.rejected.clear();
    }

    /// Registry consulted for interested listeners.
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn protocol(&self) -> &Arc<dyn Protocol> {
        &self.protocol
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Current packet reader configuration.
    pub fn config(&self) -> &PacketConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::BufMut;
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::builtin::{packet_type, GameStartPacket, HeartbeatPacket, WelcomePacket};
    use crate::codec::{encode_packet, Origin, PREAMBLE_SIZE};
    use crate::error::PayloadError;
    use crate::protocol::ProtocolRegistry;

    fn server_packet(packet_type: u32, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_packet(Origin::Server, packet_type, payload, &mut buf).unwrap();
        buf.to_vec()
    }

    fn version_payload(major: i32, minor: i32, patch: i32) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_i32_le(0);
        buf.put_f32_le(2.0);
        buf.put_i32_le(major);
        buf.put_i32_le(minor);
        buf.put_i32_le(patch);
        buf.to_vec()
    }

    fn ascii(text: &str) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_i32_le(text.len() as i32);
        buf.put_slice(text.as_bytes());
        buf.to_vec()
    }

    fn reader<R: AsyncRead + Unpin>(input: R, listeners: &ListenerRegistry) -> PacketReader<R> {
        PacketReader::new(input, Arc::new(ProtocolRegistry::core()), listeners.clone())
    }

    #[tokio::test]
    async fn uninteresting_packets_are_skipped() {
        let wire = server_packet(packet_type::PLAIN_TEXT_GREETING, &ascii("hi"));
        let listeners = ListenerRegistry::new();
        let mut reader = reader(wire.as_slice(), &listeners);

        assert!(matches!(reader.read_packet().await.unwrap(), ParseResult::Skip));
        assert!(matches!(
            reader.read_packet().await,
            Err(PacketError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn unknown_types_consume_their_length_and_skip() {
        let mut wire = server_packet(0x0bad_0bad, &[1, 2, 3, 4, 5]);
        wire.extend(server_packet(packet_type::HEARTBEAT, &[]));

        let listeners = ListenerRegistry::new();
        listeners.on(|_: &HeartbeatPacket| {});
        let mut reader = reader(wire.as_slice(), &listeners);

        assert!(matches!(reader.read_packet().await.unwrap(), ParseResult::Skip));
        let result = reader.read_packet().await.unwrap();
        assert!(result.packet().unwrap().is::<HeartbeatPacket>());
    }

    #[tokio::test]
    async fn interesting_packets_decode_with_their_listeners() {
        let wire = server_packet(packet_type::PLAIN_TEXT_GREETING, &ascii("Welcome aboard"));
        let listeners = ListenerRegistry::new();
        let seen = Arc::new(std::sync::Mutex::new(String::new()));
        let sink = Arc::clone(&seen);
        listeners.on(move |welcome: &WelcomePacket| {
            sink.lock().unwrap().push_str(&welcome.message);
        });
        let mut reader = reader(wire.as_slice(), &listeners);

        let result = reader.read_packet().await.unwrap();
        assert_eq!(result.listeners().len(), 1);
        assert_eq!(result.fire_listeners(), 1);
        assert_eq!(*seen.lock().unwrap(), "Welcome aboard");
    }

    #[tokio::test]
    async fn category_listeners_make_every_packet_interesting() {
        let wire = server_packet(packet_type::HEARTBEAT, &[]);
        let listeners = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        listeners.on_category(ArgumentCategory::Packet, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut reader = reader(wire.as_slice(), &listeners);

        let result = reader.read_packet().await.unwrap();
        result.fire_listeners();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn required_packets_decode_without_listeners_and_update_version() {
        let wire = server_packet(packet_type::CONNECTED, &version_payload(2, 4, 0));
        let listeners = ListenerRegistry::new();
        let mut reader = reader(wire.as_slice(), &listeners);
        assert_eq!(reader.version(), Version::LATEST);

        let result = reader.read_packet().await.unwrap();
        let handshake = result.packet().unwrap().downcast_ref::<VersionPacket>().unwrap();
        assert_eq!(handshake.version, Version::new(2, 4, 0));
        assert!(result.listeners().is_empty());
        assert_eq!(reader.version(), Version::new(2, 4, 0));
    }

    #[tokio::test]
    async fn decode_errors_are_failures_not_errors() {
        let mut wire = server_packet(packet_type::START_GAME, &[1, 0, 0, 0]);
        wire.extend(server_packet(packet_type::START_GAME, &[1, 0, 0, 0, 2, 0, 0, 0]));

        let listeners = ListenerRegistry::new();
        listeners.on(|_: &GameStartPacket| {});
        let mut reader = reader(wire.as_slice(), &listeners);

        let ParseResult::Fail(failure) = reader.read_packet().await.unwrap() else {
            panic!("expected a parse failure");
        };
        assert_eq!(failure.packet_type, packet_type::START_GAME);
        assert_eq!(failure.subtype, 1);
        assert_eq!(failure.payload.as_ref(), &[1, 0, 0, 0]);
        assert!(matches!(failure.source, PayloadError::UnexpectedEnd { .. }));

        let next = reader.read_packet().await.unwrap();
        let start = next.packet().unwrap().downcast_ref::<GameStartPacket>().unwrap();
        assert_eq!(start.game_type, 2);
    }

    #[tokio::test]
    async fn framing_errors_are_errors() {
        let mut wire = server_packet(packet_type::HEARTBEAT, &[]);
        wire[12] = 9;
        let listeners = ListenerRegistry::new();
        let mut reader = reader(wire.as_slice(), &listeners);
        assert!(matches!(
            reader.read_packet().await,
            Err(PacketError::NonEmptyPadding(9))
        ));
    }

    #[tokio::test]
    async fn client_packets_are_rejected() {
        let mut buf = BytesMut::new();
        encode_packet(Origin::Client, packet_type::HEARTBEAT, &[], &mut buf).unwrap();
        let listeners = ListenerRegistry::new();
        let mut reader = reader(&buf[..], &listeners);
        assert!(matches!(
            reader.read_packet().await,
            Err(PacketError::OriginMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn partial_reads_reassemble() {
        let wire = server_packet(packet_type::PLAIN_TEXT_GREETING, &ascii("slow"));
        let (client, mut server) = tokio::io::duplex(64);

        let listeners = ListenerRegistry::new();
        listeners.on(|_: &WelcomePacket| {});
        let mut reader = reader(client, &listeners);

        let writer = tokio::spawn(async move {
            for chunk in wire.chunks(5) {
                server.write_all(chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        let result = reader.read_packet().await.unwrap();
        let welcome = result.packet().unwrap().downcast_ref::<WelcomePacket>().unwrap();
        assert_eq!(welcome.message, "slow");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn bad_header_fails_before_payload_arrives() {
        let (client, mut server) = tokio::io::duplex(64);
        let listeners = ListenerRegistry::new();
        let mut reader = reader(client, &listeners);

        server.write_all(&0x1234_5678u32.to_le_bytes()).await.unwrap();
        assert!(matches!(
            reader.read_packet().await,
            Err(PacketError::IllegalHeader(0x1234_5678))
        ));
    }

    #[tokio::test]
    async fn concrete_28_byte_packet() {
        let mut wire = BytesMut::new();
        for field in [0xDEAD_BEEFu32 as i32, 28, 1, 0, 8] {
            wire.put_i32_le(field);
        }
        wire.put_u32_le(packet_type::START_GAME);
        wire.put_slice(&[0, 0, 0, 0]);
        assert_eq!(wire.len(), PREAMBLE_SIZE + 4);

        let listeners = ListenerRegistry::new();
        let mut reader = reader(&wire[..], &listeners);
        let raw = reader.read_raw().await.unwrap();
        assert_eq!(raw.packet_type, packet_type::START_GAME);
        assert_eq!(raw.payload.len(), 4);
        assert_eq!(raw.subtype(), 0);
    }

    #[tokio::test]
    async fn rejected_objects_are_tracked() {
        let listeners = ListenerRegistry::new();
        let mut reader = reader(&b""[..], &listeners);
        reader.rejected.insert(4);
        assert!(reader.rejected_objects().contains(&4));
        assert!(reader.accept_object(4));
        assert!(!reader.accept_object(4));
        reader.rejected.insert(5);
        reader.clear_rejected_objects();
        assert!(reader.rejected_objects().is_empty());
    }
}
