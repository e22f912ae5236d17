use std::io::ErrorKind;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::bitfield::BitField;
use crate::codec::{encode_packet, PacketConfig};
use crate::error::{PacketError, Result};
use crate::packet::ClientPacket;

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Buffers one outgoing payload between `start` and `finish`.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    packet_type: Option<u32>,
    buf: BytesMut,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a packet of `packet_type`.
    pub fn start(&mut self, packet_type: u32) -> Result<&mut Self> {
        if let Some(current) = self.packet_type {
            return Err(PacketError::AlreadyStarted(current));
        }
        self.packet_type = Some(packet_type);
        self.buf.clear();
        Ok(self)
    }

    pub fn is_started(&self) -> bool {
        self.packet_type.is_some()
    }

    /// Bytes written since `start`.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Discard the packet in progress.
    pub fn reset(&mut self) {
        self.packet_type = None;
        self.buf.clear();
    }

    /// Take the packet type and payload, returning to the not-started state.
    pub fn finish(&mut self) -> Result<(u32, Bytes)> {
        let packet_type = self.packet_type.take().ok_or(PacketError::NotStarted)?;
        Ok((packet_type, self.buf.split().freeze()))
    }

    fn started(&mut self) -> Result<&mut BytesMut> {
        if self.packet_type.is_none() {
            return Err(PacketError::NotStarted);
        }
        Ok(&mut self.buf)
    }

    pub fn write_byte(&mut self, value: u8) -> Result<&mut Self> {
        self.started()?.put_u8(value);
        Ok(self)
    }

    pub fn write_short(&mut self, value: i16) -> Result<&mut Self> {
        self.started()?.put_i16_le(value);
        Ok(self)
    }

    pub fn write_int(&mut self, value: i32) -> Result<&mut Self> {
        self.started()?.put_i32_le(value);
        Ok(self)
    }

    pub fn write_float(&mut self, value: f32) -> Result<&mut Self> {
        self.started()?.put_f32_le(value);
        Ok(self)
    }

    /// A boolean stored in `byte_count` bytes, the first holding 0 or 1.
    pub fn write_bool(&mut self, value: bool, byte_count: usize) -> Result<&mut Self> {
        let buf = self.started()?;
        if byte_count > 0 {
            buf.put_u8(u8::from(value));
            buf.put_bytes(0, byte_count - 1);
        }
        Ok(self)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self> {
        self.started()?.put_slice(bytes);
        Ok(self)
    }

    /// A UTF-16LE string with a NUL terminator, prefixed by its length in
    /// code units including the terminator.
    pub fn write_string(&mut self, value: &str) -> Result<&mut Self> {
        let units: Vec<u16> = value.encode_utf16().chain(std::iter::once(0)).collect();
        let count = length_prefix(units.len())?;
        let buf = self.started()?;
        buf.put_i32_le(count);
        for unit in units {
            buf.put_u16_le(unit);
        }
        Ok(self)
    }

    /// An ASCII string prefixed by its length in bytes.
    pub fn write_ascii_string(&mut self, value: &str) -> Result<&mut Self> {
        if !value.is_ascii() {
            return Err(PacketError::InvalidString(value.to_string()));
        }
        let count = length_prefix(value.len())?;
        let buf = self.started()?;
        buf.put_i32_le(count);
        buf.put_slice(value.as_bytes());
        Ok(self)
    }

    pub fn write_bit_field(&mut self, bits: &BitField) -> Result<&mut Self> {
        self.write_bytes(bits.as_bytes())
    }

    /// Write an object header: its ID followed by its bit field.
    pub fn start_object(&mut self, id: i32, bits: &BitField) -> Result<&mut Self> {
        self.write_int(id)?.write_bit_field(bits)
    }
}

fn length_prefix(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| PacketError::InvalidString(format!("{len} units is too long")))
}

/// Writes framed packets to any `AsyncWrite` stream.
///
/// Packets are built in two phases: [`start`](Self::start) a packet type,
/// fill the [`payload`](Self::payload), then [`flush`](Self::flush) the
/// preamble and payload to the stream in one write.
pub struct PacketWriter<W> {
    inner: W,
    payload: PayloadWriter,
    frame: BytesMut,
    config: PacketConfig,
}

impl<W: AsyncWrite + Unpin> PacketWriter<W> {
    /// Create a new packet writer with default configuration.
    pub fn new(inner: W) -> Self {
        Self::with_config(inner, PacketConfig::default())
    }

    /// Create a new packet writer with explicit configuration.
    pub fn with_config(inner: W, config: PacketConfig) -> Self {
        Self {
            inner,
            payload: PayloadWriter::new(),
            frame: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Begin buffering a packet of `packet_type`.
    pub fn start(&mut self, packet_type: u32) -> Result<&mut PayloadWriter> {
        self.payload.start(packet_type)
    }

    /// The payload buffer of the packet in progress.
    pub fn payload(&mut self) -> &mut PayloadWriter {
        &mut self.payload
    }

    /// Frame the buffered packet and write it out.
    pub async fn flush(&mut self) -> Result<()> {
        let (packet_type, payload) = self.payload.finish()?;
        if payload.len() > self.config.max_payload_size {
            return Err(PacketError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        self.frame.clear();
        encode_packet(self.config.local_origin, packet_type, &payload, &mut self.frame)?;

        self.inner
            .write_all(&self.frame)
            .await
            .map_err(map_write_error)?;
        self.inner.flush().await.map_err(map_write_error)?;
        trace!(
            packet_type = format_args!("0x{packet_type:08x}"),
            len = payload.len(),
            "packet written"
        );
        Ok(())
    }

    /// Start, fill and flush a complete packet.
    pub async fn write_packet(&mut self, packet: &dyn ClientPacket) -> Result<()> {
        self.payload.start(packet.packet_type())?;
        if let Err(err) = packet.write_payload(&mut self.payload) {
            self.payload.reset();
            return Err(err);
        }
        self.flush().await
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Current packet writer configuration.
    pub fn config(&self) -> &PacketConfig {
        &self.config
    }
}

fn map_write_error(err: std::io::Error) -> PacketError {
    match err.kind() {
        ErrorKind::WriteZero | ErrorKind::BrokenPipe | ErrorKind::ConnectionReset => {
            PacketError::ConnectionClosed
        }
        _ => PacketError::Io(err),
    }
}
