use std::collections::HashSet;

use bytes::{Buf, Bytes};

use crate::bitfield::BitField;
use crate::error::PayloadError;
use crate::version::Version;

type Result<T> = std::result::Result<T, PayloadError>;

/// A logical bit in an object's bit field.
///
/// Newer protocol versions insert fields into existing layouts, so the
/// physical index of a logical field can depend on the version. `None`
/// means the field does not exist in that version.
pub trait Bit {
    fn index(&self, version: Version) -> Option<usize>;
}

impl Bit for usize {
    fn index(&self, _version: Version) -> Option<usize> {
        Some(*self)
    }
}

/// Three-valued boolean for optional flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BoolState {
    #[default]
    Unknown,
    True,
    False,
}

impl BoolState {
    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }

    pub fn to_option(self) -> Option<bool> {
        match self {
            Self::Unknown => None,
            Self::True => Some(true),
            Self::False => Some(false),
        }
    }
}

impl From<bool> for BoolState {
    fn from(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }
}

/// Raw bytes of an undocumented field, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProperty {
    pub name: &'static str,
    pub bytes: Bytes,
}

/// Cursor over a single packet payload.
///
/// Created by [`PacketReader`](crate::PacketReader) for each decode. Holds
/// the per-object state (object ID, bit field, unknown properties) reset by
/// [`start_object`](Self::start_object), and a view of the reader's
/// rejected object IDs.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    buf: Bytes,
    version: Version,
    rejected: &'a mut HashSet<i32>,
    object_id: Option<i32>,
    bit_field: Option<BitField>,
    unknown: Vec<UnknownProperty>,
}

impl<'a> PayloadReader<'a> {
    pub fn new(payload: Bytes, version: Version, rejected: &'a mut HashSet<i32>) -> Self {
        Self {
            buf: payload,
            version,
            rejected,
            object_id: None,
            bit_field: None,
            unknown: Vec::new(),
        }
    }

    /// Protocol version used to resolve bits.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Whether the payload has been fully consumed.
    pub fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }

    fn need(&self, needed: usize) -> Result<()> {
        if self.buf.remaining() < needed {
            return Err(PayloadError::UnexpectedEnd {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    /// The next byte, without consuming it.
    pub fn peek_byte(&self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf[0])
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.need(n)?;
        self.buf.advance(n);
        Ok(())
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_short(&mut self) -> Result<i16> {
        self.need(2)?;
        Ok(self.buf.get_i16_le())
    }

    pub fn read_int(&mut self) -> Result<i32> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    pub fn read_float(&mut self) -> Result<f32> {
        self.need(4)?;
        Ok(self.buf.get_f32_le())
    }

    /// A boolean stored in `byte_count` bytes; true iff any byte is nonzero.
    pub fn read_bool(&mut self, byte_count: usize) -> Result<bool> {
        let bytes = self.read_bytes(byte_count)?;
        Ok(bytes.iter().any(|&b| b != 0))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Bytes> {
        self.need(n)?;
        Ok(self.buf.split_to(n))
    }

    /// A UTF-16LE string prefixed by its length in code units, including
    /// the NUL terminator. Content after the first NUL is dropped.
    pub fn read_string(&mut self) -> Result<String> {
        let count = self.read_length()?;
        let bytes = self.read_bytes(count.saturating_mul(2))?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .take_while(|&unit| unit != 0)
            .collect();
        Ok(String::from_utf16(&units)?)
    }

    /// An ASCII string prefixed by its length in bytes. Content after the
    /// first NUL is dropped.
    pub fn read_ascii_string(&mut self) -> Result<String> {
        let count = self.read_length()?;
        let bytes = self.read_bytes(count)?;
        let mut text = String::with_capacity(count);
        for &b in bytes.iter().take_while(|&&b| b != 0) {
            if !b.is_ascii() {
                return Err(PayloadError::NonAscii(b));
            }
            text.push(b as char);
        }
        Ok(text)
    }

    fn read_length(&mut self) -> Result<usize> {
        let count = self.read_int()?;
        usize::try_from(count).map_err(|_| PayloadError::InvalidStringLength(count))
    }

    /// Read the object ID and, when `bit_count > 0`, the object's bit
    /// field. Resets all per-object state.
    pub fn start_object(&mut self, bit_count: usize) -> Result<i32> {
        self.object_id = None;
        self.bit_field = None;
        self.unknown.clear();

        let id = self.read_int()?;
        self.object_id = Some(id);
        if bit_count > 0 {
            let bytes = self.read_bytes(BitField::byte_count_for(bit_count))?;
            self.bit_field = Some(BitField::from_bytes(bit_count, &bytes)?);
        }
        Ok(id)
    }

    /// ID of the object started by the last `start_object`.
    pub fn object_id(&self) -> Option<i32> {
        self.object_id
    }

    pub fn bit_field(&self) -> Option<&BitField> {
        self.bit_field.as_ref()
    }

    /// Whether `bit` is present in this version and set in the active field.
    pub fn has(&self, bit: &impl Bit) -> Result<bool> {
        let field = self.bit_field.as_ref().ok_or(PayloadError::NoBitField)?;
        Ok(bit.index(self.version).is_some_and(|index| field.get(index)))
    }

    pub fn read_byte_if(&mut self, bit: &impl Bit, default: u8) -> Result<u8> {
        if self.has(bit)? {
            self.read_byte()
        } else {
            Ok(default)
        }
    }

    pub fn read_short_if(&mut self, bit: &impl Bit, default: i16) -> Result<i16> {
        if self.has(bit)? {
            self.read_short()
        } else {
            Ok(default)
        }
    }

    /// Returns -1 when the bit is unset.
    pub fn read_int_if(&mut self, bit: &impl Bit) -> Result<i32> {
        if self.has(bit)? {
            self.read_int()
        } else {
            Ok(-1)
        }
    }

    /// Returns NaN when the bit is unset.
    pub fn read_float_if(&mut self, bit: &impl Bit) -> Result<f32> {
        if self.has(bit)? {
            self.read_float()
        } else {
            Ok(f32::NAN)
        }
    }

    pub fn read_bool_if(&mut self, bit: &impl Bit, byte_count: usize) -> Result<BoolState> {
        if self.has(bit)? {
            self.read_bool(byte_count).map(BoolState::from)
        } else {
            Ok(BoolState::Unknown)
        }
    }

    pub fn read_string_if(&mut self, bit: &impl Bit) -> Result<Option<String>> {
        if self.has(bit)? {
            self.read_string().map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn read_ascii_string_if(&mut self, bit: &impl Bit) -> Result<Option<String>> {
        if self.has(bit)? {
            self.read_ascii_string().map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn read_bytes_if(&mut self, bit: &impl Bit, n: usize) -> Result<Option<Bytes>> {
        if self.has(bit)? {
            self.read_bytes(n).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Capture `n` bytes of an undocumented field under `name`.
    pub fn read_unknown_if(&mut self, bit: &impl Bit, name: &'static str, n: usize) -> Result<()> {
        if let Some(bytes) = self.read_bytes_if(bit, n)? {
            self.unknown.push(UnknownProperty { name, bytes });
        }
        Ok(())
    }

    /// Undocumented fields captured for the current object.
    pub fn unknown_properties(&self) -> &[UnknownProperty] {
        &self.unknown
    }

    /// Take the captured unknown fields, leaving the list empty.
    pub fn take_unknown_properties(&mut self) -> Vec<UnknownProperty> {
        std::mem::take(&mut self.unknown)
    }

    /// Whether updates for the current object should be kept.
    pub fn is_accepting_current_object(&self) -> bool {
        self.object_id.is_none_or(|id| !self.rejected.contains(&id))
    }

    /// Ignore the current object in this and later packets.
    pub fn reject_current_object(&mut self) {
        if let Some(id) = self.object_id {
            self.rejected.insert(id);
        }
    }
}
