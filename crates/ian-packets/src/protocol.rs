use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::PayloadError;
use crate::packet::{DecodePacket, ServerPacket};
use crate::payload::PayloadReader;

type DecodeFn = fn(&mut PayloadReader<'_>) -> Result<Arc<dyn ServerPacket>, PayloadError>;

/// Knows how to decode one server packet type.
#[derive(Clone)]
pub struct PacketFactory {
    packet_type: u32,
    subtype: Option<u8>,
    type_id: TypeId,
    name: &'static str,
    required: bool,
    decode: DecodeFn,
}

impl PacketFactory {
    /// A factory decoding `P`.
    pub fn of<P: DecodePacket>() -> Self {
        Self {
            packet_type: P::PACKET_TYPE,
            subtype: P::SUBTYPE,
            type_id: TypeId::of::<P>(),
            name: type_name::<P>(),
            required: false,
            decode: decode_as::<P>,
        }
    }

    /// Mark the packet as decoded even when no listener wants it.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn packet_type(&self) -> u32 {
        self.packet_type
    }

    pub fn subtype(&self) -> Option<u8> {
        self.subtype
    }

    /// `TypeId` of the decoded packet, for listener lookup.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn decode(
        &self,
        reader: &mut PayloadReader<'_>,
    ) -> Result<Arc<dyn ServerPacket>, PayloadError> {
        (self.decode)(reader)
    }
}

fn decode_as<P: DecodePacket>(
    reader: &mut PayloadReader<'_>,
) -> Result<Arc<dyn ServerPacket>, PayloadError> {
    Ok(Arc::new(P::decode(reader)?))
}

impl fmt::Debug for PacketFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketFactory")
            .field("packet_type", &format_args!("0x{:08x}", self.packet_type))
            .field("subtype", &self.subtype)
            .field("name", &self.name)
            .field("required", &self.required)
            .finish()
    }
}

/// Maps packet types and subtypes to factories.
pub trait Protocol: Send + Sync {
    fn factory(&self, packet_type: u32, subtype: u8) -> Option<&PacketFactory>;
}

/// A [`Protocol`] assembled from individual factories.
///
/// A factory registered for an exact subtype wins over one registered for
/// the whole packet type.
#[derive(Debug, Clone, Default)]
pub struct ProtocolRegistry {
    factories: HashMap<u32, Vec<PacketFactory>>,
}

impl ProtocolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a factory, replacing any with the same type and subtype.
    pub fn register(&mut self, factory: PacketFactory) -> &mut Self {
        let entries = self.factories.entry(factory.packet_type).or_default();
        entries.retain(|existing| existing.subtype != factory.subtype);
        entries.push(factory);
        self
    }

    /// Builder form of [`register`](Self::register) for `P`.
    pub fn with<P: DecodePacket>(mut self) -> Self {
        self.register(PacketFactory::of::<P>());
        self
    }

    /// Like [`with`](Self::with), marking `P` as required.
    pub fn with_required<P: DecodePacket>(mut self) -> Self {
        self.register(PacketFactory::of::<P>().required());
        self
    }

    /// Append every factory of `other`.
    pub fn merge(mut self, other: ProtocolRegistry) -> Self {
        for factory in other.factories.into_values().flatten() {
            self.register(factory);
        }
        self
    }

    pub fn factories(&self) -> impl Iterator<Item = &PacketFactory> {
        self.factories.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.factories.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Protocol for ProtocolRegistry {
    fn factory(&self, packet_type: u32, subtype: u8) -> Option<&PacketFactory> {
        let entries = self.factories.get(&packet_type)?;
        entries
            .iter()
            .find(|factory| factory.subtype == Some(subtype))
            .or_else(|| entries.iter().find(|factory| factory.subtype.is_none()))
    }
}
