use std::sync::Arc;

use ian_listener::ListenerFunction;

use crate::error::ParseFailure;
use crate::packet::ServerPacket;

/// Outcome of reading one packet.
///
/// A reader starts in `Processing` while it collects interested listeners,
/// then settles on exactly one of the terminal variants.
#[derive(Debug)]
pub enum ParseResult {
    /// Listeners found so far; not returned to callers.
    Processing { listeners: Vec<ListenerFunction> },
    /// The packet was consumed but nobody needs it decoded.
    Skip,
    /// The packet decoded successfully.
    Success {
        packet: Arc<dyn ServerPacket>,
        listeners: Vec<ListenerFunction>,
    },
    /// The payload did not decode.
    Fail(Box<ParseFailure>),
}

impl ParseResult {
    pub fn processing() -> Self {
        Self::Processing {
            listeners: Vec::new(),
        }
    }

    /// Append interested listeners while processing.
    pub fn add_listeners(&mut self, more: impl IntoIterator<Item = ListenerFunction>) {
        if let Self::Processing { listeners } = self {
            listeners.extend(more);
        }
    }

    /// Whether any listener has shown interest so far.
    pub fn is_interesting(&self) -> bool {
        match self {
            Self::Processing { listeners } | Self::Success { listeners, .. } => {
                !listeners.is_empty()
            }
            Self::Skip | Self::Fail(_) => false,
        }
    }

    /// Move to `Success`, keeping the collected listeners.
    pub fn into_success(self, packet: Arc<dyn ServerPacket>) -> Self {
        match self {
            Self::Processing { listeners } | Self::Success { listeners, .. } => {
                Self::Success { packet, listeners }
            }
            terminal => terminal,
        }
    }

    /// The decoded packet, on success.
    pub fn packet(&self) -> Option<&Arc<dyn ServerPacket>> {
        match self {
            Self::Success { packet, .. } => Some(packet),
            _ => None,
        }
    }

    pub fn listeners(&self) -> &[ListenerFunction] {
        match self {
            Self::Processing { listeners } | Self::Success { listeners, .. } => listeners,
            Self::Skip | Self::Fail(_) => &[],
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Invoke every collected listener with the packet. Returns how many ran.
    pub fn fire_listeners(&self) -> usize {
        match self {
            Self::Success { packet, listeners } => listeners
                .iter()
                .filter(|listener| listener.offer(packet.as_argument()))
                .count(),
            _ => 0,
        }
    }
}
