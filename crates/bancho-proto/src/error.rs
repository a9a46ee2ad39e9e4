//! Wire-level errors for the bancho packet codec.

use thiserror::Error;

/// Errors raised while decoding or encoding a packet.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtoError {
    #[error("malformed packet {packet_id}: {reason}")]
    MalformedPacket { packet_id: u16, reason: String },

    #[error("short read decoding packet {packet_id}: needed {needed} bytes, had {available}")]
    ShortRead {
        packet_id: u16,
        needed: usize,
        available: usize,
    },

    #[error("unknown packet id {0}")]
    UnknownPacketId(u16),
}
