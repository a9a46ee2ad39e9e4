//! Bit-exact wire codec for the bancho binary packet protocol.
//!
//! A packet on the wire is `u16 id · u8 pad · u32 length · bytes payload`,
//! little-endian throughout. This crate owns framing ([`packet`]), the
//! primitive field encodings ([`fields`]), the packet id table ([`ids`]),
//! and one typed reader/builder per packet kind ([`client`], [`server`]).

pub mod client;
pub mod error;
pub mod fields;
pub mod ids;
pub mod match_data;
pub mod packet;
pub mod server;

pub use error::ProtoError;
pub use match_data::{MatchData, SlotData, SlotStatus, SlotTeam, MAX_SLOTS};
pub use packet::{frame, parse_header, try_split_packet, PacketHeader};

/// Hard ceiling on a single packet's declared payload length. Real clients
/// never send anything close to this; it exists to reject corrupt or
/// malicious length fields before they drive an allocation.
pub const MAX_PACKET_LENGTH: u32 = 16 * 1024 * 1024;
