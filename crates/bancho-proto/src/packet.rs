//! Packet header framing: `u16 id · u8 pad · u32 length · bytes payload`.

use crate::error::ProtoError;

const HEADER_LEN: usize = 7;

/// A decoded packet header plus the position of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub id: u16,
    pub length: u32,
}

/// Parse one packet header from the front of `buf`.
///
/// Returns the header and the number of bytes consumed. Does not touch the
/// payload; callers slice it themselves once enough bytes have buffered.
pub fn parse_header(buf: &[u8]) -> Result<Option<PacketHeader>, ProtoError> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }
    let id = u16::from_le_bytes([buf[0], buf[1]]);
    // buf[2] is the pad byte, always zero on the wire; we don't validate it
    // since real clients are occasionally sloppy here.
    let length = u32::from_le_bytes([buf[3], buf[4], buf[5], buf[6]]);
    Ok(Some(PacketHeader { id, length }))
}

/// Attempt to split one full packet (header + payload) off the front of
/// `buf`. Returns `None` if the buffer doesn't yet contain a full packet.
pub fn try_split_packet(buf: &[u8]) -> Result<Option<(PacketHeader, &[u8], usize)>, ProtoError> {
    let Some(header) = parse_header(buf)? else {
        return Ok(None);
    };
    let total = HEADER_LEN + header.length as usize;
    if header.length > crate::MAX_PACKET_LENGTH {
        return Err(ProtoError::MalformedPacket {
            packet_id: header.id,
            reason: format!("declared length {} exceeds max packet size", header.length),
        });
    }
    if buf.len() < total {
        return Ok(None);
    }
    let payload = &buf[HEADER_LEN..total];
    Ok(Some((header, payload, total)))
}

/// Frame a payload into a full wire packet: header + bytes.
pub fn frame(id: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&id.to_le_bytes());
    out.push(0); // pad
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_and_split_round_trip() {
        let framed = frame(5, &[1, 2, 3, 4]);
        let (header, payload, consumed) = try_split_packet(&framed).unwrap().unwrap();
        assert_eq!(header.id, 5);
        assert_eq!(header.length, 4);
        assert_eq!(payload, &[1, 2, 3, 4]);
        assert_eq!(consumed, framed.len());
    }

    #[test]
    fn partial_header_is_none() {
        assert!(try_split_packet(&[1, 2]).unwrap().is_none());
    }

    #[test]
    fn partial_payload_is_none() {
        let framed = frame(5, &[1, 2, 3, 4]);
        assert!(try_split_packet(&framed[..framed.len() - 1]).unwrap().is_none());
    }

    #[test]
    fn oversized_length_is_malformed() {
        let mut buf = vec![0u8; 7];
        buf[3..7].copy_from_slice(&(crate::MAX_PACKET_LENGTH + 1).to_le_bytes());
        assert!(try_split_packet(&buf).is_err());
    }
}
