//! Typed decoders for client → server packets.

use crate::error::ProtoError;
use crate::fields::Reader;
use crate::ids::client as id;
use crate::match_data::MatchData;

/// A decoded inbound packet. Unknown ids never reach this type; the
/// dispatcher logs and discards them before decoding is attempted.
#[derive(Debug, Clone)]
pub enum ClientPacket {
    ChangeAction {
        action_id: u8,
        action_text: String,
        action_md5: String,
        action_mods: i32,
        game_mode: u8,
        beatmap_id: i32,
    },
    SendPublicMessage {
        target: String,
        message: String,
    },
    Logout,
    RequestStatusUpdate,
    Ping,
    StartSpectating {
        user_id: i32,
    },
    StopSpectating,
    SpectateFrames {
        data: Vec<u8>,
    },
    CantSpectate,
    SendPrivateMessage {
        target: String,
        message: String,
    },
    PartLobby,
    JoinLobby,
    CreateMatch {
        data: MatchData,
    },
    JoinMatch {
        match_id: u16,
        password: String,
    },
    PartMatch,
    MatchChangeSlot {
        slot_id: i32,
    },
    MatchReady,
    MatchLock {
        slot_id: i32,
    },
    MatchChangeSettings {
        data: MatchData,
    },
    MatchStart,
    MatchScoreUpdate {
        raw: Vec<u8>,
    },
    MatchComplete,
    MatchChangeMods {
        mods: u32,
    },
    MatchLoadComplete,
    MatchNoBeatmap,
    MatchNotReady,
    MatchFailed,
    MatchHasBeatmap,
    MatchSkipRequest,
    ChannelJoin {
        channel: String,
    },
    MatchTransferHost {
        slot_id: i32,
    },
    ChannelPart {
        channel: String,
    },
    SetAwayMessage {
        message: String,
    },
    MatchChangePassword {
        data: MatchData,
    },
    UserPresenceRequest {
        user_ids: Vec<i32>,
    },
    UserPresenceRequestAll,
    ToggleBlockNonFriendDm {
        value: i32,
    },
    ChangeTeam,
    ChangeProtocolVersion {
        version: i32,
    },
}

pub fn parse(packet_id: u16, payload: &[u8]) -> Result<ClientPacket, ProtoError> {
    let mut r = Reader::new(packet_id, payload);
    let parsed = match packet_id {
        id::CHANGE_ACTION => {
            let action_id = r.u8()?;
            let action_text = r.string()?;
            let action_md5 = r.string()?;
            let action_mods = r.i32()?;
            let game_mode = r.u8()?;
            let beatmap_id = r.i32()?;
            ClientPacket::ChangeAction {
                action_id,
                action_text,
                action_md5,
                action_mods,
                game_mode,
                beatmap_id,
            }
        }
        id::SEND_PUBLIC_MESSAGE => {
            let _from = r.string()?; // client echoes its own name; server re-derives it
            let message = r.string()?;
            let target = r.string()?;
            ClientPacket::SendPublicMessage { target, message }
        }
        id::LOGOUT => ClientPacket::Logout,
        id::REQUEST_STATUS_UPDATE => ClientPacket::RequestStatusUpdate,
        id::PING => ClientPacket::Ping,
        id::START_SPECTATING => ClientPacket::StartSpectating { user_id: r.i32()? },
        id::STOP_SPECTATING => ClientPacket::StopSpectating,
        id::SPECTATE_FRAMES => ClientPacket::SpectateFrames {
            data: r.bbytes().to_vec(),
        },
        id::CANT_SPECTATE => ClientPacket::CantSpectate,
        id::SEND_PRIVATE_MESSAGE => {
            let _from = r.string()?;
            let message = r.string()?;
            let target = r.string()?;
            ClientPacket::SendPrivateMessage { target, message }
        }
        id::PART_LOBBY => ClientPacket::PartLobby,
        id::JOIN_LOBBY => ClientPacket::JoinLobby,
        id::CREATE_MATCH => ClientPacket::CreateMatch {
            data: MatchData::decode(packet_id, r.remaining())?,
        },
        id::JOIN_MATCH => {
            let match_id = r.u16()?;
            let password = r.string()?;
            ClientPacket::JoinMatch { match_id, password }
        }
        id::PART_MATCH => ClientPacket::PartMatch,
        id::MATCH_CHANGE_SLOT => ClientPacket::MatchChangeSlot { slot_id: r.i32()? },
        id::MATCH_READY => ClientPacket::MatchReady,
        id::MATCH_LOCK => ClientPacket::MatchLock { slot_id: r.i32()? },
        id::MATCH_CHANGE_SETTINGS => ClientPacket::MatchChangeSettings {
            data: MatchData::decode(packet_id, r.remaining())?,
        },
        id::MATCH_START => ClientPacket::MatchStart,
        id::MATCH_SCORE_UPDATE => ClientPacket::MatchScoreUpdate {
            raw: r.bbytes().to_vec(),
        },
        id::MATCH_COMPLETE => ClientPacket::MatchComplete,
        id::MATCH_CHANGE_MODS => ClientPacket::MatchChangeMods { mods: r.u32()? },
        id::MATCH_LOAD_COMPLETE => ClientPacket::MatchLoadComplete,
        id::MATCH_NO_BEATMAP => ClientPacket::MatchNoBeatmap,
        id::MATCH_NOT_READY => ClientPacket::MatchNotReady,
        id::MATCH_FAILED => ClientPacket::MatchFailed,
        id::MATCH_HAS_BEATMAP => ClientPacket::MatchHasBeatmap,
        id::MATCH_SKIP_REQUEST => ClientPacket::MatchSkipRequest,
        id::CHANNEL_JOIN => ClientPacket::ChannelJoin { channel: r.string()? },
        id::MATCH_TRANSFER_HOST => ClientPacket::MatchTransferHost { slot_id: r.i32()? },
        id::CHANNEL_PART => ClientPacket::ChannelPart { channel: r.string()? },
        id::SET_AWAY_MESSAGE => ClientPacket::SetAwayMessage { message: r.string()? },
        id::MATCH_CHANGE_PASSWORD => ClientPacket::MatchChangePassword {
            data: MatchData::decode(packet_id, r.remaining())?,
        },
        id::USER_PRESENCE_REQUEST => ClientPacket::UserPresenceRequest {
            user_ids: r.int_list()?,
        },
        id::USER_PRESENCE_REQUEST_ALL => ClientPacket::UserPresenceRequestAll,
        id::TOGGLE_BLOCK_NON_FRIEND_DM => ClientPacket::ToggleBlockNonFriendDm { value: r.i32()? },
        id::CHANGE_TEAM => ClientPacket::ChangeTeam,
        id::CHANGE_PROTOCOL_VERSION => ClientPacket::ChangeProtocolVersion { version: r.i32()? },
        other => return Err(ProtoError::UnknownPacketId(other)),
    };
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Writer;

    #[test]
    fn parses_send_public_message() {
        let mut w = Writer::new();
        w.string("someone").string("hello").string("#osu");
        let packet = parse(id::SEND_PUBLIC_MESSAGE, &w.into_bytes()).unwrap();
        match packet {
            ClientPacket::SendPublicMessage { target, message } => {
                assert_eq!(target, "#osu");
                assert_eq!(message, "hello");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_id_is_reported() {
        let err = parse(65000, &[]).unwrap_err();
        assert_eq!(err, ProtoError::UnknownPacketId(65000));
    }

    #[test]
    fn parses_zero_length_packets() {
        assert!(matches!(parse(id::LOGOUT, &[]).unwrap(), ClientPacket::Logout));
        assert!(matches!(parse(id::PING, &[]).unwrap(), ClientPacket::Ping));
    }
}
