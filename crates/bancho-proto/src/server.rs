//! Typed builders for server → client packets. Each function returns a
//! fully framed packet (header + payload) ready to enqueue on a session.

use crate::fields::Writer;
use crate::ids::server as id;
use crate::match_data::MatchData;
use crate::packet::frame;

pub fn user_id(uid: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.i32(uid);
    frame(id::USER_ID, &w.into_bytes())
}

pub fn send_message(from: &str, msg: &str, to: &str, from_id: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.string(from).string(msg).string(to).i32(from_id);
    frame(id::SEND_MESSAGE, &w.into_bytes())
}

pub fn pong() -> Vec<u8> {
    frame(id::PONG, &[])
}

#[allow(clippy::too_many_arguments)]
pub fn user_stats(
    uid: u32,
    action_id: u8,
    action_text: &str,
    action_md5: &str,
    action_mods: i32,
    mode: u8,
    beatmap_id: i32,
    ranked_score: u64,
    accuracy: f32,
    playcount: u32,
    total_score: u64,
    rank: u32,
    pp: u16,
) -> Vec<u8> {
    let mut w = Writer::new();
    w.u32(uid)
        .u8(action_id)
        .string(action_text)
        .string(action_md5)
        .i32(action_mods)
        .u8(mode)
        .i32(beatmap_id)
        .u64(ranked_score)
        .f32(accuracy)
        .u32(playcount)
        .u64(total_score)
        .u32(rank)
        .u16(pp);
    frame(id::USER_STATS, &w.into_bytes())
}

pub fn user_logout(uid: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.i32(uid).u8(0);
    frame(id::USER_LOGOUT, &w.into_bytes())
}

pub fn supporter_gmt(flags: u32) -> Vec<u8> {
    let mut w = Writer::new();
    w.u32(flags);
    frame(id::SUPPORTER_GMT, &w.into_bytes())
}

/// Server's answer to a client's `changeProtocolVersion`, and the version
/// advertised unconditionally on login.
pub fn protocol_version(version: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.i32(version);
    frame(id::PROTOCOL_VERSION, &w.into_bytes())
}

pub fn restart(ms: u32) -> Vec<u8> {
    let mut w = Writer::new();
    w.u32(ms);
    frame(id::RESTART, &w.into_bytes())
}

pub fn notification(text: &str) -> Vec<u8> {
    let mut w = Writer::new();
    w.string(text);
    frame(id::NOTIFICATION, &w.into_bytes())
}

pub fn channel_join_success(channel: &str) -> Vec<u8> {
    let mut w = Writer::new();
    w.string(channel);
    frame(id::CHANNEL_JOIN_SUCCESS, &w.into_bytes())
}

pub fn channel_info(name: &str, description: &str, member_count: u16) -> Vec<u8> {
    let mut w = Writer::new();
    w.string(name).string(description).u16(member_count);
    frame(id::CHANNEL_INFO, &w.into_bytes())
}

pub fn channel_info_end() -> Vec<u8> {
    frame(id::CHANNEL_INFO_END, &[])
}

pub fn channel_kicked(channel: &str) -> Vec<u8> {
    let mut w = Writer::new();
    w.string(channel);
    frame(id::CHANNEL_KICKED, &w.into_bytes())
}

#[allow(clippy::too_many_arguments)]
pub fn user_panel(
    uid: i32,
    name: &str,
    utc_offset: u8,
    country_code: u8,
    rank_flags: u8,
    longitude: f32,
    latitude: f32,
    rank: u32,
) -> Vec<u8> {
    let mut w = Writer::new();
    w.i32(uid)
        .string(name)
        .u8(utc_offset)
        .u8(country_code)
        .u8(rank_flags)
        .f32(longitude)
        .f32(latitude)
        .u32(rank);
    frame(id::USER_PANEL, &w.into_bytes())
}

pub fn user_silenced(uid: u32) -> Vec<u8> {
    let mut w = Writer::new();
    w.u32(uid);
    frame(id::USER_SILENCED, &w.into_bytes())
}

pub fn silence_end_time(seconds: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.i32(seconds);
    frame(id::SILENCE_END_TIME, &w.into_bytes())
}

pub fn target_is_silenced(username: &str) -> Vec<u8> {
    let mut w = Writer::new();
    w.string(username);
    frame(id::TARGET_IS_SILENCED, &w.into_bytes())
}

pub fn target_blocking_dms(username: &str) -> Vec<u8> {
    let mut w = Writer::new();
    w.string(username);
    frame(id::TARGET_BLOCKING_DMS, &w.into_bytes())
}

// --- Spectator family -------------------------------------------------

pub fn spectator_joined(uid: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.i32(uid);
    frame(id::SPECTATOR_JOINED, &w.into_bytes())
}

pub fn spectator_left(uid: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.i32(uid);
    frame(id::SPECTATOR_LEFT, &w.into_bytes())
}

pub fn spectate_frames(data: &[u8]) -> Vec<u8> {
    frame(id::SPECTATE_FRAMES, data)
}

pub fn no_song_spectator(uid: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.i32(uid);
    frame(id::NO_SONG_SPECTATOR, &w.into_bytes())
}

pub fn fellow_spectator_joined(uid: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.i32(uid);
    frame(id::FELLOW_SPECTATOR_JOINED, &w.into_bytes())
}

pub fn fellow_spectator_left(uid: i32) -> Vec<u8> {
    let mut w = Writer::new();
    w.i32(uid);
    frame(id::SPECTATOR_LEFT, &w.into_bytes())
}

// --- Multiplayer family -------------------------------------------------

pub fn match_new(data: &MatchData) -> Vec<u8> {
    frame(id::MATCH_NEW, &data.encode(false))
}

pub fn match_update(data: &MatchData, censor_password: bool) -> Vec<u8> {
    frame(id::MATCH_UPDATE, &data.encode(censor_password))
}

pub fn match_start(data: &MatchData) -> Vec<u8> {
    frame(id::MATCH_START, &data.encode(true))
}

pub fn match_join_success(data: &MatchData) -> Vec<u8> {
    frame(id::MATCH_JOIN_SUCCESS, &data.encode(false))
}

pub fn match_join_fail() -> Vec<u8> {
    frame(id::MATCH_JOIN_FAIL, &[])
}

pub fn match_dispose(match_id: u16) -> Vec<u8> {
    let mut w = Writer::new();
    w.u16(match_id);
    frame(id::MATCH_DISPOSE, &w.into_bytes())
}

pub fn all_players_loaded() -> Vec<u8> {
    frame(id::ALL_PLAYERS_LOADED, &[])
}

pub fn match_skip() -> Vec<u8> {
    frame(id::MATCH_SKIP, &[])
}

/// Relays a score-update frame verbatim; its payload layout is opaque to
/// the server, which only forwards the bytes a client sent.
pub fn raw_score_frame(raw: &[u8]) -> Vec<u8> {
    frame(id::MATCH_SCORE_UPDATE, raw)
}

pub fn match_complete() -> Vec<u8> {
    frame(id::MATCH_COMPLETE, &[])
}

pub fn match_transfer_host() -> Vec<u8> {
    frame(id::MATCH_TRANSFER_HOST, &[])
}

pub fn match_abort() -> Vec<u8> {
    frame(id::MATCH_ABORT, &[])
}
