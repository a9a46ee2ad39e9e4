//! Packet id constants, taken verbatim from the external interface table.
//!
//! The real wire protocol reuses small ids across otherwise-unrelated
//! packets (e.g. `13` is both `supporter_gmt` and the spectator `joined`
//! event) because client and server historically shared one enumeration
//! that grew different branches over time. We keep that quirk rather than
//! renumbering it away, since bit-exactness with a live client means
//! matching the numbers it actually expects.

/// Server → client packet ids.
pub mod server {
    pub const USER_ID: u16 = 5;
    pub const SEND_MESSAGE: u16 = 7;
    pub const PONG: u16 = 8;
    pub const USER_STATS: u16 = 11;
    pub const USER_LOGOUT: u16 = 12;
    pub const SUPPORTER_GMT: u16 = 13;
    pub const PROTOCOL_VERSION: u16 = 75;
    pub const SPECTATOR_JOINED: u16 = 13;
    pub const SPECTATOR_LEFT: u16 = 14;
    pub const SPECTATE_FRAMES: u16 = 15;
    pub const RESTART: u16 = 19;
    pub const NO_SONG_SPECTATOR: u16 = 22;
    pub const FELLOW_SPECTATOR_JOINED: u16 = 23;
    pub const NOTIFICATION: u16 = 24;
    pub const MATCH_NEW: u16 = 26;
    pub const MATCH_UPDATE: u16 = 27;
    pub const MATCH_START: u16 = 28;
    pub const MATCH_JOIN_SUCCESS: u16 = 36;
    pub const MATCH_JOIN_FAIL: u16 = 37;
    pub const MATCH_DISPOSE: u16 = 38;
    pub const CHANNEL_JOIN_SUCCESS: u16 = 64;
    pub const CHANNEL_INFO: u16 = 65;
    pub const CHANNEL_INFO_END: u16 = 66;
    pub const ALL_PLAYERS_LOADED: u16 = 46;
    pub const MATCH_SKIP: u16 = 48;
    pub const MATCH_SCORE_UPDATE: u16 = 47;
    pub const MATCH_COMPLETE: u16 = 50;
    pub const MATCH_TRANSFER_HOST: u16 = 57;
    pub const MATCH_ABORT: u16 = 58;
    pub const USER_PANEL: u16 = 83;
    pub const USER_SILENCED: u16 = 86;
    pub const CHANNEL_KICKED: u16 = 90;
    pub const SILENCE_END_TIME: u16 = 92;
    pub const TARGET_IS_SILENCED: u16 = 95;
    pub const TARGET_BLOCKING_DMS: u16 = 100;
}

/// Client → server packet ids.
pub mod client {
    pub const CHANGE_ACTION: u16 = 0;
    pub const SEND_PUBLIC_MESSAGE: u16 = 1;
    pub const LOGOUT: u16 = 2;
    pub const REQUEST_STATUS_UPDATE: u16 = 3;
    pub const PING: u16 = 4;
    pub const START_SPECTATING: u16 = 16;
    pub const STOP_SPECTATING: u16 = 17;
    pub const SPECTATE_FRAMES: u16 = 18;
    pub const CANT_SPECTATE: u16 = 21;
    pub const SEND_PRIVATE_MESSAGE: u16 = 25;
    pub const PART_LOBBY: u16 = 29;
    pub const JOIN_LOBBY: u16 = 30;
    pub const CREATE_MATCH: u16 = 31;
    pub const JOIN_MATCH: u16 = 32;
    pub const PART_MATCH: u16 = 33;
    pub const MATCH_CHANGE_SLOT: u16 = 38;
    pub const MATCH_READY: u16 = 39;
    pub const MATCH_LOCK: u16 = 40;
    pub const MATCH_CHANGE_SETTINGS: u16 = 41;
    pub const MATCH_START: u16 = 44;
    pub const MATCH_SCORE_UPDATE: u16 = 47;
    pub const MATCH_COMPLETE: u16 = 49;
    pub const MATCH_CHANGE_MODS: u16 = 51;
    pub const MATCH_LOAD_COMPLETE: u16 = 52;
    pub const MATCH_NO_BEATMAP: u16 = 53;
    pub const MATCH_NOT_READY: u16 = 54;
    pub const MATCH_FAILED: u16 = 55;
    pub const MATCH_HAS_BEATMAP: u16 = 56;
    pub const MATCH_SKIP_REQUEST: u16 = 57;
    pub const CHANNEL_JOIN: u16 = 63;
    pub const MATCH_TRANSFER_HOST: u16 = 77;
    pub const CHANNEL_PART: u16 = 78;
    pub const RECEIVE_UPDATES: u16 = 79;
    pub const SET_AWAY_MESSAGE: u16 = 82;
    pub const USER_STATS_REQUEST: u16 = 85;
    pub const MATCH_CHANGE_PASSWORD: u16 = 90;
    pub const TOURNAMENT_MATCH_INFO_REQUEST: u16 = 93;
    pub const USER_PRESENCE_REQUEST: u16 = 97;
    pub const USER_PRESENCE_REQUEST_ALL: u16 = 98;
    pub const TOGGLE_BLOCK_NON_FRIEND_DM: u16 = 99;
    pub const TOURNAMENT_JOIN_MATCH_CHANNEL: u16 = 108;
    pub const TOURNAMENT_LEAVE_MATCH_CHANNEL: u16 = 109;
    pub const CHANGE_PROTOCOL_VERSION: u16 = 1000;
    pub const CHANGE_TEAM: u16 = 1001;
}
