//! The login handshake: the one piece of connective tissue between a fresh
//! TCP accept and the dispatcher's steady-state packet loop. A connecting
//! client's very first bytes are a small text block (not a framed binary
//! packet — this predates the rest of the wire codec and real clients still
//! send it that way), three lines terminated by `\n`:
//!
//! ```text
//! <username>
//! <password_md5>
//! <osu_version>|<utc_offset>|<display_city>|<client_hashes>|<block_non_friend_dms>
//! ```
//!
//! A successful login returns a fixed burst of framed response packets:
//! `user_id`, `silenceEndTime`, `protocolVersion`, `supporter_gmt`, the
//! caller's own `userPanel`/`userStats`, one `channelInfo` per joinable
//! public channel, `channelInfoEnd`, and the bot's `userPanel`/`userStats`.

use crate::channel::ChannelRegistry;
use crate::match_engine::MatchRegistry;
use crate::session::{privileges, Session, SessionManager, SessionState};
use crate::services::Services;
use crate::streams::{self, StreamRegistry};
use bancho_proto::server;
use std::sync::Arc;

/// The chatbot/announcer account (osuAkatsuki's "peppy"/chatbot user id).
/// Below [`privileges::BOT_USER_ID_CEILING`], so its own queue never grows.
pub const BOT_USER_ID: i32 = 999;
pub const BOT_USERNAME: &str = "BanchoBot";

#[derive(Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password_md5: String,
    pub client_version: String,
    pub utc_offset: u8,
    pub client_hashes: String,
    pub block_non_friend_dms: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LoginError {
    MalformedRequest,
    UserNotFound,
    Banned,
}

/// Parses the three-line login body. Anything short of three well-formed
/// lines is `MalformedRequest` — the connection is closed without a login
/// reply, matching a real client's behavior of giving up on a garbled 200.
pub fn parse_login_request(body: &str) -> Result<LoginRequest, LoginError> {
    let mut lines = body.lines();
    let username = lines.next().ok_or(LoginError::MalformedRequest)?.trim().to_string();
    let password_md5 = lines.next().ok_or(LoginError::MalformedRequest)?.trim().to_string();
    let info_line = lines.next().ok_or(LoginError::MalformedRequest)?.trim();
    if username.is_empty() || password_md5.is_empty() {
        return Err(LoginError::MalformedRequest);
    }

    let mut fields = info_line.split('|');
    let client_version = fields.next().unwrap_or_default().to_string();
    let utc_offset: u8 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let _display_city = fields.next();
    let client_hashes = fields.next().unwrap_or_default().to_string();
    let block_non_friend_dms = fields.next().map(|s| s.trim() == "1").unwrap_or(false);

    Ok(LoginRequest {
        username,
        password_md5,
        client_version,
        utc_offset,
        client_hashes,
        block_non_friend_dms,
    })
}

pub struct LoginSuccess {
    pub session: Arc<Session>,
    pub response: Vec<u8>,
}

/// Authenticates `req` against the user store, evicts any prior session for
/// the same account, and assembles the full post-login response burst.
/// Password verification itself is a `UserStore` concern in a real
/// deployment (the website owns the password hash); this only consults
/// `is_banned` / `is_restricted` once a matching account is found by safe
/// username.
pub async fn handle_login(
    services: &Services,
    sessions: &SessionManager,
    channels: &ChannelRegistry,
    matches: &MatchRegistry,
    req: LoginRequest,
    ip: String,
) -> Result<LoginSuccess, LoginError> {
    let safe_username = req.username.to_lowercase().replace(' ', "_");
    let record = services
        .user_store
        .fetch_user_by_safe_name(&safe_username)
        .await
        .ok_or(LoginError::UserNotFound)?;

    if services.user_store.is_banned(record.user_id).await {
        return Err(LoginError::Banned);
    }

    let now = services.clock.now();
    let token_id = uuid::Uuid::new_v4().to_string();
    let mut state = SessionState::new(
        token_id,
        record.user_id,
        record.username.clone(),
        record.privileges,
        ip.clone(),
        19,
        now,
    );
    state.utc_offset = req.utc_offset;
    state.block_non_friends_dm = req.block_non_friend_dms;
    state.silence_end_time = services.user_store.get_silence_end(record.user_id).await;
    let session = Session::new(state);

    if let Some(evicted) = sessions.insert(session.clone()).await {
        crate::handlers::connection::evict(services, sessions, channels, matches, &evicted).await;
    }

    services.user_store.save_bancho_session(record.user_id, &ip).await;

    StreamRegistry::add(services, streams::MAIN).await;
    StreamRegistry::join(services, streams::MAIN, &session.token_id).await;
    session.join_stream(streams::MAIN).await;

    let stats = services.user_store.get_user_stats(record.user_id, 0, 0).await;
    session.update_cached_stats(stats).await;

    let rank_flags = if privileges::is_staff(record.privileges) { 1 } else { 0 };
    let mut response = Vec::new();
    response.extend(server::user_id(record.user_id));
    response.extend(server::silence_end_time(0));
    response.extend(server::protocol_version(19));
    response.extend(server::supporter_gmt(1));
    response.extend(server::user_panel(record.user_id, &record.username, req.utc_offset, 0, rank_flags, 0.0, 0.0, stats.game_rank));
    response.extend(server::user_stats(
        record.user_id as u32,
        0,
        "",
        "",
        0,
        0,
        0,
        stats.ranked_score,
        stats.accuracy,
        stats.playcount,
        stats.total_score,
        stats.game_rank,
        stats.pp,
    ));
    for channel in channels.public_channels() {
        let member_count = StreamRegistry::client_count(services, &streams::chat_stream(&channel.name)).await as u16;
        response.extend(server::channel_info(&channel.name, &channel.description, member_count));
    }
    response.extend(server::channel_info_end());
    response.extend(server::user_panel(BOT_USER_ID, BOT_USERNAME, 0, 0, 0, 0.0, 0.0, 0));
    response.extend(server::user_stats(BOT_USER_ID as u32, 0, "", "", 0, 0, 0, 0, 0.0, 0, 0, 0, 0));

    // Backfill every other connected user's presence, and announce this
    // login to them in turn, so every client's user list stays accurate.
    let announce_panel = server::user_panel(record.user_id, &record.username, req.utc_offset, 0, rank_flags, 0.0, 0.0, stats.game_rank);
    let announce_stats = server::user_stats(
        record.user_id as u32, 0, "", "", 0, 0, 0, stats.ranked_score, stats.accuracy, stats.playcount, stats.total_score, stats.game_rank, stats.pp,
    );
    for other in sessions.all() {
        if other.token_id == session.token_id {
            continue;
        }
        let (other_uid, other_name, other_tz, other_rank) = other.read(|s| (s.user_id, s.username.clone(), s.utc_offset, s.stats.game_rank)).await;
        session.enqueue(server::user_panel(other_uid, &other_name, other_tz, 0, 0, 0.0, 0.0, other_rank)).await.ok();
        other.enqueue(announce_panel.clone()).await.ok();
        other.enqueue(announce_stats.clone()).await.ok();
    }

    Ok(LoginSuccess { session, response })
}
