//! Control-plane bridge (C11): reacts to moderation events published by
//! external tooling (the website, admin panel) on well-known channels, so
//! a ban or silence issued outside this process still disconnects or mutes
//! the live session immediately.
//!
//! Channel names and the fields each payload carries are grounded on the
//! upstream daemon this replaces; payloads here are plain colon-separated
//! text (`user_id` always first) rather than that daemon's framing, since
//! this service's own wire codec has nothing to do with KV pub/sub.

use crate::channel::ChannelRegistry;
use crate::dispatcher::Context;
use crate::handlers;
use crate::match_engine::MatchRegistry;
use crate::services::Services;
use crate::session::SessionManager;
use crate::streams::{self, StreamRegistry};
use bancho_proto::server;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub const CHANNEL_BAN: &str = "peppy:ban";
pub const CHANNEL_UNBAN: &str = "peppy:unban";
pub const CHANNEL_SILENCE: &str = "peppy:silence";
pub const CHANNEL_DISCONNECT: &str = "peppy:disconnect";
pub const CHANNEL_NOTIFICATION: &str = "peppy:notification";
pub const CHANNEL_CHANGE_USERNAME: &str = "peppy:change_username";
pub const CHANGE_UPDATE_CACHED_STATS: &str = "peppy:update_cached_stats";
pub const CHANNEL_WIPE: &str = "peppy:wipe";

fn parse_user_id(payload: &[u8]) -> Option<i32> {
    std::str::from_utf8(payload).ok()?.split(':').next()?.parse().ok()
}

async fn disconnect_user(services: &Services, sessions: &SessionManager, channels: &ChannelRegistry, matches: &MatchRegistry, user_id: i32) {
    let Some(session) = sessions.get_by_user(user_id).await else { return };
    let ctx = Context { services, sessions, channels, matches };
    if let Err(err) = handlers::connection::logout(&ctx, &session).await {
        tracing::warn!(user_id, error = %err, "error disconnecting session by control event");
    }
}

async fn handle_ban(services: &Services, sessions: &SessionManager, channels: &ChannelRegistry, matches: &MatchRegistry, payload: &[u8]) {
    if let Some(user_id) = parse_user_id(payload) {
        disconnect_user(services, sessions, channels, matches, user_id).await;
    }
}

async fn handle_disconnect(services: &Services, sessions: &SessionManager, channels: &ChannelRegistry, matches: &MatchRegistry, payload: &[u8]) {
    if let Some(user_id) = parse_user_id(payload) {
        disconnect_user(services, sessions, channels, matches, user_id).await;
    }
}

async fn handle_wipe(services: &Services, sessions: &SessionManager, channels: &ChannelRegistry, matches: &MatchRegistry, payload: &[u8]) {
    if let Some(user_id) = parse_user_id(payload) {
        disconnect_user(services, sessions, channels, matches, user_id).await;
    }
}

/// `peppy:unban` has nothing to do on an already-disconnected session; it
/// only matters to the website's own cache. Kept as an explicit no-op arm
/// rather than folded into another handler so the channel list in the
/// glossary stays traceable to a matching branch here.
async fn handle_unban(_payload: &[u8]) {}

async fn handle_silence(services: &Services, sessions: &SessionManager, payload: &[u8]) {
    let Some(text) = std::str::from_utf8(payload).ok() else { return };
    let mut parts = text.splitn(3, ':');
    let Some(user_id) = parts.next().and_then(|s| s.parse::<i32>().ok()) else { return };
    let Some(seconds) = parts.next().and_then(|s| s.parse::<i64>().ok()) else { return };
    let reason = parts.next().unwrap_or("");
    let Some(session) = sessions.get_by_user(user_id).await else { return };
    if let Err(err) = session.silence(services, seconds, reason, user_id).await {
        tracing::warn!(user_id, error = %err, "error applying external silence");
        return;
    }
    StreamRegistry::broadcast(services, sessions, streams::MAIN, &server::user_silenced(user_id as u32), None, None).await;
}

async fn handle_notification(sessions: &SessionManager, payload: &[u8]) {
    let Some(text) = std::str::from_utf8(payload).ok() else { return };
    let mut parts = text.splitn(2, ':');
    let Some(user_id) = parts.next().and_then(|s| s.parse::<i32>().ok()) else { return };
    let message = parts.next().unwrap_or("");
    if let Some(session) = sessions.get_by_user(user_id).await {
        session.enqueue(server::notification(message)).await.ok();
    }
}

async fn handle_change_username(sessions: &SessionManager, payload: &[u8]) {
    let Some(text) = std::str::from_utf8(payload).ok() else { return };
    let mut parts = text.splitn(2, ':');
    let Some(user_id) = parts.next().and_then(|s| s.parse::<i32>().ok()) else { return };
    let Some(new_username) = parts.next() else { return };
    if let Some(session) = sessions.get_by_user(user_id).await {
        session.write(|s| s.username = new_username.to_string()).await;
    }
}

async fn handle_update_cached_stats(services: &Services, sessions: &SessionManager, payload: &[u8]) {
    let Some(user_id) = parse_user_id(payload) else { return };
    let Some(session) = sessions.get_by_user(user_id).await else { return };
    let (game_mode, relax) = session.read(|s| (s.game_mode, s.relax)).await;
    let stats = services.user_store.get_user_stats(user_id, game_mode, relax as u8).await;
    session.update_cached_stats(stats).await;
    let bytes = server::user_stats(user_id as u32, 0, "", "", 0, game_mode, 0, stats.ranked_score, stats.accuracy, stats.playcount, stats.total_score, stats.game_rank, stats.pp);
    StreamRegistry::broadcast(services, sessions, streams::MAIN, &bytes, None, None).await;
}

/// Subscribes to every `peppy:*` control channel and runs until shutdown.
pub fn spawn(
    services: Services,
    sessions: Arc<SessionManager>,
    channels: Arc<ChannelRegistry>,
    matches: Arc<MatchRegistry>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let mut ban_rx = services.kv.subscribe(CHANNEL_BAN);
    let mut unban_rx = services.kv.subscribe(CHANNEL_UNBAN);
    let mut silence_rx = services.kv.subscribe(CHANNEL_SILENCE);
    let mut disconnect_rx = services.kv.subscribe(CHANNEL_DISCONNECT);
    let mut notification_rx = services.kv.subscribe(CHANNEL_NOTIFICATION);
    let mut change_username_rx = services.kv.subscribe(CHANNEL_CHANGE_USERNAME);
    let mut update_stats_rx = services.kv.subscribe(CHANGE_UPDATE_CACHED_STATS);
    let mut wipe_rx = services.kv.subscribe(CHANNEL_WIPE);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                Ok(payload) = ban_rx.recv() => handle_ban(&services, &sessions, &channels, &matches, &payload).await,
                Ok(payload) = unban_rx.recv() => handle_unban(&payload).await,
                Ok(payload) = silence_rx.recv() => handle_silence(&services, &sessions, &payload).await,
                Ok(payload) = disconnect_rx.recv() => handle_disconnect(&services, &sessions, &channels, &matches, &payload).await,
                Ok(payload) = notification_rx.recv() => handle_notification(&sessions, &payload).await,
                Ok(payload) = change_username_rx.recv() => handle_change_username(&sessions, &payload).await,
                Ok(payload) = update_stats_rx.recv() => handle_update_cached_stats(&services, &sessions, &payload).await,
                Ok(payload) = wipe_rx.recv() => handle_wipe(&services, &sessions, &channels, &matches, &payload).await,
                _ = shutdown.recv() => {
                    tracing::info!("pubsub bridge shutting down");
                    break;
                }
            }
        }
    })
}
