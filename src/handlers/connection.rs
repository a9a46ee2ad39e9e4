//! Presence and connection-lifecycle handlers: `changeAction`, `logout`,
//! `requestStatusUpdate`, and the small away/DM-block/protocol-version
//! toggles that only ever touch the caller's own session.

use crate::channel::ChannelRegistry;
use crate::dispatcher::Context;
use crate::error::BanchoResult;
use crate::match_engine::{self, MatchRegistry};
use crate::services::Services;
use crate::session::{Session, SessionManager};
use crate::spectator;
use crate::streams::{self, StreamRegistry};
use bancho_proto::server;
use std::sync::Arc;

/// Releases everything a session holds: leaves any match, stops (and is
/// stopped by) spectating, parts every channel and stream, and tells `main`
/// the user is gone. Does not remove the session from `sessions` — callers
/// that still hold a table entry for it (an ordinary disconnect) do that
/// themselves; an evicting login has already replaced the entry.
async fn teardown(
    services: &Services,
    sessions: &SessionManager,
    channels: &ChannelRegistry,
    matches: &MatchRegistry,
    session: &Arc<Session>,
) -> BanchoResult<()> {
    if session.read(|s| s.match_id).await.is_some() {
        match_engine::leave_match(services, sessions, matches, session).await?;
    }
    spectator::stop_spectating(services, sessions, channels, session).await?;
    spectator::force_stop_all_followers(services, sessions, channels, session).await?;

    let joined_channels = session.read(|s| s.joined_channels.clone()).await;
    for channel in joined_channels {
        channels.part(services, session, &channel).await?;
    }

    let joined_streams = session.read(|s| s.joined_streams.clone()).await;
    for stream in joined_streams {
        StreamRegistry::leave(services, &stream, &session.token_id).await;
    }

    let user_id = session.read(|s| s.user_id).await;
    StreamRegistry::broadcast(services, sessions, streams::MAIN, &server::user_logout(user_id), None, None).await;
    Ok(())
}

/// Full teardown for a disconnecting session, including removing it from
/// the session table.
pub async fn logout(ctx: &Context<'_>, session: &Arc<Session>) -> BanchoResult<()> {
    teardown(ctx.services, ctx.sessions, ctx.channels, ctx.matches, session).await?;
    ctx.sessions.remove(&session.token_id);
    Ok(())
}

/// Releases everything held by a session that a newer login for the same
/// account just replaced in the session table. The table entry is
/// already gone by the time this runs, so unlike [`logout`] it must not
/// call `sessions.remove` again.
pub async fn evict(services: &Services, sessions: &SessionManager, channels: &ChannelRegistry, matches: &MatchRegistry, session: &Arc<Session>) {
    if let Err(err) = teardown(services, sessions, channels, matches, session).await {
        tracing::warn!(token = %session.token_id, error = %err, "error tearing down evicted session");
    }
}

/// Answers `requestStatusUpdate` with a fresh `userStats` built from the
/// caller's own cached presence fields and the user store's current stats.
pub async fn request_status_update(ctx: &Context<'_>, session: &Arc<Session>) -> BanchoResult<()> {
    let bytes = user_stats_packet(ctx, session).await;
    session.enqueue(bytes).await
}

async fn user_stats_packet(ctx: &Context<'_>, session: &Arc<Session>) -> Vec<u8> {
    let (user_id, action_id, action_text, action_md5, action_mods, game_mode, beatmap_id, relax) = session
        .read(|s| (s.user_id, s.action_id, s.action_text.clone(), s.action_md5.clone(), s.action_mods, s.game_mode, s.beatmap_id, s.relax))
        .await;
    let stats = ctx.services.user_store.get_user_stats(user_id, game_mode, relax as u8).await;
    server::user_stats(
        user_id as u32,
        action_id,
        &action_text,
        &action_md5,
        action_mods,
        game_mode,
        beatmap_id,
        stats.ranked_score,
        stats.accuracy,
        stats.playcount,
        stats.total_score,
        stats.game_rank,
        stats.pp,
    )
}

/// Updates the caller's cached presence fields, then rebroadcasts
/// `userStats` on `main` so every other client's user list stays current.
#[allow(clippy::too_many_arguments)]
pub async fn change_action(
    ctx: &Context<'_>,
    session: &Arc<Session>,
    action_id: u8,
    action_text: String,
    action_md5: String,
    action_mods: i32,
    game_mode: u8,
    beatmap_id: i32,
) -> BanchoResult<()> {
    session
        .write(|s| {
            s.action_id = action_id;
            s.action_text = action_text;
            s.action_md5 = action_md5;
            s.action_mods = action_mods;
            s.game_mode = game_mode;
            s.beatmap_id = beatmap_id;
        })
        .await;
    let bytes = user_stats_packet(ctx, session).await;
    StreamRegistry::broadcast(ctx.services, ctx.sessions, streams::MAIN, &bytes, Some(&session.token_id), None).await;
    Ok(())
}

pub async fn set_away_message(session: &Arc<Session>, message: String) -> BanchoResult<()> {
    session.write(|s| s.away_message = if message.is_empty() { None } else { Some(message) }).await;
    Ok(())
}

pub async fn toggle_block_non_friend_dm(session: &Arc<Session>, value: i32) -> BanchoResult<()> {
    session.write(|s| s.block_non_friends_dm = value != 0).await;
    Ok(())
}

pub async fn change_protocol_version(session: &Arc<Session>, version: i32) -> BanchoResult<()> {
    session.write(|s| s.protocol_version = version).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelRegistry;
    use crate::match_engine::MatchRegistry;
    use crate::services::Services;
    use crate::session::{privileges, SessionManager, SessionState};

    fn new_session(token: &str, user_id: i32) -> Arc<Session> {
        Session::new(SessionState::new(token.to_string(), user_id, "user".into(), privileges::USER_PUBLIC, "127.0.0.1".into(), 19, 1_000))
    }

    #[tokio::test]
    async fn change_action_broadcasts_to_other_sessions_on_main() {
        let services = Services::in_memory();
        let sessions = SessionManager::new();
        let channels = ChannelRegistry::new();
        let matches = MatchRegistry::new();
        let ctx = Context { services: &services, sessions: &sessions, channels: &channels, matches: &matches };

        let a = new_session("t1", 1001);
        let b = new_session("t2", 1002);
        sessions.insert(a.clone()).await;
        sessions.insert(b.clone()).await;
        StreamRegistry::add(&services, streams::MAIN).await;
        StreamRegistry::join(&services, streams::MAIN, "t1").await;
        StreamRegistry::join(&services, streams::MAIN, "t2").await;

        change_action(&ctx, &a, 2, "Playing".into(), "abc".into(), 0, 0, 55).await.unwrap();
        assert!(a.reset_queue().await.is_empty());
        assert!(!b.reset_queue().await.is_empty());
    }

    #[tokio::test]
    async fn logout_clears_matches_and_streams() {
        let services = Services::in_memory();
        let sessions = SessionManager::new();
        let channels = ChannelRegistry::new();
        let matches = MatchRegistry::new();
        let ctx = Context { services: &services, sessions: &sessions, channels: &channels, matches: &matches };

        let host = new_session("t1", 1);
        sessions.insert(host.clone()).await;
        let match_id = matches.create(&services, "room".into(), "".into(), 1, 0).await;
        match_engine::join_match(&services, &sessions, &matches, &host, match_id, "").await.unwrap();

        logout(&ctx, &host).await.unwrap();
        assert!(sessions.get("t1").await.is_none());
        assert!(matches.get(match_id).is_none());
    }
}
