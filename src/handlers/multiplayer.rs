//! Multiplayer packet handlers. Each wraps a [`crate::match_engine`]
//! operation, resolving the match the caller is actually sitting in from
//! their own session state rather than trusting a client-supplied id
//! (except `join_match`, where the id is the whole point of the packet).

use crate::dispatcher::Context;
use crate::error::BanchoResult;
use crate::match_engine::{self, types::{ModMode, TeamType}, NewSettings};
use crate::session::Session;
use crate::streams::{self, StreamRegistry};
use bancho_proto::match_data::MatchData;
use bancho_proto::server;
use std::sync::Arc;

pub async fn join_lobby(ctx: &Context<'_>, session: &Arc<Session>) -> BanchoResult<()> {
    StreamRegistry::join(ctx.services, streams::LOBBY, &session.token_id).await;
    session.join_stream(streams::LOBBY).await;
    for cell in ctx.matches.all() {
        let data = cell.read().await.to_wire(true);
        session.enqueue(server::match_new(&data)).await?;
    }
    Ok(())
}

pub async fn part_lobby(ctx: &Context<'_>, session: &Arc<Session>) -> BanchoResult<()> {
    StreamRegistry::leave(ctx.services, streams::LOBBY, &session.token_id).await;
    session.leave_stream(streams::LOBBY).await;
    Ok(())
}

fn settings_from_wire(data: &MatchData) -> NewSettings {
    NewSettings {
        name: data.name.clone(),
        password: data.password.clone(),
        beatmap_name: data.beatmap_name.clone(),
        beatmap_id: data.beatmap_id,
        beatmap_md5: data.beatmap_md5.clone(),
        game_mode: data.game_mode,
        mods: data.mods,
        scoring_type: data.scoring_type,
        team_type: TeamType::from_u8(data.team_type),
        mod_mode: if data.free_mods { ModMode::FreeMod } else { ModMode::Normal },
        is_in_progress: data.in_progress,
    }
}

/// Creates the match from the client-supplied `MatchData`, applies its
/// settings to the freshly created slot machine, announces it on the
/// lobby, and has the host join their own new match.
pub async fn create_match(ctx: &Context<'_>, session: &Arc<Session>, data: MatchData) -> BanchoResult<()> {
    let host_user_id = session.read(|s| s.user_id).await;
    let match_id = ctx.matches.create(ctx.services, data.name.clone(), data.password.clone(), host_user_id, data.game_mode).await;

    if let Some(cell) = ctx.matches.get(match_id) {
        let mut m = cell.write().await;
        let settings = settings_from_wire(&data);
        m.beatmap_name = settings.beatmap_name;
        m.beatmap_id = settings.beatmap_id;
        m.beatmap_md5 = settings.beatmap_md5;
        m.mods = settings.mods;
        m.scoring_type = settings.scoring_type;
        m.team_type = settings.team_type;
        m.mod_mode = settings.mod_mode;
    }

    match_engine::join_match(ctx.services, ctx.sessions, ctx.matches, session, match_id, &data.password).await?;

    if let Some(cell) = ctx.matches.get(match_id) {
        let wire = cell.read().await.to_wire(true);
        StreamRegistry::broadcast(ctx.services, ctx.sessions, streams::LOBBY, &server::match_new(&wire), None, None).await;
    }
    Ok(())
}

pub async fn join_match(ctx: &Context<'_>, session: &Arc<Session>, match_id: u16, password: &str) -> BanchoResult<()> {
    match_engine::join_match(ctx.services, ctx.sessions, ctx.matches, session, match_id, password).await?;
    Ok(())
}

pub async fn part_match(ctx: &Context<'_>, session: &Arc<Session>) -> BanchoResult<()> {
    match_engine::leave_match(ctx.services, ctx.sessions, ctx.matches, session).await
}

async fn current_match(session: &Arc<Session>) -> Option<u16> {
    session.read(|s| s.match_id).await
}

pub async fn change_settings(ctx: &Context<'_>, session: &Arc<Session>, data: MatchData) -> BanchoResult<()> {
    let Some(match_id) = current_match(session).await else { return Ok(()) };
    let user_id = session.read(|s| s.user_id).await;
    match_engine::change_settings(ctx.services, ctx.sessions, ctx.matches, user_id, match_id, settings_from_wire(&data)).await
}

pub async fn toggle_ready(ctx: &Context<'_>, session: &Arc<Session>) -> BanchoResult<()> {
    let Some(match_id) = current_match(session).await else { return Ok(()) };
    let user_id = session.read(|s| s.user_id).await;
    match_engine::toggle_ready(ctx.services, ctx.sessions, ctx.matches, user_id, match_id).await
}

pub async fn toggle_lock(ctx: &Context<'_>, session: &Arc<Session>, slot_id: i32) -> BanchoResult<()> {
    let Some(match_id) = current_match(session).await else { return Ok(()) };
    let user_id = session.read(|s| s.user_id).await;
    match_engine::toggle_lock(ctx.services, ctx.sessions, ctx.matches, user_id, match_id, slot_id.max(0) as usize).await
}

pub async fn change_slot(ctx: &Context<'_>, session: &Arc<Session>, slot_id: i32) -> BanchoResult<()> {
    let Some(match_id) = current_match(session).await else { return Ok(()) };
    let user_id = session.read(|s| s.user_id).await;
    match_engine::change_slot(ctx.services, ctx.sessions, ctx.matches, user_id, match_id, slot_id.max(0) as usize).await
}

pub async fn change_team(ctx: &Context<'_>, session: &Arc<Session>) -> BanchoResult<()> {
    let Some(match_id) = current_match(session).await else { return Ok(()) };
    let user_id = session.read(|s| s.user_id).await;
    match_engine::change_team(ctx.services, ctx.sessions, ctx.matches, user_id, match_id).await
}

pub async fn start_match(ctx: &Context<'_>, session: &Arc<Session>) -> BanchoResult<()> {
    let Some(match_id) = current_match(session).await else { return Ok(()) };
    let user_id = session.read(|s| s.user_id).await;
    match_engine::start_match(ctx.services, ctx.sessions, ctx.matches, user_id, match_id).await
}

pub async fn player_loaded(ctx: &Context<'_>, session: &Arc<Session>) -> BanchoResult<()> {
    let Some(match_id) = current_match(session).await else { return Ok(()) };
    let user_id = session.read(|s| s.user_id).await;
    match_engine::player_loaded(ctx.services, ctx.sessions, ctx.matches, user_id, match_id).await
}

pub async fn player_skip(ctx: &Context<'_>, session: &Arc<Session>) -> BanchoResult<()> {
    let Some(match_id) = current_match(session).await else { return Ok(()) };
    let user_id = session.read(|s| s.user_id).await;
    match_engine::player_skip(ctx.services, ctx.sessions, ctx.matches, user_id, match_id).await
}

pub async fn player_failed(ctx: &Context<'_>, session: &Arc<Session>) -> BanchoResult<()> {
    let Some(match_id) = current_match(session).await else { return Ok(()) };
    let user_id = session.read(|s| s.user_id).await;
    match_engine::player_failed(ctx.services, ctx.sessions, ctx.matches, user_id, match_id).await
}

pub async fn player_complete(ctx: &Context<'_>, session: &Arc<Session>) -> BanchoResult<()> {
    let Some(match_id) = current_match(session).await else { return Ok(()) };
    let user_id = session.read(|s| s.user_id).await;
    match_engine::player_complete(ctx.services, ctx.sessions, ctx.matches, user_id, match_id).await
}

pub async fn change_mods(ctx: &Context<'_>, session: &Arc<Session>, mods: u32) -> BanchoResult<()> {
    let Some(match_id) = current_match(session).await else { return Ok(()) };
    let user_id = session.read(|s| s.user_id).await;
    match_engine::change_mods(ctx.services, ctx.sessions, ctx.matches, user_id, match_id, mods).await
}

pub async fn transfer_host(ctx: &Context<'_>, session: &Arc<Session>, slot_id: i32) -> BanchoResult<()> {
    let Some(match_id) = current_match(session).await else { return Ok(()) };
    let host_user_id = session.read(|s| s.user_id).await;
    match_engine::transfer_host(ctx.services, ctx.sessions, ctx.matches, host_user_id, match_id, slot_id.max(0) as usize).await
}

pub async fn change_password(ctx: &Context<'_>, session: &Arc<Session>, password: String) -> BanchoResult<()> {
    let Some(match_id) = current_match(session).await else { return Ok(()) };
    let host_user_id = session.read(|s| s.user_id).await;
    match_engine::change_password(ctx.services, ctx.sessions, ctx.matches, host_user_id, match_id, password).await
}

pub async fn set_beatmap_availability(ctx: &Context<'_>, session: &Arc<Session>, has_beatmap: bool) -> BanchoResult<()> {
    let Some(match_id) = current_match(session).await else { return Ok(()) };
    let user_id = session.read(|s| s.user_id).await;
    match_engine::set_beatmap_availability(ctx.services, ctx.sessions, ctx.matches, user_id, match_id, has_beatmap).await
}

pub async fn relay_score_update(ctx: &Context<'_>, session: &Arc<Session>, raw: &[u8]) {
    let Some(match_id) = current_match(session).await else { return };
    match_engine::relay_score_update(ctx.services, ctx.sessions, session, match_id, raw).await;
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

    fn sample_match_data(name: &str) -> MatchData {
        use bancho_proto::match_data::SlotData;
        MatchData {
            match_id: 0,
            in_progress: false,
            match_type: 0,
            mods: 0,
            name: name.into(),
            password: String::new(),
            beatmap_name: "song".into(),
            beatmap_id: 1,
            beatmap_md5: "abc".into(),
            slots: std::array::from_fn(|_| SlotData::free()),
            host_user_id: 0,
            game_mode: 0,
            scoring_type: 0,
            team_type: 0,
            free_mods: false,
            seed: 0,
        }
    }

    #[tokio::test]
    async fn create_match_joins_host_and_announces_on_lobby() {
        let services = Services::in_memory();
        let sessions = SessionManager::new();
        let channels = ChannelRegistry::new();
        let matches = MatchRegistry::new();
        let ctx = Context { services: &services, sessions: &sessions, channels: &channels, matches: &matches };

        let host = new_session("t1", 1);
        sessions.insert(host.clone()).await;
        StreamRegistry::add(&services, streams::LOBBY).await;
        StreamRegistry::join(&services, streams::LOBBY, "t1").await;

        create_match(&ctx, &host, sample_match_data("room")).await.unwrap();
        assert_eq!(host.read(|s| s.match_id).await, Some(1));
    }

    #[tokio::test]
    async fn join_lobby_replays_existing_matches() {
        let services = Services::in_memory();
        let sessions = SessionManager::new();
        let channels = ChannelRegistry::new();
        let matches = MatchRegistry::new();
        let ctx = Context { services: &services, sessions: &sessions, channels: &channels, matches: &matches };

        matches.create(&services, "room".into(), "".into(), 1001, 0).await;
        let viewer = new_session("t1", 1001);
        sessions.insert(viewer.clone()).await;

        join_lobby(&ctx, &viewer).await.unwrap();
        assert!(!viewer.reset_queue().await.is_empty());
    }

    #[tokio::test]
    async fn toggle_ready_is_a_no_op_outside_a_match() {
        let services = Services::in_memory();
        let sessions = SessionManager::new();
        let channels = ChannelRegistry::new();
        let matches = MatchRegistry::new();
        let ctx = Context { services: &services, sessions: &sessions, channels: &channels, matches: &matches };

        let session = new_session("t1", 1);
        sessions.insert(session.clone()).await;
        assert!(toggle_ready(&ctx, &session).await.is_ok());
    }
}
