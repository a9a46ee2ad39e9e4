//! Inbound packet dispatch (C9): decode by packet id, then route under the
//! session's own processing lock. The protocol is a closed enumeration
//! (`bancho_proto::client::parse` already resolves id → typed payload), so
//! routing is a single match rather than a string-keyed handler registry.

use crate::channel::ChannelRegistry;
use crate::error::{BanchoError, BanchoResult};
use crate::handlers;
use crate::locking::{self, LockDomain};
use crate::match_engine::MatchRegistry;
use crate::services::Services;
use crate::session::{Session, SessionManager};
use bancho_proto::client::{self, ClientPacket};
use bancho_proto::{server, ProtoError};
use std::sync::Arc;

pub struct Context<'a> {
    pub services: &'a Services,
    pub sessions: &'a SessionManager,
    pub channels: &'a ChannelRegistry,
    pub matches: &'a MatchRegistry,
}

/// Decode and route one inbound packet for `session`. An unknown packet id
/// is logged and skipped; a `LockTimeout` is reported to the client without
/// closing the connection; anything else propagates so the caller's read
/// loop can decide whether to close.
pub async fn dispatch(ctx: &Context<'_>, session: &Arc<Session>, packet_id: u16, payload: &[u8]) -> BanchoResult<()> {
    let packet = match client::parse(packet_id, payload) {
        Ok(packet) => packet,
        Err(ProtoError::UnknownPacketId(id)) => {
            tracing::debug!(packet_id = id, "unknown packet id, skipping");
            return Ok(());
        }
        Err(e) => return Err(BanchoError::Proto(e)),
    };

    let lock_name = format!("{}:processing", session.token_id);
    let guard = match locking::acquire(
        ctx.services.kv.as_ref(),
        LockDomain::Session,
        &lock_name,
        ctx.services.lock_config.session_lock_ttl_ms,
        ctx.services.lock_config.lock_acquire_retries,
        ctx.services.lock_config.lock_acquire_base_backoff_ms,
    )
    .await
    {
        Ok(guard) => guard,
        Err(BanchoError::LockTimeout { name }) => {
            tracing::warn!(lock = name, "processing lock timed out");
            session.enqueue(server::notification("Server is busy, please try again.")).await?;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let result = route(ctx, session, packet).await;
    locking::release(ctx.services.kv.as_ref(), guard).await;
    result
}

async fn route(ctx: &Context<'_>, session: &Arc<Session>, packet: ClientPacket) -> BanchoResult<()> {
    match packet {
        ClientPacket::Ping => {
            session.update_ping(ctx.services).await;
            Ok(())
        }
        ClientPacket::Logout => handlers::connection::logout(ctx, session).await,
        ClientPacket::RequestStatusUpdate => handlers::connection::request_status_update(ctx, session).await,
        ClientPacket::ChangeAction { action_id, action_text, action_md5, action_mods, game_mode, beatmap_id } => {
            handlers::connection::change_action(ctx, session, action_id, action_text, action_md5, action_mods, game_mode, beatmap_id).await
        }
        ClientPacket::SetAwayMessage { message } => handlers::connection::set_away_message(session, message).await,
        ClientPacket::ToggleBlockNonFriendDm { value } => handlers::connection::toggle_block_non_friend_dm(session, value).await,
        ClientPacket::ChangeProtocolVersion { version } => handlers::connection::change_protocol_version(session, version).await,
        ClientPacket::UserPresenceRequestAll | ClientPacket::UserPresenceRequest { .. } => Ok(()),

        ClientPacket::SendPublicMessage { target, message } => handlers::messaging::send_public(ctx, session, &target, &message).await,
        ClientPacket::SendPrivateMessage { target, message } => handlers::messaging::send_private(ctx, session, &target, &message).await,
        ClientPacket::ChannelJoin { channel } => handlers::messaging::join_channel(ctx, session, &channel).await,
        ClientPacket::ChannelPart { channel } => handlers::messaging::part_channel(ctx, session, &channel).await,

        ClientPacket::StartSpectating { user_id } => handlers::spectating::start(ctx, session, user_id).await,
        ClientPacket::StopSpectating => handlers::spectating::stop(ctx, session).await,
        ClientPacket::SpectateFrames { data } => handlers::spectating::relay_frames(ctx, session, &data).await,
        ClientPacket::CantSpectate => handlers::spectating::cant_spectate(ctx, session).await,

        ClientPacket::JoinLobby => handlers::multiplayer::join_lobby(ctx, session).await,
        ClientPacket::PartLobby => handlers::multiplayer::part_lobby(ctx, session).await,
        ClientPacket::CreateMatch { data } => handlers::multiplayer::create_match(ctx, session, data).await,
        ClientPacket::JoinMatch { match_id, password } => handlers::multiplayer::join_match(ctx, session, match_id, &password).await,
        ClientPacket::PartMatch => handlers::multiplayer::part_match(ctx, session).await,
        ClientPacket::MatchChangeSettings { data } => handlers::multiplayer::change_settings(ctx, session, data).await,
        ClientPacket::MatchReady => handlers::multiplayer::toggle_ready(ctx, session).await,
        ClientPacket::MatchNotReady => handlers::multiplayer::toggle_ready(ctx, session).await,
        ClientPacket::MatchLock { slot_id } => handlers::multiplayer::toggle_lock(ctx, session, slot_id).await,
        ClientPacket::MatchChangeSlot { slot_id } => handlers::multiplayer::change_slot(ctx, session, slot_id).await,
        ClientPacket::ChangeTeam => handlers::multiplayer::change_team(ctx, session).await,
        ClientPacket::MatchStart => handlers::multiplayer::start_match(ctx, session).await,
        ClientPacket::MatchLoadComplete => handlers::multiplayer::player_loaded(ctx, session).await,
        ClientPacket::MatchSkipRequest => handlers::multiplayer::player_skip(ctx, session).await,
        ClientPacket::MatchFailed => handlers::multiplayer::player_failed(ctx, session).await,
        ClientPacket::MatchComplete => handlers::multiplayer::player_complete(ctx, session).await,
        ClientPacket::MatchChangeMods { mods } => handlers::multiplayer::change_mods(ctx, session, mods).await,
        ClientPacket::MatchTransferHost { slot_id } => handlers::multiplayer::transfer_host(ctx, session, slot_id).await,
        ClientPacket::MatchChangePassword { data } => handlers::multiplayer::change_password(ctx, session, data.password).await,
        ClientPacket::MatchNoBeatmap => handlers::multiplayer::set_beatmap_availability(ctx, session, false).await,
        ClientPacket::MatchHasBeatmap => handlers::multiplayer::set_beatmap_availability(ctx, session, true).await,
        ClientPacket::MatchScoreUpdate { raw } => {
            handlers::multiplayer::relay_score_update(ctx, session, &raw).await;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{privileges, SessionState};
    use bancho_proto::fields::Writer;
    use bancho_proto::ids::client as id;

    fn new_ctx_services() -> (Services, SessionManager, ChannelRegistry, MatchRegistry) {
        (Services::in_memory(), SessionManager::new(), ChannelRegistry::new(), MatchRegistry::new())
    }

    #[tokio::test]
    async fn unknown_packet_id_is_skipped_without_error() {
        let (services, sessions, channels, matches) = new_ctx_services();
        let ctx = Context { services: &services, sessions: &sessions, channels: &channels, matches: &matches };
        let session = Session::new(SessionState::new("t1".into(), 1, "user".into(), privileges::USER_PUBLIC, "127.0.0.1".into(), 19, 1_000));
        sessions.insert(session.clone()).await;

        assert!(dispatch(&ctx, &session, 65000, &[]).await.is_ok());
    }

    #[tokio::test]
    async fn ping_is_a_no_op() {
        let (services, sessions, channels, matches) = new_ctx_services();
        let ctx = Context { services: &services, sessions: &sessions, channels: &channels, matches: &matches };
        let session = Session::new(SessionState::new("t1".into(), 1, "user".into(), privileges::USER_PUBLIC, "127.0.0.1".into(), 19, 1_000));
        sessions.insert(session.clone()).await;

        assert!(dispatch(&ctx, &session, id::PING, &[]).await.is_ok());
    }

    #[tokio::test]
    async fn logout_removes_the_session() {
        let (services, sessions, channels, matches) = new_ctx_services();
        let ctx = Context { services: &services, sessions: &sessions, channels: &channels, matches: &matches };
        let session = Session::new(SessionState::new("t1".into(), 1, "user".into(), privileges::USER_PUBLIC, "127.0.0.1".into(), 19, 1_000));
        sessions.insert(session.clone()).await;

        dispatch(&ctx, &session, id::LOGOUT, &[]).await.unwrap();
        assert!(sessions.get("t1").await.is_none());
    }

    #[tokio::test]
    async fn change_action_updates_presence_fields() {
        let (services, sessions, channels, matches) = new_ctx_services();
        let ctx = Context { services: &services, sessions: &sessions, channels: &channels, matches: &matches };
        let session = Session::new(SessionState::new("t1".into(), 1, "user".into(), privileges::USER_PUBLIC, "127.0.0.1".into(), 19, 1_000));
        sessions.insert(session.clone()).await;

        let mut w = Writer::new();
        w.u8(2).string("Playing a song").string("abc123").i32(16).u8(0).i32(55);
        dispatch(&ctx, &session, id::CHANGE_ACTION, &w.into_bytes()).await.unwrap();
        assert_eq!(session.read(|s| s.action_id).await, 2);
        assert_eq!(session.read(|s| s.beatmap_id).await, 55);
    }
}
