//! Spectator relay (C8). `start_spectating`/`stop_spectating` live here
//! rather than as `Session` methods because they mutate the *host's*
//! `spectators` set and the shared `#spect_<uid>` channel — operations that
//! need the session table and channel registry, not just the caller's own
//! state.

use crate::channel::{Channel, ChannelRegistry};
use crate::error::BanchoResult;
use crate::services::Services;
use crate::session::{Session, SessionManager};
use crate::streams::{self, StreamRegistry};
use bancho_proto::server;
use std::sync::Arc;

fn spectator_channel_name(host_user_id: i32) -> String {
    format!("#spect_{host_user_id}")
}

/// `host_user_id < 0` is the client's own "explicit stop" sentinel, and a
/// host that no longer has a session is handled the same way: both just
/// tear down whatever the caller was previously spectating.
pub async fn start_spectating(
    services: &Services,
    sessions: &SessionManager,
    channels: &ChannelRegistry,
    spectator: &Arc<Session>,
    host_user_id: i32,
) -> BanchoResult<()> {
    stop_spectating(services, sessions, channels, spectator).await?;
    if host_user_id < 0 {
        return Ok(());
    }
    let Some(host) = sessions.get_by_user(host_user_id).await else {
        return Ok(());
    };

    let stream_name = streams::spectator_stream(host_user_id);
    StreamRegistry::add(services, &stream_name).await;
    StreamRegistry::join(services, &stream_name, &spectator.token_id).await;
    spectator.join_stream(&stream_name).await;

    spectator
        .write(|s| {
            s.spectating_token_id = Some(host.token_id.clone());
            s.spectating_user_id = Some(host_user_id);
        })
        .await;
    let first_spectator = host
        .write(|s| {
            s.spectators.insert(spectator.token_id.clone());
            s.spectators.len() == 1
        })
        .await;

    let spectator_user_id = spectator.read(|s| s.user_id).await;
    host.enqueue(server::spectator_joined(spectator_user_id)).await?;

    let channel_name = spectator_channel_name(host_user_id);
    if channels.get(&channel_name).is_none() {
        let host_username = host.read(|s| s.username.clone()).await;
        channels
            .add(
                services,
                Channel {
                    name: channel_name.clone(),
                    description: format!("Spectator lobby for host {host_username}"),
                    public_read: true,
                    public_write: false,
                    instance: true,
                },
            )
            .await;
    }
    channels.join(services, sessions, spectator, &channel_name).await?;
    if first_spectator {
        StreamRegistry::join(services, &stream_name, &host.token_id).await;
        host.join_stream(&stream_name).await;
        channels.join(services, sessions, &host, &channel_name).await?;
    }

    StreamRegistry::broadcast(services, sessions, &stream_name, &server::fellow_spectator_joined(spectator_user_id), Some(&spectator.token_id), None).await;

    let existing = host.read(|s| s.spectators.clone()).await;
    for token in existing {
        if token == spectator.token_id {
            continue;
        }
        if let Some(other) = sessions.get(&token).await {
            let uid = other.read(|s| s.user_id).await;
            spectator.enqueue(server::fellow_spectator_joined(uid)).await?;
        }
    }
    Ok(())
}

pub async fn stop_spectating(services: &Services, sessions: &SessionManager, channels: &ChannelRegistry, spectator: &Arc<Session>) -> BanchoResult<()> {
    let (host_token, host_user_id) = spectator.read(|s| (s.spectating_token_id.clone(), s.spectating_user_id)).await;
    let Some(host_user_id) = host_user_id else { return Ok(()) };
    let channel_name = spectator_channel_name(host_user_id);
    let stream_name = streams::spectator_stream(host_user_id);

    StreamRegistry::leave(services, &stream_name, &spectator.token_id).await;
    spectator.leave_stream(&stream_name).await;
    channels.part(services, spectator, &channel_name).await?;

    let spectator_user_id = spectator.read(|s| s.user_id).await;
    if let Some(host_token) = host_token {
        if let Some(host) = sessions.get(&host_token).await {
            let now_empty = host
                .write(|s| {
                    s.spectators.remove(&spectator.token_id);
                    s.spectators.is_empty()
                })
                .await;
            host.enqueue(server::spectator_left(spectator_user_id)).await?;

            let remaining = host.read(|s| s.spectators.clone()).await;
            for token in &remaining {
                if let Some(other) = sessions.get(token).await {
                    other.enqueue(server::fellow_spectator_left(spectator_user_id)).await?;
                }
            }

            if now_empty {
                channels.part(services, &host, &channel_name).await?;
                StreamRegistry::leave(services, &stream_name, &host.token_id).await;
                host.leave_stream(&stream_name).await;
            }
        }
    }

    spectator
        .write(|s| {
            s.spectating_token_id = None;
            s.spectating_user_id = None;
        })
        .await;
    Ok(())
}

/// Host disconnect forces every follower through its own `stop_spectating`.
pub async fn force_stop_all_followers(services: &Services, sessions: &SessionManager, channels: &ChannelRegistry, host: &Arc<Session>) -> BanchoResult<()> {
    let followers = host.read(|s| s.spectators.clone()).await;
    for token in followers {
        if let Some(follower) = sessions.get(&token).await {
            stop_spectating(services, sessions, channels, &follower).await?;
        }
    }
    Ok(())
}

/// Relays inbound `spectateFrames` to every follower except the host itself.
pub async fn relay_frames(services: &Services, sessions: &SessionManager, host: &Arc<Session>, data: &[u8]) {
    let host_user_id = host.read(|s| s.user_id).await;
    StreamRegistry::broadcast(services, sessions, &streams::spectator_stream(host_user_id), &server::spectate_frames(data), Some(&host.token_id), None).await;
}

/// `cant_spectate` from the host notifies every follower directly, since the
/// host itself is excluded from its own spectator stream membership checks.
pub async fn cant_spectate(services: &Services, sessions: &SessionManager, host: &Arc<Session>) -> BanchoResult<()> {
    let _ = services;
    let host_user_id = host.read(|s| s.user_id).await;
    let followers = host.read(|s| s.spectators.clone()).await;
    let bytes = server::no_song_spectator(host_user_id);
    for token in followers {
        if let Some(follower) = sessions.get(&token).await {
            follower.enqueue(bytes.clone()).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{privileges, SessionState};

    fn new_session(token: &str, user_id: i32, username: &str) -> Arc<Session> {
        Session::new(SessionState::new(token.to_string(), user_id, username.to_string(), privileges::USER_PUBLIC, "127.0.0.1".into(), 19, 1_000))
    }

    #[tokio::test]
    async fn start_and_stop_spectating_creates_and_clears_instance_channel() {
        let services = Services::in_memory();
        let sessions = SessionManager::new();
        let channels = ChannelRegistry::new();

        let host = new_session("host", 1, "host");
        sessions.insert(host.clone()).await;
        let fan = new_session("fan", 2, "fan");
        sessions.insert(fan.clone()).await;

        start_spectating(&services, &sessions, &channels, &fan, 1).await.unwrap();
        assert!(channels.get("#spect_1").is_some());
        assert_eq!(host.read(|s| s.spectators.len()).await, 1);

        stop_spectating(&services, &sessions, &channels, &fan).await.unwrap();
        assert!(channels.get("#spect_1").is_none());
        assert_eq!(host.read(|s| s.spectators.len()).await, 0);
    }

    #[tokio::test]
    async fn negative_user_id_is_treated_as_explicit_stop() {
        let services = Services::in_memory();
        let sessions = SessionManager::new();
        let channels = ChannelRegistry::new();

        let host = new_session("host", 1, "host");
        sessions.insert(host.clone()).await;
        let fan = new_session("fan", 2, "fan");
        sessions.insert(fan.clone()).await;

        start_spectating(&services, &sessions, &channels, &fan, 1).await.unwrap();
        start_spectating(&services, &sessions, &channels, &fan, -1).await.unwrap();
        assert_eq!(fan.read(|s| s.spectating_user_id).await, None);
        assert_eq!(host.read(|s| s.spectators.len()).await, 0);
    }

    #[tokio::test]
    async fn host_disconnect_stops_every_follower() {
        let services = Services::in_memory();
        let sessions = SessionManager::new();
        let channels = ChannelRegistry::new();

        let host = new_session("host", 1, "host");
        sessions.insert(host.clone()).await;
        let fan1 = new_session("fan1", 2, "fan1");
        sessions.insert(fan1.clone()).await;
        let fan2 = new_session("fan2", 3, "fan2");
        sessions.insert(fan2.clone()).await;

        start_spectating(&services, &sessions, &channels, &fan1, 1).await.unwrap();
        start_spectating(&services, &sessions, &channels, &fan2, 1).await.unwrap();

        force_stop_all_followers(&services, &sessions, &channels, &host).await.unwrap();
        assert_eq!(fan1.read(|s| s.spectating_user_id).await, None);
        assert_eq!(fan2.read(|s| s.spectating_user_id).await, None);
    }
}
