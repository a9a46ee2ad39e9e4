//! Named chat channels (C5). Channel definitions live in an in-process
//! registry (they're server configuration, not per-replica shared state);
//! membership and fan-out go through the KV-backed [`StreamRegistry`].

use crate::error::BanchoResult;
use crate::services::Services;
use crate::session::privileges;
use crate::session::{Session, SessionManager};
use crate::streams::{self, StreamRegistry};
use bancho_proto::server;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Channel {
    pub name: String,
    pub description: String,
    pub public_read: bool,
    pub public_write: bool,
    pub instance: bool,
}

#[derive(Default)]
pub struct ChannelRegistry {
    channels: DashMap<String, Channel>,
}

pub enum JoinOutcome {
    JoinOk,
    AlreadyJoined,
    NoPermission,
    Unknown,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, services: &Services, channel: Channel) {
        let name = channel.name.clone();
        streams::StreamRegistry::add(services, &streams::chat_stream(&name)).await;
        self.channels.insert(name, channel);
    }

    pub fn get(&self, name: &str) -> Option<Channel> {
        self.channels.get(name).map(|c| c.clone())
    }

    /// Every publicly-readable, non-instance channel, in the order login
    /// replays `channelInfo` for the newly connected client.
    pub fn public_channels(&self) -> Vec<Channel> {
        self.channels
            .iter()
            .filter(|c| c.public_read && !c.instance)
            .map(|c| c.value().clone())
            .collect()
    }

    pub async fn remove(&self, services: &Services, name: &str) {
        self.channels.remove(name);
        StreamRegistry::remove(services, &streams::chat_stream(name)).await;
    }

    fn can_join(channel: &Channel, session_privileges: u32, is_bot: bool) -> bool {
        if is_bot {
            return true;
        }
        if channel.name == "#premium" && session_privileges & privileges::USER_PREMIUM == 0 {
            return false;
        }
        if channel.name == "#supporter" && session_privileges & privileges::USER_DONOR == 0 {
            return false;
        }
        if !channel.public_read && !privileges::is_staff(session_privileges) {
            return false;
        }
        true
    }

    /// Joining enforces the premium/supporter/staff rules, sends
    /// `channelJoinSuccess` to the actor, and (for public channels)
    /// refreshes `channelInfo` on `main`.
    pub async fn join(
        &self,
        services: &Services,
        sessions: &SessionManager,
        session: &Arc<Session>,
        name: &str,
    ) -> BanchoResult<JoinOutcome> {
        let Some(channel) = self.get(name) else {
            return Ok(JoinOutcome::Unknown);
        };
        let (privs, is_bot, already) = session
            .read(|s| (s.privileges, s.is_bot(), s.joined_channels.contains(name)))
            .await;
        if already {
            return Ok(JoinOutcome::AlreadyJoined);
        }
        if !Self::can_join(&channel, privs, is_bot) {
            return Ok(JoinOutcome::NoPermission);
        }

        session.join_channel(name).await;
        let stream_name = streams::chat_stream(name);
        StreamRegistry::join(services, &stream_name, &session.token_id).await;
        session.join_stream(&stream_name).await;
        session.enqueue(server::channel_join_success(name)).await?;

        if channel.public_read {
            self.broadcast_channel_info(services, sessions, &channel).await?;
        }
        Ok(JoinOutcome::JoinOk)
    }

    /// Parting an `instance` channel whose membership reaches zero removes
    /// the channel and its backing stream.
    pub async fn part(&self, services: &Services, session: &Arc<Session>, name: &str) -> BanchoResult<()> {
        let Some(channel) = self.get(name) else {
            return Ok(());
        };
        session.part_channel(name).await;
        let stream_name = streams::chat_stream(name);
        StreamRegistry::leave(services, &stream_name, &session.token_id).await;
        session.leave_stream(&stream_name).await;
        session.enqueue(server::channel_kicked(name)).await?;

        if channel.instance && StreamRegistry::client_count(services, &stream_name).await == 0 {
            self.remove(services, name).await;
        }
        Ok(())
    }

    async fn broadcast_channel_info(&self, services: &Services, sessions: &SessionManager, channel: &Channel) -> BanchoResult<()> {
        let member_count = StreamRegistry::client_count(services, &streams::chat_stream(&channel.name)).await as u16;
        let bytes = server::channel_info(&channel.name, &channel.description, member_count);
        StreamRegistry::broadcast(services, sessions, streams::MAIN, &bytes, None, None).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;

    fn public_channel(name: &str) -> Channel {
        Channel {
            name: name.to_string(),
            description: "test channel".into(),
            public_read: true,
            public_write: true,
            instance: false,
        }
    }

    fn new_session(token: &str, user_id: i32, privs: u32) -> Arc<Session> {
        Session::new(SessionState::new(token.to_string(), user_id, "host".into(), privs, "127.0.0.1".into(), 19, 1_000))
    }

    #[tokio::test]
    async fn join_and_part_public_channel() {
        let services = Services::in_memory();
        let sessions = SessionManager::new();
        let registry = ChannelRegistry::new();
        registry.add(&services, public_channel("#osu")).await;

        let session = new_session("t1", 7, privileges::USER_PUBLIC);
        sessions.insert(session.clone()).await;

        let outcome = registry.join(&services, &sessions, &session, "#osu").await.unwrap();
        assert!(matches!(outcome, JoinOutcome::JoinOk));
        assert_eq!(StreamRegistry::client_count(&services, &streams::chat_stream("#osu")).await, 1);

        registry.part(&services, &session, "#osu").await.unwrap();
        assert_eq!(StreamRegistry::client_count(&services, &streams::chat_stream("#osu")).await, 0);
    }

    #[tokio::test]
    async fn non_staff_cannot_join_private_channel() {
        let services = Services::in_memory();
        let sessions = SessionManager::new();
        let registry = ChannelRegistry::new();
        registry
            .add(&services, Channel { public_read: false, ..public_channel("#staff") })
            .await;

        let session = new_session("t1", 7, privileges::USER_PUBLIC);
        sessions.insert(session.clone()).await;
        let outcome = registry.join(&services, &sessions, &session, "#staff").await.unwrap();
        assert!(matches!(outcome, JoinOutcome::NoPermission));
    }

    #[tokio::test]
    async fn instance_channel_is_removed_when_empty() {
        let services = Services::in_memory();
        let sessions = SessionManager::new();
        let registry = ChannelRegistry::new();
        registry
            .add(&services, Channel { instance: true, ..public_channel("#spect_7") })
            .await;

        let session = new_session("t1", 5, privileges::USER_PUBLIC);
        sessions.insert(session.clone()).await;
        registry.join(&services, &sessions, &session, "#spect_7").await.unwrap();
        registry.part(&services, &session, "#spect_7").await.unwrap();
        assert!(registry.get("#spect_7").is_none());
    }
}
