//! Chat core (C6): message routing between channels and private messages,
//! with the silence/permission/DM-blocking rules layered on top.

use crate::channel::ChannelRegistry;
use crate::error::BanchoResult;
use crate::services::Services;
use crate::session::{privileges, Session, SessionManager};
use crate::streams::{self, StreamRegistry};
use bancho_proto::server;
use std::sync::Arc;

pub const MAX_MESSAGE_BYTES: usize = 2000;

#[derive(Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Silenced,
    NoPermission,
    TargetUnknown,
    TargetBlockingDms,
}

/// `send(from, target, message)`. `target` starting with `#` resolves a
/// channel by name; otherwise it resolves a connected session by username.
pub async fn send(
    services: &Services,
    sessions: &SessionManager,
    channels: &ChannelRegistry,
    from: &Arc<Session>,
    target: &str,
    message: &str,
) -> BanchoResult<SendOutcome> {
    let now = services.clock.now();
    if from.is_silenced(now).await {
        from.enqueue(server::notification("You are silenced and cannot send messages.")).await?;
        return Ok(SendOutcome::Silenced);
    }

    let truncated: String = if message.len() > MAX_MESSAGE_BYTES {
        tracing::warn!(target, "message truncated to max length");
        message.chars().take(MAX_MESSAGE_BYTES).collect()
    } else {
        message.to_string()
    };

    let (from_username, from_id) = from.read(|s| (s.username.clone(), s.user_id)).await;

    let outcome = if let Some(channel_name) = target.strip_prefix('#').map(|_| target) {
        send_to_channel(services, sessions, channels, from, channel_name, &truncated, &from_username, from_id).await?
    } else {
        send_private(services, sessions, from, target, &truncated, &from_username, from_id).await?
    };

    if outcome == SendOutcome::Sent {
        from.push_message_line(format!("{from_username}: {truncated}")).await;
    }
    Ok(outcome)
}

async fn send_to_channel(
    services: &Services,
    sessions: &SessionManager,
    channels: &ChannelRegistry,
    from: &Arc<Session>,
    channel_name: &str,
    message: &str,
    from_username: &str,
    from_id: i32,
) -> BanchoResult<SendOutcome> {
    let Some(channel) = channels.get(channel_name) else {
        return Ok(SendOutcome::TargetUnknown);
    };
    let (privs, is_bot) = from.read(|s| (s.privileges, s.is_bot())).await;
    if !channel.public_write && !is_bot && !privileges::is_staff(privs) {
        from.enqueue(server::notification("You cannot speak in this channel.")).await?;
        return Ok(SendOutcome::NoPermission);
    }
    let bytes = server::send_message(from_username, message, channel_name, from_id);
    StreamRegistry::broadcast(services, sessions, &streams::chat_stream(channel_name), &bytes, Some(&from.token_id), None).await;
    Ok(SendOutcome::Sent)
}

async fn send_private(
    services: &Services,
    sessions: &SessionManager,
    from: &Arc<Session>,
    target_username: &str,
    message: &str,
    from_username: &str,
    from_id: i32,
) -> BanchoResult<SendOutcome> {
    let Some(recipient) = find_session_by_username(sessions, target_username).await else {
        return Ok(SendOutcome::TargetUnknown);
    };

    let (blocks_dms, recipient_user_id) = recipient.read(|s| (s.block_non_friends_dm, s.user_id)).await;
    if blocks_dms {
        let friend_ids = services.user_store.get_friend_list(recipient_user_id).await;
        if !friend_ids.contains(&from_id) {
            from.enqueue(server::target_blocking_dms(target_username)).await?;
            return Ok(SendOutcome::TargetBlockingDms);
        }
    }

    let bytes = server::send_message(from_username, message, target_username, from_id);
    recipient.enqueue(bytes).await?;
    Ok(SendOutcome::Sent)
}

fn normalize(username: &str) -> String {
    username.to_lowercase().replace(' ', "_")
}

async fn find_session_by_username(sessions: &SessionManager, username: &str) -> Option<Arc<Session>> {
    let safe_target = normalize(username);
    for session in sessions.all() {
        if session.read(|s| s.safe_username == safe_target).await {
            return Some(session);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::session::SessionState;

    fn new_session(token: &str, user_id: i32, privs: u32) -> Arc<Session> {
        Session::new(SessionState::new(token.to_string(), user_id, "sender".into(), privs, "127.0.0.1".into(), 19, 1_000))
    }

    fn public_channel(name: &str, public_write: bool) -> Channel {
        Channel {
            name: name.to_string(),
            description: "test channel".into(),
            public_read: true,
            public_write,
            instance: false,
        }
    }

    #[tokio::test]
    async fn silenced_sender_is_swallowed() {
        let services = Services::in_memory();
        let sessions = SessionManager::new();
        let channels = ChannelRegistry::new();
        channels.add(&services, public_channel("#osu", true)).await;

        let sender = new_session("t1", 7, privileges::USER_PUBLIC);
        sender.write(|s| s.silence_end_time = services_now(&services) + 1000).await;
        sessions.insert(sender.clone()).await;

        let outcome = send(&services, &sessions, &channels, &sender, "#osu", "hello").await.unwrap();
        assert_eq!(outcome, SendOutcome::Silenced);
    }

    #[tokio::test]
    async fn non_writer_cannot_speak_in_read_only_channel() {
        let services = Services::in_memory();
        let sessions = SessionManager::new();
        let channels = ChannelRegistry::new();
        channels.add(&services, public_channel("#announce", false)).await;

        let sender = new_session("t1", 7, privileges::USER_PUBLIC);
        sessions.insert(sender.clone()).await;

        let outcome = send(&services, &sessions, &channels, &sender, "#announce", "hello").await.unwrap();
        assert_eq!(outcome, SendOutcome::NoPermission);
    }

    #[tokio::test]
    async fn channel_broadcast_excepts_the_sender() {
        let services = Services::in_memory();
        let sessions = SessionManager::new();
        let channels = ChannelRegistry::new();
        channels.add(&services, public_channel("#osu", true)).await;

        let sender = new_session("t1", 7, privileges::USER_PUBLIC);
        sessions.insert(sender.clone()).await;
        channels.join(&services, &sessions, &sender, "#osu").await.unwrap();

        let listener = new_session("t2", 8, privileges::USER_PUBLIC);
        sessions.insert(listener.clone()).await;
        channels.join(&services, &sessions, &listener, "#osu").await.unwrap();
        sender.reset_queue().await;
        listener.reset_queue().await;

        let outcome = send(&services, &sessions, &channels, &sender, "#osu", "hi").await.unwrap();
        assert_eq!(outcome, SendOutcome::Sent);
        assert!(sender.reset_queue().await.is_empty());
        assert!(!listener.reset_queue().await.is_empty());
    }

    #[tokio::test]
    async fn dm_to_unknown_user_is_reported() {
        let services = Services::in_memory();
        let sessions = SessionManager::new();
        let channels = ChannelRegistry::new();
        let sender = new_session("t1", 7, privileges::USER_PUBLIC);
        sessions.insert(sender.clone()).await;

        let outcome = send(&services, &sessions, &channels, &sender, "ghost", "hi").await.unwrap();
        assert_eq!(outcome, SendOutcome::TargetUnknown);
    }

    fn services_now(services: &Services) -> i64 {
        services.clock.now()
    }
}
