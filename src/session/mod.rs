//! Per-connected-client state, keyed by an opaque login token. A [`Session`] is shared
//! behind an `Arc` so the dispatcher, stream broadcasts, and periodic
//! workers can all reach the same instance; [`SessionManager`] is the
//! process-local index from `token_id` to that `Arc`.
//!
//! The outbound queue lives behind its own `Mutex`, separate from the rest
//! of the session's fields, so a broadcast's `enqueue` never has to wait on
//! whatever handler currently holds the session's KV-backed processing
//! lock (the bufferLock vs. processing-lock split in the concurrency
//! model).

pub mod privileges;

use crate::error::{BanchoError, BanchoResult};
use crate::services::Services;
use crate::user_store::UserStats;
use dashmap::DashMap;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

pub const MAX_QUEUE_BYTES: usize = 10 * 1024 * 1024;
pub const MESSAGES_BUFFER_CAPACITY: usize = 100;
pub const MESSAGE_MAX_CHARS: usize = 1000;
pub const SPAM_THRESHOLD: u32 = 10;
pub const SPAM_SILENCE_SECONDS: i64 = 600;

#[derive(Debug, Clone)]
pub struct SessionState {
    pub token_id: String,
    pub user_id: i32,
    pub username: String,
    pub safe_username: String,
    pub privileges: u32,
    pub whitelist: u8,
    pub ip: String,
    pub irc: bool,
    pub tournament: bool,
    pub utc_offset: u8,
    pub login_time: i64,
    pub ping_time: i64,
    pub silence_end_time: i64,
    pub protocol_version: i32,
    pub joined_streams: HashSet<String>,
    pub joined_channels: HashSet<String>,
    pub match_id: Option<u16>,
    pub spectating_token_id: Option<String>,
    pub spectating_user_id: Option<i32>,
    pub spectators: HashSet<String>,
    pub longitude: f32,
    pub latitude: f32,
    pub country: u8,
    pub action_id: u8,
    pub action_text: String,
    pub action_md5: String,
    pub action_mods: i32,
    pub game_mode: u8,
    pub relax: bool,
    pub autopilot: bool,
    pub beatmap_id: i32,
    pub stats: UserStats,
    pub spam_rate: u32,
    pub away_message: Option<String>,
    pub sent_away: HashSet<i32>,
    pub messages_buffer: VecDeque<String>,
    pub block_non_friends_dm: bool,
}

impl SessionState {
    pub fn new(token_id: String, user_id: i32, username: String, privileges: u32, ip: String, protocol_version: i32, now: i64) -> Self {
        let safe_username = username.to_lowercase().replace(' ', "_");
        Self {
            token_id,
            user_id,
            username,
            safe_username,
            privileges,
            whitelist: 0,
            ip,
            irc: false,
            tournament: false,
            utc_offset: 0,
            login_time: now,
            ping_time: now,
            silence_end_time: 0,
            protocol_version,
            joined_streams: HashSet::new(),
            joined_channels: HashSet::new(),
            match_id: None,
            spectating_token_id: None,
            spectating_user_id: None,
            spectators: HashSet::new(),
            longitude: 0.0,
            latitude: 0.0,
            country: 0,
            action_id: 0,
            action_text: String::new(),
            action_md5: String::new(),
            action_mods: 0,
            game_mode: 0,
            relax: false,
            autopilot: false,
            beatmap_id: 0,
            stats: UserStats::default(),
            spam_rate: 0,
            away_message: None,
            sent_away: HashSet::new(),
            messages_buffer: VecDeque::new(),
            block_non_friends_dm: false,
        }
    }

    pub fn is_bot(&self) -> bool {
        self.user_id < privileges::BOT_USER_ID_CEILING
    }
}

pub struct Session {
    pub token_id: String,
    queue: Mutex<Vec<u8>>,
    state: RwLock<SessionState>,
}

impl Session {
    pub fn new(state: SessionState) -> Arc<Self> {
        Arc::new(Self {
            token_id: state.token_id.clone(),
            queue: Mutex::new(Vec::new()),
            state: RwLock::new(state),
        })
    }

    pub async fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&SessionState) -> R,
    {
        f(&*self.state.read().await)
    }

    pub async fn write<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut SessionState) -> R,
    {
        f(&mut *self.state.write().await)
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state.read().await.clone()
    }

    /// A no-op for IRC bridges and bot accounts, since neither ever drains
    /// a queue. Never lets the queue grow past 10 MiB.
    pub async fn enqueue(&self, bytes: Vec<u8>) -> BanchoResult<()> {
        let (skip, token_id) = self.read(|s| (s.irc || s.is_bot(), s.token_id.clone())).await;
        if skip {
            return Ok(());
        }
        let mut queue = self.queue.lock().await;
        if queue.len() + bytes.len() > MAX_QUEUE_BYTES {
            return Err(BanchoError::QueueOverflow(token_id));
        }
        queue.extend_from_slice(&bytes);
        Ok(())
    }

    pub async fn reset_queue(&self) -> Vec<u8> {
        let mut queue = self.queue.lock().await;
        std::mem::take(&mut *queue)
    }

    pub async fn join_channel(&self, name: &str) {
        self.write(|s| { s.joined_channels.insert(name.to_string()); }).await;
    }

    pub async fn part_channel(&self, name: &str) {
        self.write(|s| { s.joined_channels.remove(name); }).await;
    }

    pub async fn join_stream(&self, name: &str) {
        self.write(|s| { s.joined_streams.insert(name.to_string()); }).await;
    }

    pub async fn leave_stream(&self, name: &str) {
        self.write(|s| { s.joined_streams.remove(name); }).await;
    }

    pub async fn set_location(&self, latitude: f32, longitude: f32, country: u8) {
        self.write(|s| {
            s.latitude = latitude;
            s.longitude = longitude;
            s.country = country;
        })
        .await;
    }

    /// A session is silenced exactly while `silence_end_time > now`.
    pub async fn is_silenced(&self, now: i64) -> bool {
        self.read(|s| s.silence_end_time > now).await
    }

    /// Persists the new `silence_end_time`, updates the session, and
    /// enqueues `silenceEndTime` to the silenced user. The `userSilenced`
    /// broadcast on `main` is the caller's responsibility (it needs the
    /// stream registry, which a bare `Session` doesn't have).
    pub async fn silence(&self, services: &Services, seconds: i64, reason: &str, author_uid: i32) -> BanchoResult<()> {
        let user_id = self.read(|s| s.user_id).await;
        let end = services.clock.now() + seconds;
        services.user_store.silence(user_id, end, reason, author_uid).await;
        self.write(|s| s.silence_end_time = end).await;
        self.enqueue(bancho_proto::server::silence_end_time(seconds as i32)).await?;
        Ok(())
    }

    /// Returns `true` exactly when this call crossed the spam threshold
    /// and triggered an auto-silence.
    pub async fn spam_protect(&self, services: &Services) -> BanchoResult<bool> {
        let crossed = self
            .write(|s| {
                s.spam_rate += 1;
                s.spam_rate > SPAM_THRESHOLD
            })
            .await;
        if crossed {
            let user_id = self.read(|s| s.user_id).await;
            self.silence(services, SPAM_SILENCE_SECONDS, "Spamming (auto spam protection)", user_id).await?;
        }
        Ok(crossed)
    }

    pub async fn decay_spam(&self) {
        self.write(|s| s.spam_rate = 0).await;
    }

    pub async fn update_ping(&self, services: &Services) {
        let now = services.clock.now();
        self.write(|s| s.ping_time = now).await;
    }

    pub async fn update_cached_stats(&self, stats: UserStats) {
        self.write(|s| s.stats = stats).await;
    }

    pub async fn check_restricted(&self, services: &Services) -> bool {
        let user_id = self.read(|s| s.user_id).await;
        services.user_store.is_restricted(user_id).await
    }

    pub async fn check_banned(&self, services: &Services) -> bool {
        let user_id = self.read(|s| s.user_id).await;
        services.user_store.is_banned(user_id).await
    }

    /// C6's message buffer ring: at most 100 rendered lines, each truncated
    /// to 1000 chars.
    pub async fn push_message_line(&self, line: String) {
        let truncated: String = line.chars().take(MESSAGE_MAX_CHARS).collect();
        self.write(|s| {
            if s.messages_buffer.len() >= MESSAGES_BUFFER_CAPACITY {
                s.messages_buffer.pop_front();
            }
            s.messages_buffer.push_back(truncated);
        })
        .await;
    }
}

#[derive(Default)]
pub struct SessionManager {
    by_token: DashMap<String, Arc<Session>>,
    by_user: DashMap<i32, String>,
    user_of_token: DashMap<String, i32>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evicts any prior session for this `user_id` outside tournament mode
    /// before inserting the new one; returns the evicted session, if any,
    /// so the caller can run its full logout path on it.
    pub async fn insert(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        let (user_id, tournament) = session.read(|s| (s.user_id, s.tournament)).await;
        let evicted = if tournament {
            None
        } else if let Some(prev_token) = self.by_user.get(&user_id).map(|e| e.clone()) {
            self.by_token.remove(&prev_token).map(|(_, s)| s)
        } else {
            None
        };
        if let Some(ref evicted) = evicted {
            self.user_of_token.remove(&evicted.token_id);
        }
        self.by_user.insert(user_id, session.token_id.clone());
        self.user_of_token.insert(session.token_id.clone(), user_id);
        self.by_token.insert(session.token_id.clone(), session);
        evicted
    }

    pub async fn get(&self, token_id: &str) -> Option<Arc<Session>> {
        self.by_token.get(token_id).map(|s| s.clone())
    }

    pub async fn get_by_user(&self, user_id: i32) -> Option<Arc<Session>> {
        let token_id = self.by_user.get(&user_id).map(|e| e.clone())?;
        self.get(&token_id).await
    }

    pub fn remove(&self, token_id: &str) -> Option<Arc<Session>> {
        let removed = self.by_token.remove(token_id).map(|(_, s)| s);
        if let Some((_, user_id)) = self.user_of_token.remove(token_id) {
            self.by_user.remove_if(&user_id, |_, t| t == token_id);
        }
        removed
    }

    pub fn all(&self) -> Vec<Arc<Session>> {
        self.by_token.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::Services;

    fn state(token: &str, user_id: i32) -> SessionState {
        SessionState::new(token.to_string(), user_id, "host".into(), privileges::USER_PUBLIC, "127.0.0.1".into(), 19, 1_000)
    }

    #[tokio::test]
    async fn enqueue_respects_bot_and_irc_no_op() {
        let session = Session::new(state("t1", 999));
        session.enqueue(vec![1, 2, 3]).await.unwrap();
        assert!(session.reset_queue().await.is_empty());

        let session = Session::new(state("t2", 5000));
        session.enqueue(vec![1, 2, 3]).await.unwrap();
        assert_eq!(session.reset_queue().await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn enqueue_overflow_is_rejected() {
        let session = Session::new(state("t1", 5000));
        let huge = vec![0u8; MAX_QUEUE_BYTES + 1];
        assert!(session.enqueue(huge).await.is_err());
    }

    #[tokio::test]
    async fn spam_protect_silences_after_threshold() {
        let services = Services::in_memory();
        let session = Session::new(state("t1", 5000));
        let mut triggered = false;
        for _ in 0..SPAM_THRESHOLD + 1 {
            triggered = session.spam_protect(&services).await.unwrap();
        }
        assert!(triggered);
        assert!(session.is_silenced(services.clock.now()).await);
    }

    #[tokio::test]
    async fn manager_evicts_prior_session_for_same_user() {
        let manager = SessionManager::new();
        let s1 = Session::new(state("t1", 7));
        manager.insert(s1.clone()).await;
        let s2 = Session::new(state("t2", 7));
        let evicted = manager.insert(s2.clone()).await;
        assert_eq!(evicted.unwrap().token_id, "t1");
        assert!(manager.get("t1").await.is_none());
        assert_eq!(manager.get_by_user(7).await.unwrap().token_id, "t2");
    }

    #[tokio::test]
    async fn manager_does_not_evict_tournament_sessions() {
        let manager = SessionManager::new();
        let mut first_state = state("t1", 7);
        first_state.tournament = true;
        let s1 = Session::new(first_state);
        manager.insert(s1).await;

        let mut second_state = state("t2", 7);
        second_state.tournament = true;
        let s2 = Session::new(second_state);
        let evicted = manager.insert(s2).await;
        assert!(evicted.is_none());
        assert!(manager.get("t1").await.is_some());
    }
}
