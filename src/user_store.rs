//! External collaborator for account data that lives outside this service
//! (the website's database, in a real deployment). [`InMemoryUserStore`] is
//! the test double used by every in-process test.

use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user_id: i32,
    pub username: String,
    pub safe_username: String,
    pub privileges: u32,
    pub banned: bool,
    pub restricted: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UserStats {
    pub ranked_score: u64,
    pub accuracy: f32,
    pub playcount: u32,
    pub total_score: u64,
    pub game_rank: u32,
    pub pp: u16,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn fetch_user_by_id(&self, user_id: i32) -> Option<UserRecord>;
    async fn fetch_user_by_safe_name(&self, safe_username: &str) -> Option<UserRecord>;
    async fn get_user_stats(&self, user_id: i32, game_mode: u8, relax: u8) -> UserStats;
    async fn get_friend_list(&self, user_id: i32) -> Vec<i32>;
    async fn is_banned(&self, user_id: i32) -> bool;
    async fn is_restricted(&self, user_id: i32) -> bool;
    async fn silence(&self, user_id: i32, seconds: i64, reason: &str, author_uid: i32);
    async fn get_silence_end(&self, user_id: i32) -> i64;
    async fn save_bancho_session(&self, user_id: i32, ip: &str);
}

#[derive(Debug, Default, Clone, Copy)]
struct SilenceRecord {
    end: i64,
}

pub struct InMemoryUserStore {
    users: DashMap<i32, UserRecord>,
    stats: DashMap<(i32, u8, u8), UserStats>,
    friends: DashMap<i32, Vec<i32>>,
    silences: DashMap<i32, SilenceRecord>,
    silence_log: DashMap<i32, Vec<(i64, String, i32)>>,
    sessions_saved: DashMap<i32, Vec<String>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            stats: DashMap::new(),
            friends: DashMap::new(),
            silences: DashMap::new(),
            silence_log: DashMap::new(),
            sessions_saved: DashMap::new(),
        }
    }

    pub fn insert_user(&self, user: UserRecord) {
        self.users.insert(user.user_id, user);
    }

    pub fn insert_stats(&self, user_id: i32, game_mode: u8, relax: u8, stats: UserStats) {
        self.stats.insert((user_id, game_mode, relax), stats);
    }

    pub fn set_friends(&self, user_id: i32, friends: Vec<i32>) {
        self.friends.insert(user_id, friends);
    }

    pub fn sessions_saved_for(&self, user_id: i32) -> Vec<String> {
        self.sessions_saved.get(&user_id).map(|v| v.clone()).unwrap_or_default()
    }
}

impl Default for InMemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn fetch_user_by_id(&self, user_id: i32) -> Option<UserRecord> {
        self.users.get(&user_id).map(|u| u.clone())
    }

    async fn fetch_user_by_safe_name(&self, safe_username: &str) -> Option<UserRecord> {
        self.users
            .iter()
            .find(|u| u.safe_username == safe_username)
            .map(|u| u.clone())
    }

    async fn get_user_stats(&self, user_id: i32, game_mode: u8, relax: u8) -> UserStats {
        self.stats.get(&(user_id, game_mode, relax)).map(|s| *s).unwrap_or_default()
    }

    async fn get_friend_list(&self, user_id: i32) -> Vec<i32> {
        self.friends.get(&user_id).map(|f| f.clone()).unwrap_or_default()
    }

    async fn is_banned(&self, user_id: i32) -> bool {
        self.users.get(&user_id).map(|u| u.banned).unwrap_or(false)
    }

    async fn is_restricted(&self, user_id: i32) -> bool {
        self.users.get(&user_id).map(|u| u.restricted).unwrap_or(false)
    }

    async fn silence(&self, user_id: i32, seconds: i64, reason: &str, author_uid: i32) {
        self.silences.insert(user_id, SilenceRecord { end: seconds });
        self.silence_log
            .entry(user_id)
            .or_default()
            .push((seconds, reason.to_string(), author_uid));
    }

    async fn get_silence_end(&self, user_id: i32) -> i64 {
        self.silences.get(&user_id).map(|s| s.end).unwrap_or(0)
    }

    async fn save_bancho_session(&self, user_id: i32, ip: &str) {
        self.sessions_saved.entry(user_id).or_default().push(ip.to_string());
    }
}
