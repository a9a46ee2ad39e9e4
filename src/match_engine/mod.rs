//! Multiplayer match engine (C7). Every public operation here is wrapped in
//! the match's KV-backed lock; if the match has been disposed between
//! lookup and lock acquisition, the operation is a silent no-op, matching
//! the failure semantics of the upstream handler functions this is
//! modeled on (lock, re-check existence, mutate, `send_updates`).

pub mod types;

use crate::error::BanchoResult;
use crate::locking::{self, LockDomain};
use crate::services::Services;
use crate::session::{Session, SessionManager};
use crate::streams::{self, StreamRegistry};
use bancho_proto::match_data::SlotStatus;
use bancho_proto::server;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use types::{Match, ModMode, Slot, TeamType, SPEED_CHANGING};

#[derive(Debug, PartialEq, Eq)]
pub enum JoinMatchOutcome {
    Joined,
    WrongPassword,
    MatchFull,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct NewSettings {
    pub name: String,
    pub password: String,
    pub beatmap_name: String,
    pub beatmap_id: i32,
    pub beatmap_md5: String,
    pub game_mode: u8,
    pub mods: u32,
    pub scoring_type: u8,
    pub team_type: TeamType,
    pub mod_mode: ModMode,
    pub is_in_progress: bool,
}

#[derive(Default)]
pub struct MatchRegistry {
    matches: DashMap<u16, Arc<RwLock<Match>>>,
    next_id: AtomicU16,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self { matches: DashMap::new(), next_id: AtomicU16::new(1) }
    }

    pub async fn create(&self, services: &Services, name: String, password: String, host_user_id: i32, game_mode: u8) -> u16 {
        let match_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        StreamRegistry::add(services, &streams::multiplayer_stream(match_id)).await;
        StreamRegistry::add(services, &streams::multiplayer_playing_stream(match_id)).await;
        self.matches.insert(match_id, Arc::new(RwLock::new(Match::new(match_id, name, password, host_user_id, game_mode))));
        match_id
    }

    pub fn get(&self, match_id: u16) -> Option<Arc<RwLock<Match>>> {
        self.matches.get(&match_id).map(|m| m.clone())
    }

    pub fn all(&self) -> Vec<Arc<RwLock<Match>>> {
        self.matches.iter().map(|e| e.value().clone()).collect()
    }

    async fn dispose(&self, services: &Services, sessions: &SessionManager, match_id: u16) {
        self.matches.remove(&match_id);
        StreamRegistry::remove(services, &streams::multiplayer_stream(match_id)).await;
        StreamRegistry::remove(services, &streams::multiplayer_playing_stream(match_id)).await;
        StreamRegistry::broadcast(services, sessions, streams::LOBBY, &server::match_dispose(match_id), None, None).await;
    }
}

async fn with_lock<F, Fut, R>(services: &Services, match_id: u16, f: F) -> BanchoResult<Option<R>>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = R>,
{
    let guard = locking::acquire(
        services.kv.as_ref(),
        LockDomain::Match,
        &match_id.to_string(),
        services.lock_config.match_lock_ttl_ms,
        services.lock_config.lock_acquire_retries,
        services.lock_config.lock_acquire_base_backoff_ms,
    )
    .await?;
    let result = f().await;
    locking::release(services.kv.as_ref(), guard).await;
    Ok(Some(result))
}

/// Broadcasts `updateMatch` to the match itself and the lobby (C7's
/// `send_updates`); the lobby copy always has its password censored.
async fn send_updates(services: &Services, sessions: &SessionManager, matches: &MatchRegistry, match_id: u16) {
    let Some(cell) = matches.get(match_id) else { return };
    let data = cell.read().await.to_wire(false);
    StreamRegistry::broadcast(services, sessions, &streams::multiplayer_stream(match_id), &server::match_update(&data, false), None, None).await;
    let lobby_data = cell.read().await.to_wire(true);
    StreamRegistry::broadcast(services, sessions, streams::LOBBY, &server::match_update(&lobby_data, true), None, None).await;
}

pub async fn join_match(
    services: &Services,
    sessions: &SessionManager,
    matches: &MatchRegistry,
    session: &Arc<Session>,
    match_id: u16,
    password: &str,
) -> BanchoResult<JoinMatchOutcome> {
    let Some(cell) = matches.get(match_id) else {
        return Ok(JoinMatchOutcome::Unknown);
    };
    let outcome = with_lock(services, match_id, || async {
        if matches.get(match_id).is_none() {
            return JoinMatchOutcome::Unknown;
        }
        let mut m = cell.write().await;
        if !m.password.is_empty() && m.password != password {
            return JoinMatchOutcome::WrongPassword;
        }
        let Some(slot_id) = m.first_free_slot() else {
            return JoinMatchOutcome::MatchFull;
        };
        let (user_id, token_id) = session.read(|s| (s.user_id, s.token_id.clone())).await;
        m.slots[slot_id].status = SlotStatus::NotReady;
        m.slots[slot_id].user_id = Some(user_id);
        m.slots[slot_id].token_id = Some(token_id);
        JoinMatchOutcome::Joined
    })
    .await?
    .unwrap_or(JoinMatchOutcome::Unknown);

    if outcome == JoinMatchOutcome::Joined {
        session.write(|s| s.match_id = Some(match_id)).await;
        StreamRegistry::join(services, &streams::multiplayer_stream(match_id), &session.token_id).await;
        session.join_stream(&streams::multiplayer_stream(match_id)).await;
        let data = cell.read().await.to_wire(false);
        session.enqueue(server::match_join_success(&data)).await?;
        send_updates(services, sessions, matches, match_id).await;
    } else if outcome == JoinMatchOutcome::WrongPassword || outcome == JoinMatchOutcome::MatchFull {
        session.enqueue(server::match_join_fail()).await?;
    }
    Ok(outcome)
}

/// Frees the session's slot, transfers host if it was the host's slot,
/// and disposes the match if it becomes empty.
pub async fn leave_match(services: &Services, sessions: &SessionManager, matches: &MatchRegistry, session: &Arc<Session>) -> BanchoResult<()> {
    let Some(match_id) = session.read(|s| s.match_id).await else {
        return Ok(());
    };
    let Some(cell) = matches.get(match_id) else {
        session.write(|s| s.match_id = None).await;
        return Ok(());
    };

    let user_id = session.read(|s| s.user_id).await;
    let (became_empty, new_host) = with_lock(services, match_id, || async {
        let mut m = cell.write().await;
        if let Some(slot_id) = m.slot_of_user(user_id) {
            m.slots[slot_id] = Slot::free();
        }
        let was_host = m.host_user_id == user_id;
        let mut new_host = None;
        if was_host {
            if let Some(slot_id) = m.slots.iter().position(|s| s.is_occupied()) {
                if let Some(uid) = m.slots[slot_id].user_id {
                    m.host_user_id = uid;
                    new_host = Some(uid);
                }
            }
        }
        (m.occupied_count() == 0, new_host)
    })
    .await?
    .unwrap_or((false, None));

    session.write(|s| s.match_id = None).await;
    StreamRegistry::leave(services, &streams::multiplayer_stream(match_id), &session.token_id).await;
    session.leave_stream(&streams::multiplayer_stream(match_id)).await;

    if let Some(new_host_id) = new_host {
        if let Some(new_host_session) = sessions.get_by_user(new_host_id).await {
            new_host_session.enqueue(server::match_transfer_host()).await?;
        }
    }

    if became_empty {
        matches.dispose(services, sessions, match_id).await;
    } else {
        send_updates(services, sessions, matches, match_id).await;
    }
    Ok(())
}

/// Resets every non-locked slot to `NOT_READY` when any of
/// `{mods, beatmap_md5, scoring_type, team_type, mod_mode}` changes, then
/// applies the FREE_MOD/NORMAL mod-mode transition (host slot ↔ match) and
/// team-type (re)initialization, finally forcing `mod_mode = NORMAL` for
/// `TAG_COOP`/`TAG_TEAM_VS`.
pub async fn change_settings(
    services: &Services,
    sessions: &SessionManager,
    matches: &MatchRegistry,
    requester_user_id: i32,
    match_id: u16,
    new: NewSettings,
) -> BanchoResult<()> {
    let Some(cell) = matches.get(match_id) else { return Ok(()) };
    let applied = with_lock(services, match_id, || async {
        let mut m = cell.write().await;
        if m.host_user_id != requester_user_id {
            return false;
        }

        let settings_changed = m.mods != new.mods
            || m.beatmap_md5 != new.beatmap_md5
            || m.scoring_type != new.scoring_type
            || m.team_type != new.team_type
            || m.mod_mode != new.mod_mode;
        let mode_changed = m.mod_mode != new.mod_mode;
        let team_changed = m.team_type != new.team_type;

        m.name = new.name;
        m.password = new.password;
        m.beatmap_name = new.beatmap_name;
        m.beatmap_id = new.beatmap_id;
        m.beatmap_md5 = new.beatmap_md5;
        m.game_mode = new.game_mode;
        m.mods = new.mods;
        m.scoring_type = new.scoring_type;
        m.team_type = new.team_type;
        m.mod_mode = new.mod_mode;
        m.is_in_progress = new.is_in_progress;

        if settings_changed {
            for slot in m.slots.iter_mut() {
                if slot.is_occupied() && !matches!(slot.status, SlotStatus::Locked) {
                    slot.status = SlotStatus::NotReady;
                }
            }
        }

        if mode_changed {
            if matches!(m.mod_mode, ModMode::Normal) {
                let host_id = m.host_user_id;
                if let Some(slot_id) = m.slot_of_user(host_id) {
                    m.mods = m.slots[slot_id].mods;
                }
            } else {
                let match_mods = m.mods;
                for slot in m.slots.iter_mut() {
                    if slot.is_occupied() {
                        slot.mods = match_mods;
                    }
                }
                m.mods &= SPEED_CHANGING;
            }
        }

        if team_changed {
            initialize_teams(&mut m);
        }

        if matches!(m.team_type, TeamType::TagCoop | TeamType::TagTeamVs) {
            m.mod_mode = ModMode::Normal;
        }
        true
    })
    .await?
    .unwrap_or(false);
    if applied {
        send_updates(services, sessions, matches, match_id).await;
    }
    Ok(())
}

fn initialize_teams(m: &mut Match) {
    use bancho_proto::match_data::SlotTeam;
    for (i, slot) in m.slots.iter_mut().enumerate() {
        slot.team = if m.team_type.is_team_based() {
            if i % 2 == 0 { SlotTeam::Red } else { SlotTeam::Blue }
        } else {
            SlotTeam::Neutral
        };
    }
}

pub async fn toggle_ready(services: &Services, sessions: &SessionManager, matches: &MatchRegistry, user_id: i32, match_id: u16) -> BanchoResult<()> {
    let Some(cell) = matches.get(match_id) else { return Ok(()) };
    with_lock(services, match_id, || async {
        let mut m = cell.write().await;
        if let Some(slot_id) = m.slot_of_user(user_id) {
            m.slots[slot_id].status = match m.slots[slot_id].status {
                SlotStatus::Ready => SlotStatus::NotReady,
                SlotStatus::NotReady => SlotStatus::Ready,
                other => other,
            };
        }
    })
    .await?;
    send_updates(services, sessions, matches, match_id).await;
    Ok(())
}

/// Host toggles `FREE`/`LOCKED` on any slot but their own.
pub async fn toggle_lock(services: &Services, sessions: &SessionManager, matches: &MatchRegistry, host_user_id: i32, match_id: u16, slot_id: usize) -> BanchoResult<()> {
    let Some(cell) = matches.get(match_id) else { return Ok(()) };
    let applied = with_lock(services, match_id, || async {
        let mut m = cell.write().await;
        if m.host_user_id != host_user_id || slot_id >= m.slots.len() {
            return false;
        }
        if m.slot_of_user(host_user_id) == Some(slot_id) {
            return false;
        }
        m.slots[slot_id].status = match m.slots[slot_id].status {
            SlotStatus::Free => SlotStatus::Locked,
            SlotStatus::Locked => SlotStatus::Free,
            other => other,
        };
        true
    })
    .await?
    .unwrap_or(false);
    if applied {
        send_updates(services, sessions, matches, match_id).await;
    }
    Ok(())
}

pub async fn change_team(services: &Services, sessions: &SessionManager, matches: &MatchRegistry, user_id: i32, match_id: u16) -> BanchoResult<()> {
    use bancho_proto::match_data::SlotTeam;
    let Some(cell) = matches.get(match_id) else { return Ok(()) };
    with_lock(services, match_id, || async {
        let mut m = cell.write().await;
        if let Some(slot_id) = m.slot_of_user(user_id) {
            m.slots[slot_id].team = match m.slots[slot_id].team {
                SlotTeam::Red => SlotTeam::Blue,
                SlotTeam::Blue | SlotTeam::Neutral => SlotTeam::Red,
            };
        }
    })
    .await?;
    send_updates(services, sessions, matches, match_id).await;
    Ok(())
}

/// Transitions every `READY` slot to `PLAYING`; the host may force-start
/// with outstanding `NOT_READY` slots left behind.
pub async fn start_match(services: &Services, sessions: &SessionManager, matches: &MatchRegistry, host_user_id: i32, match_id: u16) -> BanchoResult<()> {
    let Some(cell) = matches.get(match_id) else { return Ok(()) };
    let applied = with_lock(services, match_id, || async {
        let mut m = cell.write().await;
        if m.host_user_id != host_user_id {
            return false;
        }
        m.is_in_progress = true;
        for slot in m.slots.iter_mut() {
            if matches!(slot.status, SlotStatus::Ready) {
                slot.status = SlotStatus::Playing;
                slot.loaded = false;
                slot.skipped = false;
                slot.completed = false;
                slot.failed = false;
            }
        }
        true
    })
    .await?
    .unwrap_or(false);
    if !applied {
        return Ok(());
    }
    let data = cell.read().await.to_wire(false);
    StreamRegistry::broadcast(services, sessions, &streams::multiplayer_stream(match_id), &server::match_start(&data), None, None).await;
    send_updates(services, sessions, matches, match_id).await;
    Ok(())
}

pub async fn player_loaded(services: &Services, sessions: &SessionManager, matches: &MatchRegistry, user_id: i32, match_id: u16) -> BanchoResult<()> {
    let Some(cell) = matches.get(match_id) else { return Ok(()) };
    let all_loaded = with_lock(services, match_id, || async {
        let mut m = cell.write().await;
        if let Some(slot_id) = m.slot_of_user(user_id) {
            m.slots[slot_id].loaded = true;
        }
        m.slots.iter().filter(|s| matches!(s.status, SlotStatus::Playing)).all(|s| s.loaded)
    })
    .await?
    .unwrap_or(false);

    if all_loaded {
        StreamRegistry::broadcast(services, sessions, &streams::multiplayer_playing_stream(match_id), &server::all_players_loaded(), None, None).await;
    }
    Ok(())
}

/// When every `PLAYING` slot has skipped, broadcasts `matchSkip` on the
/// playing stream as the "all players skipped" signal.
pub async fn player_skip(services: &Services, sessions: &SessionManager, matches: &MatchRegistry, user_id: i32, match_id: u16) -> BanchoResult<()> {
    let Some(cell) = matches.get(match_id) else { return Ok(()) };
    let all_skipped = with_lock(services, match_id, || async {
        let mut m = cell.write().await;
        if let Some(slot_id) = m.slot_of_user(user_id) {
            m.slots[slot_id].skipped = true;
        }
        m.slots.iter().filter(|s| matches!(s.status, SlotStatus::Playing)).all(|s| s.skipped)
    })
    .await?
    .unwrap_or(false);

    if all_skipped {
        StreamRegistry::broadcast(services, sessions, &streams::multiplayer_playing_stream(match_id), &server::match_skip(), None, None).await;
    }
    Ok(())
}

pub async fn player_failed(services: &Services, sessions: &SessionManager, matches: &MatchRegistry, user_id: i32, match_id: u16) -> BanchoResult<()> {
    let Some(cell) = matches.get(match_id) else { return Ok(()) };
    with_lock(services, match_id, || async {
        let mut m = cell.write().await;
        if let Some(slot_id) = m.slot_of_user(user_id) {
            m.slots[slot_id].failed = true;
        }
    })
    .await?;
    send_updates(services, sessions, matches, match_id).await;
    Ok(())
}

/// When every non-`FREE` slot has reported complete, resets them all to
/// `NOT_READY`, clears `is_in_progress`, and broadcasts `matchComplete`.
pub async fn player_complete(services: &Services, sessions: &SessionManager, matches: &MatchRegistry, user_id: i32, match_id: u16) -> BanchoResult<()> {
    let Some(cell) = matches.get(match_id) else { return Ok(()) };
    let all_complete = with_lock(services, match_id, || async {
        let mut m = cell.write().await;
        if let Some(slot_id) = m.slot_of_user(user_id) {
            m.slots[slot_id].completed = true;
        }
        let done = m.slots.iter().filter(|s| s.is_occupied()).all(|s| s.completed);
        if done {
            m.is_in_progress = false;
            for slot in m.slots.iter_mut() {
                if slot.is_occupied() {
                    slot.status = SlotStatus::NotReady;
                    slot.loaded = false;
                    slot.skipped = false;
                    slot.completed = false;
                    slot.failed = false;
                }
            }
        }
        done
    })
    .await?
    .unwrap_or(false);

    if all_complete {
        StreamRegistry::broadcast(services, sessions, &streams::multiplayer_stream(match_id), &server::match_complete(), None, None).await;
    }
    send_updates(services, sessions, matches, match_id).await;
    Ok(())
}

/// Moves the caller's occupied slot into an empty target slot.
pub async fn change_slot(services: &Services, sessions: &SessionManager, matches: &MatchRegistry, user_id: i32, match_id: u16, new_slot_id: usize) -> BanchoResult<()> {
    let Some(cell) = matches.get(match_id) else { return Ok(()) };
    with_lock(services, match_id, || async {
        let mut m = cell.write().await;
        if new_slot_id >= m.slots.len() || !matches!(m.slots[new_slot_id].status, SlotStatus::Free) {
            return;
        }
        if let Some(old_slot_id) = m.slot_of_user(user_id) {
            m.slots.swap(old_slot_id, new_slot_id);
        }
    })
    .await?;
    send_updates(services, sessions, matches, match_id).await;
    Ok(())
}

/// In `FREE_MOD`, updates only the caller's own slot mods; in `NORMAL`,
/// only the host may change the match-wide mods.
pub async fn change_mods(services: &Services, sessions: &SessionManager, matches: &MatchRegistry, user_id: i32, match_id: u16, mods: u32) -> BanchoResult<()> {
    let Some(cell) = matches.get(match_id) else { return Ok(()) };
    let applied = with_lock(services, match_id, || async {
        let mut m = cell.write().await;
        match m.mod_mode {
            ModMode::FreeMod => match m.slot_of_user(user_id) {
                Some(slot_id) => {
                    m.slots[slot_id].mods = mods & !SPEED_CHANGING;
                    true
                }
                None => false,
            },
            ModMode::Normal if m.host_user_id == user_id => {
                m.mods = mods;
                true
            }
            ModMode::Normal => false,
        }
    })
    .await?
    .unwrap_or(false);
    if applied {
        send_updates(services, sessions, matches, match_id).await;
    }
    Ok(())
}

/// Host hands off to the occupant of `target_slot_id`.
pub async fn transfer_host(services: &Services, sessions: &SessionManager, matches: &MatchRegistry, host_user_id: i32, match_id: u16, target_slot_id: usize) -> BanchoResult<()> {
    let Some(cell) = matches.get(match_id) else { return Ok(()) };
    let new_host = with_lock(services, match_id, || async {
        let mut m = cell.write().await;
        if m.host_user_id != host_user_id || target_slot_id >= m.slots.len() {
            return None;
        }
        let target = m.slots[target_slot_id].user_id?;
        m.host_user_id = target;
        Some(target)
    })
    .await?
    .flatten();

    if let Some(new_host_id) = new_host {
        if let Some(new_host_session) = sessions.get_by_user(new_host_id).await {
            new_host_session.enqueue(server::match_transfer_host()).await?;
        }
        send_updates(services, sessions, matches, match_id).await;
    }
    Ok(())
}

pub async fn change_password(services: &Services, sessions: &SessionManager, matches: &MatchRegistry, host_user_id: i32, match_id: u16, password: String) -> BanchoResult<()> {
    let Some(cell) = matches.get(match_id) else { return Ok(()) };
    let applied = with_lock(services, match_id, || async {
        let mut m = cell.write().await;
        if m.host_user_id != host_user_id {
            return false;
        }
        m.password = password;
        true
    })
    .await?
    .unwrap_or(false);
    if applied {
        send_updates(services, sessions, matches, match_id).await;
    }
    Ok(())
}

/// `NO_MAP`/`NOT_READY` toggle for the caller's own slot, driven by the
/// client's `matchNoBeatmap`/`matchHasBeatmap` packets.
pub async fn set_beatmap_availability(services: &Services, sessions: &SessionManager, matches: &MatchRegistry, user_id: i32, match_id: u16, has_beatmap: bool) -> BanchoResult<()> {
    let Some(cell) = matches.get(match_id) else { return Ok(()) };
    with_lock(services, match_id, || async {
        let mut m = cell.write().await;
        if let Some(slot_id) = m.slot_of_user(user_id) {
            m.slots[slot_id].status = match (has_beatmap, m.slots[slot_id].status) {
                (false, SlotStatus::NotReady | SlotStatus::Ready) => SlotStatus::NoMap,
                (true, SlotStatus::NoMap) => SlotStatus::NotReady,
                (_, other) => other,
            };
        }
    })
    .await?;
    send_updates(services, sessions, matches, match_id).await;
    Ok(())
}

/// Relays a raw score-frame packet verbatim to the rest of the playing
/// lobby; its field layout is opaque to the match engine.
pub async fn relay_score_update(services: &Services, sessions: &SessionManager, sender: &Arc<Session>, match_id: u16, raw: &[u8]) {
    StreamRegistry::broadcast(services, sessions, &streams::multiplayer_playing_stream(match_id), &server::raw_score_frame(raw), Some(&sender.token_id), None).await;
}
