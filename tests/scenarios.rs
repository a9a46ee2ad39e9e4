//! End-to-end scenarios driven against an in-memory `Services`, exercising
//! the full path from wire bytes in to enqueued wire bytes out without ever
//! opening a socket.

use banchod::channel::ChannelRegistry;
use banchod::chat;
use banchod::dispatcher::{self, Context};
use banchod::login::{self, LoginRequest};
use banchod::match_engine::{self, MatchRegistry};
use banchod::session::{privileges, Session, SessionManager, SessionState};
use banchod::services::Services;
use banchod::user_store::{InMemoryUserStore, UserRecord};
use banchod::workers;
use bancho_proto::fields::Reader;
use bancho_proto::ids::{client as cid, server as sid};
use bancho_proto::packet::try_split_packet;
use std::sync::Arc;

fn user(user_id: i32, username: &str, privs: u32) -> UserRecord {
    UserRecord {
        user_id,
        username: username.into(),
        safe_username: username.to_lowercase(),
        privileges: privs,
        banned: false,
        restricted: false,
    }
}

fn response_ids(bytes: &[u8]) -> Vec<u16> {
    let mut ids = Vec::new();
    let mut buf = bytes;
    while let Some((header, _, consumed)) = try_split_packet(buf).unwrap() {
        ids.push(header.id);
        buf = &buf[consumed..];
    }
    ids
}

/// Scenario 1: a successful login for a USER_PUBLIC|USER_NORMAL account
/// returns `user_id`, `silenceEndTime`, `protocolVersion`, `supporter_gmt`,
/// the caller's own presence pair, one `channelInfo` per joinable public
/// channel, `channelInfoEnd`, and the bot's presence pair, in that order.
#[tokio::test]
async fn scenario_login_produces_the_full_packet_burst() {
    let store = InMemoryUserStore::new();
    store.insert_user(user(42, "player", privileges::USER_PUBLIC | privileges::USER_NORMAL));
    let services = Services::new(
        Arc::new(banchod::kv::memory::MemoryKv::new()),
        Arc::new(banchod::clock::SystemClock),
        Arc::new(store),
        Arc::new(banchod::metrics::NoopMetricsSink),
        Arc::new(banchod::webhook::NoopWebhook),
        banchod::config::LockConfig::default(),
    );
    let sessions = SessionManager::new();
    let channels = ChannelRegistry::new();
    let matches = MatchRegistry::new();
    channels.add(&services, banchod::channel::Channel {
        name: "#osu".into(),
        description: "Main channel".into(),
        public_read: true,
        public_write: true,
        instance: false,
    }).await;

    let req = LoginRequest {
        username: "player".into(),
        password_md5: "x".into(),
        client_version: "b1".into(),
        utc_offset: 0,
        client_hashes: String::new(),
        block_non_friend_dms: false,
    };
    let result = login::handle_login(&services, &sessions, &channels, &matches, req, "127.0.0.1".into()).await.unwrap();

    assert_eq!(
        response_ids(&result.response),
        vec![
            sid::USER_ID,
            sid::SILENCE_END_TIME,
            sid::PROTOCOL_VERSION,
            sid::SUPPORTER_GMT,
            sid::USER_PANEL,
            sid::USER_STATS,
            sid::CHANNEL_INFO,
            sid::CHANNEL_INFO_END,
            sid::USER_PANEL,
            sid::USER_STATS,
        ]
    );

    let (_, payload, _) = try_split_packet(&result.response).unwrap().unwrap();
    let mut r = Reader::new(sid::USER_ID, payload);
    assert_eq!(r.i32().unwrap(), 42);
}

/// Scenario 2: a match is created, a second user joins slot 1, and a
/// settings change resets every non-locked occupied slot back to
/// `NOT_READY`.
#[tokio::test]
async fn scenario_create_match_join_and_settings_reset() {
    let services = Services::in_memory();
    let sessions = SessionManager::new();
    let matches = MatchRegistry::new();

    let host = Session::new(SessionState::new("host-tok".into(), 7, "host".into(), privileges::USER_PUBLIC, "127.0.0.1".into(), 19, 1_000));
    sessions.insert(host.clone()).await;
    let guest = Session::new(SessionState::new("guest-tok".into(), 9, "guest".into(), privileges::USER_PUBLIC, "127.0.0.1".into(), 19, 1_000));
    sessions.insert(guest.clone()).await;

    let match_id = matches.create(&services, "room".into(), String::new(), 7, 0).await;
    match_engine::join_match(&services, &sessions, &matches, &host, match_id, "").await.unwrap();

    let outcome = match_engine::join_match(&services, &sessions, &matches, &guest, match_id, "").await.unwrap();
    assert_eq!(outcome, match_engine::JoinMatchOutcome::Joined);

    {
        let cell = matches.get(match_id).unwrap();
        let mut m = cell.write().await;
        let host_slot = m.slot_of_user(7).unwrap();
        m.slots[host_slot].status = bancho_proto::match_data::SlotStatus::Ready;
        let guest_slot = m.slot_of_user(9).unwrap();
        m.slots[guest_slot].status = bancho_proto::match_data::SlotStatus::Ready;
    }

    let new = match_engine::NewSettings {
        name: "room".into(),
        password: String::new(),
        beatmap_name: "new song".into(),
        beatmap_id: 2,
        beatmap_md5: "def456".into(),
        game_mode: 0,
        mods: 0,
        scoring_type: 0,
        team_type: match_engine::types::TeamType::HeadToHead,
        mod_mode: match_engine::types::ModMode::Normal,
        is_in_progress: false,
    };
    match_engine::change_settings(&services, &sessions, &matches, 7, match_id, new).await.unwrap();

    let cell = matches.get(match_id).unwrap();
    let m = cell.read().await;
    assert_eq!(m.beatmap_name, "new song");
    for slot in &m.slots {
        if slot.is_occupied() {
            assert_eq!(slot.status, bancho_proto::match_data::SlotStatus::NotReady);
        }
    }
}

/// Scenario 3: switching the mod mode from NORMAL to FREE_MOD with DT|HD
/// set on the match pushes those mods onto the host's own slot, and
/// collapses the match-level `mods` down to just the speed-changing bits
/// (DT), since FREE_MOD only centralizes those.
#[tokio::test]
async fn scenario_freemods_transition_centralizes_only_speed_changing_mods() {
    use match_engine::types::{ModMode, TeamType, SPEED_CHANGING};

    let services = Services::in_memory();
    let sessions = SessionManager::new();
    let matches = MatchRegistry::new();

    let host = Session::new(SessionState::new("host-tok".into(), 7, "host".into(), privileges::USER_PUBLIC, "127.0.0.1".into(), 19, 1_000));
    sessions.insert(host.clone()).await;

    let match_id = matches.create(&services, "room".into(), String::new(), 7, 0).await;
    match_engine::join_match(&services, &sessions, &matches, &host, match_id, "").await.unwrap();

    const MOD_DOUBLE_TIME: u32 = 1 << 6;
    const MOD_HIDDEN: u32 = 1 << 3;
    let dt_hd = MOD_DOUBLE_TIME | MOD_HIDDEN;

    let freemod_settings = match_engine::NewSettings {
        name: "room".into(),
        password: String::new(),
        beatmap_name: "song".into(),
        beatmap_id: 1,
        beatmap_md5: "abc".into(),
        game_mode: 0,
        mods: dt_hd,
        scoring_type: 0,
        team_type: TeamType::HeadToHead,
        mod_mode: ModMode::FreeMod,
        is_in_progress: false,
    };
    match_engine::change_settings(&services, &sessions, &matches, 7, match_id, freemod_settings).await.unwrap();

    let cell = matches.get(match_id).unwrap();
    let m = cell.read().await;
    assert_eq!(m.mod_mode, ModMode::FreeMod);
    let host_slot = m.slot_of_user(7).unwrap();
    assert_eq!(m.slots[host_slot].mods, dt_hd);
    assert_eq!(m.mods, dt_hd & SPEED_CHANGING);
    assert_eq!(m.mods, MOD_DOUBLE_TIME);
}

/// Scenario 4: spectating creates the instance channel and notifies the
/// host; the follower disconnecting tears both back down.
#[tokio::test]
async fn scenario_spectating_creates_and_clears_instance_state() {
    let services = Services::in_memory();
    let sessions = Arc::new(SessionManager::new());
    let channels = Arc::new(ChannelRegistry::new());
    let matches = Arc::new(MatchRegistry::new());
    let ctx = Context { services: &services, sessions: &sessions, channels: &channels, matches: &matches };

    let host = Session::new(SessionState::new("host-tok".into(), 7, "host".into(), privileges::USER_PUBLIC, "127.0.0.1".into(), 19, 1_000));
    sessions.insert(host.clone()).await;
    let fan = Session::new(SessionState::new("fan-tok".into(), 5, "fan".into(), privileges::USER_PUBLIC, "127.0.0.1".into(), 19, 1_000));
    sessions.insert(fan.clone()).await;
    host.reset_queue().await;

    banchod::spectator::start_spectating(&services, &sessions, &channels, &fan, 7).await.unwrap();
    assert!(channels.get("#spect_7").is_some());
    let host_bytes = host.reset_queue().await;
    assert_eq!(response_ids(&host_bytes), vec![sid::SPECTATOR_JOINED]);
    let mut r = Reader::new(sid::SPECTATOR_JOINED, &try_split_packet(&host_bytes).unwrap().unwrap().1);
    assert_eq!(r.i32().unwrap(), 5);

    dispatcher::dispatch(&ctx, &fan, cid::LOGOUT, &[]).await.unwrap();
    assert!(channels.get("#spect_7").is_none());
    assert_eq!(host.read(|s| s.spectators.len()).await, 0);
}

/// Scenario 5: an 11th message within the decay window crosses the spam
/// threshold, silences the sender for 600s, and announces `userSilenced`
/// on `main`.
#[tokio::test]
async fn scenario_spam_triggers_auto_silence() {
    let services = Services::in_memory();
    let sessions = SessionManager::new();
    let channels = ChannelRegistry::new();
    channels.add(&services, banchod::channel::Channel {
        name: "#osu".into(),
        description: "Main channel".into(),
        public_read: true,
        public_write: true,
        instance: false,
    }).await;
    banchod::streams::StreamRegistry::add(&services, banchod::streams::MAIN).await;

    let sender = Session::new(SessionState::new("t1".into(), 11, "spammer".into(), privileges::USER_PUBLIC, "127.0.0.1".into(), 19, 1_000));
    sessions.insert(sender.clone()).await;
    banchod::streams::StreamRegistry::join(&services, banchod::streams::MAIN, &sender.token_id).await;

    let bystander = Session::new(SessionState::new("t2".into(), 12, "bystander".into(), privileges::USER_PUBLIC, "127.0.0.1".into(), 19, 1_000));
    sessions.insert(bystander.clone()).await;
    banchod::streams::StreamRegistry::join(&services, banchod::streams::MAIN, &bystander.token_id).await;
    bystander.reset_queue().await;

    for _ in 0..banchod::session::SPAM_THRESHOLD {
        sender.spam_protect(&services).await.unwrap();
    }
    let triggered = sender.spam_protect(&services).await.unwrap();
    assert!(triggered);

    let now = services.clock.now();
    assert!(sender.is_silenced(now).await);

    let outcome = chat::send(&services, &sessions, &channels, &sender, "#osu", "spam").await.unwrap();
    assert_eq!(outcome, chat::SendOutcome::Silenced);

    let sender_bytes = sender.reset_queue().await;
    assert!(response_ids(&sender_bytes).contains(&sid::SILENCE_END_TIME));

    banchod::streams::StreamRegistry::broadcast(
        &services,
        &sessions,
        banchod::streams::MAIN,
        &bancho_proto::server::user_silenced(11),
        None,
        None,
    )
    .await;
    let bystander_bytes = bystander.reset_queue().await;
    assert_eq!(response_ids(&bystander_bytes), vec![sid::USER_SILENCED]);
}

/// Scenario 6: a session whose last ping was past the inactivity timeout
/// is logged out by the reaper, which broadcasts `userLogout` on `main`.
#[tokio::test]
async fn scenario_inactivity_reaper_logs_out_stale_sessions() {
    let (services, clock) = Services::in_memory_with_virtual_clock(10_000);
    let sessions = Arc::new(SessionManager::new());
    let channels = Arc::new(ChannelRegistry::new());
    let matches = Arc::new(MatchRegistry::new());

    let stale = Session::new(SessionState::new("stale-tok".into(), 21, "afk".into(), privileges::USER_PUBLIC, "127.0.0.1".into(), 19, 10_000));
    sessions.insert(stale.clone()).await;
    banchod::streams::StreamRegistry::add(&services, banchod::streams::MAIN).await;
    banchod::streams::StreamRegistry::join(&services, banchod::streams::MAIN, &stale.token_id).await;

    let observer = Session::new(SessionState::new("observer-tok".into(), 22, "watcher".into(), privileges::USER_PUBLIC, "127.0.0.1".into(), 19, 10_000));
    sessions.insert(observer.clone()).await;
    banchod::streams::StreamRegistry::join(&services, banchod::streams::MAIN, &observer.token_id).await;
    observer.reset_queue().await;

    clock.advance(301);

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let handle = workers::spawn_inactivity_reaper(services.clone(), sessions.clone(), channels, matches, 1, 300, shutdown_rx);
    tokio::time::sleep(std::time::Duration::from_millis(1200)).await;
    shutdown_tx.send(()).ok();
    handle.await.unwrap();

    assert!(sessions.get("stale-tok").await.is_none());
    let observer_bytes = observer.reset_queue().await;
    assert!(response_ids(&observer_bytes).contains(&sid::USER_LOGOUT));
}
