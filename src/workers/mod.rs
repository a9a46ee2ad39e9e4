//! Periodic background workers (C10): spam-rate decay and the inactivity
//! reaper. Each is spawned as its own task with a `tokio::time::interval`
//! and a shutdown broadcast receiver.

use crate::channel::ChannelRegistry;
use crate::dispatcher::Context;
use crate::handlers;
use crate::locking::{self, LockDomain};
use crate::match_engine::MatchRegistry;
use crate::services::Services;
use crate::session::SessionManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Resets every connected session's spam counter on a fixed cadence, so a
/// burst of chat messages only ever risks a silence within one decay
/// window rather than accumulating forever.
pub fn spawn_spam_decay(services: Services, sessions: Arc<SessionManager>, interval_secs: u64, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(interval_secs));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    for session in sessions.all() {
                        let lock_name = format!("{}:processing", session.token_id);
                        let guard = locking::acquire(
                            services.kv.as_ref(),
                            LockDomain::Session,
                            &lock_name,
                            services.lock_config.session_lock_ttl_ms,
                            services.lock_config.lock_acquire_retries,
                            services.lock_config.lock_acquire_base_backoff_ms,
                        ).await;
                        session.decay_spam().await;
                        if let Ok(guard) = guard {
                            locking::release(services.kv.as_ref(), guard).await;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("spam decay worker shutting down");
                    break;
                }
            }
        }
    })
}

/// Logs out any session that hasn't pinged within `timeout_secs`, skipping
/// bot/IRC/tournament sessions (none of those send a steady ping stream a
/// timeout should judge).
#[allow(clippy::too_many_arguments)]
pub fn spawn_inactivity_reaper(
    services: Services,
    sessions: Arc<SessionManager>,
    channels: Arc<ChannelRegistry>,
    matches: Arc<MatchRegistry>,
    interval_secs: u64,
    timeout_secs: u64,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(interval_secs));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let now = services.clock.now();
                    for session in sessions.all() {
                        let (irc, tournament, ping_time) = session.read(|s| (s.irc, s.tournament, s.ping_time)).await;
                        if irc || tournament || session.read(|s| s.is_bot()).await {
                            continue;
                        }
                        if now - ping_time < timeout_secs as i64 {
                            continue;
                        }
                        tracing::info!(token = %session.token_id, "reaping inactive session");
                        let ctx = Context { services: &services, sessions: &sessions, channels: &channels, matches: &matches };
                        if let Err(err) = handlers::connection::logout(&ctx, &session).await {
                            tracing::warn!(token = %session.token_id, error = %err, "error reaping inactive session");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("inactivity reaper shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{privileges, Session, SessionState};

    #[tokio::test]
    async fn spam_decay_resets_every_session_counter() {
        let services = Services::in_memory();
        let sessions = Arc::new(SessionManager::new());
        let session = Session::new(SessionState::new("t1".into(), 1, "user".into(), privileges::USER_PUBLIC, "127.0.0.1".into(), 19, 1_000));
        session.write(|s| s.spam_rate = 5).await;
        sessions.insert(session.clone()).await;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = spawn_spam_decay(services, sessions.clone(), 1, shutdown_rx);
        tokio::time::sleep(Duration::from_millis(1200)).await;
        shutdown_tx.send(()).ok();
        handle.await.unwrap();

        assert_eq!(session.read(|s| s.spam_rate).await, 0);
    }

    #[tokio::test]
    async fn reaper_logs_out_sessions_past_the_timeout() {
        let (services, clock) = Services::in_memory_with_virtual_clock(10_000);
        let sessions = Arc::new(SessionManager::new());
        let channels = Arc::new(ChannelRegistry::new());
        let matches = Arc::new(MatchRegistry::new());

        let stale = Session::new(SessionState::new("t1".into(), 5000, "user".into(), privileges::USER_PUBLIC, "127.0.0.1".into(), 19, 10_000));
        sessions.insert(stale.clone()).await;
        clock.advance(400);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = spawn_inactivity_reaper(services, sessions.clone(), channels, matches, 1, 300, shutdown_rx);
        tokio::time::sleep(Duration::from_millis(1200)).await;
        shutdown_tx.send(()).ok();
        handle.await.unwrap();

        assert!(sessions.get("t1").await.is_none());
    }
}
