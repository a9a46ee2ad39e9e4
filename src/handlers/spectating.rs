//! Thin wrappers around [`crate::spectator`]'s relay operations, keyed by
//! the four spectator-family inbound packets.

use crate::dispatcher::Context;
use crate::error::BanchoResult;
use crate::session::Session;
use crate::spectator;
use std::sync::Arc;

pub async fn start(ctx: &Context<'_>, session: &Arc<Session>, host_user_id: i32) -> BanchoResult<()> {
    spectator::start_spectating(ctx.services, ctx.sessions, ctx.channels, session, host_user_id).await
}

pub async fn stop(ctx: &Context<'_>, session: &Arc<Session>) -> BanchoResult<()> {
    spectator::stop_spectating(ctx.services, ctx.sessions, ctx.channels, session).await
}

pub async fn relay_frames(ctx: &Context<'_>, session: &Arc<Session>, data: &[u8]) -> BanchoResult<()> {
    spectator::relay_frames(ctx.services, ctx.sessions, session, data).await;
    Ok(())
}

pub async fn cant_spectate(ctx: &Context<'_>, session: &Arc<Session>) -> BanchoResult<()> {
    spectator::cant_spectate(ctx.services, ctx.sessions, session).await
}
