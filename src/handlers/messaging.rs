//! Chat packet handlers: both `sendPublicMessage` and `sendPrivateMessage`
//! funnel into the same [`crate::chat::send`] (it branches on a leading `#`
//! to tell a channel target from a username target), so these wrappers only
//! differ in which inbound packet id reaches them.

use crate::chat;
use crate::dispatcher::Context;
use crate::error::BanchoResult;
use crate::session::Session;
use std::sync::Arc;

pub async fn send_public(ctx: &Context<'_>, session: &Arc<Session>, target: &str, message: &str) -> BanchoResult<()> {
    chat::send(ctx.services, ctx.sessions, ctx.channels, session, target, message).await?;
    Ok(())
}

pub async fn send_private(ctx: &Context<'_>, session: &Arc<Session>, target: &str, message: &str) -> BanchoResult<()> {
    chat::send(ctx.services, ctx.sessions, ctx.channels, session, target, message).await?;
    Ok(())
}

pub async fn join_channel(ctx: &Context<'_>, session: &Arc<Session>, channel: &str) -> BanchoResult<()> {
    ctx.channels.join(ctx.services, ctx.sessions, session, channel).await?;
    Ok(())
}

pub async fn part_channel(ctx: &Context<'_>, session: &Arc<Session>, channel: &str) -> BanchoResult<()> {
    ctx.channels.part(ctx.services, session, channel).await
}
