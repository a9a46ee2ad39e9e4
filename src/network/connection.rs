//! Connection: handles one client's socket from the login handshake
//! through steady-state packet dispatch.
//!
//! The handshake is a handful of plain-text lines read synchronously; the
//! steady-state loop then reads framed binary packets off the same socket
//! and dispatches them, while a separate timer periodically drains the
//! session's outbound queue to the socket. The queue is a plain buffer with no
//! waker, so there is nothing to `.await` on between flushes — a tick is
//! the only way anything else's broadcast reaches this socket.

use crate::channel::ChannelRegistry;
use crate::dispatcher::{self, Context};
use crate::handlers;
use crate::login;
use crate::match_engine::MatchRegistry;
use crate::services::Services;
use crate::session::SessionManager;
use bancho_proto::packet::try_split_packet;
use bancho_proto::server;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const READ_CHUNK: usize = 4096;
const FLUSH_INTERVAL_MS: u64 = 50;

pub struct Connection {
    stream: TcpStream,
    addr: SocketAddr,
    services: Services,
    sessions: Arc<SessionManager>,
    channels: Arc<ChannelRegistry>,
    matches: Arc<MatchRegistry>,
}

impl Connection {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        services: Services,
        sessions: Arc<SessionManager>,
        channels: Arc<ChannelRegistry>,
        matches: Arc<MatchRegistry>,
    ) -> Self {
        Self { stream, addr, services, sessions, channels, matches }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        let Some((body, mut buffer)) = read_handshake_body(&mut self.stream).await? else {
            tracing::info!(addr = %self.addr, "client disconnected during handshake");
            return Ok(());
        };

        let req = match login::parse_login_request(&body) {
            Ok(req) => req,
            Err(_) => {
                self.stream.write_all(&server::user_id(-1)).await.ok();
                return Ok(());
            }
        };

        let success = match login::handle_login(&self.services, &self.sessions, &self.channels, &self.matches, req, self.addr.ip().to_string()).await {
            Ok(success) => success,
            Err(login::LoginError::Banned) => {
                self.stream.write_all(&server::user_id(-5)).await.ok();
                return Ok(());
            }
            Err(_) => {
                self.stream.write_all(&server::user_id(-1)).await.ok();
                return Ok(());
            }
        };
        let session = success.session;
        let token_id = session.token_id.clone();
        self.stream.write_all(&success.response).await?;

        let ctx = Context { services: &self.services, sessions: &self.sessions, channels: &self.channels, matches: &self.matches };
        let mut flush_tick = tokio::time::interval(Duration::from_millis(FLUSH_INTERVAL_MS));
        flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut read_chunk = [0u8; READ_CHUNK];

        'outer: loop {
            tokio::select! {
                read = self.stream.read(&mut read_chunk) => {
                    let n = read?;
                    if n == 0 {
                        tracing::info!(addr = %self.addr, token = %token_id, "client disconnected");
                        break 'outer;
                    }
                    buffer.extend_from_slice(&read_chunk[..n]);

                    loop {
                        match try_split_packet(&buffer) {
                            Ok(Some((header, payload, consumed))) => {
                                let payload = payload.to_vec();
                                if let Err(err) = dispatcher::dispatch(&ctx, &session, header.id, &payload).await {
                                    tracing::warn!(token = %token_id, error = %err, "dispatch error");
                                    let fatal = err.is_fatal();
                                    self.services.metrics.record_packet_dropped(header.id, err.error_code());
                                    buffer.drain(..consumed);
                                    if fatal {
                                        break 'outer;
                                    }
                                    continue;
                                }
                                self.services.metrics.record_packet_decoded(header.id);
                                buffer.drain(..consumed);
                            }
                            Ok(None) => break,
                            Err(_) => {
                                tracing::warn!(addr = %self.addr, token = %token_id, "malformed packet, closing connection");
                                break 'outer;
                            }
                        }
                    }

                    if !Self::flush(&mut self.stream, self.addr, &session).await? {
                        break 'outer;
                    }
                }
                _ = flush_tick.tick() => {
                    if !Self::flush(&mut self.stream, self.addr, &session).await? {
                        break 'outer;
                    }
                }
            }
        }

        // A newer login may already have evicted and torn this session down;
        // only run teardown if the table still points at this exact session.
        if let Some(current) = self.sessions.get(&token_id).await {
            if Arc::ptr_eq(&current, &session) {
                handlers::connection::logout(&ctx, &session).await.ok();
            }
        }
        Ok(())
    }

    async fn flush(
        stream: &mut TcpStream,
        addr: SocketAddr,
        session: &Arc<crate::session::Session>,
    ) -> anyhow::Result<bool> {
        let bytes = session.reset_queue().await;
        if bytes.is_empty() {
            return Ok(true);
        }
        match stream.write_all(&bytes).await {
            Ok(()) => Ok(true),
            Err(err) => {
                tracing::warn!(addr = %addr, error = %err, "write error");
                Ok(false)
            }
        }
    }
}

/// Reads the three-line login handshake off `stream`, returning the raw
/// body text and any already-buffered bytes that belong to the first
/// framed packet after it. `None` means the client disconnected before
/// completing the handshake.
async fn read_handshake_body(stream: &mut TcpStream) -> anyhow::Result<Option<(String, Vec<u8>)>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let newlines = buf.iter().filter(|&&b| b == b'\n').count();
        if newlines >= 3 {
            break;
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let mut seen = 0;
    let split_at = buf
        .iter()
        .position(|&b| {
            if b == b'\n' {
                seen += 1;
            }
            seen == 3
        })
        .map(|pos| pos + 1)
        .unwrap_or(buf.len());

    let body = String::from_utf8_lossy(&buf[..split_at]).into_owned();
    let leftover = buf[split_at..].to_vec();
    Ok(Some((body, leftover)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_split_keeps_trailing_bytes_separate() {
        let mut buf = b"user\npass\nb1|0|0||0\n".to_vec();
        buf.extend_from_slice(&bancho_proto::packet::frame(4, &[]));
        let mut seen = 0;
        let split_at = buf
            .iter()
            .position(|&b| {
                if b == b'\n' {
                    seen += 1;
                }
                seen == 3
            })
            .map(|pos| pos + 1)
            .unwrap();
        assert_eq!(&buf[..split_at], b"user\npass\nb1|0|0||0\n");
        assert_eq!(&buf[split_at..], &bancho_proto::packet::frame(4, &[])[..]);
    }
}
