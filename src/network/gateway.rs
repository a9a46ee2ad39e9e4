//! Gateway: TCP listener that accepts incoming connections and spawns a
//! [`Connection`] task for each one.

use crate::channel::ChannelRegistry;
use crate::match_engine::MatchRegistry;
use crate::network::Connection;
use crate::services::Services;
use crate::session::SessionManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

pub struct Gateway {
    listener: TcpListener,
    services: Services,
    sessions: Arc<SessionManager>,
    channels: Arc<ChannelRegistry>,
    matches: Arc<MatchRegistry>,
}

impl Gateway {
    pub async fn bind(
        addr: SocketAddr,
        services: Services,
        sessions: Arc<SessionManager>,
        channels: Arc<ChannelRegistry>,
        matches: Arc<MatchRegistry>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "gateway listening");
        Ok(Self { listener, services, sessions, channels, matches })
    }

    /// Accepts connections until `shutdown` fires, spawning one task per
    /// client. Does not wait for in-flight connections to drain; callers
    /// that need a clean stop should also track the spawned handles.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            tracing::info!(%addr, "connection accepted");
                            let connection = Connection::new(
                                stream,
                                addr,
                                self.services.clone(),
                                self.sessions.clone(),
                                self.channels.clone(),
                                self.matches.clone(),
                            );
                            tokio::spawn(async move {
                                if let Err(err) = connection.run().await {
                                    tracing::warn!(%addr, error = %err, "connection error");
                                }
                            });
                        }
                        Err(err) => tracing::warn!(error = %err, "failed to accept connection"),
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("gateway shutting down");
                    return Ok(());
                }
            }
        }
    }
}
