//! Out-of-band moderation notifications. Replaces a thread-pool Discord
//! shipper with an unbounded mpsc queue drained by one background task,
//! with bounded retries owned entirely by this adapter — the match/session
//! core never blocks on or observes delivery.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum ModerationEvent {
    Silenced { user_id: i32, seconds: i64, reason: String, author_uid: i32 },
    Restricted { user_id: i32, reason: String },
    Banned { user_id: i32, reason: String },
}

#[async_trait]
pub trait Webhook: Send + Sync {
    fn notify(&self, event: ModerationEvent);
}

#[derive(Debug, Default)]
pub struct NoopWebhook;

impl Webhook for NoopWebhook {
    fn notify(&self, _event: ModerationEvent) {}
}

/// Narrow seam for the actual outbound transport, so `QueuedWebhook` owns
/// retry/backoff policy while delivery mechanics (HTTP, in tests: a
/// recording sink) live behind this trait.
#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn deliver(&self, channel: &str, event: &ModerationEvent) -> Result<(), String>;
}

pub struct UrlWebhookSink {
    urls: std::collections::HashMap<String, String>,
}

impl UrlWebhookSink {
    pub fn new(urls: std::collections::HashMap<String, String>) -> Self {
        Self { urls }
    }
}

#[async_trait]
impl WebhookSink for UrlWebhookSink {
    async fn deliver(&self, channel: &str, event: &ModerationEvent) -> Result<(), String> {
        match self.urls.get(channel) {
            Some(_url) => {
                // The HTTP client itself is an adapter concern out of scope here;
                // a real deployment plugs a `reqwest`-backed sink behind this trait.
                tracing::debug!(?event, channel, "would POST moderation webhook");
                Ok(())
            }
            None => Err(format!("no webhook url configured for channel {channel}")),
        }
    }
}

const MAX_ATTEMPTS: u32 = 5;
const BASE_BACKOFF_MS: u64 = 200;

pub struct QueuedWebhook {
    sender: mpsc::Sender<(String, ModerationEvent)>,
    dropped: Arc<AtomicU64>,
}

impl QueuedWebhook {
    pub fn spawn(sink: Arc<dyn WebhookSink>, channel: &str) -> Self {
        let (sender, mut receiver) = mpsc::channel::<(String, ModerationEvent)>(1024);
        let dropped = Arc::new(AtomicU64::new(0));
        let dropped_in_task = dropped.clone();
        let default_channel = channel.to_string();
        tokio::spawn(async move {
            while let Some((channel, event)) = receiver.recv().await {
                let channel = if channel.is_empty() { default_channel.clone() } else { channel };
                let mut attempt = 0;
                loop {
                    match sink.deliver(&channel, &event).await {
                        Ok(()) => break,
                        Err(err) if attempt + 1 < MAX_ATTEMPTS => {
                            attempt += 1;
                            let backoff = BASE_BACKOFF_MS * 2u64.pow(attempt);
                            tracing::warn!(%channel, attempt, %err, "webhook delivery failed, retrying");
                            tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
                        }
                        Err(err) => {
                            dropped_in_task.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(%channel, %err, "webhook delivery dropped after retry budget exhausted");
                            break;
                        }
                    }
                }
            }
        });
        Self { sender, dropped }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Webhook for QueuedWebhook {
    fn notify(&self, event: ModerationEvent) {
        if self.sender.try_send((String::new(), event)).is_err() {
            tracing::warn!("moderation webhook queue full, dropping event");
        }
    }
}
