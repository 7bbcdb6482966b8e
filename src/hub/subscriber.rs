//! Per-subscriber transport pumps
//!
//! Every WebSocket connection runs two loops:
//!
//! - the write pump drains the subscriber's hub queue into the socket,
//!   coalescing frames already queued into one flush, relays pong replies,
//!   and sends a protocol ping every `ping_period`;
//! - the read pump consumes inbound frames under a read deadline that is
//!   re-armed by every frame (keepalive pongs included) and answers the
//!   application-level `{"type":"ping"}` with `{"type":"pong"}`.
//!
//! Both are generic over `Sink`/`Stream` so they run against plain channels
//! in tests.

use std::fmt::Display;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, Utf8Bytes};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};

use super::{Hub, Subscription};
use crate::config::HubConfig;

const PONG_FRAME: &str = r#"{"type":"pong"}"#;

/// Pending application pongs per connection; extra pings are dropped
const PONG_QUEUE: usize = 8;

/// Timing and size limits for one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpConfig {
    /// Deadline for a single write (or coalesced batch)
    pub write_wait: Duration,
    /// Read deadline; a silent peer is dropped after this long
    pub pong_wait: Duration,
    /// Keepalive interval, shorter than `pong_wait`
    pub ping_period: Duration,
    /// Largest accepted inbound frame in bytes
    pub max_message_size: usize,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self::from(&HubConfig::default())
    }
}

impl From<&HubConfig> for PumpConfig {
    fn from(config: &HubConfig) -> Self {
        Self {
            write_wait: config.write_wait(),
            pong_wait: config.pong_wait(),
            ping_period: config.ping_period(),
            max_message_size: config.max_message_size,
        }
    }
}

/// Why a pump stopped
#[derive(Debug, Error)]
pub enum PumpError {
    #[error("write failed: {0}")]
    Write(String),

    #[error("write timed out")]
    WriteTimeout,

    #[error("read failed: {0}")]
    Read(String),

    #[error("no frame received within the read deadline")]
    ReadTimeout,

    #[error("inbound frame of {size} bytes exceeds limit of {limit}")]
    MessageTooLarge { size: usize, limit: usize },
}

#[derive(Deserialize)]
struct ClientMessage {
    #[serde(rename = "type")]
    kind: String,
}

// ============================================================================
// Write pump
// ============================================================================

/// Drain `queue` into `sink` until the hub closes the queue or a write fails
pub async fn write_pump<S>(
    mut sink: S,
    mut queue: mpsc::Receiver<Utf8Bytes>,
    mut pongs: mpsc::Receiver<Utf8Bytes>,
    config: PumpConfig,
) -> Result<(), PumpError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut keepalive = tokio::time::interval_at(
        Instant::now() + config.ping_period,
        config.ping_period,
    );

    loop {
        tokio::select! {
            frame = queue.recv() => match frame {
                Some(frame) => {
                    // Coalesce whatever is already queued into this flush
                    let pending = queue.len();
                    let batch = async {
                        sink.feed(Message::Text(frame)).await?;
                        for _ in 0..pending {
                            match queue.try_recv() {
                                Ok(next) => sink.feed(Message::Text(next)).await?,
                                Err(_) => break,
                            }
                        }
                        sink.flush().await
                    };
                    write_within(config.write_wait, batch).await?;
                }
                None => {
                    // Queue closed by the hub
                    let _ = timeout(config.write_wait, sink.send(Message::Close(None))).await;
                    return Ok(());
                }
            },
            Some(pong) = pongs.recv() => {
                write_within(config.write_wait, sink.send(Message::Text(pong))).await?;
            }
            _ = keepalive.tick() => {
                write_within(config.write_wait, sink.send(Message::Ping(Bytes::new()))).await?;
            }
        }
    }
}

async fn write_within<F, E>(wait: Duration, write: F) -> Result<(), PumpError>
where
    F: std::future::Future<Output = Result<(), E>>,
    E: Display,
{
    match timeout(wait, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(PumpError::Write(e.to_string())),
        Err(_) => Err(PumpError::WriteTimeout),
    }
}

// ============================================================================
// Read pump
// ============================================================================

/// Consume inbound frames until the peer closes, errors, or goes silent
pub async fn read_pump<R, E>(
    mut stream: R,
    pongs: mpsc::Sender<Utf8Bytes>,
    config: PumpConfig,
) -> Result<(), PumpError>
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let message = match timeout(config.pong_wait, stream.next()).await {
            Err(_) => return Err(PumpError::ReadTimeout),
            Ok(None) => return Ok(()),
            Ok(Some(Err(e))) => return Err(PumpError::Read(e.to_string())),
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => {
                if text.len() > config.max_message_size {
                    return Err(PumpError::MessageTooLarge {
                        size: text.len(),
                        limit: config.max_message_size,
                    });
                }
                let is_ping = serde_json::from_str::<ClientMessage>(text.as_str())
                    .map(|m| m.kind == "ping")
                    .unwrap_or(false);
                if is_ping && pongs.try_send(Utf8Bytes::from_static(PONG_FRAME)).is_err() {
                    tracing::debug!("Pong queue full, dropping reply");
                }
            }
            Message::Binary(data) if data.len() > config.max_message_size => {
                return Err(PumpError::MessageTooLarge {
                    size: data.len(),
                    limit: config.max_message_size,
                });
            }
            Message::Close(_) => return Ok(()),
            // Protocol pings are answered by the transport; pongs only re-arm the deadline
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}

// ============================================================================
// Connection driver
// ============================================================================

/// Run both pumps for one registered subscriber and unregister it afterwards
pub async fn run_subscriber<S, R, E>(
    hub: Hub,
    subscription: Subscription,
    sink: S,
    stream: R,
    config: PumpConfig,
) where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display + Send,
    R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
{
    let Subscription { id, queue } = subscription;
    let (pong_tx, pong_rx) = mpsc::channel(PONG_QUEUE);

    let mut writer = tokio::spawn(write_pump(sink, queue, pong_rx, config));
    let mut reader = tokio::spawn(read_pump(stream, pong_tx, config));

    tokio::select! {
        result = &mut reader => {
            log_exit(id, "read", result);
            hub.unregister(id);
            // Queue closes once the hub processes the unregister
            log_exit(id, "write", writer.await);
        }
        result = &mut writer => {
            log_exit(id, "write", result);
            reader.abort();
            hub.unregister(id);
        }
    }
}

fn log_exit(
    id: super::SubscriberId,
    pump: &'static str,
    result: Result<Result<(), PumpError>, tokio::task::JoinError>,
) {
    match result {
        Ok(Ok(())) => tracing::debug!(subscriber = id, pump, "Pump finished"),
        Ok(Err(e)) => tracing::info!(subscriber = id, pump, error = %e, "Pump stopped"),
        Err(e) if e.is_cancelled() => {}
        Err(e) => tracing::error!(subscriber = id, pump, error = %e, "Pump task panicked"),
    }
}
