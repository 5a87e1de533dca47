//! Feed handler: pulls movers snapshots and submits them as batches
//!
//! `http(s)://` urls are polled on a fixed interval, `ws(s)://` urls are
//! treated as a push stream where every text frame is a full snapshot.

use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use reqwest::Client;
use serde_json::Value;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::shared::{error::FeedError, parse::parse_batch, types::RawObservation};

/// Connection status for the movers feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Connected,
    Disconnected,
    Reconnecting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    Poll(String),
    WebSocket(String),
}

impl FeedSource {
    pub fn from_url(url: &str) -> Result<Self, FeedError> {
        let url = url.trim();
        let scheme = url.split("://").next().unwrap_or_default().to_ascii_lowercase();
        match scheme.as_str() {
            "http" | "https" => Ok(FeedSource::Poll(url.to_string())),
            "ws" | "wss" => Ok(FeedSource::WebSocket(url.to_string())),
            _ => Err(FeedError::UnsupportedScheme(url.to_string())),
        }
    }
}

/// Feed configuration
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Snapshot endpoint
    pub url: String,
    /// Poll period for HTTP endpoints
    pub poll_interval: Duration,
    /// Delay before reconnecting a dropped WebSocket
    pub reconnect_delay: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080/movers".to_string(),
            poll_interval: Duration::from_millis(1000),
            reconnect_delay: Duration::from_secs(2),
        }
    }
}

impl FeedConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set reconnect delay
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

/// Spawn the feed task for `config`
///
/// The task stops, dropping any in-flight request, as soon as `shutdown_rx`
/// flips or the batch receiver goes away.
pub fn spawn_feed(
    config: FeedConfig,
    batch_tx: mpsc::Sender<Vec<RawObservation>>,
    shutdown_rx: watch::Receiver<bool>,
    status_tx: watch::Sender<FeedStatus>,
) -> Result<JoinHandle<()>, FeedError> {
    let source = FeedSource::from_url(&config.url)?;
    info!(?source, "Starting movers feed");

    Ok(tokio::spawn(async move {
        match source {
            FeedSource::Poll(url) => {
                run_poll_loop(url, config.poll_interval, batch_tx, shutdown_rx, status_tx).await
            }
            FeedSource::WebSocket(url) => {
                run_websocket_loop(url, config.reconnect_delay, batch_tx, shutdown_rx, status_tx)
                    .await
            }
        }
        debug!("Movers feed stopped");
    }))
}

async fn fetch_snapshot(client: &Client, url: &str) -> Result<Value, FeedError> {
    let snapshot = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<Value>()
        .await?;
    Ok(snapshot)
}

async fn run_poll_loop(
    url: String,
    poll_interval: Duration,
    batch_tx: mpsc::Sender<Vec<RawObservation>>,
    mut shutdown_rx: watch::Receiver<bool>,
    status_tx: watch::Sender<FeedStatus>,
) {
    let client = Client::new();
    let mut timer = interval(poll_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    status_tx.send_replace(FeedStatus::Reconnecting);

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            _ = timer.tick() => {}
        }

        let fetched = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            fetched = fetch_snapshot(&client, &url) => fetched,
        };

        match fetched {
            Ok(snapshot) => {
                status_tx.send_replace(FeedStatus::Connected);
                let batch = parse_batch(&snapshot, Utc::now());
                if batch_tx.send(batch).await.is_err() {
                    warn!("Batch receiver dropped, stopping feed");
                    break;
                }
            }
            Err(e) => {
                // Engine sees a missing batch, display stays as it was
                warn!(%url, error = %e, "Movers snapshot poll failed");
                status_tx.send_replace(FeedStatus::Disconnected);
            }
        }
    }
}

async fn run_websocket_loop(
    url: String,
    reconnect_delay: Duration,
    batch_tx: mpsc::Sender<Vec<RawObservation>>,
    mut shutdown_rx: watch::Receiver<bool>,
    status_tx: watch::Sender<FeedStatus>,
) {
    'reconnect: loop {
        status_tx.send_replace(FeedStatus::Reconnecting);

        let connected = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            connected = connect_async(url.as_str()) => connected.map_err(FeedError::from),
        };

        match connected {
            Ok((ws_stream, _)) => {
                info!("Connected to movers feed at {}", url);
                status_tx.send_replace(FeedStatus::Connected);

                let (_, mut read) = ws_stream.split();

                loop {
                    let msg = tokio::select! {
                        biased;
                        _ = shutdown_rx.changed() => break 'reconnect,
                        msg = read.next() => msg,
                    };

                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<Value>(&text) {
                                Ok(snapshot) => {
                                    let batch = parse_batch(&snapshot, Utc::now());
                                    if batch_tx.send(batch).await.is_err() {
                                        warn!("Batch receiver dropped, stopping feed");
                                        break 'reconnect;
                                    }
                                }
                                Err(e) => {
                                    let preview: String = text.chars().take(100).collect();
                                    debug!("Failed to parse movers frame: {} - {}", e, preview);
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            warn!("Movers feed connection closed");
                            break;
                        }
                        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                            // Heartbeat - handled automatically
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            let e = FeedError::from(e);
                            error!("Movers feed error: {}", e);
                            if e.is_terminal() {
                                break;
                            }
                        }
                    }
                }

                status_tx.send_replace(FeedStatus::Disconnected);
            }
            Err(e) => {
                error!("Failed to connect to movers feed at {}: {}", url, e);
                status_tx.send_replace(FeedStatus::Disconnected);
            }
        }

        debug!("Waiting {:?} before reconnecting to movers feed...", reconnect_delay);
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }

    status_tx.send_replace(FeedStatus::Disconnected);
}
