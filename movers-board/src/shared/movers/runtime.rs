//! Tokio runtime around [`MoversEngine`]
//!
//! Two independent activities share the engine behind one mutex:
//! - ingestion: every submitted batch is smoothed and turned into candidates
//! - commit loop: a fixed-cadence timer, sole writer of the on-screen rows
//!
//! Committed rows are published on a `watch` channel, so readers always see
//! the latest commit and never a queue of stale ones.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, info};

use super::engine::MoversEngine;
use crate::shared::types::{DisplayRow, RawObservation};

/// Pending batches beyond this are back-pressured onto the feed
const BATCH_CHANNEL_SIZE: usize = 64;

/// Read-only snapshot of committed rows
pub type RowsSnapshot = Arc<Vec<DisplayRow>>;

/// Handle to a running engine
pub struct EngineHandle {
    engine: Arc<Mutex<MoversEngine>>,
    batch_tx: mpsc::Sender<Vec<RawObservation>>,
    rows_rx: watch::Receiver<RowsSnapshot>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

/// Spawn the ingestion task and the commit loop for an engine
pub fn spawn_engine(engine: MoversEngine) -> EngineHandle {
    let commit_interval = engine.config().stabilizer.commit_interval;
    let engine = Arc::new(Mutex::new(engine));

    let (batch_tx, batch_rx) = mpsc::channel(BATCH_CHANNEL_SIZE);
    let (rows_tx, rows_rx) = watch::channel(RowsSnapshot::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ingest_task = tokio::spawn(run_ingest_loop(
        Arc::clone(&engine),
        batch_rx,
        shutdown_rx.clone(),
    ));
    let commit_task = tokio::spawn(run_commit_loop(
        Arc::clone(&engine),
        commit_interval,
        rows_tx,
        shutdown_rx,
    ));

    info!(
        commit_ms = commit_interval.as_millis() as u64,
        "Movers engine started"
    );

    EngineHandle {
        engine,
        batch_tx,
        rows_rx,
        shutdown_tx,
        tasks: vec![ingest_task, commit_task],
    }
}

async fn run_ingest_loop(
    engine: Arc<Mutex<MoversEngine>>,
    mut batch_rx: mpsc::Receiver<Vec<RawObservation>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            batch = batch_rx.recv() => {
                let Some(batch) = batch else { break };
                if *shutdown_rx.borrow() {
                    break;
                }
                engine.lock().ingest(&batch, Utc::now());
            }
        }
    }
    debug!("Ingestion task stopped");
}

async fn run_commit_loop(
    engine: Arc<Mutex<MoversEngine>>,
    commit_interval: std::time::Duration,
    rows_tx: watch::Sender<RowsSnapshot>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(commit_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            _ = ticker.tick() => {
                if *shutdown_rx.borrow() {
                    break;
                }
                let committed = engine.lock().commit(Utc::now());
                if let Some(rows) = committed {
                    rows_tx.send_replace(Arc::new(rows));
                }
            }
        }
    }
    debug!("Commit loop stopped");
}

impl EngineHandle {
    /// Queue a feed batch for ingestion, `false` once the engine is shut down
    pub async fn submit(&self, batch: Vec<RawObservation>) -> bool {
        if *self.shutdown_tx.borrow() {
            return false;
        }
        self.batch_tx.send(batch).await.is_ok()
    }

    /// Sender for feed tasks that push batches on their own schedule
    pub fn batch_sender(&self) -> mpsc::Sender<Vec<RawObservation>> {
        self.batch_tx.clone()
    }

    /// Receiver notified on every effective commit
    pub fn subscribe(&self) -> watch::Receiver<RowsSnapshot> {
        self.rows_rx.clone()
    }

    /// Polled read of the latest committed rows
    pub fn latest(&self) -> RowsSnapshot {
        Arc::clone(&self.rows_rx.borrow())
    }

    /// Receiver that flips to `true` when shutdown is requested
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Shared engine, for read access outside the runtime
    pub fn engine(&self) -> Arc<Mutex<MoversEngine>> {
        Arc::clone(&self.engine)
    }

    /// Join an extra task (e.g., a feed) on shutdown
    pub fn attach(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    /// Stop committing and ingesting, then wait for every task to finish
    ///
    /// A commit already in progress completes; no new commit starts.
    pub async fn shutdown(self) {
        info!("Shutting down movers engine");
        self.shutdown_tx.send_replace(true);
        drop(self.batch_tx);

        for task in self.tasks {
            let _ = task.await;
        }
        info!("Movers engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::config::{EngineConfig, Preset, StabilizerConfig};
    use std::time::Duration;
    use tokio::time::timeout;

    fn fast_engine() -> MoversEngine {
        let config = EngineConfig::new(Preset::Predator).with_stabilizer(
            StabilizerConfig::preset(Preset::Predator).with_commit_interval(Duration::from_millis(20)),
        );
        MoversEngine::new(config).unwrap()
    }

    fn batch(entries: &[(&str, f64)]) -> Vec<RawObservation> {
        entries
            .iter()
            .map(|(id, raw)| RawObservation::new(*id, *raw, 1.0, Utc::now()))
            .collect()
    }

    #[tokio::test]
    async fn test_submitted_batch_is_committed_and_published() {
        let handle = spawn_engine(fast_engine());
        let mut rows_rx = handle.subscribe();

        assert!(handle.submit(batch(&[("BTC", 5.0), ("ETH", 2.0)])).await);

        timeout(Duration::from_secs(2), rows_rx.changed())
            .await
            .expect("commit within timeout")
            .unwrap();

        let rows = handle.latest();
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["BTC", "ETH"]);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_unchanged_feed_publishes_once() {
        let handle = spawn_engine(fast_engine());
        let mut rows_rx = handle.subscribe();

        handle.submit(batch(&[("BTC", 5.0)])).await;
        timeout(Duration::from_secs(2), rows_rx.changed())
            .await
            .unwrap()
            .unwrap();

        for _ in 0..3 {
            handle.submit(batch(&[("BTC", 5.0)])).await;
        }
        let republished = timeout(Duration::from_millis(200), rows_rx.changed()).await;
        assert!(republished.is_err(), "identical feed must not publish again");

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_mutation_after_shutdown() {
        let handle = spawn_engine(fast_engine());
        let engine = handle.engine();
        let sender = handle.batch_sender();
        let rows_rx = handle.subscribe();

        handle.shutdown().await;

        // Channel is closed once the ingestion task has stopped
        assert!(sender.send(batch(&[("BTC", 5.0)])).await.is_err());
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(engine.lock().store().is_empty());
        assert!(engine.lock().rows().is_empty());
        assert!(rows_rx.borrow().is_empty());
    }
}
