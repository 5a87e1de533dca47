//! Movers engine: smoother, selector and merger over one owned metadata store

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use super::{
    merger::DisplayMerger, meta::MetaStore, selector::CandidateSelector, smoother::ScoreSmoother,
};
use crate::shared::{
    config::EngineConfig,
    error::ConfigError,
    types::{Candidate, DisplayRow, RawObservation},
};

fn to_delta(duration: std::time::Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// Stabilization engine for one board (gainers or losers)
///
/// `ingest` runs on every feed batch, `commit` on the fixed commit cadence.
/// Both take `now` explicitly so the engine never reads a clock itself.
#[derive(Debug)]
pub struct MoversEngine {
    config: EngineConfig,
    store: MetaStore,
    smoother: ScoreSmoother,
    selector: CandidateSelector,
    merger: DisplayMerger,
    candidates: Vec<Candidate>,
}

impl MoversEngine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let s = &config.stabilizer;
        let smoother = ScoreSmoother::new(s.alpha);
        let selector = CandidateSelector::new(
            config.polarity,
            config.candidate_capacity(),
            to_delta(s.vanish_grace),
        );
        let merger = DisplayMerger::new(
            config.visible_count,
            to_delta(s.min_stay),
            s.swap_margin,
            s.bubble_passes,
        );

        info!(
            polarity = %config.polarity,
            visible = config.visible_count,
            alpha = s.alpha,
            commit_ms = s.commit_interval.as_millis() as u64,
            "Movers engine initialised"
        );

        Ok(Self {
            config,
            store: MetaStore::new(),
            smoother,
            selector,
            merger,
            candidates: Vec::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fold a feed batch into the store and rebuild the candidate snapshot
    ///
    /// Returns the number of candidates now available to the next commit.
    pub fn ingest(&mut self, batch: &[RawObservation], now: DateTime<Utc>) -> usize {
        let created = self.smoother.apply(&mut self.store, batch, now);
        let pruned = self.store.prune(now);
        let on_screen = self.merger.on_screen_ids();

        self.candidates = self.selector.select(&mut self.store, batch, &on_screen, now);

        debug!(
            observations = batch.len(),
            created,
            pruned,
            tracked = self.store.len(),
            candidates = self.candidates.len(),
            "Ingested batch"
        );
        self.candidates.len()
    }

    /// Run one commit cycle against the latest candidate snapshot
    pub fn commit(&mut self, now: DateTime<Utc>) -> Option<Vec<DisplayRow>> {
        self.merger.merge(&self.candidates, &mut self.store, now)
    }

    /// Rows of the last effective commit
    pub fn rows(&self) -> &[DisplayRow] {
        self.merger.rows()
    }

    /// Latest candidate snapshot
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn store(&self) -> &MetaStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{
        config::{Preset, StabilizerConfig},
        types::Polarity,
    };
    use std::time::Duration;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    fn obs(id: &str, raw: f64, ms: i64) -> RawObservation {
        RawObservation::new(id, raw, 100.0, at(ms))
    }

    fn ids(rows: &[DisplayRow]) -> Vec<&str> {
        rows.iter().map(|r| r.id.as_str()).collect()
    }

    fn smooth_engine(visible: usize) -> MoversEngine {
        MoversEngine::new(EngineConfig::new(Preset::Smooth).with_visible_count(visible)).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = EngineConfig::default()
            .with_stabilizer(StabilizerConfig::default().with_alpha(1.2));
        assert_eq!(MoversEngine::new(config).unwrap_err(), ConfigError::Alpha(1.2));
    }

    #[test]
    fn test_first_commit_shows_seeded_ema() {
        let mut engine = smooth_engine(10);

        engine.ingest(&[obs("BTC", 5.0, 0)], at(0));
        let rows = engine.commit(at(0)).unwrap();

        assert_eq!(ids(&rows), vec!["BTC"]);
        assert_eq!(rows[0].score, 5.0);
        assert_eq!(engine.store().get("BTC").unwrap().ema_score, 5.0);
    }

    #[test]
    fn test_identical_batches_commit_once() {
        let mut engine = smooth_engine(10);
        let batch = vec![obs("A", 3.0, 0), obs("B", 2.0, 0), obs("C", 1.0, 0)];

        let mut commits = 0;
        for tick in 0..10 {
            let now = at(tick * 420);
            engine.ingest(&batch, now);
            if engine.commit(now).is_some() {
                commits += 1;
            }
        }

        assert_eq!(commits, 1);
        assert_eq!(ids(engine.rows()), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_small_gap_does_not_reorder() {
        let mut engine = MoversEngine::new(
            EngineConfig::new(Preset::Smooth)
                .with_stabilizer(StabilizerConfig::preset(Preset::Smooth).with_alpha(1.0)),
        )
        .unwrap();

        engine.ingest(&[obs("A", 10.0, 0), obs("B", 9.0, 0)], at(0));
        engine.commit(at(0));

        engine.ingest(&[obs("A", 10.0, 420), obs("B", 9.95, 420)], at(420));
        engine.commit(at(420));
        assert_eq!(ids(engine.rows()), vec!["A", "B"]);

        // B now leads A by 0.05, still under the 0.18 margin
        engine.ingest(&[obs("A", 10.0, 840), obs("B", 10.05, 840)], at(840));
        engine.commit(at(840));
        assert_eq!(ids(engine.rows()), vec!["A", "B"]);

        engine.ingest(&[obs("A", 10.0, 1260), obs("B", 10.3, 1260)], at(1260));
        engine.commit(at(1260));
        assert_eq!(ids(engine.rows()), vec!["B", "A"]);
    }

    #[test]
    fn test_vanished_id_visible_for_grace_commits() {
        // commit every 420ms, grace 1600ms, feed every 100ms
        let mut engine = smooth_engine(10);
        let mut visible_commits = 0;
        let mut dropped_at = None;

        engine.ingest(&[obs("A", 5.0, 0), obs("B", 1.0, 0)], at(0));
        engine.commit(at(0));
        assert_eq!(ids(engine.rows()), vec!["A", "B"]);

        let mut commit_at = 100;
        for ms in (100..=2500).step_by(100) {
            engine.ingest(&[obs("B", 1.0, ms)], at(ms));
            if ms == commit_at {
                engine.commit(at(ms));
                if engine.rows().iter().any(|r| r.id == "A") {
                    visible_commits += 1;
                } else if dropped_at.is_none() {
                    dropped_at = Some(ms);
                }
                commit_at += 420;
            }
        }

        assert_eq!(visible_commits, 4);
        assert_eq!(dropped_at, Some(1780));
        assert_eq!(ids(engine.rows()), vec!["B"]);
    }

    #[test]
    fn test_grace_row_marked_and_decaying() {
        let mut engine = MoversEngine::new(
            EngineConfig::new(Preset::Smooth)
                .with_stabilizer(StabilizerConfig::preset(Preset::Smooth).with_alpha(1.0)),
        )
        .unwrap();

        engine.ingest(&[obs("A", 10.0, 0), obs("B", 1.0, 0)], at(0));
        engine.commit(at(0));

        engine.ingest(&[obs("B", 1.0, 420)], at(420));
        let rows = engine.commit(at(420)).unwrap();
        let a = rows.iter().find(|r| r.id == "A").unwrap();
        assert!(a.is_grace_entry);
        assert!((a.score - 9.2).abs() < 1e-9);
        assert_eq!(a.data.raw_score, 10.0);

        engine.ingest(&[obs("B", 1.0, 840)], at(840));
        let rows = engine.commit(at(840)).unwrap();
        let a = rows.iter().find(|r| r.id == "A").unwrap();
        assert!(a.score < 9.2);
    }

    #[test]
    fn test_shown_id_survives_challengers_until_lease_elapses() {
        let config = EngineConfig::new(Preset::Smooth)
            .with_visible_count(2)
            .with_stabilizer(
                StabilizerConfig::preset(Preset::Smooth)
                    .with_alpha(1.0)
                    .with_min_stay(Duration::from_millis(2000)),
            );
        let mut engine = MoversEngine::new(config).unwrap();

        engine.ingest(&[obs("A", 3.0, 0), obs("B", 2.0, 0)], at(0));
        engine.commit(at(0));

        // Five challengers push A and B past the 2 + 4 candidate capacity
        let challengers = [
            obs("P", 9.0, 0),
            obs("Q", 8.0, 0),
            obs("R", 7.0, 0),
            obs("S", 6.0, 0),
            obs("T", 5.0, 0),
            obs("A", 3.0, 0),
            obs("B", 2.0, 0),
        ];
        for ms in [420, 840, 1260, 1680] {
            engine.ingest(&challengers, at(ms));
            assert!(engine.store().get("B").unwrap().is_locked(at(ms)));
            assert_eq!(engine.candidates().len(), 6);
            engine.commit(at(ms));
            assert_eq!(ids(engine.rows()), vec!["A", "B"], "evicted at {ms}ms");
        }

        engine.ingest(&challengers, at(2100));
        engine.commit(at(2100));
        assert_eq!(ids(engine.rows()), vec!["P", "A"]);
    }

    #[test]
    fn test_incumbent_in_buffer_band_keeps_slot() {
        let mut engine = MoversEngine::new(
            EngineConfig::new(Preset::Smooth)
                .with_visible_count(2)
                .with_stabilizer(StabilizerConfig::preset(Preset::Smooth).with_alpha(1.0)),
        )
        .unwrap();

        engine.ingest(&[obs("A", 3.0, 0), obs("B", 2.0, 0)], at(0));
        engine.commit(at(0));

        // Leases long gone; X edges past B by 0.01 at the visible cutoff
        engine.ingest(&[obs("A", 3.0, 5000), obs("X", 2.01, 5000), obs("B", 2.0, 5000)], at(5000));
        assert_eq!(
            engine.candidates().iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            vec!["A", "X", "B"]
        );
        assert!(engine.commit(at(5000)).is_none());
        assert_eq!(ids(engine.rows()), vec!["A", "B"]);
    }

    #[test]
    fn test_empty_feed_keeps_last_rows() {
        let mut engine = smooth_engine(10);

        engine.ingest(&[obs("A", 2.0, 0)], at(0));
        engine.commit(at(0));

        // Upstream gap outlasts the grace window
        for ms in (420..=4200).step_by(420) {
            engine.ingest(&[], at(ms));
            engine.commit(at(ms));
        }
        assert_eq!(ids(engine.rows()), vec!["A"]);
    }

    #[test]
    fn test_prunes_silent_entities() {
        let mut engine = smooth_engine(10);

        engine.ingest(&[obs("A", 2.0, 0), obs("B", 1.0, 0)], at(0));
        engine.ingest(&[obs("B", 1.0, 60_000)], at(60_000));
        engine.ingest(&[obs("B", 1.0, 120_500)], at(120_500));

        assert!(!engine.store().contains("A"));
        assert!(engine.store().contains("B"));
    }

    #[test]
    fn test_losers_board() {
        let mut engine = MoversEngine::new(
            EngineConfig::new(Preset::Predator).with_polarity(Polarity::Losers),
        )
        .unwrap();

        engine.ingest(&[obs("A", -1.0, 0), obs("B", 4.0, 0), obs("C", -6.0, 0)], at(0));
        let rows = engine.commit(at(0)).unwrap();

        assert_eq!(ids(&rows), vec!["C", "A"]);
    }

    #[test]
    fn test_candidate_list_bounded() {
        let mut engine = smooth_engine(3);
        let batch: Vec<_> = (0..20).map(|i| obs(&format!("S{i}"), 1.0 + i as f64, 0)).collect();

        assert_eq!(engine.ingest(&batch, at(0)), 3 + 4);
        assert_eq!(engine.commit(at(0)).unwrap().len(), 3);
    }
}
