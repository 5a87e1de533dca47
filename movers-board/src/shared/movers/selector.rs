//! Candidate selection: scored feed plus ids riding the vanish grace
//!
//! The list holds `visible + buffer` entries so rank jitter right at the
//! cutoff stays off screen.

use chrono::{DateTime, TimeDelta, Utc};
use fnv::FnvHashSet;
use smol_str::SmolStr;
use tracing::debug;

use super::meta::MetaStore;
use crate::shared::types::{Candidate, Polarity, RawObservation};

/// Per-ingest multiplier applied to a vanished id's score
pub const GRACE_DECAY: f64 = 0.92;

#[derive(Debug, Clone)]
pub struct CandidateSelector {
    polarity: Polarity,
    capacity: usize,
    vanish_grace: TimeDelta,
}

impl CandidateSelector {
    pub fn new(polarity: Polarity, capacity: usize, vanish_grace: TimeDelta) -> Self {
        Self {
            polarity,
            capacity,
            vanish_grace,
        }
    }

    /// Build the ranked candidate list for this ingest
    ///
    /// `batch` must already be folded into `store` by the smoother.
    pub fn select(
        &self,
        store: &mut MetaStore,
        batch: &[RawObservation],
        on_screen: &[SmolStr],
        now: DateTime<Utc>,
    ) -> Vec<Candidate> {
        let mut seen = FnvHashSet::default();
        let mut candidates = Vec::with_capacity(batch.len().min(self.capacity) + on_screen.len());

        for observation in batch {
            if !seen.insert(observation.id.clone()) {
                continue;
            }
            let Some(meta) = store.get_mut(&observation.id) else {
                continue;
            };
            if !self.polarity.admits(meta.last_raw_score) {
                continue;
            }

            meta.last_ranked_at = Some(now);
            meta.grace_score = None;
            candidates.push(Candidate {
                id: observation.id.clone(),
                score: self.polarity.orient(meta.ema_score),
                source: meta.last_row.clone(),
                is_grace_entry: false,
            });
        }

        // Stable sort: equal scores keep feed order
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        let ranked: FnvHashSet<SmolStr> = candidates.iter().map(|c| c.id.clone()).collect();

        for id in on_screen {
            if ranked.contains(id) {
                continue;
            }
            let Some(meta) = store.get_mut(id) else {
                continue;
            };

            let last_ranked = meta.last_ranked_at.unwrap_or(meta.last_seen_at);
            if now - last_ranked > self.vanish_grace {
                meta.grace_score = None;
                debug!(%id, "Vanish grace elapsed, dropping candidate");
                continue;
            }

            let decayed = meta
                .grace_score
                .unwrap_or_else(|| self.polarity.orient(meta.ema_score))
                * GRACE_DECAY;
            meta.grace_score = Some(decayed);
            candidates.push(Candidate {
                id: id.clone(),
                score: decayed,
                source: meta.last_row.clone(),
                is_grace_entry: true,
            });
        }

        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        self.truncate(&mut candidates, store, on_screen, now);
        candidates
    }

    /// Cut the ranked list to capacity, keeping leased on-screen ids past the cutoff
    ///
    /// Leased ids are at most the visible count, so the list never exceeds capacity.
    fn truncate(
        &self,
        candidates: &mut Vec<Candidate>,
        store: &MetaStore,
        on_screen: &[SmolStr],
        now: DateTime<Utc>,
    ) {
        let leased: FnvHashSet<&str> = on_screen
            .iter()
            .filter(|id| store.get(id).is_some_and(|meta| meta.is_locked(now)))
            .map(SmolStr::as_str)
            .collect();
        let reserved = candidates
            .iter()
            .filter(|c| leased.contains(c.id.as_str()))
            .count();

        let mut room = self.capacity.saturating_sub(reserved);
        let before = candidates.len();
        candidates.retain(|c| {
            if leased.contains(c.id.as_str()) {
                true
            } else if room > 0 {
                room -= 1;
                true
            } else {
                false
            }
        });
        if candidates.len() < before && reserved > 0 {
            debug!(reserved, dropped = before - candidates.len(), "Kept leased ids past cutoff");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::movers::smoother::ScoreSmoother;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    fn obs(id: &str, raw: f64, ms: i64) -> RawObservation {
        RawObservation::new(id, raw, 100.0, at(ms))
    }

    fn ids(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.id.as_str()).collect()
    }

    /// Smooth a batch in, then select, like one ingest
    fn tick(
        selector: &CandidateSelector,
        store: &mut MetaStore,
        batch: &[RawObservation],
        on_screen: &[&str],
        ms: i64,
    ) -> Vec<Candidate> {
        ScoreSmoother::new(1.0).apply(store, batch, at(ms));
        let on_screen: Vec<SmolStr> = on_screen.iter().map(SmolStr::new).collect();
        selector.select(store, batch, &on_screen, at(ms))
    }

    #[test]
    fn test_polarity_filter_and_order() {
        let selector = CandidateSelector::new(Polarity::Gainers, 10, TimeDelta::milliseconds(1600));
        let mut store = MetaStore::new();

        let batch = vec![obs("A", 1.0, 0), obs("B", -2.0, 0), obs("C", 3.0, 0), obs("D", 0.0, 0)];
        let candidates = tick(&selector, &mut store, &batch, &[], 0);

        assert_eq!(ids(&candidates), vec!["C", "A"]);
        assert!(candidates.iter().all(|c| !c.is_grace_entry));
    }

    #[test]
    fn test_losers_rank_biggest_drop_first() {
        let selector = CandidateSelector::new(Polarity::Losers, 10, TimeDelta::milliseconds(1600));
        let mut store = MetaStore::new();

        let batch = vec![obs("A", -1.0, 0), obs("B", 2.0, 0), obs("C", -3.0, 0)];
        let candidates = tick(&selector, &mut store, &batch, &[], 0);

        assert_eq!(ids(&candidates), vec!["C", "A"]);
        assert_eq!(candidates[0].score, 3.0);
    }

    #[test]
    fn test_ties_keep_feed_order() {
        let selector = CandidateSelector::new(Polarity::Gainers, 10, TimeDelta::milliseconds(1600));
        let mut store = MetaStore::new();

        let batch = vec![obs("Z", 2.0, 0), obs("Y", 2.0, 0), obs("X", 2.0, 0)];
        let candidates = tick(&selector, &mut store, &batch, &[], 0);

        assert_eq!(ids(&candidates), vec!["Z", "Y", "X"]);
    }

    #[test]
    fn test_truncates_to_capacity() {
        let selector = CandidateSelector::new(Polarity::Gainers, 3, TimeDelta::milliseconds(1600));
        let mut store = MetaStore::new();

        let batch: Vec<_> = (1..=6).map(|i| obs(&format!("S{i}"), i as f64, 0)).collect();
        let candidates = tick(&selector, &mut store, &batch, &[], 0);

        assert_eq!(ids(&candidates), vec!["S6", "S5", "S4"]);
    }

    #[test]
    fn test_leased_on_screen_id_survives_cutoff() {
        let selector = CandidateSelector::new(Polarity::Gainers, 3, TimeDelta::milliseconds(1600));
        let mut store = MetaStore::new();

        let batch = vec![
            obs("P", 9.0, 0),
            obs("Q", 8.0, 0),
            obs("R", 7.0, 0),
            obs("A", 3.0, 0),
            obs("B", 2.0, 0),
        ];
        tick(&selector, &mut store, &batch, &[], 0);
        store.get_mut("B").unwrap().extend_lease(at(2000));

        let leased = tick(&selector, &mut store, &batch, &["A", "B"], 400);
        assert_eq!(ids(&leased), vec!["P", "Q", "B"]);

        // Lease elapsed: plain score cutoff again
        let expired = tick(&selector, &mut store, &batch, &["A", "B"], 2000);
        assert_eq!(ids(&expired), vec!["P", "Q", "R"]);
    }

    #[test]
    fn test_grace_entry_decays_then_drops() {
        let selector = CandidateSelector::new(Polarity::Gainers, 10, TimeDelta::milliseconds(1000));
        let mut store = MetaStore::new();

        tick(&selector, &mut store, &[obs("A", 10.0, 0), obs("B", 1.0, 0)], &[], 0);

        let first = tick(&selector, &mut store, &[obs("B", 1.0, 400)], &["A", "B"], 400);
        let grace = first.iter().find(|c| c.id == "A").unwrap();
        assert!(grace.is_grace_entry);
        assert!((grace.score - 9.2).abs() < 1e-9);

        let second = tick(&selector, &mut store, &[obs("B", 1.0, 800)], &["A", "B"], 800);
        let grace = second.iter().find(|c| c.id == "A").unwrap();
        assert!((grace.score - 10.0 * 0.92 * 0.92).abs() < 1e-9);

        // 1000ms absent is still inside the window, 1200ms is not
        let third = tick(&selector, &mut store, &[obs("B", 1.0, 1000)], &["A", "B"], 1000);
        assert!(third.iter().any(|c| c.id == "A"));
        let fourth = tick(&selector, &mut store, &[obs("B", 1.0, 1200)], &["A", "B"], 1200);
        assert_eq!(ids(&fourth), vec!["B"]);
    }

    #[test]
    fn test_grace_only_for_on_screen_ids() {
        let selector = CandidateSelector::new(Polarity::Gainers, 10, TimeDelta::milliseconds(1600));
        let mut store = MetaStore::new();

        tick(&selector, &mut store, &[obs("A", 5.0, 0)], &[], 0);
        let candidates = tick(&selector, &mut store, &[], &[], 400);

        assert!(candidates.is_empty());
    }

    #[test]
    fn test_empty_batch_keeps_grace_entries() {
        let selector = CandidateSelector::new(Polarity::Gainers, 10, TimeDelta::milliseconds(1600));
        let mut store = MetaStore::new();

        tick(&selector, &mut store, &[obs("A", 5.0, 0)], &[], 0);
        let candidates = tick(&selector, &mut store, &[], &["A"], 400);

        assert_eq!(ids(&candidates), vec!["A"]);
        assert!(candidates[0].is_grace_entry);
    }

    #[test]
    fn test_polarity_flip_uses_grace_window() {
        let selector = CandidateSelector::new(Polarity::Gainers, 10, TimeDelta::milliseconds(1000));
        let mut store = MetaStore::new();

        tick(&selector, &mut store, &[obs("A", 5.0, 0)], &[], 0);

        // Still in the feed, but now a loser: kept at decaying score until the window closes
        let flipped = tick(&selector, &mut store, &[obs("A", -1.0, 500)], &["A"], 500);
        assert!(flipped[0].is_grace_entry);
        let gone = tick(&selector, &mut store, &[obs("A", -1.0, 1500)], &["A"], 1500);
        assert!(gone.is_empty());
    }
}
