//! Per-entity exponential smoothing of the raw momentum value

use chrono::{DateTime, Utc};

use super::meta::MetaStore;
use crate::shared::types::RawObservation;

/// Exponential moving average over each id's raw score
///
/// `ema' = ema * (1 - alpha) + raw * alpha`, seeded with the first raw value.
#[derive(Debug, Clone, Copy)]
pub struct ScoreSmoother {
    alpha: f64,
}

impl ScoreSmoother {
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    #[inline]
    pub fn blend(&self, previous: f64, raw: f64) -> f64 {
        previous * (1.0 - self.alpha) + raw * self.alpha
    }

    /// Fold a batch into the store, returns the number of ids seen for the first time
    pub fn apply(&self, store: &mut MetaStore, batch: &[RawObservation], now: DateTime<Utc>) -> usize {
        let mut created_count = 0;

        for observation in batch {
            let raw = if observation.raw_score.is_finite() {
                observation.raw_score
            } else {
                0.0
            };

            let (meta, created) = store.entry_or_insert(observation, now);
            if created {
                created_count += 1;
                meta.ema_score = raw;
            } else {
                meta.ema_score = self.blend(meta.ema_score, raw);
            }
            meta.last_raw_score = raw;
            meta.last_seen_at = now;
            meta.grace_score = None;
            meta.last_row = observation.clone();
        }

        created_count
    }
}
