//! Display merger: the sole writer of the on-screen list
//!
//! Each commit reconciles the previous rows with the latest candidates:
//! 1. Locked incumbents (lease not yet elapsed) that are still candidates keep a slot.
//! 2. Remaining slots go to incumbents still anywhere in the candidate list
//!    (buffer included) in their prior order, then newcomers in candidate order.
//! 3. Any slot still free is filled from the candidate buffer by score.
//! 4. Bounded hysteresis: adjacent rows swap only when the lower one leads by more
//!    than `swap_margin`, for at most `bubble_passes` sweeps.
//! 5. Newcomers get a lease of `min_stay`.
//! 6. Unchanged signature (ids + rounded scores) means no commit.
//!
//! A candidate outside the selected rows never displaces an incumbent through
//! hysteresis. It enters only once an incumbent leaves the candidate list,
//! which the selector holds off while the incumbent is leased.

use chrono::{DateTime, TimeDelta, Utc};
use fnv::{FnvHashMap, FnvHashSet};
use smol_str::SmolStr;
use tracing::debug;

use super::meta::MetaStore;
use crate::shared::types::{Candidate, DisplayRow};

/// Ordered ids with scores rounded to hundredths
pub type Signature = Vec<(SmolStr, i64)>;

#[derive(Debug, Clone)]
pub struct DisplayMerger {
    visible_count: usize,
    min_stay: TimeDelta,
    swap_margin: f64,
    bubble_passes: usize,
    rows: Vec<DisplayRow>,
    signature: Signature,
}

impl DisplayMerger {
    pub fn new(
        visible_count: usize,
        min_stay: TimeDelta,
        swap_margin: f64,
        bubble_passes: usize,
    ) -> Self {
        Self {
            visible_count,
            min_stay,
            swap_margin,
            bubble_passes,
            rows: Vec::new(),
            signature: Vec::new(),
        }
    }

    /// Currently committed rows
    pub fn rows(&self) -> &[DisplayRow] {
        &self.rows
    }

    pub fn on_screen_ids(&self) -> Vec<SmolStr> {
        self.rows.iter().map(|row| row.id.clone()).collect()
    }

    /// Run one commit cycle, returns the new rows only when they changed
    pub fn merge(
        &mut self,
        candidates: &[Candidate],
        store: &mut MetaStore,
        now: DateTime<Utc>,
    ) -> Option<Vec<DisplayRow>> {
        if candidates.is_empty() {
            debug!("No candidates, keeping previous rows");
            return None;
        }

        let by_id: FnvHashMap<&str, &Candidate> =
            candidates.iter().map(|c| (c.id.as_str(), c)).collect();
        let previous: Vec<&str> = self.rows.iter().map(|row| row.id.as_str()).collect();
        let previous_set: FnvHashSet<&str> = previous.iter().copied().collect();

        let mut selected: FnvHashSet<&str> = FnvHashSet::default();

        // Locked incumbents still eligible
        for id in &previous {
            if selected.len() >= self.visible_count {
                break;
            }
            let locked = store.get(id).is_some_and(|meta| meta.is_locked(now));
            if locked && by_id.contains_key(id) {
                selected.insert(*id);
            }
        }

        // Merged order: incumbents in prior order, then newcomers in candidate order
        let merged = previous
            .iter()
            .copied()
            .filter(|id| by_id.contains_key(id))
            .chain(
                candidates
                    .iter()
                    .map(|c| c.id.as_str())
                    .filter(|id| !previous_set.contains(id)),
            );
        for id in merged {
            if selected.len() >= self.visible_count {
                break;
            }
            selected.insert(id);
        }

        // Buffer fill by score
        for candidate in candidates {
            if selected.len() >= self.visible_count {
                break;
            }
            selected.insert(candidate.id.as_str());
        }

        // Incumbents keep their relative order, newcomers follow by candidate rank
        let mut next: Vec<&Candidate> = previous
            .iter()
            .filter(|id| selected.contains(*id))
            .filter_map(|id| by_id.get(id).copied())
            .chain(
                candidates
                    .iter()
                    .filter(|c| selected.contains(c.id.as_str()) && !previous_set.contains(c.id.as_str())),
            )
            .collect();

        self.bubble(&mut next);

        let signature: Signature = next
            .iter()
            .map(|c| (c.id.clone(), (c.score * 100.0).round() as i64))
            .collect();
        if signature == self.signature {
            return None;
        }

        let lease_until = now
            .checked_add_signed(self.min_stay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        for candidate in next.iter().filter(|c| !previous_set.contains(c.id.as_str())) {
            if let Some(meta) = store.get_mut(&candidate.id) {
                meta.extend_lease(lease_until);
            }
        }

        let rows: Vec<DisplayRow> = next
            .iter()
            .enumerate()
            .map(|(position, c)| DisplayRow {
                id: c.id.clone(),
                data: c.source.clone(),
                position,
                score: c.score,
                is_grace_entry: c.is_grace_entry,
            })
            .collect();

        debug!(
            rows = rows.len(),
            entered = rows.iter().filter(|r| !previous_set.contains(r.id.as_str())).count(),
            left = previous.iter().filter(|id| !selected.contains(*id)).count(),
            "Committed display rows"
        );

        self.rows = rows.clone();
        self.signature = signature;
        Some(rows)
    }

    /// Bounded bottom-up adjacent swaps, so a strong row can climb within one sweep
    fn bubble(&self, rows: &mut [&Candidate]) {
        if rows.len() < 2 {
            return;
        }
        for _ in 0..self.bubble_passes {
            let mut swapped = false;
            for upper in (0..rows.len() - 1).rev() {
                if rows[upper + 1].score - rows[upper].score > self.swap_margin {
                    rows.swap(upper, upper + 1);
                    swapped = true;
                }
            }
            if !swapped {
                break;
            }
        }
    }
}
