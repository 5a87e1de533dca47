//! Per-entity state owned by the engine
//!
//! One `EntityMeta` per id, created on first observation and swept once the id
//! has been silent for longer than [`META_IDLE_TTL`].

use chrono::{DateTime, TimeDelta, Utc};
use fnv::FnvHashMap;
use smol_str::SmolStr;

use crate::shared::types::RawObservation;

/// Entries idle for longer than this are pruned (2 minutes)
pub const META_IDLE_TTL: TimeDelta = TimeDelta::minutes(2);

#[derive(Debug, Clone, PartialEq)]
pub struct EntityMeta {
    pub ema_score: f64,
    pub last_raw_score: f64,
    pub last_seen_at: DateTime<Utc>,
    /// Lease deadline: the id may not be evicted from screen before this
    pub min_stay_until: Option<DateTime<Utc>>,
    /// Last time the id passed the board's polarity filter
    pub last_ranked_at: Option<DateTime<Utc>>,
    /// Score carried while the id rides the vanish grace, decayed every ingest
    pub grace_score: Option<f64>,
    /// Latest observation, kept so grace entries can still render their row
    pub last_row: RawObservation,
}

impl EntityMeta {
    pub fn new(observation: RawObservation, now: DateTime<Utc>) -> Self {
        Self {
            ema_score: observation.raw_score,
            last_raw_score: observation.raw_score,
            last_seen_at: now,
            min_stay_until: None,
            last_ranked_at: None,
            grace_score: None,
            last_row: observation,
        }
    }

    /// Check if the lease still protects this id at `now`
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.min_stay_until.is_some_and(|until| until > now)
    }

    /// Extend the lease, never shortening one already granted
    pub fn extend_lease(&mut self, until: DateTime<Utc>) {
        self.min_stay_until = Some(match self.min_stay_until {
            Some(current) if current > until => current,
            _ => until,
        });
    }
}

/// Single owned store of entity state, passed by reference to each stage
#[derive(Debug, Default)]
pub struct MetaStore {
    entries: FnvHashMap<SmolStr, EntityMeta>,
}

impl MetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&EntityMeta> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut EntityMeta> {
        self.entries.get_mut(id)
    }

    pub fn entry_or_insert(
        &mut self,
        observation: &RawObservation,
        now: DateTime<Utc>,
    ) -> (&mut EntityMeta, bool) {
        let mut created = false;
        let meta = self
            .entries
            .entry(observation.id.clone())
            .or_insert_with(|| {
                created = true;
                EntityMeta::new(observation.clone(), now)
            });
        (meta, created)
    }

    /// Delete entries idle for longer than [`META_IDLE_TTL`], returns the number removed
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, meta| now - meta.last_seen_at <= META_IDLE_TTL);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }
}
