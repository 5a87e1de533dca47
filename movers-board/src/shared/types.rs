/// Core data types for the movers board
///
/// Observations flow in from the feed, candidates are rebuilt on every ingest,
/// and display rows are what the commit loop hands to the presentation layer.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A single scored entity from one feed snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawObservation {
    /// Stable symbol id (e.g., "BTC")
    pub id: SmolStr,
    /// Momentum value supplied by the backend (percentage change)
    pub raw_score: f64,
    /// Last traded price
    pub price: f64,
    /// When the backend observed this value
    pub observed_at: DateTime<Utc>,
    /// Opaque fields passed through untouched to the display rows
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RawObservation {
    /// Create an observation with no pass-through fields
    pub fn new(
        id: impl Into<SmolStr>,
        raw_score: f64,
        price: f64,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            raw_score,
            price,
            observed_at,
            extra: serde_json::Map::new(),
        }
    }
}

/// Which side of the market an engine instance ranks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Deserialize, Serialize)]
pub enum Polarity {
    /// Strictly positive movers, biggest first
    #[default]
    #[display("gainers")]
    Gainers,
    /// Strictly negative movers, biggest drop first
    #[display("losers")]
    Losers,
}

impl Polarity {
    /// Check whether a raw signal belongs on this board
    pub fn admits(&self, raw_score: f64) -> bool {
        match self {
            Polarity::Gainers => raw_score > 0.0,
            Polarity::Losers => raw_score < 0.0,
        }
    }

    /// Map a smoothed score onto a "higher ranks first" scale
    pub fn orient(&self, score: f64) -> f64 {
        match self {
            Polarity::Gainers => score,
            Polarity::Losers => -score,
        }
    }
}

/// A ranked entry eligible for display, rebuilt on every ingest
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: SmolStr,
    /// Oriented effective score (EMA, or decayed EMA for grace entries)
    pub score: f64,
    /// Latest observation for this id
    pub source: RawObservation,
    /// True when the id is absent from the feed and kept alive by the vanish grace
    pub is_grace_entry: bool,
}

/// A committed on-screen row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayRow {
    pub id: SmolStr,
    /// Original input fields of the latest observation
    pub data: RawObservation,
    /// Zero-based rank on screen
    pub position: usize,
    /// Oriented effective score at commit time
    pub score: f64,
    pub is_grace_entry: bool,
}
