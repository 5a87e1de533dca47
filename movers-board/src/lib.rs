/// Movers Board - Shared Library
///
/// This library turns a noisy, fast-refreshing feed of scored market movers
/// into a small top-N list that evolves smoothly on screen:
/// - EMA smoothing per symbol
/// - Vanish grace for symbols that briefly drop out of the feed
/// - Fixed-cadence commits with min-stay leases and hysteresis reordering
///
/// The library includes:
/// - Core data types and observation parsing for feed snapshots
/// - Preset-based configuration
/// - The stabilization engine, its tokio runtime and feed handler
/// - A ratatui panel for the `movers-board` binary
pub mod shared;

// Re-export commonly used types for convenience
pub use shared::types::{Candidate, DisplayRow, Polarity, RawObservation};

pub use shared::config::{EngineConfig, Preset, StabilizerConfig};
pub use shared::error::{ConfigError, FeedError};
pub use shared::parse::{parse_batch, parse_number, parse_observation};

// Stabilization engine
pub use shared::movers::{
    render_movers_panel, spawn_engine, spawn_feed, EngineHandle, FeedConfig, FeedStatus,
    MoversEngine, RowsSnapshot,
};
