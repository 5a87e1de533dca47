//! Live movers board stabilization
//!
//! Provides:
//! - Per-entity EMA smoothing of the raw momentum feed
//! - Candidate selection with vanish grace for ids that drop out of the feed
//! - Fixed-cadence display commits with min-stay leases and hysteresis
//! - Tokio runtime, feed handler and ratatui widget around the engine

mod engine;
mod feed;
mod merger;
mod meta;
mod runtime;
mod selector;
mod smoother;
mod widget;

pub use engine::MoversEngine;
pub use feed::{spawn_feed, FeedConfig, FeedSource, FeedStatus};
pub use merger::{DisplayMerger, Signature};
pub use meta::{EntityMeta, MetaStore, META_IDLE_TTL};
pub use runtime::{spawn_engine, EngineHandle, RowsSnapshot};
pub use selector::{CandidateSelector, GRACE_DECAY};
pub use smoother::ScoreSmoother;
pub use widget::render_movers_panel;
