/// Tuning for the movers stabilization engine
///
/// Values come bundled in named presets and are injected at construction.
/// The engine never looks at the environment to pick its own tuning.

use crate::shared::{error::ConfigError, types::Polarity};
use derive_more::Display;
use std::{str::FromStr, time::Duration};

/// Named bundles of the seven stabilizer options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum Preset {
    /// Low jitter, slower reaction
    #[default]
    #[display("smooth")]
    Smooth,
    /// Faster reaction, more movement on screen
    #[display("predator")]
    Predator,
}

impl FromStr for Preset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "smooth" => Ok(Preset::Smooth),
            "predator" => Ok(Preset::Predator),
            other => Err(ConfigError::UnknownPreset(other.to_string())),
        }
    }
}

impl FromStr for Polarity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gainers" | "up" => Ok(Polarity::Gainers),
            "losers" | "down" => Ok(Polarity::Losers),
            other => Err(ConfigError::UnknownPolarity(other.to_string())),
        }
    }
}

/// Smoothing, lease and hysteresis parameters
#[derive(Debug, Clone, PartialEq)]
pub struct StabilizerConfig {
    /// EMA coefficient in (0, 1]; higher reacts faster but jitters more
    pub alpha: f64,
    /// Period between display commits
    pub commit_interval: Duration,
    /// Minimum time an id stays on screen once shown
    pub min_stay: Duration,
    /// Score gap (percentage points) required to swap two adjacent rows
    pub swap_margin: f64,
    /// Maximum adjacent-swap sweeps per commit
    pub bubble_passes: usize,
    /// How long a vanished id stays eligible at a decaying score
    pub vanish_grace: Duration,
    /// Extra candidate slots beyond the visible count
    pub buffer_rows: usize,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self::preset(Preset::default())
    }
}

impl StabilizerConfig {
    /// Build the values bundled by a named preset
    pub fn preset(preset: Preset) -> Self {
        match preset {
            Preset::Smooth => Self {
                alpha: 0.30,
                commit_interval: Duration::from_millis(420),
                min_stay: Duration::from_millis(2400),
                swap_margin: 0.18,
                bubble_passes: 1,
                vanish_grace: Duration::from_millis(1600),
                buffer_rows: 4,
            },
            Preset::Predator => Self {
                alpha: 0.55,
                commit_interval: Duration::from_millis(250),
                min_stay: Duration::from_millis(1200),
                swap_margin: 0.08,
                bubble_passes: 2,
                vanish_grace: Duration::from_millis(900),
                buffer_rows: 3,
            },
        }
    }

    /// Set EMA coefficient
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set commit interval
    pub fn with_commit_interval(mut self, interval: Duration) -> Self {
        self.commit_interval = interval;
        self
    }

    /// Set minimum stay lease
    pub fn with_min_stay(mut self, min_stay: Duration) -> Self {
        self.min_stay = min_stay;
        self
    }

    /// Set swap margin
    pub fn with_swap_margin(mut self, margin: f64) -> Self {
        self.swap_margin = margin;
        self
    }

    /// Set bubble passes
    pub fn with_bubble_passes(mut self, passes: usize) -> Self {
        self.bubble_passes = passes;
        self
    }

    /// Set vanish grace window
    pub fn with_vanish_grace(mut self, grace: Duration) -> Self {
        self.vanish_grace = grace;
        self
    }

    /// Set buffer rows
    pub fn with_buffer_rows(mut self, rows: usize) -> Self {
        self.buffer_rows = rows;
        self
    }
}

/// Full construction input for one engine instance
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub stabilizer: StabilizerConfig,
    /// Rows shown on screen
    pub visible_count: usize,
    pub polarity: Polarity,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stabilizer: StabilizerConfig::default(),
            visible_count: 10,
            polarity: Polarity::Gainers,
        }
    }
}

impl EngineConfig {
    /// Create a configuration from a preset with default sizing
    pub fn new(preset: Preset) -> Self {
        Self {
            stabilizer: StabilizerConfig::preset(preset),
            ..Default::default()
        }
    }

    /// Set visible row count
    pub fn with_visible_count(mut self, count: usize) -> Self {
        self.visible_count = count;
        self
    }

    /// Set ranking polarity
    pub fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    /// Replace stabilizer tuning
    pub fn with_stabilizer(mut self, stabilizer: StabilizerConfig) -> Self {
        self.stabilizer = stabilizer;
        self
    }

    /// Upper bound on the candidate list length
    pub fn candidate_capacity(&self) -> usize {
        self.visible_count + self.stabilizer.buffer_rows
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.stabilizer;
        if !(s.alpha > 0.0 && s.alpha <= 1.0) {
            return Err(ConfigError::Alpha(s.alpha));
        }
        if s.commit_interval.is_zero() {
            return Err(ConfigError::CommitInterval);
        }
        if self.visible_count == 0 {
            return Err(ConfigError::VisibleCount);
        }
        if !s.swap_margin.is_finite() || s.swap_margin < 0.0 {
            return Err(ConfigError::SwapMargin(s.swap_margin));
        }
        Ok(())
    }
}
