use thiserror::Error;

/// Invalid tuning values rejected at engine construction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("alpha must be within (0, 1], got {0}")]
    Alpha(f64),

    #[error("commit interval must be non-zero")]
    CommitInterval,

    #[error("visible count must be non-zero")]
    VisibleCount,

    #[error("swap margin must be finite and non-negative, got {0}")]
    SwapMargin(f64),

    #[error("unknown preset: {0} (expected smooth or predator)")]
    UnknownPreset(String),

    #[error("unknown polarity: {0} (expected gainers or losers)")]
    UnknownPolarity(String),
}

/// All errors generated while acquiring feed snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("unsupported feed url scheme: {0}")]
    UnsupportedScheme(String),

    #[error("snapshot request failed: {0}")]
    Request(String),

    #[error("snapshot request returned status {0}")]
    Status(u16),

    #[error("snapshot decode failed: {0}")]
    Decode(String),

    #[error("WebSocket error: {0}")]
    Socket(String),
}

impl FeedError {
    /// Determine if an error requires the feed connection to be re-established.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_terminal(&self) -> bool {
        match self {
            FeedError::Socket(_) => true,
            FeedError::UnsupportedScheme(_) => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(value: reqwest::Error) -> Self {
        match value.status() {
            Some(status) => Self::Status(status.as_u16()),
            None if value.is_decode() => Self::Decode(value.to_string()),
            None => Self::Request(value.to_string()),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Socket(value.to_string())
    }
}
