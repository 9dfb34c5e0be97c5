//! Error types for the MentorLens engine
//!
//! Collaborator calls fail with [`FetchError`]. The engine converts every
//! failure at its call site into one of the [`EngineError`] kinds:
//! - scope resolution failures degrade to an empty program scope
//! - availability failures degrade to empty availability
//! - filtered fetch failures are shown inline next to an empty row set
//! - rate limiting only drives poller back-off
//!
//! A stale response is not an error; see [`crate::FetchOutcome::Discarded`].

use mentorlens_filter::{RangeError, SelectionError};
use std::time::Duration;

/// Failure of a single collaborator call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Server answered 429
    #[error("rate limited")]
    RateLimited {
        /// Server-suggested wait, if any
        retry_after: Option<Duration>,
    },

    /// Any other non-2xx status
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// Connection, TLS or timeout failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body did not have the expected shape
    #[error("decode error: {0}")]
    Decode(String),
}

impl FetchError {
    /// Check if this is a rate-limit signal
    #[inline]
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Check if a later attempt may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Decode(_) => false,
        }
    }

    /// Classify a non-success HTTP status
    #[must_use]
    pub fn from_status(
        status: u16,
        message: impl Into<String>,
        retry_after: Option<Duration>,
    ) -> Self {
        if status == 429 {
            Self::RateLimited { retry_after }
        } else {
            Self::Status {
                status,
                message: message.into(),
            }
        }
    }
}

/// Engine-level error taxonomy
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Coordinator program lookup failed
    #[error("scope resolution failed: {0}")]
    ScopeResolution(FetchError),

    /// Unfiltered availability pull failed
    #[error("availability fetch failed: {0}")]
    AvailabilityFetch(FetchError),

    /// Ranged data fetch failed
    #[error("failed to load data: {0}")]
    FilteredFetch(FetchError),

    /// Server asked us to slow down
    #[error("rate limited")]
    RateLimited,

    /// Selection transition refused
    #[error("selection rejected: {0}")]
    Selection(#[from] SelectionError),

    /// Selection could not be compiled into a range
    #[error("range compilation failed: {0}")]
    Range(#[from] RangeError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Whether the error is shown to the user
    ///
    /// Only filtered-fetch failures and refused selections reach the widget;
    /// the rest are recovered locally.
    #[inline]
    #[must_use]
    pub fn is_user_visible(&self) -> bool {
        matches!(self, Self::FilteredFetch(_) | Self::Selection(_) | Self::Range(_))
    }

    /// Short inline message for the widget
    #[must_use]
    pub fn inline_message(&self) -> String {
        match self {
            Self::FilteredFetch(FetchError::Status { status, .. }) => {
                format!("Failed to load data (HTTP {status})")
            }
            Self::FilteredFetch(FetchError::RateLimited { .. }) | Self::RateLimited => {
                "Too many requests, try again shortly".to_string()
            }
            Self::FilteredFetch(_) => "Failed to load data".to_string(),
            other => other.to_string(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file unreadable
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Not valid TOML for the config schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parsed but are inconsistent
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
