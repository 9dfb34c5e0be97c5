//! Core types for the MentorLens engine
//!
//! Identities, feed and subscription ids, page visibility and widget
//! descriptions.

use mentorlens_filter::EntityId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use ulid::Ulid;

/// Coordinator user identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoordinatorId(pub String);

impl CoordinatorId {
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for CoordinatorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who is looking at the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Identity {
    /// Sees every program
    Administrator,
    /// Sees their own program, looked up remotely
    Coordinator { user_id: CoordinatorId },
    /// Views a single pinned entity
    PinnedEntity { entity_id: EntityId },
}

impl Identity {
    #[must_use]
    pub fn coordinator(user_id: impl Into<String>) -> Self {
        Self::Coordinator {
            user_id: CoordinatorId::new(user_id),
        }
    }

    #[must_use]
    pub fn pinned(entity_id: impl Into<String>) -> Self {
        Self::PinnedEntity {
            entity_id: EntityId::new(entity_id),
        }
    }
}

/// Notification feed identity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(pub String);

impl FeedId {
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FeedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique poll subscription identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Ulid);

impl SubscriptionId {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hosting page visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

impl Visibility {
    #[inline]
    #[must_use]
    pub fn is_visible(self) -> bool {
        matches!(self, Self::Visible)
    }
}

/// How a widget presents its rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetView {
    #[default]
    Chart,
    Table,
}

/// Error parsing a widget view name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown view: {0:?} (expected chart or table)")]
pub struct ViewParseError(pub String);

impl FromStr for WidgetView {
    type Err = ViewParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chart" => Ok(Self::Chart),
            "table" => Ok(Self::Table),
            _ => Err(ViewParseError(s.to_string())),
        }
    }
}

impl std::fmt::Display for WidgetView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Chart => "chart",
            Self::Table => "table",
        })
    }
}

/// One analytics widget instance of the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetSpec {
    /// Name used in logs
    pub name: String,
    /// Backend route serving the widget's rows
    pub endpoint: String,
    /// JSON field holding each row's timestamp
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
}

fn default_timestamp_field() -> String {
    "date".to_string()
}

impl WidgetSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            timestamp_field: default_timestamp_field(),
        }
    }

    #[must_use]
    pub fn with_timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = field.into();
        self
    }
}
