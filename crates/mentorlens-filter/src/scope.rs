//! Data-access scope
//!
//! A [`Scope`] is resolved once per identity and read-only afterwards.

use serde::{Deserialize, Serialize};

/// Program identifier as issued by the backend
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgramId(pub String);

impl ProgramId {
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

impl std::fmt::Display for ProgramId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Single-entity identifier (a pinned mentee, mentor or enterprise view)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
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

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Effective data-access scope for a widget
///
/// `Program { program_id: None }` is the degraded scope produced when a
/// coordinator's program could not be found: it is still program-restricted,
/// so it yields no rows instead of falling back to everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Scope {
    /// Whole dataset
    Unrestricted,
    /// One coordinator's program
    Program {
        #[serde(rename = "programId")]
        program_id: Option<ProgramId>,
    },
    /// One pinned entity
    Entity {
        #[serde(rename = "entityId")]
        entity_id: EntityId,
    },
}

impl Scope {
    /// Program scope for a known program
    #[inline]
    #[must_use]
    pub fn program(id: impl Into<String>) -> Self {
        Self::Program {
            program_id: Some(ProgramId::new(id)),
        }
    }

    /// Program scope with no program (lookup failed or returned nothing)
    #[inline]
    #[must_use]
    pub fn no_program() -> Self {
        Self::Program { program_id: None }
    }

    /// Pinned single-entity scope
    #[inline]
    #[must_use]
    pub fn entity(id: impl Into<String>) -> Self {
        Self::Entity {
            entity_id: EntityId::new(id),
        }
    }

    /// Short name of the scope kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unrestricted => "unrestricted",
            Self::Program { .. } => "program",
            Self::Entity { .. } => "entity",
        }
    }

    /// True when no query should be issued because the scope cannot match rows
    #[inline]
    #[must_use]
    pub fn yields_empty(&self) -> bool {
        matches!(self, Self::Program { program_id: None })
    }

    /// Query parameters restricting a backend call to this scope
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Unrestricted | Self::Program { program_id: None } => Vec::new(),
            Self::Program {
                program_id: Some(id),
            } => vec![("program_id", id.0.clone())],
            Self::Entity { entity_id } => vec![("entity_id", entity_id.0.clone())],
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unrestricted => f.write_str("unrestricted"),
            Self::Program {
                program_id: Some(id),
            } => write!(f, "program:{id}"),
            Self::Program { program_id: None } => f.write_str("program:none"),
            Self::Entity { entity_id } => write!(f, "entity:{entity_id}"),
        }
    }
}
