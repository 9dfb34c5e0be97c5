//! Scope resolution
//!
//! Decides whose data a widget may see before any query is issued. While a
//! coordinator lookup is outstanding the published state is
//! [`ScopeState::Resolving`] and downstream fetches wait on it.

use crate::cancel::{CancellationToken, EpochClock, Ticket};
use crate::error::EngineError;
use crate::source::ProgramDirectory;
use crate::types::Identity;
use mentorlens_filter::Scope;
use std::sync::Arc;
use tokio::sync::watch;

/// Published resolution state
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeState {
    /// Lookup in progress; no fetch may proceed
    Resolving,
    /// Scope settled
    Resolved(Scope),
}

impl ScopeState {
    #[inline]
    #[must_use]
    pub fn is_resolving(&self) -> bool {
        matches!(self, Self::Resolving)
    }

    #[inline]
    #[must_use]
    pub fn scope(&self) -> Option<&Scope> {
        match self {
            Self::Resolving => None,
            Self::Resolved(scope) => Some(scope),
        }
    }
}

/// Resolve an identity into a scope
///
/// Never fails: a failed or empty coordinator lookup yields the empty
/// program scope so the widget shows "no data" instead of everything.
pub async fn resolve_scope(directory: &dyn ProgramDirectory, identity: &Identity) -> Scope {
    match identity {
        Identity::Administrator => Scope::Unrestricted,
        Identity::PinnedEntity { entity_id } => Scope::Entity {
            entity_id: entity_id.clone(),
        },
        Identity::Coordinator { user_id } => match directory.program_for(user_id).await {
            Ok(Some(program_id)) => Scope::Program {
                program_id: Some(program_id),
            },
            Ok(None) => {
                tracing::info!(coordinator = %user_id, "coordinator has no program");
                Scope::no_program()
            }
            Err(e) => {
                let err = EngineError::ScopeResolution(e);
                tracing::warn!(
                    coordinator = %user_id,
                    error = %err,
                    "falling back to empty program scope"
                );
                Scope::no_program()
            }
        },
    }
}

/// Resolves identities and publishes the resulting scope
pub struct ScopeResolver {
    directory: Arc<dyn ProgramDirectory>,
    state: watch::Sender<ScopeState>,
    clock: Arc<EpochClock>,
    token: CancellationToken,
}

impl std::fmt::Debug for ScopeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeResolver")
            .field("state", &*self.state.borrow())
            .field("epoch", &self.clock.latest())
            .finish_non_exhaustive()
    }
}

impl ScopeResolver {
    /// Create a resolver in the `Resolving` state
    #[must_use]
    pub fn new(directory: Arc<dyn ProgramDirectory>) -> Self {
        let (state, _) = watch::channel(ScopeState::Resolving);
        Self {
            directory,
            state,
            clock: Arc::new(EpochClock::new()),
            token: CancellationToken::new(),
        }
    }

    /// Observe resolution state
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ScopeState> {
        self.state.subscribe()
    }

    /// True while a lookup is outstanding
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_resolving()
    }

    /// Current scope, once resolved
    #[must_use]
    pub fn current(&self) -> Option<Scope> {
        self.state.borrow().scope().cloned()
    }

    /// Resolve `identity` and publish the scope
    ///
    /// Call again when the identity changes. If a newer resolution starts
    /// before this one finishes, this result is dropped and the newer one
    /// wins.
    pub async fn resolve(&self, identity: &Identity) -> Scope {
        let ticket = Ticket::issue(&self.clock, &self.token);
        self.state.send_replace(ScopeState::Resolving);

        let scope = resolve_scope(self.directory.as_ref(), identity).await;

        if ticket.is_relevant() {
            tracing::info!(scope = %scope, epoch = %ticket.epoch(), "scope resolved");
            self.state.send_replace(ScopeState::Resolved(scope.clone()));
        } else {
            tracing::debug!(epoch = %ticket.epoch(), "discarding superseded scope resolution");
        }
        scope
    }

    /// Stop publishing results of outstanding lookups
    pub fn shutdown(&self) {
        self.token.cancel();
    }
}
