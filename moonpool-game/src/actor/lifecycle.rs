//! Agent lifecycle state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle of one agent attached to an actor.
///
/// # State Transitions
///
/// ```text
/// Unattached → Activating → Active → Deactivating → Detached
///                  ↓
///               Detached (activation failed)
/// ```
///
/// Every transition happens inside the owning actor's mailbox.
///
/// # Invariants
///
/// - An agent in `Active` has completed `active()`
/// - `Detached` is terminal: the actor drops the slot on reaching it, so a
///   new agent starts over from `Unattached`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentPhase {
    /// No agent for this component yet.
    Unattached,

    /// `active()` in progress.
    Activating,

    /// Ready to serve handlers, listeners and timers.
    Active,

    /// `inactive()` in progress.
    Deactivating,

    /// Agent dropped; state may still be cached until flushed.
    Detached,
}

impl AgentPhase {
    /// Check if transition to next phase is valid.
    ///
    /// # Valid Transitions
    ///
    /// - Unattached → Activating
    /// - Activating → Active (activation succeeded)
    /// - Activating → Detached (activation failed)
    /// - Active → Deactivating
    /// - Deactivating → Detached
    pub fn can_transition_to(&self, next: AgentPhase) -> bool {
        use AgentPhase::*;
        matches!(
            (self, next),
            (Unattached, Activating)
                | (Activating, Active)
                | (Activating, Detached)
                | (Active, Deactivating)
                | (Deactivating, Detached)
        )
    }

    /// Check if the agent may run business code in this phase.
    pub fn can_serve(&self) -> bool {
        matches!(self, AgentPhase::Active)
    }

    /// Check if this is a terminal phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentPhase::Detached)
    }
}

/// Why an actor's agents are being deactivated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeactivationReason {
    /// Offline and idle longer than the idle timeout.
    IdleTimeout,

    /// The runtime is shutting down.
    Shutdown,

    /// Explicit request from business code.
    ExplicitRequest,
}

impl DeactivationReason {
    /// Check if the actor is removed from the registry afterwards.
    pub fn evicts(&self) -> bool {
        matches!(
            self,
            DeactivationReason::IdleTimeout | DeactivationReason::ExplicitRequest
        )
    }
}
