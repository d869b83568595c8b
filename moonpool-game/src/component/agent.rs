//! Agent trait: lifecycle hooks shared by every behavior object.

use async_trait::async_trait;

use super::AgentContext;
use crate::error::ActorError;

/// Hot-swappable behavior bound to one component of one actor.
///
/// An agent holds no persistent data. Everything that must survive a
/// restart or a hotfix lives in the component's [`State`](crate::storage::State),
/// reachable through [`AgentContext::state`]. Fields on the agent itself are
/// transient (counters, timer ids, derived caches).
///
/// All hooks run inside the owning actor's mailbox.
///
/// # Lifecycle
///
/// 1. `active()` - once, when the agent is attached
/// 2. business methods, handlers, listeners, timers
/// 3. `inactive()` - once, before the state is flushed and the agent dropped
///
/// After a hotfix the replacement agent gets `reload()` instead of
/// `active()`; the old agent is dropped without `inactive()`.
#[async_trait]
pub trait Agent: Send + 'static {
    /// Called once after the agent is created and its state is loaded.
    async fn active(&mut self, _ctx: &mut AgentContext<'_>) -> Result<(), ActorError> {
        Ok(())
    }

    /// Called once before the agent is detached.
    ///
    /// Timers still scheduled when this returns are cancelled by the actor.
    async fn inactive(&mut self, _ctx: &mut AgentContext<'_>) -> Result<(), ActorError> {
        Ok(())
    }

    /// Called on a replacement agent created by a hotfix.
    async fn reload(&mut self, _ctx: &mut AgentContext<'_>) -> Result<(), ActorError> {
        Ok(())
    }

    /// Called on every active agent when the server day rolls over.
    async fn cross_day(&mut self, _ctx: &mut AgentContext<'_>, _open_day: u32) -> Result<(), ActorError> {
        Ok(())
    }
}
