//! Components (persistent state) and agents (swappable behavior).
//!
//! A [`Component`] is a compile-time declaration: which actor kind it
//! attaches to, which [`State`] it owns and which agent interface drives it.
//! The agent interface is usually a trait object, so a hotfix can bind a
//! different implementation to the same component without touching state:
//!
//! ```rust,ignore
//! #[async_trait]
//! pub trait BagBehavior: Agent {
//!     async fn add_item(&mut self, ctx: &mut AgentContext<'_>, item: u32) -> Result<(), ActorError>;
//! }
//!
//! pub struct BagComponent;
//!
//! impl Component for BagComponent {
//!     const KIND: ComponentKind = ComponentKind::new("bag");
//!     const ACTOR_KIND: ActorKind = ActorKind::Role;
//!     type State = BagState;
//!     type Agent = dyn BagBehavior;
//! }
//! ```

mod agent;
mod context;
mod hotfix;
mod registry;

use std::fmt;

use serde::Serialize;

use crate::actor::ActorKind;
use crate::storage::State;

pub use agent::Agent;
pub use context::AgentContext;
pub use hotfix::{HotfixModule, HotfixModuleBuilder};
pub use registry::{ComponentDecl, ComponentRegistry, ComponentRegistryBuilder};

pub(crate) use registry::ErasedBinding;

/// Name of one logical subsystem of an entity ("bag", "role", "server").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ComponentKind(&'static str);

impl ComponentKind {
    /// Create a component kind.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Name of the kind.
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Static declaration of a component.
pub trait Component: Send + Sync + 'static {
    /// Unique component name.
    const KIND: ComponentKind;

    /// Kind of actor this component attaches to.
    const ACTOR_KIND: ActorKind;

    /// Persistent state owned by the component.
    type State: State;

    /// Agent interface driving the component, usually `dyn SomeBehavior`.
    type Agent: ?Sized + Agent;
}
