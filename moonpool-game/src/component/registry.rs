//! Component declarations and type-erased agent bindings.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use tracing::debug;

use super::{Agent, AgentContext, Component, ComponentKind, HotfixModule};
use crate::actor::{downcast_agent, ActorKind};
use crate::error::{ActorError, ConfigError};
use crate::messaging::HandlerScope;
use crate::storage::{State, StateCache, StateTypeRegistry};

/// Static metadata of one declared component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentDecl {
    /// Component name.
    pub kind: ComponentKind,
    /// Actor kind the component attaches to.
    pub actor_kind: ActorKind,
    /// Declared name of the component's state type.
    pub state_type: &'static str,
    /// Stable hash of `state_type`.
    pub state_hash: u64,
}

/// Every component the runtime knows about, grouped by actor kind.
///
/// Built once at startup and immutable afterwards. Hotfix modules are
/// checked against it before they are installed.
pub struct ComponentRegistry {
    decls: BTreeMap<ComponentKind, ComponentDecl>,
    by_actor: HashMap<ActorKind, Vec<ComponentKind>>,
    state_types: StateTypeRegistry,
}

impl ComponentRegistry {
    /// Start declaring components.
    pub fn builder() -> ComponentRegistryBuilder {
        ComponentRegistryBuilder::default()
    }

    /// Declaration of `kind`.
    pub fn get(&self, kind: ComponentKind) -> Option<&ComponentDecl> {
        self.decls.get(&kind)
    }

    /// Components attaching to `actor_kind`, in declaration order.
    pub fn components_of(&self, actor_kind: ActorKind) -> &[ComponentKind] {
        self.by_actor
            .get(&actor_kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Actor kinds with at least one component.
    pub fn actor_kinds(&self) -> Vec<ActorKind> {
        let mut kinds: Vec<ActorKind> = self.by_actor.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    /// Decoders for every declared state type.
    pub fn state_types(&self) -> &StateTypeRegistry {
        &self.state_types
    }

    /// Number of declared components.
    pub fn len(&self) -> usize {
        self.decls.len()
    }

    /// Returns `true` if nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Check that `module` covers every declared component and refers to
    /// nothing undeclared.
    pub fn validate(&self, module: &HotfixModule) -> Result<(), ConfigError> {
        for decl in self.decls.values() {
            if module.binding(decl.kind).is_none() {
                return Err(ConfigError::MissingBinding {
                    component: decl.kind,
                    actor_kind: decl.actor_kind,
                });
            }
        }

        for binding in module.bindings() {
            self.declared(binding.component(), binding.agent_type())?;
        }

        for handler in module.handlers().iter() {
            let decl = self.declared(handler.component(), handler.name())?;
            let scope_kind = match handler.scope() {
                HandlerScope::Global(kind) | HandlerScope::Session(kind) => kind,
                HandlerScope::Request => continue,
            };
            if scope_kind != decl.actor_kind {
                return Err(ConfigError::ScopeMismatch {
                    handler: handler.name(),
                    scope_kind,
                    component: decl.kind,
                    component_kind: decl.actor_kind,
                });
            }
        }

        for listener in module.listeners().iter() {
            self.declared(listener.component(), listener.name())?;
        }

        for timer in module.timers().iter() {
            self.declared(timer.component(), timer.name())?;
        }

        Ok(())
    }

    fn declared(&self, component: ComponentKind, used_by: &'static str) -> Result<&ComponentDecl, ConfigError> {
        self.decls
            .get(&component)
            .ok_or(ConfigError::UnknownComponent { component, used_by })
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.decls.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Collects component declarations. The first error is kept and returned by
/// [`build`](Self::build).
#[derive(Default)]
pub struct ComponentRegistryBuilder {
    decls: BTreeMap<ComponentKind, ComponentDecl>,
    by_actor: HashMap<ActorKind, Vec<ComponentKind>>,
    state_types: StateTypeRegistry,
    error: Option<ConfigError>,
}

impl ComponentRegistryBuilder {
    /// Declare component `C`.
    pub fn declare<C: Component>(mut self) -> Self {
        if self.error.is_some() {
            return self;
        }
        if self.decls.contains_key(&C::KIND) {
            self.error = Some(ConfigError::DuplicateComponent(C::KIND));
            return self;
        }
        if let Err(e) = self.state_types.register::<C::State>() {
            self.error = Some(e);
            return self;
        }

        let decl = ComponentDecl {
            kind: C::KIND,
            actor_kind: C::ACTOR_KIND,
            state_type: <C::State as State>::TYPE_NAME,
            state_hash: <C::State as State>::type_hash(),
        };
        self.decls.insert(C::KIND, decl);
        self.by_actor.entry(C::ACTOR_KIND).or_default().push(C::KIND);
        self
    }

    /// Finish the registry.
    pub fn build(self) -> Result<ComponentRegistry, ConfigError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        debug!(components = self.decls.len(), "component registry built");
        Ok(ComponentRegistry {
            decls: self.decls,
            by_actor: self.by_actor,
            state_types: self.state_types,
        })
    }
}

/// Object-safe access to one component's agent factory and hooks.
///
/// Agents are stored as `Box<dyn Any + Send>` holding a `Box<C::Agent>`;
/// the binding knows `C` and downcasts.
#[async_trait]
pub(crate) trait ErasedBinding: Send + Sync {
    fn component(&self) -> ComponentKind;

    /// Name of the concrete agent type the factory builds.
    fn agent_type(&self) -> &'static str;

    fn create_agent(&self) -> Box<dyn Any + Send>;

    /// Load the component's state into `cache`, creating a default on a miss.
    async fn load_state(&self, cache: &mut StateCache, id: i64) -> Result<(), ActorError>;

    async fn active(&self, agent: &mut Box<dyn Any + Send>, ctx: &mut AgentContext<'_>) -> Result<(), ActorError>;

    async fn inactive(&self, agent: &mut Box<dyn Any + Send>, ctx: &mut AgentContext<'_>) -> Result<(), ActorError>;

    async fn reload(&self, agent: &mut Box<dyn Any + Send>, ctx: &mut AgentContext<'_>) -> Result<(), ActorError>;

    async fn cross_day(
        &self,
        agent: &mut Box<dyn Any + Send>,
        ctx: &mut AgentContext<'_>,
        open_day: u32,
    ) -> Result<(), ActorError>;
}

pub(crate) struct TypedBinding<C: Component> {
    factory: Box<dyn Fn() -> Box<C::Agent> + Send + Sync>,
    agent_type: &'static str,
    _component: PhantomData<fn() -> C>,
}

impl<C: Component> TypedBinding<C> {
    pub(crate) fn new<F>(agent_type: &'static str, factory: F) -> Self
    where
        F: Fn() -> Box<C::Agent> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            agent_type,
            _component: PhantomData,
        }
    }
}

#[async_trait]
impl<C: Component> ErasedBinding for TypedBinding<C> {
    fn component(&self) -> ComponentKind {
        C::KIND
    }

    fn agent_type(&self) -> &'static str {
        self.agent_type
    }

    fn create_agent(&self) -> Box<dyn Any + Send> {
        Box::new((self.factory)())
    }

    async fn load_state(&self, cache: &mut StateCache, id: i64) -> Result<(), ActorError> {
        cache.get_or_create::<C::State>(id).await?;
        Ok(())
    }

    async fn active(&self, agent: &mut Box<dyn Any + Send>, ctx: &mut AgentContext<'_>) -> Result<(), ActorError> {
        downcast_agent::<C>(agent)?.active(ctx).await
    }

    async fn inactive(&self, agent: &mut Box<dyn Any + Send>, ctx: &mut AgentContext<'_>) -> Result<(), ActorError> {
        downcast_agent::<C>(agent)?.inactive(ctx).await
    }

    async fn reload(&self, agent: &mut Box<dyn Any + Send>, ctx: &mut AgentContext<'_>) -> Result<(), ActorError> {
        downcast_agent::<C>(agent)?.reload(ctx).await
    }

    async fn cross_day(
        &self,
        agent: &mut Box<dyn Any + Send>,
        ctx: &mut AgentContext<'_>,
        open_day: u32,
    ) -> Result<(), ActorError> {
        downcast_agent::<C>(agent)?.cross_day(ctx, open_day).await
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct BagState {
        items: Vec<u32>,
    }

    impl State for BagState {
        const TYPE_NAME: &'static str = "BagState";
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct GuildState {
        members: u32,
    }

    impl State for GuildState {
        const TYPE_NAME: &'static str = "GuildState";
    }

    struct BagAgent;

    impl Agent for BagAgent {}

    struct BagComponent;

    impl Component for BagComponent {
        const KIND: ComponentKind = ComponentKind::new("bag");
        const ACTOR_KIND: ActorKind = ActorKind::Role;
        type State = BagState;
        type Agent = BagAgent;
    }

    struct GuildComponent;

    impl Component for GuildComponent {
        const KIND: ComponentKind = ComponentKind::new("guild");
        const ACTOR_KIND: ActorKind = ActorKind::Guild;
        type State = GuildState;
        type Agent = BagAgent;
    }

    struct OtherBagComponent;

    impl Component for OtherBagComponent {
        const KIND: ComponentKind = ComponentKind::new("other_bag");
        const ACTOR_KIND: ActorKind = ActorKind::Role;
        type State = BagState;
        type Agent = BagAgent;
    }

    #[test]
    fn test_declarations_grouped_by_actor_kind() {
        let registry = ComponentRegistry::builder()
            .declare::<BagComponent>()
            .declare::<GuildComponent>()
            .build()
            .expect("registry");

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.components_of(ActorKind::Role), &[BagComponent::KIND]);
        assert_eq!(registry.components_of(ActorKind::Guild), &[GuildComponent::KIND]);
        assert!(registry.components_of(ActorKind::Account).is_empty());
        assert_eq!(registry.actor_kinds(), vec![ActorKind::Role, ActorKind::Guild]);

        let decl = registry.get(BagComponent::KIND).expect("bag declared");
        assert_eq!(decl.state_type, "BagState");
        assert_eq!(decl.state_hash, BagState::type_hash());
        assert_eq!(registry.state_types().type_name(decl.state_hash), Some("BagState"));
    }

    #[test]
    fn test_duplicate_component_rejected() {
        let err = ComponentRegistry::builder()
            .declare::<BagComponent>()
            .declare::<BagComponent>()
            .build()
            .expect_err("duplicate");
        assert!(matches!(err, ConfigError::DuplicateComponent(kind) if kind == BagComponent::KIND));
    }

    #[test]
    fn test_shared_state_type_rejected() {
        let err = ComponentRegistry::builder()
            .declare::<BagComponent>()
            .declare::<OtherBagComponent>()
            .build()
            .expect_err("shared state type");
        assert!(matches!(err, ConfigError::DuplicateStateType("BagState")));
    }

    #[test]
    fn test_module_without_binding_rejected() {
        let registry = ComponentRegistry::builder()
            .declare::<BagComponent>()
            .declare::<GuildComponent>()
            .build()
            .expect("registry");
        let module = HotfixModule::builder("partial")
            .agent::<BagComponent, _>("BagAgent", || Box::new(BagAgent))
            .build()
            .expect("module");

        let err = registry.validate(&module).expect_err("guild unbound");
        assert!(matches!(
            err,
            ConfigError::MissingBinding { component, actor_kind: ActorKind::Guild } if component == GuildComponent::KIND
        ));
    }

    #[test]
    fn test_binding_for_undeclared_component_rejected() {
        let registry = ComponentRegistry::builder()
            .declare::<BagComponent>()
            .build()
            .expect("registry");
        let module = HotfixModule::builder("extra")
            .agent::<BagComponent, _>("BagAgent", || Box::new(BagAgent))
            .agent::<GuildComponent, _>("GuildAgent", || Box::new(BagAgent))
            .build()
            .expect("module");

        let err = registry.validate(&module).expect_err("guild undeclared");
        assert!(matches!(err, ConfigError::UnknownComponent { used_by: "GuildAgent", .. }));
    }
}
