//! The runtime handle used by the transport layer and by business code.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use tracing::{debug, info, warn};

use super::builder::RuntimeBuilder;
use super::shared::RuntimeShared;
use super::SaveReport;
use crate::actor::{ActorKind, ActorManager, ActorRef, DeactivationReason, EntityKey};
use crate::component::{ComponentKind, ComponentRegistry, HotfixModule};
use crate::config::RuntimeConfig;
use crate::error::{ActorError, ConfigError, DispatchError};
use crate::event::{EventDispatcher, EventId, Payload};
use crate::messaging::{InboundFrame, MessageDispatcher, Session, SessionManager};
use crate::storage::{StateKey, StateQuery};
use crate::timer::TimerScheduler;

/// Handle to a running game server core. Cheap to clone.
///
/// # Example
///
/// ```rust,ignore
/// let runtime = GameRuntime::builder()
///     .config(config)
///     .component::<AccountComponent>()
///     .component::<RoleComponent>()
///     .module(module_v1)
///     .store(Arc::new(MongoAdapter::new(db)))
///     .build()?;
/// runtime.start().await?;
///
/// // per inbound frame, from the transport
/// runtime.dispatch(&session, frame).await?;
///
/// runtime.shutdown().await;
/// ```
#[derive(Clone)]
pub struct GameRuntime {
    shared: Arc<RuntimeShared>,
}

impl GameRuntime {
    /// Start configuring a runtime.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub(crate) fn from_shared(shared: Arc<RuntimeShared>) -> Self {
        Self { shared }
    }

    pub(crate) fn shared(&self) -> &Arc<RuntimeShared> {
        &self.shared
    }

    /// Runtime configuration.
    pub fn config(&self) -> &RuntimeConfig {
        self.shared.config()
    }

    /// Declared components.
    pub fn components(&self) -> &ComponentRegistry {
        self.shared.components()
    }

    /// Module currently installed.
    pub fn module(&self) -> Arc<HotfixModule> {
        self.shared.module()
    }

    /// Live actors.
    pub fn actors(&self) -> &ActorManager {
        self.shared.actors()
    }

    /// Bound client sessions.
    pub fn sessions(&self) -> &SessionManager {
        self.shared.sessions()
    }

    /// Running timers.
    pub fn timers(&self) -> &TimerScheduler {
        self.shared.timers()
    }

    /// Actor for `key`, created on first access.
    pub fn actor(&self, key: EntityKey) -> ActorRef {
        self.shared.actor_for(key)
    }

    /// Key of the server actor of this runtime.
    pub fn server_key(&self) -> EntityKey {
        self.shared.coordinator_key()
    }

    /// Activate every global actor and start the background loops.
    ///
    /// Each global actor kind with declared components gets its actor
    /// created and all of those components attached. The server actor is
    /// always created since it owns the online roster.
    pub async fn start(&self) -> Result<(), ActorError> {
        let server_id = self.config().server_id;
        let mut globals: Vec<ActorKind> = self
            .components()
            .actor_kinds()
            .into_iter()
            .filter(|kind| kind.is_global())
            .collect();
        if !globals.contains(&ActorKind::Server) {
            globals.insert(0, ActorKind::Server);
        }

        for kind in globals {
            let key = EntityKey::global(kind, server_id);
            self.actor(key)
                .send_with("activate", None, |cell| cell.activate_declared().boxed())
                .await?;
            debug!(actor = %key, "global actor active");
        }

        self.spawn_maintenance();
        info!(server_id, module = self.module().name(), "game runtime started");
        Ok(())
    }

    /// Message dispatcher for client frames.
    pub fn messages(&self) -> MessageDispatcher {
        MessageDispatcher::new(self.shared.clone())
    }

    /// Dispatch one client frame. See [`MessageDispatcher::dispatch`].
    pub async fn dispatch(&self, session: &Arc<Session>, frame: InboundFrame) -> Result<(), DispatchError> {
        self.messages().dispatch(session, frame).await
    }

    /// Event dispatcher.
    pub fn events(&self) -> EventDispatcher {
        EventDispatcher::new(self.shared.clone())
    }

    /// Dispatch an event as if raised by `origin`.
    pub fn dispatch_event(&self, origin: EntityKey, id: EventId, payload: Payload) {
        self.shared.dispatch_event(origin, id, payload);
    }

    /// Install a new module and swap every live agent built from the old one.
    ///
    /// The module is checked against the declared components first; a
    /// rejected module leaves the current one in place. Actors created from
    /// now on start with the new module. Live actors keep their own module
    /// until the swap task queued in their mailbox runs, so events, timer
    /// fires and attaches queued before it still use the old tables.
    /// Returns the new module version.
    pub fn hotfix(&self, module: HotfixModule) -> Result<u64, ConfigError> {
        self.components().validate(&module)?;
        let module = self.shared.install_module(module);
        let version = module.version();

        let actors = self.actors().snapshot();
        for actor in &actors {
            let module = module.clone();
            let posted = actor.post("hotfix".into(), false, move |cell| cell.apply_hotfix(module).boxed());
            if let Err(e) = posted {
                debug!(actor = %actor.key(), error = %e, "actor gone before hotfix");
            }
        }
        info!(module = module.name(), version, actors = actors.len(), "hotfix installed");
        Ok(version)
    }

    /// Agent type bound to `component` on `actor_kind` actors in the current
    /// module.
    pub fn resolve_agent_type(&self, actor_kind: ActorKind, component: ComponentKind) -> Option<&'static str> {
        let decl = self.components().get(component)?;
        if decl.actor_kind != actor_kind {
            return None;
        }
        self.module().agent_type(component)
    }

    /// Mark `key` online or offline.
    pub async fn set_online(&self, key: EntityKey, online: bool) -> Result<(), ActorError> {
        self.actor(key)
            .send(move |cell| {
                async move {
                    cell.set_online(online);
                    Ok(())
                }
                .boxed()
            })
            .await
    }

    /// Whether `key` is marked online. Entities without a live actor are
    /// offline.
    pub async fn is_online(&self, key: EntityKey) -> Result<bool, ActorError> {
        match self.actors().get(&key) {
            Some(actor) => actor.send(|cell| async move { Ok(cell.is_online()) }.boxed()).await,
            None => Ok(false),
        }
    }

    /// Online entities, as recorded on the server actor.
    pub async fn online_roster(&self) -> Result<Vec<EntityKey>, ActorError> {
        self.shared
            .coordinator()
            .send(|cell| async move { Ok(cell.online_roster().iter().copied().collect()) }.boxed())
            .await
    }

    /// Number of online entities.
    pub async fn online_count(&self) -> Result<usize, ActorError> {
        Ok(self.online_roster().await?.len())
    }

    /// Bind `session` to `key`. A previous connection is closed and returned.
    pub fn bind_session(&self, key: EntityKey, session: Arc<Session>) -> Option<Arc<Session>> {
        self.sessions().bind(key, session)
    }

    /// Remove the session bound to `key` if it is connection `session_id`,
    /// and raise [`EventId::SESSION_REMOVED`] on the entity's actor.
    pub fn remove_session(&self, key: EntityKey, session_id: u64) -> bool {
        match self.sessions().remove_if_current(&key, session_id) {
            Some(session) => {
                session.unbind();
                debug!(entity = %key, session = session_id, "session removed");
                self.dispatch_event(key, EventId::SESSION_REMOVED, Payload::Int(session_id as i64));
                true
            }
            None => false,
        }
    }

    /// Wait until every task queued so far on every live actor has run.
    pub async fn all_finish(&self) {
        let actors = self.actors().snapshot();
        let pending = actors.iter().map(|actor| {
            actor.call("all_finish".into(), false, None, |_| async { Ok(()) }.boxed())
        });
        for result in join_all(pending).await {
            if let Err(e) = result {
                debug!(error = %e, "actor stopped while draining");
            }
        }
    }

    /// Run the day rollover hook on every live actor.
    ///
    /// Global actors roll over first, the server actor before the others.
    pub async fn cross_day(&self, open_day: u32) {
        let server = self.server_key();
        let (mut globals, entities): (Vec<ActorRef>, Vec<ActorRef>) = self
            .actors()
            .snapshot()
            .into_iter()
            .partition(|actor| actor.key().is_global());
        globals.sort_by_key(|actor| actor.key() != server);

        info!(open_day, globals = globals.len(), entities = entities.len(), "cross day");
        for batch in [globals, entities] {
            let pending = batch.iter().map(|actor| {
                actor.call("cross_day".into(), false, None, move |cell| {
                    cell.cross_day(open_day).boxed()
                })
            });
            for result in join_all(pending).await {
                if let Err(e) = result {
                    warn!(open_day, error = %e, "cross day failed");
                }
            }
        }
    }

    /// Deactivate every agent of `key`, flush its state and remove the actor.
    ///
    /// Returns `false` if the state could not be flushed; the actor then
    /// stays live.
    pub async fn deactivate(&self, key: EntityKey) -> Result<bool, ActorError> {
        let Some(actor) = self.actors().get(&key) else {
            return Ok(true);
        };
        actor
            .call("deactivate".into(), false, None, |cell| {
                async move {
                    let written = cell.shut_down(DeactivationReason::ExplicitRequest).await?;
                    Ok(written.is_some())
                }
                .boxed()
            })
            .await
    }

    /// State of `component` for entity `key`, rendered as JSON.
    ///
    /// Reads the live actor's cache if the actor exists, the store
    /// otherwise. `None` if no state exists.
    pub async fn inspect_state(
        &self,
        key: EntityKey,
        component: ComponentKind,
    ) -> Result<Option<serde_json::Value>, ActorError> {
        let decl = *self
            .components()
            .get(component)
            .ok_or(ActorError::UnknownComponent(component))?;
        let state_key = StateKey {
            type_hash: decl.state_hash,
            id: key.id,
        };

        if let Some(actor) = self.actors().get(&key) {
            let cached = actor
                .call("inspect".into(), false, None, move |cell| {
                    async move { cell.cache().snapshot_json(state_key).transpose().map_err(ActorError::from) }
                        .boxed()
                })
                .await?;
            if cached.is_some() {
                return Ok(cached);
            }
        }

        let record = self
            .shared
            .store()
            .find_one(&StateQuery::from(state_key))
            .await?;
        match record {
            Some(record) => {
                let value = self
                    .components()
                    .state_types()
                    .decode_json(record.type_hash, &record.data)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Stop the runtime.
    ///
    /// In order: stop the background loops, cancel every timer, close every
    /// session, drain every mailbox, then deactivate and flush each actor
    /// (entities first, the server actor last) and drop them all.
    pub async fn shutdown(&self) -> SaveReport {
        let mut report = SaveReport::default();
        if !self.shared.begin_shutdown() {
            return report;
        }
        info!("game runtime shutting down");

        self.shared.stop_background();
        let timers = self.timers().cancel_all();
        let sessions = self.sessions().remove_all();
        debug!(timers, sessions = sessions.len(), "timers and sessions closed");

        self.all_finish().await;

        let server = self.server_key();
        let mut actors = self.actors().snapshot();
        actors.sort_by_key(|actor| (actor.key().is_global(), actor.key() == server));
        for actor in actors {
            let key = actor.key();
            let result = actor
                .call("shutdown".into(), false, None, |cell| {
                    cell.shut_down(DeactivationReason::Shutdown).boxed()
                })
                .await;
            match result {
                Ok(Some(written)) => {
                    report.actors += 1;
                    report.states += written;
                }
                Ok(None) => report.failed.push(key),
                Err(e) => {
                    warn!(actor = %key, error = %e, "shutdown of actor failed");
                    report.failed.push(key);
                }
            }
        }

        let dropped = self.actors().drain();
        info!(
            actors = dropped.len(),
            states = report.states,
            failed = report.failed.len(),
            "game runtime stopped"
        );
        report
    }
}

impl fmt::Debug for GameRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameRuntime")
            .field("server_id", &self.config().server_id)
            .field("actors", &self.actors().len())
            .field("sessions", &self.sessions().len())
            .finish()
    }
}
