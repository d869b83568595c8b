//! State shared by every actor of one runtime.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::actor::{ActorKind, ActorManager, ActorRef, EntityKey};
use crate::component::{ComponentKind, ComponentRegistry, ErasedBinding, HotfixModule};
use crate::config::RuntimeConfig;
use crate::error::ActorError;
use crate::event::{EventDispatcher, EventId, Payload};
use crate::messaging::{JsonCodec, SessionManager};
use crate::storage::{CacheBackend, PersistenceAdapter};
use crate::timer::TimerScheduler;

pub(crate) struct RuntimeShared {
    config: RuntimeConfig,
    components: ComponentRegistry,
    module: RwLock<Arc<HotfixModule>>,
    module_version: AtomicU64,
    actors: ActorManager,
    timers: TimerScheduler,
    sessions: SessionManager,
    store: Arc<dyn PersistenceAdapter>,
    cache_backend: Option<Arc<dyn CacheBackend>>,
    codec: JsonCodec,
    background: Mutex<Vec<JoinHandle<()>>>,
    shutting_down: AtomicBool,
}

impl RuntimeShared {
    pub(crate) fn new(
        config: RuntimeConfig,
        components: ComponentRegistry,
        module: HotfixModule,
        store: Arc<dyn PersistenceAdapter>,
        cache_backend: Option<Arc<dyn CacheBackend>>,
    ) -> Self {
        Self {
            config,
            components,
            module: RwLock::new(Arc::new(module.with_version(1))),
            module_version: AtomicU64::new(1),
            actors: ActorManager::new(),
            timers: TimerScheduler::new(),
            sessions: SessionManager::new(),
            store,
            cache_backend,
            codec: JsonCodec,
            background: Mutex::new(Vec::new()),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub(crate) fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub(crate) fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Current module. Callers keep the returned `Arc` for the duration of
    /// one operation so a concurrent swap never mixes versions.
    pub(crate) fn module(&self) -> Arc<HotfixModule> {
        self.module
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install `module` and return its version.
    pub(crate) fn install_module(&self, module: HotfixModule) -> Arc<HotfixModule> {
        let version = self.module_version.fetch_add(1, Ordering::AcqRel) + 1;
        let module = Arc::new(module.with_version(version));
        *self.module.write().unwrap_or_else(PoisonError::into_inner) = module.clone();
        module
    }

    pub(crate) fn actors(&self) -> &ActorManager {
        &self.actors
    }

    pub(crate) fn timers(&self) -> &TimerScheduler {
        &self.timers
    }

    pub(crate) fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub(crate) fn store(&self) -> Arc<dyn PersistenceAdapter> {
        self.store.clone()
    }

    pub(crate) fn cache_backend(&self) -> Option<Arc<dyn CacheBackend>> {
        self.cache_backend.clone()
    }

    pub(crate) fn codec(&self) -> &JsonCodec {
        &self.codec
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    pub(crate) fn begin_shutdown(&self) -> bool {
        !self.shutting_down.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn add_background(&self, task: JoinHandle<()>) {
        self.background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }

    pub(crate) fn stop_background(&self) {
        let tasks: Vec<JoinHandle<()>> = self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            task.abort();
        }
    }

    /// Binding to use for `kind` on an actor of `actor_kind`.
    pub(crate) fn resolve_binding(
        &self,
        module: &HotfixModule,
        actor_kind: ActorKind,
        kind: ComponentKind,
    ) -> Result<Arc<dyn ErasedBinding>, ActorError> {
        let decl = self
            .components
            .get(kind)
            .ok_or(ActorError::UnknownComponent(kind))?;
        if decl.actor_kind != actor_kind {
            return Err(ActorError::NotBound {
                actor_kind,
                component: kind,
            });
        }
        module
            .binding(kind)
            .cloned()
            .ok_or(ActorError::UnknownComponent(kind))
    }

    /// Live actor for `key`, created on first access.
    pub(crate) fn actor_for(self: &Arc<Self>, key: EntityKey) -> ActorRef {
        self.actors.get_or_create(self, key)
    }

    pub(crate) fn coordinator_key(&self) -> EntityKey {
        EntityKey::global(ActorKind::Server, self.config.server_id)
    }

    /// The server actor owning the online roster.
    pub(crate) fn coordinator(self: &Arc<Self>) -> ActorRef {
        self.actor_for(self.coordinator_key())
    }

    pub(crate) fn dispatch_event(self: &Arc<Self>, origin: EntityKey, id: EventId, payload: Payload) {
        EventDispatcher::new(self.clone()).dispatch(origin, id, payload);
    }

    /// Record `key` as online or offline on the coordinator.
    pub(crate) fn update_roster(self: &Arc<Self>, key: EntityKey, online: bool) {
        if key.is_global() {
            return;
        }
        let posted = self.coordinator().post("roster".into(), false, move |cell| {
            async move {
                let roster = cell.roster_mut();
                let changed = if online {
                    roster.insert(key)
                } else {
                    roster.remove(&key)
                };
                if changed {
                    debug!(entity = %key, online, total = roster.len(), "online roster updated");
                }
                Ok(())
            }
            .boxed()
        });
        if let Err(e) = posted {
            warn!(entity = %key, online, error = %e, "roster update lost");
        }
    }
}
