//! Shared fixtures: a small game with accounts, roles, pets and a server.
//!
//! - `account` component on Account actors, driven by [`LoginHandler`]
//! - `role` component on Role actors, behind the hot-swappable
//!   [`RoleBehavior`] (V1 levels up by 1, V2 by 10)
//! - `pet` component on Role actors, listening to [`GOT_NEW_PET`]
//! - `server` component on the Server actor, listening to
//!   [`WORLD_LEVEL_UP`]
//!
//! Every hook and callback writes a line into a shared [`Recorder`].

#![allow(dead_code)]

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use moonpool_game::actor::{ActorKind, EntityKey};
use moonpool_game::component::{Agent, AgentContext, Component, ComponentKind, HotfixModule};
use moonpool_game::config::RuntimeConfig;
use moonpool_game::error::ActorError;
use moonpool_game::event::{Event, EventId, EventListener, Payload};
use moonpool_game::messaging::{
    Handler, HandlerScope, Inbound, InboundFrame, JsonCodec, MemoryChannel, Message, MessageCodec, MsgId,
    OutboundFrame, Session, StatusCode,
};
use moonpool_game::runtime::GameRuntime;
use moonpool_game::storage::{InMemoryStore, State};
use moonpool_game::timer::TimerHandler;

pub const GOT_NEW_PET: EventId = EventId(101);
pub const WORLD_LEVEL_UP: EventId = EventId(1001);

pub const NAME_REQUIRED: StatusCode = StatusCode(10);

// ============================================================================
// Recorder
// ============================================================================

/// Ordered log of everything the test agents did.
#[derive(Debug, Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    pub fn push(&self, entry: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.entries().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

// ============================================================================
// States
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub name: String,
    pub logins: u32,
}

impl State for AccountState {
    const TYPE_NAME: &'static str = "AccountState";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleState {
    pub level: u32,
    pub ticks: u32,
}

impl State for RoleState {
    const TYPE_NAME: &'static str = "RoleState";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PetState {
    pub pets: Vec<i64>,
}

impl State for PetState {
    const TYPE_NAME: &'static str = "PetState";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerState {
    pub world_level: u32,
}

impl State for ServerState {
    const TYPE_NAME: &'static str = "ServerState";
}

// ============================================================================
// Components and agents
// ============================================================================

pub struct AccountComponent;

impl Component for AccountComponent {
    const KIND: ComponentKind = ComponentKind::new("account");
    const ACTOR_KIND: ActorKind = ActorKind::Account;
    type State = AccountState;
    type Agent = AccountAgent;
}

pub struct AccountAgent {
    recorder: Recorder,
}

impl AccountAgent {
    pub fn new(recorder: Recorder) -> Self {
        Self { recorder }
    }
}

#[async_trait]
impl Agent for AccountAgent {
    async fn active(&mut self, ctx: &mut AgentContext<'_>) -> Result<(), ActorError> {
        self.recorder.push(format!("active:{}:account", ctx.key()));
        Ok(())
    }
}

pub struct RoleComponent;

impl Component for RoleComponent {
    const KIND: ComponentKind = ComponentKind::new("role");
    const ACTOR_KIND: ActorKind = ActorKind::Role;
    type State = RoleState;
    type Agent = dyn RoleBehavior;
}

/// Behavior swapped by the hotfix tests.
#[async_trait]
pub trait RoleBehavior: Agent {
    fn label(&self) -> &'static str;

    async fn level_up(&mut self, ctx: &mut AgentContext<'_>) -> Result<u32, ActorError>;
}

pub struct RoleAgentV1 {
    recorder: Recorder,
}

#[async_trait]
impl Agent for RoleAgentV1 {
    async fn active(&mut self, ctx: &mut AgentContext<'_>) -> Result<(), ActorError> {
        self.recorder.push(format!("active:{}:v1", ctx.key()));
        Ok(())
    }

    async fn inactive(&mut self, ctx: &mut AgentContext<'_>) -> Result<(), ActorError> {
        self.recorder.push(format!("inactive:{}:v1", ctx.key()));
        Ok(())
    }

    async fn reload(&mut self, ctx: &mut AgentContext<'_>) -> Result<(), ActorError> {
        self.recorder.push(format!("reload:{}:v1", ctx.key()));
        Ok(())
    }

    async fn cross_day(&mut self, ctx: &mut AgentContext<'_>, open_day: u32) -> Result<(), ActorError> {
        self.recorder.push(format!("cross_day:{}:{open_day}", ctx.key()));
        Ok(())
    }
}

#[async_trait]
impl RoleBehavior for RoleAgentV1 {
    fn label(&self) -> &'static str {
        "v1"
    }

    async fn level_up(&mut self, ctx: &mut AgentContext<'_>) -> Result<u32, ActorError> {
        let state = ctx.state::<RoleComponent>()?;
        state.level += 1;
        Ok(state.level)
    }
}

pub struct RoleAgentV2 {
    recorder: Recorder,
}

#[async_trait]
impl Agent for RoleAgentV2 {
    async fn active(&mut self, ctx: &mut AgentContext<'_>) -> Result<(), ActorError> {
        self.recorder.push(format!("active:{}:v2", ctx.key()));
        Ok(())
    }

    async fn inactive(&mut self, ctx: &mut AgentContext<'_>) -> Result<(), ActorError> {
        self.recorder.push(format!("inactive:{}:v2", ctx.key()));
        Ok(())
    }

    async fn reload(&mut self, ctx: &mut AgentContext<'_>) -> Result<(), ActorError> {
        self.recorder.push(format!("reload:{}:v2", ctx.key()));
        Ok(())
    }
}

#[async_trait]
impl RoleBehavior for RoleAgentV2 {
    fn label(&self) -> &'static str {
        "v2"
    }

    async fn level_up(&mut self, ctx: &mut AgentContext<'_>) -> Result<u32, ActorError> {
        let state = ctx.state::<RoleComponent>()?;
        state.level += 10;
        Ok(state.level)
    }
}

pub struct PetComponent;

impl Component for PetComponent {
    const KIND: ComponentKind = ComponentKind::new("pet");
    const ACTOR_KIND: ActorKind = ActorKind::Role;
    type State = PetState;
    type Agent = PetAgent;
}

pub struct PetAgent {
    recorder: Recorder,
}

#[async_trait]
impl Agent for PetAgent {
    async fn active(&mut self, ctx: &mut AgentContext<'_>) -> Result<(), ActorError> {
        self.recorder.push(format!("active:{}:pet", ctx.key()));
        Ok(())
    }
}

pub struct ServerComponent;

impl Component for ServerComponent {
    const KIND: ComponentKind = ComponentKind::new("server");
    const ACTOR_KIND: ActorKind = ActorKind::Server;
    type State = ServerState;
    type Agent = ServerAgent;
}

pub struct ServerAgent {
    recorder: Recorder,
}

#[async_trait]
impl Agent for ServerAgent {
    async fn active(&mut self, ctx: &mut AgentContext<'_>) -> Result<(), ActorError> {
        self.recorder.push(format!("active:{}:server", ctx.key()));
        Ok(())
    }

    async fn cross_day(&mut self, ctx: &mut AgentContext<'_>, open_day: u32) -> Result<(), ActorError> {
        self.recorder.push(format!("cross_day:{}:{open_day}", ctx.key()));
        Ok(())
    }
}

// ============================================================================
// Messages and handlers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReqLogin {
    pub account_id: i64,
    pub name: String,
}

impl Message for ReqLogin {
    const MSG_ID: MsgId = 101;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResLogin {
    pub account_id: i64,
    pub logins: u32,
}

impl Message for ResLogin {
    const MSG_ID: MsgId = 102;
}

pub struct LoginHandler;

#[async_trait]
impl Handler for LoginHandler {
    const SCOPE: HandlerScope = HandlerScope::Request;
    type Component = AccountComponent;
    type Request = ReqLogin;
    type Response = ResLogin;

    fn route(&self, request: &ReqLogin) -> Option<EntityKey> {
        (request.account_id > 0).then(|| EntityKey::new(ActorKind::Account, request.account_id))
    }

    async fn handle(
        &self,
        _agent: &mut AccountAgent,
        ctx: &mut AgentContext<'_>,
        request: Inbound<ReqLogin>,
    ) -> Result<Option<ResLogin>, ActorError> {
        if request.body.name.is_empty() {
            return Err(ActorError::business(NAME_REQUIRED, "account name cannot be empty"));
        }
        let account_id = ctx.key().id;
        let state = ctx.state::<AccountComponent>()?;
        state.name = request.body.name;
        state.logins += 1;
        Ok(Some(ResLogin {
            account_id,
            logins: state.logins,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReqLevelUp;

impl Message for ReqLevelUp {
    const MSG_ID: MsgId = 201;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResLevelUp {
    pub level: u32,
    pub agent: String,
}

impl Message for ResLevelUp {
    const MSG_ID: MsgId = 202;
}

pub struct LevelUpHandler;

#[async_trait]
impl Handler for LevelUpHandler {
    const SCOPE: HandlerScope = HandlerScope::Session(ActorKind::Role);
    type Component = RoleComponent;
    type Request = ReqLevelUp;
    type Response = ResLevelUp;

    async fn handle(
        &self,
        agent: &mut <RoleComponent as Component>::Agent,
        ctx: &mut AgentContext<'_>,
        _request: Inbound<ReqLevelUp>,
    ) -> Result<Option<ResLevelUp>, ActorError> {
        let level = agent.level_up(ctx).await?;
        Ok(Some(ResLevelUp {
            level,
            agent: agent.label().to_string(),
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReqSlow {
    pub millis: u64,
}

impl Message for ReqSlow {
    const MSG_ID: MsgId = 203;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResSlow;

impl Message for ResSlow {
    const MSG_ID: MsgId = 204;
}

pub const SLOW_TIMEOUT: Duration = Duration::from_millis(50);

/// Sleeps inside the mailbox; answers within [`SLOW_TIMEOUT`] or times out.
pub struct SlowHandler;

#[async_trait]
impl Handler for SlowHandler {
    const SCOPE: HandlerScope = HandlerScope::Session(ActorKind::Role);
    type Component = RoleComponent;
    type Request = ReqSlow;
    type Response = ResSlow;

    fn timeout(&self) -> Option<Duration> {
        Some(SLOW_TIMEOUT)
    }

    async fn handle(
        &self,
        _agent: &mut <RoleComponent as Component>::Agent,
        _ctx: &mut AgentContext<'_>,
        request: Inbound<ReqSlow>,
    ) -> Result<Option<ResSlow>, ActorError> {
        tokio::time::sleep(Duration::from_millis(request.body.millis)).await;
        Ok(Some(ResSlow))
    }
}

// ============================================================================
// Listeners and timers
// ============================================================================

pub struct PetListener {
    recorder: Recorder,
}

#[async_trait]
impl EventListener for PetListener {
    type Component = PetComponent;
    const EVENTS: &'static [EventId] = &[GOT_NEW_PET];

    async fn on_event(
        &self,
        _agent: &mut PetAgent,
        ctx: &mut AgentContext<'_>,
        event: &Event,
    ) -> Result<(), ActorError> {
        let Payload::Int(pet) = event.payload else {
            return Err(ActorError::business(StatusCode::BAD_REQUEST, "pet id expected"));
        };
        ctx.state::<PetComponent>()?.pets.push(pet);
        self.recorder.push(format!("pet:{}:{pet}", ctx.key()));
        Ok(())
    }
}

pub struct RoleWorldListener {
    recorder: Recorder,
}

#[async_trait]
impl EventListener for RoleWorldListener {
    type Component = RoleComponent;
    const EVENTS: &'static [EventId] = &[WORLD_LEVEL_UP];

    async fn on_event(
        &self,
        _agent: &mut <RoleComponent as Component>::Agent,
        ctx: &mut AgentContext<'_>,
        _event: &Event,
    ) -> Result<(), ActorError> {
        self.recorder.push(format!("world:{}", ctx.key()));
        Ok(())
    }
}

pub struct ServerWorldListener {
    recorder: Recorder,
}

#[async_trait]
impl EventListener for ServerWorldListener {
    type Component = ServerComponent;
    const EVENTS: &'static [EventId] = &[WORLD_LEVEL_UP];

    async fn on_event(
        &self,
        _agent: &mut ServerAgent,
        ctx: &mut AgentContext<'_>,
        _event: &Event,
    ) -> Result<(), ActorError> {
        ctx.state::<ServerComponent>()?.world_level += 1;
        self.recorder.push(format!("world:{}", ctx.key()));
        Ok(())
    }
}

/// Marks the role offline when its session goes away.
pub struct RoleSessionListener {
    recorder: Recorder,
}

#[async_trait]
impl EventListener for RoleSessionListener {
    type Component = RoleComponent;
    const EVENTS: &'static [EventId] = &[EventId::SESSION_REMOVED];

    async fn on_event(
        &self,
        _agent: &mut <RoleComponent as Component>::Agent,
        ctx: &mut AgentContext<'_>,
        _event: &Event,
    ) -> Result<(), ActorError> {
        ctx.set_online(false);
        self.recorder.push(format!("offline:{}", ctx.key()));
        Ok(())
    }
}

/// Counts ticks in the role state. Yields mid-callback so an overlapping
/// task would show up in the recorder.
pub struct RoleTick {
    recorder: Recorder,
}

#[async_trait]
impl TimerHandler for RoleTick {
    type Component = RoleComponent;

    async fn on_timer(
        &self,
        _agent: &mut <RoleComponent as Component>::Agent,
        ctx: &mut AgentContext<'_>,
        _param: &Payload,
    ) -> Result<(), ActorError> {
        self.recorder.push("begin");
        tokio::time::sleep(Duration::from_millis(10)).await;
        ctx.state::<RoleComponent>()?.ticks += 1;
        self.recorder.push("end");
        Ok(())
    }
}

// ============================================================================
// Runtime fixture
// ============================================================================

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Module with the given role behavior version.
pub fn module(recorder: &Recorder, v2: bool) -> HotfixModule {
    module_with(recorder, v2, true)
}

/// Module with the given role behavior version, with or without the pet
/// listener.
pub fn module_with(recorder: &Recorder, v2: bool, pet_listener: bool) -> HotfixModule {
    let account = recorder.clone();
    let role = recorder.clone();
    let pet = recorder.clone();
    let server = recorder.clone();

    let builder = HotfixModule::builder(if v2 { "logic-v2" } else { "logic-v1" })
        .agent::<AccountComponent, _>("AccountAgent", move || Box::new(AccountAgent::new(account.clone())))
        .agent::<PetComponent, _>("PetAgent", move || {
            Box::new(PetAgent {
                recorder: pet.clone(),
            })
        })
        .agent::<ServerComponent, _>("ServerAgent", move || {
            Box::new(ServerAgent {
                recorder: server.clone(),
            })
        });

    let builder = if v2 {
        builder.agent::<RoleComponent, _>("RoleAgentV2", move || -> Box<dyn RoleBehavior> {
            Box::new(RoleAgentV2 {
                recorder: role.clone(),
            })
        })
    } else {
        builder.agent::<RoleComponent, _>("RoleAgentV1", move || -> Box<dyn RoleBehavior> {
            Box::new(RoleAgentV1 {
                recorder: role.clone(),
            })
        })
    };

    let builder = if pet_listener {
        builder.listener(PetListener {
            recorder: recorder.clone(),
        })
    } else {
        builder
    };

    builder
        .handler(LoginHandler)
        .handler(LevelUpHandler)
        .handler(SlowHandler)
        .listener(RoleWorldListener {
            recorder: recorder.clone(),
        })
        .listener(ServerWorldListener {
            recorder: recorder.clone(),
        })
        .listener(RoleSessionListener {
            recorder: recorder.clone(),
        })
        .timer(RoleTick {
            recorder: recorder.clone(),
        })
        .build()
        .expect("module should build")
}

pub struct Fixture {
    pub runtime: GameRuntime,
    pub store: Arc<InMemoryStore>,
    pub recorder: Recorder,
}

pub fn fixture() -> Fixture {
    fixture_with(RuntimeConfig::default())
}

pub fn fixture_with(config: RuntimeConfig) -> Fixture {
    init_tracing();
    let recorder = Recorder::default();
    let store = Arc::new(InMemoryStore::new());
    let runtime = GameRuntime::builder()
        .config(config)
        .component::<AccountComponent>()
        .component::<RoleComponent>()
        .component::<PetComponent>()
        .component::<ServerComponent>()
        .module(module(&recorder, false))
        .store(store.clone())
        .build()
        .expect("runtime should build");
    Fixture {
        runtime,
        store,
        recorder,
    }
}

/// Started runtime with the default configuration.
pub async fn started() -> Fixture {
    let fixture = fixture();
    fixture.runtime.start().await.expect("start");
    fixture
}

pub fn role(id: i64) -> EntityKey {
    EntityKey::new(ActorKind::Role, id)
}

pub fn session(id: u64) -> (Arc<MemoryChannel>, Arc<Session>) {
    let channel = Arc::new(MemoryChannel::new());
    let session = Arc::new(Session::new(id, channel.clone()));
    (channel, session)
}

pub fn frame<M: Message + Serialize>(uni_id: i32, message: &M) -> InboundFrame {
    InboundFrame::encode(&JsonCodec, uni_id, message).expect("encode frame")
}

pub fn decode<M: DeserializeOwned>(frame: &OutboundFrame) -> M {
    let message = frame.message.as_ref().expect("frame carries a body");
    JsonCodec.decode(&message.payload).expect("decode body")
}

/// Level up `key` through its role agent, outside of any client message.
pub async fn level_up(runtime: &GameRuntime, key: EntityKey) -> Result<u32, ActorError> {
    runtime
        .actor(key)
        .send(|cell| {
            async move {
                cell.with_agent::<RoleComponent, _, _>(|agent, ctx| agent.level_up(ctx))
                    .await
            }
            .boxed()
        })
        .await
}

/// Current role state of `key`, attaching the role component if needed.
pub async fn role_state(runtime: &GameRuntime, key: EntityKey) -> RoleState {
    runtime
        .actor(key)
        .send(|cell| {
            async move {
                cell.agent::<RoleComponent>().await?;
                Ok(cell.state::<RoleComponent>()?.clone())
            }
            .boxed()
        })
        .await
        .expect("role state")
}

/// Wait for event fan-out to settle: origin, coordinator, then targets.
pub async fn settle(runtime: &GameRuntime) {
    for _ in 0..3 {
        runtime.all_finish().await;
    }
}
