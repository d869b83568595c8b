//! Message handlers and the message-id to handler table.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::codec::{JsonCodec, MessageCodec};
use super::envelope::{Inbound, Message, MsgId, Outbound};
use super::session::Session;
use crate::actor::{ActorCell, ActorKind, EntityKey};
use crate::component::{AgentContext, Component, ComponentKind};
use crate::error::{ActorError, ConfigError, DispatchError};

/// How the dispatcher finds the actor a handler runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerScope {
    /// The server-wide singleton of this kind.
    Global(ActorKind),
    /// The actor the session is logged in as. Unbound sessions are rejected.
    Session(ActorKind),
    /// Computed from the request by [`Handler::route`], e.g. the account
    /// named in a login request.
    Request,
}

/// Handles one client message type on one component's agent.
///
/// ```rust,ignore
/// struct BuyItemHandler;
///
/// #[async_trait]
/// impl Handler for BuyItemHandler {
///     const SCOPE: HandlerScope = HandlerScope::Session(ActorKind::Role);
///     type Component = BagComponent;
///     type Request = ReqBuyItem;
///     type Response = ResBuyItem;
///
///     async fn handle(
///         &self,
///         agent: &mut dyn BagBehavior,
///         ctx: &mut AgentContext<'_>,
///         req: Inbound<ReqBuyItem>,
///     ) -> Result<Option<ResBuyItem>, ActorError> {
///         agent.buy(ctx, req.body.item_id).await.map(Some)
///     }
/// }
/// ```
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Target actor resolution.
    const SCOPE: HandlerScope;

    /// Component whose agent handles the message.
    type Component: Component;

    /// Decoded request.
    type Request: Message + DeserializeOwned + Send + 'static;

    /// Response body sent back with the request's correlation id.
    type Response: Message + Serialize + Send + 'static;

    /// Caller-side timeout. `None` uses the runtime default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Target of a [`HandlerScope::Request`] handler.
    fn route(&self, _request: &Self::Request) -> Option<EntityKey> {
        None
    }

    /// Handle the request inside the target actor's mailbox.
    async fn handle(
        &self,
        agent: &mut <Self::Component as Component>::Agent,
        ctx: &mut AgentContext<'_>,
        request: Inbound<Self::Request>,
    ) -> Result<Option<Self::Response>, ActorError>;
}

/// A decoded request and the actor it must run on.
pub(crate) struct Prepared {
    pub(crate) target: EntityKey,
    pub(crate) request: Box<dyn Any + Send>,
}

#[async_trait]
pub(crate) trait ErasedHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn msg_id(&self) -> MsgId;

    fn component(&self) -> ComponentKind;

    fn scope(&self) -> HandlerScope;

    fn timeout(&self) -> Option<Duration>;

    /// Decode the payload and resolve the target, before any mailbox is
    /// touched.
    fn prepare(
        &self,
        codec: &JsonCodec,
        payload: &[u8],
        session: &Session,
        server_id: i32,
    ) -> Result<Prepared, DispatchError>;

    async fn invoke(
        &self,
        cell: &mut ActorCell,
        request: Box<dyn Any + Send>,
        uni_id: i32,
        session: Arc<Session>,
    ) -> Result<Option<Outbound>, ActorError>;
}

struct TypedHandler<H: Handler> {
    handler: H,
}

#[async_trait]
impl<H: Handler> ErasedHandler for TypedHandler<H> {
    fn name(&self) -> &'static str {
        std::any::type_name::<H>()
    }

    fn msg_id(&self) -> MsgId {
        <H::Request as Message>::MSG_ID
    }

    fn component(&self) -> ComponentKind {
        <H::Component as Component>::KIND
    }

    fn scope(&self) -> HandlerScope {
        H::SCOPE
    }

    fn timeout(&self) -> Option<Duration> {
        self.handler.timeout()
    }

    fn prepare(
        &self,
        codec: &JsonCodec,
        payload: &[u8],
        session: &Session,
        server_id: i32,
    ) -> Result<Prepared, DispatchError> {
        let msg_id = self.msg_id();
        let request: H::Request = codec
            .decode(payload)
            .map_err(|source| DispatchError::Decode { msg_id, source })?;

        let target = match H::SCOPE {
            HandlerScope::Global(kind) => EntityKey::global(kind, server_id),
            HandlerScope::Session(kind) => match session.entity() {
                Some(key) if key.kind == kind => key,
                _ => return Err(DispatchError::NotAuthenticated(kind)),
            },
            HandlerScope::Request => self
                .handler
                .route(&request)
                .ok_or(DispatchError::Unroutable(msg_id))?,
        };

        Ok(Prepared {
            target,
            request: Box::new(request),
        })
    }

    async fn invoke(
        &self,
        cell: &mut ActorCell,
        request: Box<dyn Any + Send>,
        uni_id: i32,
        session: Arc<Session>,
    ) -> Result<Option<Outbound>, ActorError> {
        let body = match request.downcast::<H::Request>() {
            Ok(body) => *body,
            Err(_) => return Err(ActorError::AgentTypeMismatch(self.component())),
        };
        let inbound = Inbound {
            body,
            uni_id,
            session,
        };

        let mut agent = cell.checkout::<H::Component>().await?;
        let result = {
            let mut ctx = AgentContext::new(cell, self.component());
            self.handler.handle(&mut *agent, &mut ctx, inbound).await
        };
        cell.checkin::<H::Component>(agent);

        match result? {
            Some(response) => Ok(Some(Outbound::encode(&JsonCodec, &response)?)),
            None => Ok(None),
        }
    }
}

/// One handler per message type, built at startup.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<MsgId, Arc<dyn ErasedHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for its request's message id.
    ///
    /// A second handler for the same id is a configuration error.
    pub fn register<H: Handler>(&mut self, handler: H) -> Result<(), ConfigError> {
        let typed: Arc<dyn ErasedHandler> = Arc::new(TypedHandler { handler });
        let msg_id = typed.msg_id();
        if let Some(first) = self.handlers.get(&msg_id) {
            return Err(ConfigError::DuplicateHandler {
                msg_id,
                first: first.name(),
                second: typed.name(),
            });
        }
        self.handlers.insert(msg_id, typed);
        Ok(())
    }

    pub(crate) fn get(&self, msg_id: MsgId) -> Option<&Arc<dyn ErasedHandler>> {
        self.handlers.get(&msg_id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<dyn ErasedHandler>> {
        self.handlers.values()
    }

    /// Returns `true` if a handler is registered for `msg_id`.
    pub fn has_handler(&self, msg_id: MsgId) -> bool {
        self.handlers.contains_key(&msg_id)
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}
