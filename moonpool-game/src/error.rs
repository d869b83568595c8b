//! Error types for the game actor runtime.
//!
//! Errors are split by how far they propagate:
//!
//! - [`ActorError`]: failures local to one actor task (handler errors,
//!   timeouts, lifecycle violations). They never leave the actor's mailbox
//!   except as the result of a `send`.
//! - [`DispatchError`]: routing failures detected before any mailbox is
//!   touched, plus handler failures surfaced to the connection.
//! - [`ConfigError`]: registry misconfiguration. Fatal at startup.
//! - [`StorageError`]: persistence failures, re-exported from
//!   [`storage`](crate::storage).

use std::time::Duration;

use thiserror::Error;

use crate::actor::{ActorKind, AgentPhase, EntityKey};
use crate::component::ComponentKind;
use crate::event::EventId;
use crate::messaging::{CodecError, MsgId, StatusCode};

pub use crate::storage::StorageError;

/// Errors raised while running work on an actor.
#[derive(Debug, Error)]
pub enum ActorError {
    /// The actor's mailbox no longer accepts tasks (evicted or stopped).
    #[error("Actor mailbox closed: {0}")]
    MailboxClosed(EntityKey),

    /// The task was dropped before producing a result (mailbox stopped or task panicked).
    #[error("Task on {0} was dropped before completing")]
    TaskDropped(EntityKey),

    /// The caller stopped waiting for the result.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// A task tried to `send` to the actor it is running on.
    #[error("Reentrant send to {0} from its own mailbox")]
    Reentrant(EntityKey),

    /// The agent is checked out by the task currently running.
    #[error("Agent {0} is busy")]
    AgentBusy(ComponentKind),

    /// The stored agent does not have the type the caller expects.
    #[error("Agent {0} has an unexpected concrete type")]
    AgentTypeMismatch(ComponentKind),

    /// The component kind was never declared.
    #[error("Component {0} is not declared")]
    UnknownComponent(ComponentKind),

    /// The component may not attach to this kind of actor.
    #[error("Component {component} cannot attach to {actor_kind} actors")]
    NotBound {
        /// Kind of the actor that asked for the component.
        actor_kind: ActorKind,
        /// The component that was requested.
        component: ComponentKind,
    },

    /// The component is not attached to this actor.
    #[error("Component {0} is not attached")]
    NotAttached(ComponentKind),

    /// The agent's `active` hook failed.
    #[error("Agent activation failed for {kind}: {reason}")]
    ActivationFailed {
        /// Component whose agent failed to activate.
        kind: ComponentKind,
        /// Failure reported by the hook.
        reason: String,
    },

    /// Agent lifecycle violation.
    #[error("Invalid agent state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current phase.
        from: AgentPhase,
        /// Requested phase.
        to: AgentPhase,
    },

    /// A business rule rejected the request; the code is sent to the client.
    #[error("Business error {code}: {description}")]
    Business {
        /// Status code written to the client.
        code: StatusCode,
        /// Human readable description.
        description: String,
    },

    /// The runtime is shutting down and no longer accepts work.
    #[error("Runtime is shutting down")]
    ShuttingDown,

    /// Storage operation failed.
    #[error("Storage failed: {0}")]
    StorageFailed(#[from] StorageError),

    /// Payload encoding or decoding failed.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl ActorError {
    /// Build a business error carrying a client status code.
    pub fn business(code: StatusCode, description: impl Into<String>) -> Self {
        ActorError::Business {
            code,
            description: description.into(),
        }
    }

    /// Status code reported to the client for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ActorError::Business { code, .. } => *code,
            ActorError::Timeout(_) => StatusCode::TIMEOUT,
            ActorError::AgentBusy(_)
            | ActorError::MailboxClosed(_)
            | ActorError::TaskDropped(_)
            | ActorError::ShuttingDown => StatusCode::BUSY,
            ActorError::Codec(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_ERROR,
        }
    }
}

/// Errors raised by the message dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler is registered for the message type.
    #[error("No handler registered for message {0}")]
    UnknownMessage(MsgId),

    /// The handler needs a session bound to an actor of this kind.
    #[error("Session is not bound to a {0} actor")]
    NotAuthenticated(ActorKind),

    /// The handler could not compute a target actor from the request.
    #[error("Message {0} could not be routed to an actor")]
    Unroutable(MsgId),

    /// The payload does not decode into the handler's request type.
    #[error("Malformed payload for message {msg_id}: {source}")]
    Decode {
        /// Message type that failed to decode.
        msg_id: MsgId,
        /// Underlying codec failure.
        #[source]
        source: CodecError,
    },

    /// The handler ran and failed.
    #[error("Handler failed: {0}")]
    Handler(#[from] ActorError),
}

impl DispatchError {
    /// Returns `true` if the message was rejected before reaching any mailbox.
    pub fn is_routing_error(&self) -> bool {
        !matches!(self, DispatchError::Handler(_))
    }
}

/// Startup configuration errors. Any of these prevents the runtime from
/// serving traffic.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Two handlers claim the same message type.
    #[error("Duplicate handler for message {msg_id}: {first} and {second}")]
    DuplicateHandler {
        /// Contested message type.
        msg_id: MsgId,
        /// Handler registered first.
        first: &'static str,
        /// Handler registered second.
        second: &'static str,
    },

    /// A component kind was declared twice.
    #[error("Component {0} declared twice")]
    DuplicateComponent(ComponentKind),

    /// Two components share the same state type.
    #[error("State type {0} is owned by more than one component")]
    DuplicateStateType(&'static str),

    /// Two agent factories bound to the same component kind.
    #[error("Duplicate agent binding for component {0}")]
    DuplicateBinding(ComponentKind),

    /// The same listener registered twice for one event.
    #[error("Listener {listener} registered twice for event {event}")]
    DuplicateListener {
        /// Listener type name.
        listener: &'static str,
        /// Event it was registered for.
        event: EventId,
    },

    /// The same timer handler registered twice.
    #[error("Timer handler {0} registered twice")]
    DuplicateTimerHandler(&'static str),

    /// A declared component has no agent binding.
    #[error("Component {component} on {actor_kind} actors has no agent binding")]
    MissingBinding {
        /// Component without a binding.
        component: ComponentKind,
        /// Actor kind it attaches to.
        actor_kind: ActorKind,
    },

    /// A binding, handler, listener or timer refers to an undeclared component.
    #[error("{used_by} refers to undeclared component {component}")]
    UnknownComponent {
        /// Undeclared component.
        component: ComponentKind,
        /// Registration that referenced it.
        used_by: &'static str,
    },

    /// A handler's scope targets an actor kind its component cannot attach to.
    #[error("Handler {handler} targets {scope_kind} actors but {component} attaches to {component_kind}")]
    ScopeMismatch {
        /// Handler type name.
        handler: &'static str,
        /// Actor kind targeted by the scope.
        scope_kind: ActorKind,
        /// Component the handler operates on.
        component: ComponentKind,
        /// Actor kind the component attaches to.
        component_kind: ActorKind,
    },

    /// A required builder field was not set.
    #[error("{0} is required")]
    Missing(&'static str),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let err = ActorError::business(StatusCode(42), "account cannot be empty");
        assert_eq!(err.status_code(), StatusCode(42));
        assert_eq!(
            ActorError::Timeout(Duration::from_secs(1)).status_code(),
            StatusCode::TIMEOUT
        );
        assert_eq!(
            ActorError::UnknownComponent(ComponentKind::new("bag")).status_code(),
            StatusCode::INTERNAL_ERROR
        );
    }

    #[test]
    fn test_routing_classification() {
        assert!(DispatchError::UnknownMessage(9).is_routing_error());
        assert!(DispatchError::NotAuthenticated(ActorKind::Role).is_routing_error());
        let handler = DispatchError::Handler(ActorError::Timeout(Duration::from_millis(5)));
        assert!(!handler.is_routing_error());
    }
}
