//! Client message dispatch.
//!
//! - [`envelope`](InboundFrame): frames exchanged with the transport
//! - [`Handler`]: one handler per message type, bound to a component
//! - [`MessageDispatcher`]: frame to handler to actor mailbox
//! - [`Session`] / [`SessionManager`]: connections and the entity they are
//!   logged in as

mod codec;
mod dispatcher;
mod envelope;
mod handler;
mod session;

pub use codec::{CodecError, JsonCodec, MessageCodec};
pub use dispatcher::MessageDispatcher;
pub use envelope::{Inbound, InboundFrame, Message, MsgId, Outbound, OutboundFrame, StatusCode};
pub use handler::{Handler, HandlerRegistry, HandlerScope};
pub use session::{ClientChannel, MemoryChannel, Session, SessionManager};
