//! Routes inbound client frames to handlers running in actor mailboxes.
//!
//! # Flow
//!
//! ```text
//! InboundFrame ─▶ handler lookup ─▶ decode + resolve target ─▶ actor mailbox
//!                     │ miss                │ fail                   │
//!                     ▼                     ▼                        ▼
//!              routing error         routing error          response / error frame
//!             (no actor touched)   (no actor touched)      (only when uni_id != 0)
//! ```

use std::borrow::Cow;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, warn};

use super::envelope::{InboundFrame, Outbound, OutboundFrame};
use super::handler::ErasedHandler;
use super::session::Session;
use crate::error::{ActorError, DispatchError};
use crate::runtime::RuntimeShared;

/// Dispatches client frames. Cheap to clone.
#[derive(Clone)]
pub struct MessageDispatcher {
    shared: Arc<RuntimeShared>,
}

impl MessageDispatcher {
    pub(crate) fn new(shared: Arc<RuntimeShared>) -> Self {
        Self { shared }
    }

    /// Dispatch one frame received on `session`.
    ///
    /// Routing errors are reported on the session's channel and returned
    /// without touching any actor. Handler failures are written back as an
    /// error frame when the client supplied a correlation id, and returned.
    pub async fn dispatch(&self, session: &Arc<Session>, frame: InboundFrame) -> Result<(), DispatchError> {
        if self.shared.is_shutting_down() {
            return self.fail(session, &frame, ActorError::ShuttingDown);
        }

        let module = self.shared.module();
        let Some(handler) = module.handlers().get(frame.msg_id).cloned() else {
            return self.reject(session, DispatchError::UnknownMessage(frame.msg_id));
        };
        drop(module);

        let result = match self.run(&handler, session, &frame).await {
            Err(RunError::Routing(e)) => return self.reject(session, e),
            Err(RunError::Actor(ActorError::MailboxClosed(key))) => {
                debug!(actor = %key, msg_id = frame.msg_id, "mailbox closed, retrying once");
                self.run(&handler, session, &frame).await
            }
            other => other,
        };

        match result {
            Ok(response) => {
                if frame.wants_response() {
                    session.write(OutboundFrame::success(frame.uni_id, response));
                } else if response.is_some() {
                    debug!(msg_id = frame.msg_id, "response dropped for uni_id 0");
                }
                Ok(())
            }
            Err(RunError::Routing(e)) => self.reject(session, e),
            Err(RunError::Actor(e)) => self.fail(session, &frame, e),
        }
    }

    async fn run(
        &self,
        handler: &Arc<dyn ErasedHandler>,
        session: &Arc<Session>,
        frame: &InboundFrame,
    ) -> Result<Option<Outbound>, RunError> {
        let prepared = handler
            .prepare(
                self.shared.codec(),
                &frame.payload,
                session,
                self.shared.config().server_id,
            )
            .map_err(RunError::Routing)?;

        let actor = self.shared.actor_for(prepared.target);
        let timeout = handler.timeout().or(self.shared.config().send_timeout);
        let context: Cow<'static, str> = Cow::Owned(format!("msg {} ({})", frame.msg_id, handler.name()));

        let invoked = handler.clone();
        let request = prepared.request;
        let uni_id = frame.uni_id;
        let session = session.clone();
        actor
            .send_with(context, timeout, move |cell| {
                async move { invoked.invoke(cell, request, uni_id, session).await }.boxed()
            })
            .await
            .map_err(RunError::Actor)
    }

    fn reject(&self, session: &Arc<Session>, error: DispatchError) -> Result<(), DispatchError> {
        debug!(session = session.id(), error = %error, "routing error");
        session.channel().routing_error(&error);
        Err(error)
    }

    fn fail(&self, session: &Arc<Session>, frame: &InboundFrame, error: ActorError) -> Result<(), DispatchError> {
        warn!(
            session = session.id(),
            msg_id = frame.msg_id,
            uni_id = frame.uni_id,
            error = %error,
            "handler failed"
        );
        if frame.wants_response() {
            session.write(OutboundFrame::failure(
                frame.uni_id,
                error.status_code(),
                error.to_string(),
            ));
        }
        Err(DispatchError::Handler(error))
    }
}

enum RunError {
    Routing(DispatchError),
    Actor(ActorError),
}
