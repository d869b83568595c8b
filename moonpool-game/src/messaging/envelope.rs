//! Inbound and outbound frames exchanged with the transport.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::codec::{CodecError, MessageCodec};
use super::session::Session;

/// Wire message type id.
pub type MsgId = i32;

/// A typed client message with a fixed wire id.
pub trait Message {
    /// Wire id of this message type.
    const MSG_ID: MsgId;
}

/// Result code written next to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusCode(pub i32);

impl StatusCode {
    /// Request succeeded.
    pub const SUCCESS: StatusCode = StatusCode(0);
    /// Unexpected server-side failure.
    pub const INTERNAL_ERROR: StatusCode = StatusCode(1);
    /// The handler did not answer in time.
    pub const TIMEOUT: StatusCode = StatusCode(2);
    /// The payload could not be understood.
    pub const BAD_REQUEST: StatusCode = StatusCode(3);
    /// The target actor is unavailable, retry later.
    pub const BUSY: StatusCode = StatusCode(4);

    /// Returns `true` for [`StatusCode::SUCCESS`].
    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Decoded frame header plus raw payload, as handed over by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// Message type id.
    pub msg_id: MsgId,
    /// Correlation id; 0 means fire-and-forget.
    pub uni_id: i32,
    /// Encoded request.
    pub payload: Vec<u8>,
}

impl InboundFrame {
    /// Build a frame from raw parts.
    pub fn new(msg_id: MsgId, uni_id: i32, payload: Vec<u8>) -> Self {
        Self {
            msg_id,
            uni_id,
            payload,
        }
    }

    /// Encode `message` into a frame.
    pub fn encode<M, C>(codec: &C, uni_id: i32, message: &M) -> Result<Self, CodecError>
    where
        M: Message + Serialize,
        C: MessageCodec,
    {
        Ok(Self::new(M::MSG_ID, uni_id, codec.encode(message)?))
    }

    /// Returns `true` if the client expects a paired response.
    pub fn wants_response(&self) -> bool {
        self.uni_id != 0
    }
}

/// An encoded message on its way to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Message type id.
    pub msg_id: MsgId,
    /// Encoded body.
    pub payload: Vec<u8>,
}

impl Outbound {
    /// Encode a typed message.
    pub fn encode<M, C>(codec: &C, message: &M) -> Result<Self, CodecError>
    where
        M: Message + Serialize,
        C: MessageCodec,
    {
        Ok(Self {
            msg_id: M::MSG_ID,
            payload: codec.encode(message)?,
        })
    }
}

/// Frame written back to the client: `(message, uni_id, code, description)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Correlation id of the request, 0 for pushes.
    pub uni_id: i32,
    /// Result code.
    pub code: StatusCode,
    /// Optional error description.
    pub description: Option<String>,
    /// Optional response body.
    pub message: Option<Outbound>,
}

impl OutboundFrame {
    /// Successful response, with or without a body.
    pub fn success(uni_id: i32, message: Option<Outbound>) -> Self {
        Self {
            uni_id,
            code: StatusCode::SUCCESS,
            description: None,
            message,
        }
    }

    /// Error response carrying the request's correlation id.
    pub fn failure(uni_id: i32, code: StatusCode, description: impl Into<String>) -> Self {
        Self {
            uni_id,
            code,
            description: Some(description.into()),
            message: None,
        }
    }

    /// Server-initiated message with no correlation id.
    pub fn push(message: Outbound) -> Self {
        Self::success(0, Some(message))
    }
}

/// A decoded request as seen by a handler.
#[derive(Debug)]
pub struct Inbound<T> {
    /// Decoded request body.
    pub body: T,
    /// Correlation id of the request.
    pub uni_id: i32,
    /// Connection the request arrived on.
    pub session: Arc<Session>,
}
