//! Payload serialization for client messages.
//!
//! Frames arrive already split into `(msg_id, uni_id, payload)`; the
//! [`MessageCodec`] only turns payload bytes into typed requests and typed
//! responses back into bytes. [`JsonCodec`] is the default.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Error type for codec operations.
#[derive(Debug)]
pub enum CodecError {
    /// Failed to encode a message to bytes.
    Encode(Box<dyn std::error::Error + Send + Sync>),
    /// Failed to decode bytes to a message.
    Decode(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Encode(e) => write!(f, "encode error: {}", e),
            CodecError::Decode(e) => write!(f, "decode error: {}", e),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Encode(e) => Some(e.as_ref()),
            CodecError::Decode(e) => Some(e.as_ref()),
        }
    }
}

/// Pluggable payload format.
pub trait MessageCodec: Clone + Send + Sync + 'static {
    /// Encode a serializable message to bytes.
    fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes to a deserializable message.
    fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<T, CodecError>;
}

/// JSON codec using serde_json.
#[derive(Clone, Default, Debug, Copy)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(msg).map_err(|e| CodecError::Encode(Box::new(e)))
    }

    fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(buf).map_err(|e| CodecError::Decode(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct ReqEnterScene {
        scene: u32,
        name: String,
    }

    #[test]
    fn test_decode_request() {
        let codec = JsonCodec;
        let req: ReqEnterScene = codec
            .decode(br#"{"scene":3,"name":"harbor"}"#)
            .expect("decode should succeed");
        assert_eq!(
            req,
            ReqEnterScene {
                scene: 3,
                name: "harbor".to_string()
            }
        );
    }

    #[test]
    fn test_decode_error() {
        let codec = JsonCodec;
        let result: Result<ReqEnterScene, CodecError> = codec.decode(b"not valid json {");
        let err = result.expect_err("invalid json");
        assert!(matches!(err, CodecError::Decode(_)));
        assert!(err.to_string().contains("decode error"));
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        let codec = JsonCodec;
        let bytes = codec.encode(&vec![1, 2, 3]).expect("encode should succeed");
        let result: Result<ReqEnterScene, CodecError> = codec.decode(&bytes);
        assert!(result.is_err());
    }
}
