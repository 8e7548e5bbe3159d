//! JSON text frames.

use crate::error::Result;
use crate::message::{ClientMessage, ServerMessage};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a message as one text frame.
pub fn encode<T: Serialize>(message: &T) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// Decode one text frame.
pub fn decode<T: DeserializeOwned>(frame: &str) -> Result<T> {
    Ok(serde_json::from_str(frame)?)
}

pub fn decode_client(frame: &str) -> Result<ClientMessage> {
    decode(frame)
}

pub fn decode_server(frame: &str) -> Result<ServerMessage> {
    decode(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::message::ErrorCode;
    use flowsync_doc::Document;

    #[test]
    fn test_decode_client_frame() {
        let frame = r#"{"type":"update_doc","id":4,"version":2,"operations":[
            {"type":"set_position","id":"demo_1","position":{"x":1.0,"y":2.0}}
        ]}"#;
        match decode_client(frame).unwrap() {
            ClientMessage::UpdateDoc {
                id,
                version,
                operations,
            } => {
                assert_eq!((id, version), (4, 2));
                assert_eq!(operations[0].name(), "set_position");
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_doc_frame_carries_document() {
        let doc = Document::demo().unwrap();
        let frame = encode(&ServerMessage::Doc {
            id: 1,
            version: 0,
            doc: doc.clone(),
        })
        .unwrap();
        match decode_server(&frame).unwrap() {
            ServerMessage::Doc { doc: decoded, .. } => assert_eq!(decoded, doc),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        let err = decode_client("{\"type\":\"shout\"}").unwrap_err();
        assert!(matches!(err, SyncError::Codec(_)));
        assert_eq!(err.code(), ErrorCode::ParseError);
    }
}
