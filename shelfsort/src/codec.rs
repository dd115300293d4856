//! Text frame codec for the client WebSocket.
//!
//! Decoding happens in two steps: the `{type, data}` envelope first, then the
//! payload for the recognized type. This keeps the three failure classes
//! (broken envelope, unknown type, bad payload) apart for logging.

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::protocol::{InboundMessage, OutboundMessage};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("invalid data for {kind}: {source}")]
    InvalidPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("binary frames are not supported")]
    BinaryFrame,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

fn payload<T: DeserializeOwned>(
    kind: &'static str,
    data: serde_json::Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::InvalidPayload { kind, source })
}

/// Decode one inbound text frame.
pub fn decode(text: &str) -> Result<InboundMessage, ProtocolError> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(ProtocolError::MalformedEnvelope)?;

    let message = match envelope.kind.as_str() {
        InboundMessage::INIT_UPLOAD => {
            InboundMessage::InitUpload(payload(InboundMessage::INIT_UPLOAD, envelope.data)?)
        }
        // Payload-less messages ignore whatever `data` carries.
        InboundMessage::CANCEL_UPLOAD => InboundMessage::CancelUpload,
        InboundMessage::FILE_UPLOAD => {
            InboundMessage::FileUpload(payload(InboundMessage::FILE_UPLOAD, envelope.data)?)
        }
        InboundMessage::SELECT_MODE => {
            InboundMessage::SelectMode(payload(InboundMessage::SELECT_MODE, envelope.data)?)
        }
        InboundMessage::INIT_PREDICTIONS => InboundMessage::InitPredictions,
        InboundMessage::PREDICTION_APPROVAL => InboundMessage::PredictionApproval(payload(
            InboundMessage::PREDICTION_APPROVAL,
            envelope.data,
        )?),
        _ => return Err(ProtocolError::UnknownType(envelope.kind)),
    };

    Ok(message)
}

/// Encode one outbound notification as a text frame.
pub fn encode(message: &OutboundMessage) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(message)?;
    if json.len() > 1_000_000 {
        tracing::info!(
            json_size_bytes = json.len(),
            json_size_kb = json.len() / 1024,
            "Large frame being encoded"
        );
    }
    Ok(json)
}
