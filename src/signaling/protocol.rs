//! Wire JSON types of the signaling layer.
//!
//! SDP objects and ICE candidates travel over signaling as JSON strings and
//! are reconstructed into host RTC objects on arrival; subscription payload
//! fields are nullable JSON scalars that may be either embedded objects or
//! JSON-encoded strings, depending on the carrier.

use derive_more::{Display, From};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::platform::{IceCandidate, SdpType};

/// Identifier of a call room. Opaque to the orchestrator.
#[derive(
    Clone,
    Debug,
    Deserialize,
    Display,
    Eq,
    From,
    Hash,
    PartialEq,
    Serialize,
)]
#[from(forward)]
pub struct RoomId(pub String);

/// Acknowledgement of a signaling call.
///
/// Every call of the signaling contract acknowledges with at least the
/// affected room id.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RoomAck {
    /// Id of the affected room.
    pub id: RoomId,
}

/// Room-addressed signaling request.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RoomRequest {
    /// Id of the addressed room.
    pub id: RoomId,
}

/// [RTCSdpType][1] of a [`SessionDescription`].
///
/// [1]: https://w3.org/TR/webrtc/#dom-rtcsdptype
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    /// Offer description.
    Offer,

    /// Answer description.
    Answer,

    /// Provisional answer description.
    Pranswer,
}

/// Session description as transmitted over signaling.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SessionDescription {
    /// Type of this description.
    #[serde(rename = "type")]
    pub kind: SdpKind,

    /// Raw SDP payload.
    pub sdp: String,
}

impl From<SdpType> for SessionDescription {
    fn from(sdp: SdpType) -> Self {
        match sdp {
            SdpType::Offer(sdp) => Self {
                kind: SdpKind::Offer,
                sdp,
            },
            SdpType::Answer(sdp) => Self {
                kind: SdpKind::Answer,
                sdp,
            },
        }
    }
}

impl SessionDescription {
    /// Reconstructs the host [`SdpType`] out of this description.
    ///
    /// Returns [`None`] for kinds the orchestrator never applies directly.
    #[must_use]
    pub fn into_sdp_type(self) -> Option<SdpType> {
        match self.kind {
            SdpKind::Offer => Some(SdpType::Offer(self.sdp)),
            SdpKind::Answer => Some(SdpType::Answer(self.sdp)),
            SdpKind::Pranswer => None,
        }
    }
}

/// ICE candidate as transmitted over signaling.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct IceCandidateMessage {
    /// Candidate line.
    pub candidate: String,

    /// Identifier of the media description this candidate belongs to.
    #[serde(default, rename = "sdpMid", skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    /// Index of the media description this candidate belongs to.
    #[serde(
        default,
        rename = "sdpMLineIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_m_line_index: Option<u16>,
}

impl From<IceCandidate> for IceCandidateMessage {
    fn from(candidate: IceCandidate) -> Self {
        Self {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_m_line_index: candidate.sdp_m_line_index,
        }
    }
}

impl From<IceCandidateMessage> for IceCandidate {
    fn from(msg: IceCandidateMessage) -> Self {
        Self {
            candidate: msg.candidate,
            sdp_mid: msg.sdp_mid,
            sdp_m_line_index: msg.sdp_m_line_index,
        }
    }
}

/// Decodes a nullable JSON-scalar subscription field, accepting both an
/// embedded object and a JSON-encoded string.
///
/// # Errors
///
/// If the value deserializes into neither form of `T`.
pub fn decode_scalar<T: DeserializeOwned>(
    value: &Value,
) -> Result<T, serde_json::Error> {
    match value {
        Value::String(s) => serde_json::from_str(s),
        other => serde_json::from_value(other.clone()),
    }
}

/// Extracts a room reference out of a payload field that may be a
/// `{"id": …}` object (possibly JSON-encoded) or a bare id string.
#[must_use]
pub fn decode_room_ref(value: &Value) -> Option<RoomId> {
    match value {
        Value::String(s) => serde_json::from_str::<RoomAck>(s)
            .map(|ack| ack.id)
            .ok()
            .or_else(|| Some(RoomId(s.clone()))),
        other => serde_json::from_value::<RoomAck>(other.clone())
            .map(|ack| ack.id)
            .ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_description_round_trips_through_wire_json() {
        let desc = SessionDescription {
            kind: SdpKind::Offer,
            sdp: "v=0\r\n".to_owned(),
        };
        let json = serde_json::to_string(&desc).unwrap();
        assert!(json.contains(r#""type":"offer""#));
        assert_eq!(serde_json::from_str::<SessionDescription>(&json).unwrap(), desc);
    }

    #[test]
    fn candidate_uses_rtc_field_names() {
        let msg = IceCandidateMessage {
            candidate: "candidate:0 1 UDP 2122252543 198.51.100.7 49203 typ host"
                .to_owned(),
            sdp_mid: Some("0".to_owned()),
            sdp_m_line_index: Some(0),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""sdpMid":"0""#));
        assert!(json.contains(r#""sdpMLineIndex":0"#));
    }

    #[test]
    fn decode_scalar_accepts_embedded_and_encoded_forms() {
        let embedded = serde_json::json!({"type": "answer", "sdp": "v=0\r\n"});
        let encoded = Value::String(embedded.to_string());

        let from_embedded: SessionDescription = decode_scalar(&embedded).unwrap();
        let from_encoded: SessionDescription = decode_scalar(&encoded).unwrap();
        assert_eq!(from_embedded, from_encoded);
    }

    #[test]
    fn decode_room_ref_accepts_object_and_bare_string() {
        let object = serde_json::json!({"id": "r1"});
        assert_eq!(decode_room_ref(&object), Some(RoomId::from("r1")));

        let bare = Value::String("r1".to_owned());
        assert_eq!(decode_room_ref(&bare), Some(RoomId::from("r1")));

        let encoded = Value::String(r#"{"id":"r1"}"#.to_owned());
        assert_eq!(decode_room_ref(&encoded), Some(RoomId::from("r1")));
    }
}
