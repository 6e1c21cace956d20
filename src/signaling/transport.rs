//! Transport contract of the signaling layer.
//!
//! The reference carrier is a GraphQL client over WebSockets (mutations for
//! the outbound calls, an `onRoomInteraction` subscription for the inbound
//! events), but any transport that can satisfy this trait qualifies.

use derive_more::Display;
use futures::{future::LocalBoxFuture, stream::LocalBoxStream};
use serde::Deserialize;
use serde_json::Value;

use super::protocol::{RoomAck, RoomId, RoomRequest};

/// Errors of a [`SignalingTransport`].
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum TransportError {
    /// Outbound signaling call failed.
    #[display(fmt = "signaling request failed: {}", _0)]
    Request(String),

    /// Inbound subscription delivered an error.
    #[display(fmt = "signaling subscription errored: {}", _0)]
    Subscription(String),
}

/// One payload of the room-interaction subscription.
///
/// Every field is a nullable JSON scalar; non-null fields are dispatched as
/// events in declaration order.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomInteraction {
    /// Acknowledgement that this side is (still) joined to the room.
    pub joined: Option<Value>,

    /// Another peer joined the room; this side becomes the offerer.
    pub new_peer: Option<Value>,

    /// SDP offer from the remote peer.
    pub new_offer: Option<Value>,

    /// SDP answer from the remote peer.
    pub new_answer: Option<Value>,

    /// ICE candidate from the remote peer.
    pub new_ice_candidate: Option<Value>,

    /// The call was finished remotely.
    pub finished: Option<Value>,

    /// The remote peer left the room.
    pub disconnected: Option<Value>,
}

/// Carrier of typed signaling calls and the room-interaction subscription.
#[cfg_attr(feature = "mockable", mockall::automock)]
pub trait SignalingTransport {
    /// Joins the provided room.
    fn connect(
        &self,
        req: RoomRequest,
    ) -> LocalBoxFuture<'static, Result<RoomAck, TransportError>>;

    /// Re-asserts presence in the provided room (keepalive).
    fn joined(
        &self,
        req: RoomRequest,
    ) -> LocalBoxFuture<'static, Result<RoomAck, TransportError>>;

    /// Leaves the provided room.
    fn disconnect(
        &self,
        req: RoomRequest,
    ) -> LocalBoxFuture<'static, Result<RoomAck, TransportError>>;

    /// Finishes the call in the provided room.
    fn finish(
        &self,
        req: RoomRequest,
    ) -> LocalBoxFuture<'static, Result<RoomAck, TransportError>>;

    /// Sends a JSON-encoded SDP offer to the remote peer.
    fn send_sdp_offer(
        &self,
        sdp: String,
        room_id: RoomId,
    ) -> LocalBoxFuture<'static, Result<RoomAck, TransportError>>;

    /// Sends a JSON-encoded SDP answer to the remote peer.
    fn send_sdp_answer(
        &self,
        sdp: String,
        room_id: RoomId,
    ) -> LocalBoxFuture<'static, Result<RoomAck, TransportError>>;

    /// Sends a JSON-encoded ICE candidate to the remote peer.
    fn send_ice_candidate(
        &self,
        candidate: String,
        room_id: RoomId,
    ) -> LocalBoxFuture<'static, Result<RoomAck, TransportError>>;

    /// Subscribes to the room-interaction events.
    ///
    /// Dropping the [`Stream`] unsubscribes.
    ///
    /// [`Stream`]: futures::Stream
    fn subscribe(
        &self,
    ) -> LocalBoxStream<'static, Result<RoomInteraction, TransportError>>;
}
