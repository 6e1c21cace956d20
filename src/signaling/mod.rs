//! Typed signaling channel between the orchestrator and the room.
//!
//! [`SignalingClient`] adapts a raw [`SignalingTransport`] into the typed
//! event surface the orchestrator consumes: subscription payloads are
//! decoded and dispatched field by field, outbound SDP/ICE objects are
//! JSON-encoded, and subscription errors start a keepalive that re-asserts
//! room presence until the carrier recovers.

pub mod protocol;
pub mod transport;

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::Duration,
};

use derive_more::{Display, From};
use futures::{
    channel::mpsc,
    future::{self, Either},
    stream::LocalBoxStream,
    StreamExt as _,
};
use medea_macro::dispatchable;
use medea_reactive::ObservableCell;
use tracerr::Traced;

use crate::platform;

pub use self::{
    protocol::{
        IceCandidateMessage, RoomAck, RoomId, RoomRequest, SdpKind,
        SessionDescription,
    },
    transport::{RoomInteraction, SignalingTransport, TransportError},
};

#[cfg(feature = "mockable")]
pub use self::transport::MockSignalingTransport;

/// Interval of the keepalive re-issuing `joined` after subscription errors.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Errors that may occur in a [`SignalingClient`].
#[derive(Clone, Debug, Display, From)]
pub enum SignalingError {
    /// Underlying transport call failed.
    #[display(fmt = "{}", _0)]
    Transport(TransportError),

    /// Outbound payload could not be JSON-encoded.
    #[display(fmt = "failed to encode signaling payload: {}", _0)]
    Serialize(Rc<serde_json::Error>),
}

type Result<T> = std::result::Result<T, Traced<SignalingError>>;

/// Typed events of the signaling channel.
#[dispatchable(self: &Self, async_trait(?Send))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SignalingEvent {
    /// Signaling subscription became live.
    Open,

    /// Signaling subscription is gone.
    Close,

    /// Signaling-level error, forwarded verbatim.
    Error {
        /// Error description.
        message: String,
    },

    /// Another peer joined the room; this side becomes the offerer.
    NewPeer {
        /// Id of the affected room.
        id: RoomId,
    },

    /// The remote peer left the room.
    Disconnected {
        /// Id of the affected room.
        id: RoomId,
    },

    /// The call was finished remotely.
    Finished {
        /// Id of the affected room.
        id: RoomId,
    },

    /// SDP offer from the remote peer.
    NewOffer {
        /// The received description.
        sdp: SessionDescription,
    },

    /// SDP answer from the remote peer.
    NewAnswer {
        /// The received description.
        sdp: SessionDescription,
    },

    /// ICE candidate from the remote peer.
    NewIceCandidate {
        /// The received candidate.
        candidate: IceCandidateMessage,
    },
}

/// Typed signaling channel of one call.
pub struct SignalingClient(Rc<Inner>);

/// Actual state of a [`SignalingClient`].
struct Inner {
    /// Raw carrier of signaling messages.
    transport: Rc<dyn SignalingTransport>,

    /// Whether the signaling subscription is currently live.
    connected: ObservableCell<bool>,

    /// Room this client is (or was last) connected to; target of keepalive
    /// re-joins.
    room_id: RefCell<Option<RoomId>>,

    /// Subscribers of [`SignalingClient::events()`].
    subs: RefCell<Vec<mpsc::UnboundedSender<SignalingEvent>>>,

    /// Guard against overlapping keepalive tasks.
    keepalive_running: Cell<bool>,
}

impl SignalingClient {
    /// Creates a new [`SignalingClient`] over the provided transport and
    /// starts consuming its subscription.
    #[must_use]
    pub fn new(transport: Rc<dyn SignalingTransport>) -> Self {
        let inner = Rc::new(Inner {
            transport: Rc::clone(&transport),
            connected: ObservableCell::new(false),
            room_id: RefCell::new(None),
            subs: RefCell::new(Vec::new()),
            keepalive_running: Cell::new(false),
        });

        let weak = Rc::downgrade(&inner);
        let mut subscription = transport.subscribe();
        platform::spawn(async move {
            while let Some(item) = subscription.next().await {
                let Some(inner) = weak.upgrade() else { break };
                match item {
                    Ok(payload) => inner.dispatch_payload(payload),
                    Err(err) => inner.handle_subscription_error(&err),
                };
            }
            if let Some(inner) = weak.upgrade() {
                inner.connected.set(false);
                inner.emit(SignalingEvent::Close);
            }
        });

        Self(inner)
    }

    /// Indicates whether the signaling subscription is live.
    #[inline]
    #[must_use]
    pub fn connected(&self) -> bool {
        self.0.connected.get()
    }

    /// Returns a [`Stream`] of every [`SignalingEvent`] of this client.
    ///
    /// [`Stream`]: futures::Stream
    #[must_use]
    pub fn events(&self) -> LocalBoxStream<'static, SignalingEvent> {
        let (tx, rx) = mpsc::unbounded();
        self.0.subs.borrow_mut().push(tx);
        Box::pin(rx)
    }

    /// Connects signaling to the provided room.
    ///
    /// # Errors
    ///
    /// With [`SignalingError::Transport`] if the underlying call fails.
    pub async fn connect(&self, id: RoomId) -> Result<RoomAck> {
        let ack = self
            .0
            .transport
            .connect(RoomRequest { id: id.clone() })
            .await
            .map_err(SignalingError::from)
            .map_err(tracerr::wrap!())?;
        self.0.room_id.replace(Some(id));
        self.0.set_connected(true);
        Ok(ack)
    }

    /// Disconnects signaling from the provided room.
    ///
    /// # Errors
    ///
    /// With [`SignalingError::Transport`] if the underlying call fails.
    pub async fn disconnect(&self, id: &RoomId) -> Result<RoomAck> {
        let ack = self
            .0
            .transport
            .disconnect(RoomRequest { id: id.clone() })
            .await
            .map_err(SignalingError::from)
            .map_err(tracerr::wrap!())?;
        self.0.set_connected(false);
        Ok(ack)
    }

    /// Announces that the call in the provided room is finished.
    ///
    /// # Errors
    ///
    /// With [`SignalingError::Transport`] if the underlying call fails.
    pub async fn finish(&self, id: &RoomId) -> Result<RoomAck> {
        self.0
            .transport
            .finish(RoomRequest { id: id.clone() })
            .await
            .map_err(SignalingError::from)
            .map_err(tracerr::wrap!())
    }

    /// Sends the provided SDP offer to the remote peer.
    ///
    /// # Errors
    ///
    /// With [`SignalingError::Serialize`] if the description cannot be
    /// encoded, or [`SignalingError::Transport`] if the send fails.
    pub async fn send_sdp_offer(
        &self,
        sdp: &SessionDescription,
        room_id: &RoomId,
    ) -> Result<RoomAck> {
        let json = encode(sdp)?;
        self.0
            .transport
            .send_sdp_offer(json, room_id.clone())
            .await
            .map_err(SignalingError::from)
            .map_err(tracerr::wrap!())
    }

    /// Sends the provided SDP answer to the remote peer.
    ///
    /// # Errors
    ///
    /// With [`SignalingError::Serialize`] if the description cannot be
    /// encoded, or [`SignalingError::Transport`] if the send fails.
    pub async fn send_sdp_answer(
        &self,
        sdp: &SessionDescription,
        room_id: &RoomId,
    ) -> Result<RoomAck> {
        let json = encode(sdp)?;
        self.0
            .transport
            .send_sdp_answer(json, room_id.clone())
            .await
            .map_err(SignalingError::from)
            .map_err(tracerr::wrap!())
    }

    /// Sends the provided ICE candidate to the remote peer.
    ///
    /// # Errors
    ///
    /// With [`SignalingError::Serialize`] if the candidate cannot be
    /// encoded, or [`SignalingError::Transport`] if the send fails.
    pub async fn send_ice_candidate(
        &self,
        candidate: &IceCandidateMessage,
        room_id: &RoomId,
    ) -> Result<RoomAck> {
        let json = encode(candidate)?;
        self.0
            .transport
            .send_ice_candidate(json, room_id.clone())
            .await
            .map_err(SignalingError::from)
            .map_err(tracerr::wrap!())
    }
}

/// JSON-encodes an outbound signaling payload.
fn encode<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(Rc::new)
        .map_err(SignalingError::from)
        .map_err(tracerr::wrap!())
}

impl Inner {
    /// Publishes the provided event to every subscriber.
    fn emit(&self, event: SignalingEvent) {
        self.subs
            .borrow_mut()
            .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }

    /// Flips the connected flag, emitting [`SignalingEvent::Open`] /
    /// [`SignalingEvent::Close`] on transitions.
    fn set_connected(&self, connected: bool) {
        let was = self.connected.get();
        self.connected.set(connected);
        if connected && !was {
            self.emit(SignalingEvent::Open);
        } else if !connected && was {
            self.emit(SignalingEvent::Close);
        }
    }

    /// Dispatches the non-null fields of the provided payload as events, in
    /// contract order.
    fn dispatch_payload(&self, payload: RoomInteraction) {
        if payload.joined.is_some() {
            self.set_connected(true);
        }
        if let Some(value) = payload.new_peer {
            match protocol::decode_room_ref(&value) {
                Some(id) => self.emit(SignalingEvent::NewPeer { id }),
                None => log::warn!("undecodable newPeer payload: {value}"),
            }
        }
        if let Some(value) = payload.new_offer {
            match protocol::decode_scalar::<SessionDescription>(&value) {
                Ok(sdp) => self.emit(SignalingEvent::NewOffer { sdp }),
                Err(e) => log::warn!("undecodable newOffer payload: {e}"),
            }
        }
        if let Some(value) = payload.new_answer {
            match protocol::decode_scalar::<SessionDescription>(&value) {
                Ok(sdp) => self.emit(SignalingEvent::NewAnswer { sdp }),
                Err(e) => log::warn!("undecodable newAnswer payload: {e}"),
            }
        }
        if let Some(value) = payload.new_ice_candidate {
            match protocol::decode_scalar::<IceCandidateMessage>(&value) {
                Ok(candidate) => {
                    self.emit(SignalingEvent::NewIceCandidate { candidate });
                }
                Err(e) => {
                    log::warn!("undecodable newIceCandidate payload: {e}");
                }
            }
        }
        if let Some(value) = payload.finished {
            match protocol::decode_room_ref(&value) {
                Some(id) => self.emit(SignalingEvent::Finished { id }),
                None => log::warn!("undecodable finished payload: {value}"),
            }
        }
        if let Some(value) = payload.disconnected {
            match protocol::decode_room_ref(&value) {
                Some(id) => self.emit(SignalingEvent::Disconnected { id }),
                None => log::warn!("undecodable disconnected payload: {value}"),
            }
        }
    }

    /// Reacts to a subscription error: re-dispatches `error` and `close`,
    /// then keeps re-asserting room presence until the carrier recovers.
    fn handle_subscription_error(self: Rc<Self>, err: &TransportError) {
        log::warn!("{err}");
        self.emit(SignalingEvent::Error {
            message: err.to_string(),
        });
        self.connected.set(false);
        self.emit(SignalingEvent::Close);
        self.start_keepalive();
    }

    /// Starts the keepalive task: eagerly re-issues `joined` and then once
    /// per [`KEEPALIVE_INTERVAL`] until the subscription is live again.
    fn start_keepalive(self: Rc<Self>) {
        if self.keepalive_running.get() {
            return;
        }
        let Some(room_id) = self.room_id.borrow().clone() else {
            return;
        };
        self.keepalive_running.set(true);

        let weak = Rc::downgrade(&self);
        platform::spawn(async move {
            loop {
                let Some(inner) = weak.upgrade() else { break };
                if inner.connected.get() {
                    break;
                }
                if let Err(e) = inner
                    .transport
                    .joined(RoomRequest {
                        id: room_id.clone(),
                    })
                    .await
                {
                    log::warn!("signaling keepalive failed: {e}");
                }
                let reconnected = inner.connected.when_eq(true);
                drop(inner);
                let tick = Box::pin(platform::delay_for(KEEPALIVE_INTERVAL));
                if let Either::Right(_) =
                    future::select(tick, reconnected).await
                {
                    break;
                }
            }
            if let Some(inner) = weak.upgrade() {
                inner.keepalive_running.set(false);
            }
        });
    }
}
