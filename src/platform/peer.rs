//! Host contract for the [RTCPeerConnection][1] primitive.
//!
//! The orchestrator never talks to a concrete WebRTC stack; it drives
//! whatever the embedder provides through the [`RtcPeerConnection`] trait.
//! All state reads are synchronous snapshots, all mutations are futures
//! resolving on the host's completion, and everything the host fires
//! spontaneously arrives through a single [`PeerConnectionEvent`] stream.
//!
//! [1]: https://w3.org/TR/webrtc/#rtcpeerconnection-interface

use std::rc::Rc;

use derive_more::Display;
use futures::{future::LocalBoxFuture, stream::LocalBoxStream};

use crate::media::MediaKind;

use super::{Error, MediaStreamTrack, RtcStats};

/// [RTCSignalingState][1] of a peer connection.
///
/// [1]: https://w3.org/TR/webrtc/#dom-rtcsignalingstate
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum SignalingState {
    /// No offer/answer exchange in progress.
    #[display(fmt = "stable")]
    Stable,

    /// Local description is an offer.
    #[display(fmt = "have-local-offer")]
    HaveLocalOffer,

    /// Remote description is an offer.
    #[display(fmt = "have-remote-offer")]
    HaveRemoteOffer,

    /// Local description is a provisional answer.
    #[display(fmt = "have-local-pranswer")]
    HaveLocalPranswer,

    /// Remote description is a provisional answer.
    #[display(fmt = "have-remote-pranswer")]
    HaveRemotePranswer,

    /// Peer connection is closed.
    #[display(fmt = "closed")]
    Closed,
}

/// [RTCIceConnectionState][1] of a peer connection.
///
/// [1]: https://w3.org/TR/webrtc/#dom-rtciceconnectionstate
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum IceConnectionState {
    /// ICE agent is gathering addresses or waiting for remote candidates.
    #[display(fmt = "new")]
    New,

    /// ICE agent is checking candidate pairs.
    #[display(fmt = "checking")]
    Checking,

    /// A usable candidate pair was found.
    #[display(fmt = "connected")]
    Connected,

    /// All candidate pairs have been checked, a connection is in use.
    #[display(fmt = "completed")]
    Completed,

    /// Connectivity was lost, the agent is trying to recover.
    #[display(fmt = "disconnected")]
    Disconnected,

    /// No usable candidate pair could be found.
    #[display(fmt = "failed")]
    Failed,

    /// ICE agent is shut down.
    #[display(fmt = "closed")]
    Closed,
}

/// [RTCIceGatheringState][1] of a peer connection.
///
/// [1]: https://w3.org/TR/webrtc/#dom-rtcicegatheringstate
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum IceGatheringState {
    /// Gathering has not started yet.
    #[display(fmt = "new")]
    New,

    /// Local candidates are being gathered.
    #[display(fmt = "gathering")]
    Gathering,

    /// Gathering is complete.
    #[display(fmt = "complete")]
    Complete,
}

/// [RTCPeerConnectionState][1] of a peer connection.
///
/// [1]: https://w3.org/TR/webrtc/#dom-rtcpeerconnectionstate
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum PeerConnectionState {
    /// Transports are being established.
    #[display(fmt = "new")]
    New,

    /// At least one transport is connecting.
    #[display(fmt = "connecting")]
    Connecting,

    /// All transports are connected.
    #[display(fmt = "connected")]
    Connected,

    /// At least one transport is disconnected.
    #[display(fmt = "disconnected")]
    Disconnected,

    /// At least one transport has permanently failed.
    #[display(fmt = "failed")]
    Failed,

    /// Peer connection is closed.
    #[display(fmt = "closed")]
    Closed,
}

/// [RTCIceCandidate][1] representation.
///
/// [1]: https://w3.org/TR/webrtc/#rtcicecandidate-interface
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IceCandidate {
    /// [`candidate` field][1] of the discovered candidate.
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcicecandidate-candidate
    pub candidate: String,

    /// [`sdpMLineIndex` field][1] of the discovered candidate.
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcicecandidate-sdpmlineindex
    pub sdp_m_line_index: Option<u16>,

    /// [`sdpMid` field][1] of the discovered candidate.
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcicecandidate-sdpmid
    pub sdp_mid: Option<String>,
}

/// Representation of [RTCSdpType] with its SDP payload.
///
/// [RTCSdpType]: https://w3.org/TR/webrtc/#dom-rtcsdptype
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SdpType {
    /// [`offer` type][1] of SDP.
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcsdptype-offer
    Offer(String),

    /// [`answer` type][1] of SDP.
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcsdptype-answer
    Answer(String),
}

/// Options of an [`RtcPeerConnection::create_offer()`] call.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfferOptions {
    /// Offer to receive audio even if none is sent.
    pub offer_to_receive_audio: bool,

    /// Offer to receive video even if none is sent.
    pub offer_to_receive_video: bool,

    /// Regenerate ICE credentials with this offer.
    pub ice_restart: bool,
}

/// [RTCIceServer][1] description.
///
/// [1]: https://w3.org/TR/webrtc/#rtciceserver-dictionary
#[derive(Clone, Debug, Default)]
pub struct IceServer {
    /// STUN/TURN server URLs.
    pub urls: Vec<String>,

    /// Username for TURN authentication.
    pub username: Option<String>,

    /// Credential for TURN authentication.
    pub credential: Option<String>,
}

/// Host RTC configuration, passed through to peer connection creation as-is.
#[derive(Clone, Debug, Default)]
pub struct RtcConfiguration {
    /// ICE servers to gather candidates against.
    pub ice_servers: Vec<IceServer>,

    /// Restrict ICE to relayed candidates only.
    pub is_force_relayed: bool,
}

/// State of a [`DataChannel`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DataChannelState {
    /// Underlying transport is being established.
    Connecting,

    /// Channel is ready to send and receive.
    Open,

    /// Channel is being shut down.
    Closing,

    /// Channel is closed.
    Closed,
}

/// Events fired by a [`DataChannel`].
#[derive(Clone, Debug)]
pub enum DataChannelEvent {
    /// Channel transitioned to [`DataChannelState::Open`].
    Open,

    /// Channel received a text message.
    Message(String),

    /// Channel errored.
    Error(String),

    /// Channel transitioned to [`DataChannelState::Closed`].
    Close,
}

/// [RTCDataChannel][1] provided by the host runtime.
///
/// [1]: https://w3.org/TR/webrtc/#rtcdatachannel
#[cfg_attr(feature = "mockable", mockall::automock)]
pub trait DataChannel {
    /// Sends a text message to the remote peer.
    ///
    /// # Errors
    ///
    /// If the channel is not open or the host send fails.
    fn send(&self, data: &str) -> Result<(), Error>;

    /// Returns the current state of this channel.
    fn ready_state(&self) -> DataChannelState;

    /// Returns a [`Stream`] of this channel's events.
    ///
    /// Intended to be consumed by a single subscriber; the host may return
    /// an empty [`Stream`] on repeated calls.
    ///
    /// [`Stream`]: futures::Stream
    fn on_event(&self) -> LocalBoxStream<'static, DataChannelEvent>;

    /// Closes this channel.
    fn close(&self);
}

/// [RTCRtpSender][1] of a peer connection.
///
/// [1]: https://w3.org/TR/webrtc/#rtcrtpsender-interface
#[cfg_attr(feature = "mockable", mockall::automock)]
pub trait RtpSender {
    /// Returns media kind of the track currently carried by this sender,
    /// or [`None`] if the sender is trackless.
    fn track_kind(&self) -> Option<MediaKind>;

    /// Indicates whether this sender supports in-place track replacement
    /// without renegotiation.
    fn replaceable(&self) -> bool;

    /// Replaces the track carried by this sender.
    ///
    /// # Errors
    ///
    /// If the host replacement fails or is unsupported.
    fn replace_track(
        &self,
        track: Rc<dyn MediaStreamTrack>,
    ) -> LocalBoxFuture<'static, Result<(), Error>>;
}

/// Events fired spontaneously by an [`RtcPeerConnection`].
pub enum PeerConnectionEvent {
    /// New local ICE candidate was discovered; [`None`] marks the end of
    /// candidates.
    IceCandidate(Option<IceCandidate>),

    /// Negotiation is needed (tracks changed, ICE restart requested).
    NegotiationNeeded,

    /// [`SignalingState`] changed.
    SignalingStateChange(SignalingState),

    /// [`IceConnectionState`] changed.
    IceConnectionStateChange(IceConnectionState),

    /// [`IceGatheringState`] changed.
    IceGatheringStateChange(IceGatheringState),

    /// [`PeerConnectionState`] changed.
    ConnectionStateChange(PeerConnectionState),

    /// Remote track arrived.
    Track(Rc<dyn MediaStreamTrack>),

    /// Remote peer opened a data channel towards us.
    DataChannel(Rc<dyn DataChannel>),
}

/// [RTCPeerConnection][1] provided by the host runtime.
///
/// Owned exclusively by the orchestrator; at most one instance is live per
/// call at any instant.
///
/// [1]: https://w3.org/TR/webrtc/#rtcpeerconnection-interface
#[cfg_attr(feature = "mockable", mockall::automock)]
pub trait RtcPeerConnection {
    /// Obtains an SDP offer from the host.
    ///
    /// # Errors
    ///
    /// If the host offer creation fails.
    fn create_offer(
        &self,
        options: OfferOptions,
    ) -> LocalBoxFuture<'static, Result<String, Error>>;

    /// Obtains an SDP answer from the host.
    ///
    /// # Errors
    ///
    /// If the host answer creation fails.
    fn create_answer(&self) -> LocalBoxFuture<'static, Result<String, Error>>;

    /// Sets the local session description.
    ///
    /// # Errors
    ///
    /// If the description is rejected by the host.
    fn set_local_description(
        &self,
        sdp: SdpType,
    ) -> LocalBoxFuture<'static, Result<(), Error>>;

    /// Sets the remote session description.
    ///
    /// # Errors
    ///
    /// If the description is rejected by the host.
    fn set_remote_description(
        &self,
        sdp: SdpType,
    ) -> LocalBoxFuture<'static, Result<(), Error>>;

    /// Indicates whether a remote description is currently set.
    fn has_remote_description(&self) -> bool;

    /// Applies a remote ICE candidate.
    ///
    /// # Errors
    ///
    /// If the candidate is rejected by the host.
    fn add_ice_candidate(
        &self,
        candidate: IceCandidate,
    ) -> LocalBoxFuture<'static, Result<(), Error>>;

    /// Requests an ICE restart natively.
    ///
    /// Returns `false` when the host has no such primitive, in which case
    /// the caller falls back to an offer with
    /// [`OfferOptions::ice_restart`].
    fn restart_ice(&self) -> bool;

    /// Returns the current [`SignalingState`].
    fn signaling_state(&self) -> SignalingState;

    /// Returns the current [`IceConnectionState`].
    fn ice_connection_state(&self) -> IceConnectionState;

    /// Returns the current [`IceGatheringState`].
    fn ice_gathering_state(&self) -> IceGatheringState;

    /// Returns the current [`PeerConnectionState`].
    fn connection_state(&self) -> PeerConnectionState;

    /// Adds a local track to be sent to the remote peer.
    ///
    /// # Errors
    ///
    /// With [`ErrorKind::NotSupported`] if the host lacks track insertion
    /// entirely.
    ///
    /// [`ErrorKind::NotSupported`]: super::ErrorKind::NotSupported
    fn add_track(&self, track: Rc<dyn MediaStreamTrack>) -> Result<(), Error>;

    /// Returns all [`RtpSender`]s of this peer connection.
    fn senders(&self) -> Vec<Rc<dyn RtpSender>>;

    /// Removes the given sender (and its track) from this peer connection.
    ///
    /// # Errors
    ///
    /// If the host removal fails.
    fn remove_track(&self, sender: &Rc<dyn RtpSender>) -> Result<(), Error>;

    /// Creates a data channel with the provided label.
    ///
    /// # Errors
    ///
    /// If the host channel creation fails.
    fn create_data_channel(
        &self,
        label: &str,
        ordered: bool,
    ) -> Result<Rc<dyn DataChannel>, Error>;

    /// Snapshots the statistics report of this peer connection.
    ///
    /// # Errors
    ///
    /// If the host stats retrieval fails.
    fn get_stats(&self) -> LocalBoxFuture<'static, Result<RtcStats, Error>>;

    /// Returns a [`Stream`] of everything this peer connection fires.
    ///
    /// Intended to be consumed by a single subscriber; the host may return
    /// an empty [`Stream`] on repeated calls.
    ///
    /// [`Stream`]: futures::Stream
    fn on_event(&self) -> LocalBoxStream<'static, PeerConnectionEvent>;

    /// Closes this peer connection.
    fn close(&self);
}

/// Factory of [`RtcPeerConnection`]s.
///
/// The orchestrator re-creates peer connections on every renegotiation by
/// teardown, so it holds a factory rather than a single instance.
#[cfg_attr(feature = "mockable", mockall::automock)]
pub trait PeerConnectionFactory {
    /// Creates a new [`RtcPeerConnection`] with the provided configuration.
    ///
    /// # Errors
    ///
    /// If the host peer connection creation fails.
    fn create(
        &self,
        config: &RtcConfiguration,
    ) -> Result<Rc<dyn RtcPeerConnection>, Error>;
}
