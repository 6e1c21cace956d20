//! The call orchestrator.
//!
//! [`Call`] owns the state machine of a single peer-to-peer audio/video
//! session: it reacts to signaling events and peer connection callbacks
//! through one serialized dispatcher, enforces the negotiation invariants,
//! supervises connectivity, and publishes the consumer-facing event surface.

use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
    time::Duration,
};

use async_trait::async_trait;
use derive_more::{Display, From};
use futures::{channel::mpsc, FutureExt as _, StreamExt as _};
use medea_reactive::ObservableCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracerr::Traced;

use crate::{
    events::{CallEvent, EventEmitter, SubscriptionId},
    media::{
        LocalStream, MediaKind, MediaManager, MediaManagerError,
        MediaStreamSettings, RemoteStream, VideoSource,
    },
    network::{self, NetworkSupervisor},
    peer::{
        Bitrate, BitrateSampler, Connection, IceCandidateBuffer,
        PeerConnectionError, PeerEvent, PeerEventHandler,
    },
    platform::{
        self, IceCandidate, IceConnectionState, IceGatheringState,
        InputDeviceInfo, MediaDeviceKind, MediaStreamTrack, OfferOptions,
        PeerConnectionFactory, PeerConnectionState, RtcConfiguration,
        SdpType, SignalingState, TrackEvent,
    },
    sdp::{BandwidthLimit, SdpRewriter},
    signaling::{
        IceCandidateMessage, RoomId, SdpKind, SessionDescription,
        SignalingClient, SignalingEvent, SignalingEventHandler,
    },
};

/// Delay between ICE gathering completion and the stalled-connection check.
const ICE_STALL_CHECK_DELAY: Duration = Duration::from_secs(3);

/// Window between the two bitrate samples of the disconnection strategy.
const BITRATE_SAMPLE_WINDOW: Duration = Duration::from_secs(4);

/// Bitrate drop (in kbps) on the most relevant channel that makes the
/// disconnection strategy restart ICE.
const BITRATE_DROP_THRESHOLD_KBPS: i64 = 100;

/// Type tag of the data channel control frame.
const CONTROL_FRAME_KIND: &str = "ec";

/// Errors surfaced to the consumer through [`CallEvent::Error`].
#[derive(Clone, Debug, Display)]
pub enum CallError {
    /// Host runtime lacks track insertion entirely; the call cannot proceed.
    #[display(fmt = "runtime does not support adding tracks")]
    Support,

    /// ICE failed twice in one session. The call stays alive so the consumer
    /// can decide to finish it.
    #[display(fmt = "connection is too poor to continue")]
    PoorConnection,

    /// The network probe reported offline during recovery; the orchestrator
    /// retries automatically on the next online transition.
    #[display(fmt = "no internet access")]
    NoInternetAccess,

    /// A capture device was not found or could not deliver media.
    #[display(fmt = "{} not found", "device_name(*_0)")]
    DeviceNotFound(MediaKind),

    /// Permission to use a capture device was denied.
    #[display(fmt = "permission to use {} denied", "device_name(*_0)")]
    DevicePermission(MediaKind),

    /// Signaling-level error, forwarded verbatim.
    #[display(fmt = "{}", _0)]
    Signaling(String),
}

impl CallError {
    /// Returns the stable machine-readable code of this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Support => "SUPPORT_ERROR",
            Self::PoorConnection => "POOR_CONNECTION_ERROR",
            Self::NoInternetAccess => "NO_INTERNET_ACCESS_ERROR",
            Self::DeviceNotFound(_) => "DEVICE_NOT_FOUND_ERROR",
            Self::DevicePermission(_) => "DEVICE_PERMISSION_ERROR",
            Self::Signaling(_) => "SIGNALING_ERROR",
        }
    }

    /// Returns the device this error is about, if it is a device error.
    #[must_use]
    pub fn device(&self) -> Option<&'static str> {
        match self {
            Self::DeviceNotFound(kind) | Self::DevicePermission(kind) => {
                Some(device_name(*kind))
            }
            _ => None,
        }
    }
}

/// Consumer-facing name of the capture device of the provided kind.
fn device_name(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Video => "camera",
        MediaKind::Audio => "microphone",
    }
}

/// Role of this side in the current offer/answer exchange.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum NegotiationRole {
    /// This side initiates negotiation.
    #[display(fmt = "offerer")]
    Offerer,

    /// This side answers an incoming offer.
    #[display(fmt = "answerer")]
    Answerer,
}

/// Phase of the call state machine.
///
/// [`CallState::Finished`] is terminal: no negotiation, reconnection or
/// bitrate-driven restart may occur past it.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum CallState {
    /// Nothing started yet.
    #[display(fmt = "idle")]
    Idle,

    /// Local media is being acquired.
    #[display(fmt = "acquiring media")]
    AcquiringMedia,

    /// Signaling subscription is live, waiting for a peer.
    #[display(fmt = "signaling connected")]
    SignalingConnected,

    /// Offer/answer exchange in progress.
    #[display(fmt = "negotiating ({})", _0)]
    Negotiating(NegotiationRole),

    /// Data channel is open towards the remote peer.
    #[display(fmt = "matched")]
    Matched,

    /// Media is flowing.
    #[display(fmt = "sustaining")]
    Sustaining,

    /// A recovery strategy is running.
    #[display(fmt = "reconnecting")]
    Reconnecting,

    /// The call is over.
    #[display(fmt = "finished")]
    Finished,
}

/// Peer-reported enabled state of its audio and video.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize,
)]
pub struct ExternalControls {
    /// Whether the peer's audio is enabled.
    pub audio: bool,

    /// Whether the peer's video is enabled.
    pub video: bool,
}

/// Control frame exchanged over the data channel.
#[derive(Debug, Deserialize, Serialize)]
struct ControlFrame {
    /// Frame type tag; [`CONTROL_FRAME_KIND`] for control frames.
    #[serde(rename = "type")]
    kind: String,

    /// Reported controls.
    data: ExternalControls,
}

/// Static configuration of a [`Call`].
#[derive(Clone, Debug, Default)]
pub struct CallConfig {
    /// Bandwidth limit enforced on every locally produced offer and answer.
    pub bandwidth: BandwidthLimit,

    /// Parse-and-reserialize locally produced SDP before sending.
    pub sdp_transform: bool,

    /// Check for a stuck connection 3 seconds after ICE gathering completes.
    pub ice_stalled_check: bool,

    /// Run the bitrate-driven strategy on ICE disconnection.
    pub bitrate_check: bool,

    /// Host RTC configuration, passed through to peer connection creation.
    pub rtc_configuration: RtcConfiguration,
}

/// Error of a [`CallHandle`] pointing to a dropped [`Call`].
#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display(fmt = "call handle is detached")]
pub struct HandleDetachedError;

/// Errors of [`CallHandle::finish()`].
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum FinishCallError {
    /// Handle points to a dropped [`Call`].
    #[display(fmt = "call handle is detached")]
    Detached,

    /// There is no room to finish.
    #[display(fmt = "no active call to finish")]
    NoActiveCall,
}

/// Errors of device switching operations.
#[derive(Clone, Debug, Display, From)]
pub enum DeviceSwitchError {
    /// Handle points to a dropped [`Call`].
    #[display(fmt = "call handle is detached")]
    Detached,

    /// Media re-acquisition failed.
    #[display(fmt = "{}", _0)]
    Media(MediaManagerError),

    /// Peer connection mutation failed.
    #[display(fmt = "{}", _0)]
    Peer(PeerConnectionError),

    /// Host sender refused the replacement track.
    #[display(fmt = "failed to replace sender track: {}", _0)]
    #[from(ignore)]
    ReplaceTrackFailed(platform::Error),

    /// Host in-place camera switch failed.
    #[display(fmt = "failed to switch camera: {}", _0)]
    #[from(ignore)]
    SwitchCameraFailed(platform::Error),
}

macro_rules! upgrade_handle {
    ($v:expr, $err:expr) => {
        $v.upgrade().ok_or_else(|| tracerr::new!($err))
    };
    ($v:expr) => {
        upgrade_handle!($v, HandleDetachedError)
    };
}

/// External handle to a [`Call`].
///
/// This is the consumer surface: operations, observable properties and the
/// event subscription.
#[derive(Clone)]
pub struct CallHandle(Weak<InnerCall>);

impl CallHandle {
    /// Starts the call: acquires local media, connects signaling to the
    /// provided room and waits for a peer.
    ///
    /// Device and signaling failures are published through
    /// [`CallEvent::Error`]; negotiation failures trigger the reconnection
    /// strategy.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if the backing [`Call`] is dropped.
    pub async fn start(
        &self,
        room_id: RoomId,
        constraints: MediaStreamSettings,
    ) -> Result<(), Traced<HandleDetachedError>> {
        let inner = upgrade_handle!(self.0)?;
        inner.start(room_id, Some(constraints)).await;
        Ok(())
    }

    /// Finishes the call: tears the peer connection down, stops local
    /// tracks and announces the finish over signaling (best-effort).
    ///
    /// Idempotent: finishing an already finished call is a no-op.
    ///
    /// # Errors
    ///
    /// With [`FinishCallError::NoActiveCall`] if the call was never started.
    pub async fn finish(&self) -> Result<(), Traced<FinishCallError>> {
        let inner = upgrade_handle!(self.0, FinishCallError::Detached)?;
        inner.finish(true).await
    }

    /// Flips the enabled flag of every local audio track and reports the new
    /// controls to the peer.
    ///
    /// Silent no-op without a local stream.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if the backing [`Call`] is dropped.
    pub fn toggle_audio(&self) -> Result<(), Traced<HandleDetachedError>> {
        upgrade_handle!(self.0).map(|inner| inner.toggle(MediaKind::Audio))
    }

    /// Flips the enabled flag of every local video track and reports the new
    /// controls to the peer.
    ///
    /// Silent no-op without a local stream.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if the backing [`Call`] is dropped.
    pub fn toggle_video(&self) -> Result<(), Traced<HandleDetachedError>> {
        upgrade_handle!(self.0).map(|inner| inner.toggle(MediaKind::Video))
    }

    /// Switches the active capture device of the provided device's kind and
    /// replaces the corresponding outbound track.
    ///
    /// # Errors
    ///
    /// See [`DeviceSwitchError`] for details.
    pub async fn set_active_device(
        &self,
        device: InputDeviceInfo,
    ) -> Result<(), Traced<DeviceSwitchError>> {
        let inner = upgrade_handle!(self.0, DeviceSwitchError::Detached)?;
        inner.set_active_device(device).await
    }

    /// Rotates to the next video input (wrapping), or flips the camera in
    /// place on hosts exposing such a primitive.
    ///
    /// # Errors
    ///
    /// See [`DeviceSwitchError`] for details.
    pub async fn next_video_device(
        &self,
    ) -> Result<(), Traced<DeviceSwitchError>> {
        let inner = upgrade_handle!(self.0, DeviceSwitchError::Detached)?;
        inner.next_video_device().await
    }

    /// Re-starts the call with the video sourced from a screen capture.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if the backing [`Call`] is dropped.
    pub async fn share_screen(&self) -> Result<(), Traced<HandleDetachedError>> {
        let inner = upgrade_handle!(self.0)?;
        inner.restart_with_video_source(VideoSource::Display).await;
        Ok(())
    }

    /// Re-starts the call with the video sourced from the camera.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if the backing [`Call`] is dropped.
    pub async fn share_video(&self) -> Result<(), Traced<HandleDetachedError>> {
        let inner = upgrade_handle!(self.0)?;
        inner.restart_with_video_source(VideoSource::Device).await;
        Ok(())
    }

    /// Forwards the provided payload over the data channel.
    ///
    /// Silent no-op if the channel is not open.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if the backing [`Call`] is dropped.
    pub fn send(&self, data: &str) -> Result<(), Traced<HandleDetachedError>> {
        upgrade_handle!(self.0).map(|inner| inner.send(data))
    }

    /// Subscribes the provided listener to the call events.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if the backing [`Call`] is dropped.
    pub fn on_event<F>(
        &self,
        f: F,
    ) -> Result<SubscriptionId, Traced<HandleDetachedError>>
    where
        F: Fn(&CallEvent) + 'static,
    {
        upgrade_handle!(self.0).map(|inner| inner.events.on(f))
    }

    /// Removes a listener registered with [`CallHandle::on_event()`].
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if the backing [`Call`] is dropped.
    pub fn off_event(
        &self,
        id: SubscriptionId,
    ) -> Result<bool, Traced<HandleDetachedError>> {
        upgrade_handle!(self.0).map(|inner| inner.events.off(id))
    }

    /// Indicates whether the call reached its terminal state.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if the backing [`Call`] is dropped.
    pub fn finished(&self) -> Result<bool, Traced<HandleDetachedError>> {
        upgrade_handle!(self.0).map(|inner| inner.finished.get())
    }

    /// Indicates whether the signaling subscription is live.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if the backing [`Call`] is dropped.
    pub fn connected(&self) -> Result<bool, Traced<HandleDetachedError>> {
        upgrade_handle!(self.0).map(|inner| inner.signaling.connected())
    }

    /// Indicates whether the data channel towards the peer is open.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if the backing [`Call`] is dropped.
    pub fn matched(&self) -> Result<bool, Traced<HandleDetachedError>> {
        upgrade_handle!(self.0).map(|inner| inner.matched.get())
    }

    /// Indicates whether local audio is enabled.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if the backing [`Call`] is dropped.
    pub fn audio(&self) -> Result<bool, Traced<HandleDetachedError>> {
        upgrade_handle!(self.0).map(|inner| {
            inner
                .local_stream
                .borrow()
                .as_ref()
                .map_or(false, |s| s.is_enabled(MediaKind::Audio))
        })
    }

    /// Indicates whether local video is enabled.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if the backing [`Call`] is dropped.
    pub fn video(&self) -> Result<bool, Traced<HandleDetachedError>> {
        upgrade_handle!(self.0).map(|inner| {
            inner
                .local_stream
                .borrow()
                .as_ref()
                .map_or(false, |s| s.is_enabled(MediaKind::Video))
        })
    }

    /// Returns the peer-reported controls, if any arrived.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if the backing [`Call`] is dropped.
    pub fn external_controls(
        &self,
    ) -> Result<Option<ExternalControls>, Traced<HandleDetachedError>> {
        upgrade_handle!(self.0).map(|inner| *inner.external_controls.borrow())
    }

    /// Returns the local stream handle, if media was acquired.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if the backing [`Call`] is dropped.
    pub fn local_stream(
        &self,
    ) -> Result<Option<Rc<LocalStream>>, Traced<HandleDetachedError>> {
        upgrade_handle!(self.0).map(|inner| inner.local_stream.borrow().clone())
    }

    /// Returns the stream assembled from the remote peer's tracks, if any
    /// arrived.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if the backing [`Call`] is dropped.
    pub fn peer_stream(
        &self,
    ) -> Result<Option<RemoteStream>, Traced<HandleDetachedError>> {
        upgrade_handle!(self.0).map(|inner| inner.peer_stream.borrow().clone())
    }

    /// Returns the current phase of the call state machine.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if the backing [`Call`] is dropped.
    pub fn state(&self) -> Result<CallState, Traced<HandleDetachedError>> {
        upgrade_handle!(self.0).map(|inner| inner.state.get())
    }
}

/// A single peer-to-peer audio/video session.
pub struct Call(Rc<InnerCall>);

impl Call {
    /// Creates a new [`Call`] wired to the provided collaborators and starts
    /// its event dispatcher.
    #[must_use]
    pub fn new(
        signaling: Rc<SignalingClient>,
        media: Rc<MediaManager>,
        network: Rc<NetworkSupervisor>,
        peers: Rc<dyn PeerConnectionFactory>,
        config: CallConfig,
    ) -> Self {
        /// Everything the dispatcher reacts to, fanned into one stream.
        enum Event {
            Signaling(SignalingEvent),
            Peer(PeerEvent),
        }

        let (peer_events_tx, peer_events_rx) = mpsc::unbounded();
        let mut signaling_events =
            signaling.events().map(Event::Signaling).fuse();
        let mut peer_events = peer_events_rx.map(Event::Peer).fuse();

        let rewriter = SdpRewriter::new(config.bandwidth, config.sdp_transform);
        let inner = Rc::new(InnerCall {
            config,
            rewriter,
            signaling,
            media,
            network,
            peers,
            peer_events_tx,
            events: EventEmitter::default(),
            state: Cell::new(CallState::Idle),
            finished: ObservableCell::new(false),
            room_id: RefCell::new(None),
            constraints: RefCell::new(None),
            peer: RefCell::new(None),
            candidates: IceCandidateBuffer::default(),
            local_stream: RefCell::new(None),
            remote_tracks: RefCell::new(Vec::new()),
            peer_stream: RefCell::new(None),
            external_controls: RefCell::new(None),
            matched: Cell::new(false),
            ice_failed: Cell::new(false),
            listening_network_change: Cell::new(false),
            running_disconnection_strategy: Cell::new(false),
            sampler: RefCell::new(BitrateSampler::new()),
            weak_this: RefCell::new(Weak::new()),
        });
        inner.weak_this.replace(Rc::downgrade(&inner));

        let weak = Rc::downgrade(&inner);
        platform::spawn(async move {
            loop {
                let event = futures::select! {
                    event = signaling_events.select_next_some() => event,
                    event = peer_events.select_next_some() => event,
                    complete => break,
                };
                let Some(inner) = weak.upgrade() else { break };
                match event {
                    Event::Signaling(event) => {
                        event.dispatch_with(&*inner).await;
                    }
                    Event::Peer(event) => {
                        event.dispatch_with(&*inner).await;
                    }
                }
            }
        });

        Self(inner)
    }

    /// Creates a new external handle to this [`Call`].
    #[inline]
    #[must_use]
    pub fn handle(&self) -> CallHandle {
        CallHandle(Rc::downgrade(&self.0))
    }
}

/// Actual state of a [`Call`].
struct InnerCall {
    /// Static configuration.
    config: CallConfig,

    /// Rewriter applied to every locally produced offer and answer.
    rewriter: SdpRewriter,

    /// Typed signaling channel.
    signaling: Rc<SignalingClient>,

    /// Capture device coordinator.
    media: Rc<MediaManager>,

    /// Reachability supervisor, consulted during recovery only.
    network: Rc<NetworkSupervisor>,

    /// Factory of host peer connections.
    peers: Rc<dyn PeerConnectionFactory>,

    /// Sender handed to every created [`Connection`].
    peer_events_tx: mpsc::UnboundedSender<PeerEvent>,

    /// Publisher of the consumer event surface.
    events: EventEmitter<CallEvent>,

    /// Current phase of the state machine.
    state: Cell<CallState>,

    /// Terminal flag; sticky once set.
    finished: ObservableCell<bool>,

    /// Room this call lives in.
    room_id: RefCell<Option<RoomId>>,

    /// Media settings of the current session, preserved for restarts.
    constraints: RefCell<Option<MediaStreamSettings>>,

    /// The live peer connection, absent between teardown and rebuild.
    peer: RefCell<Option<Rc<Connection>>>,

    /// Remote candidates waiting for a remote description.
    candidates: IceCandidateBuffer,

    /// Local media of this call.
    local_stream: RefCell<Option<Rc<LocalStream>>>,

    /// Every track received from the remote peer so far.
    remote_tracks: RefCell<Vec<Rc<dyn MediaStreamTrack>>>,

    /// Stream assembled out of [`InnerCall::remote_tracks`].
    peer_stream: RefCell<Option<RemoteStream>>,

    /// Peer-reported controls, if any arrived.
    external_controls: RefCell<Option<ExternalControls>>,

    /// Whether the data channel towards the peer is open.
    matched: Cell<bool>,

    /// Whether ICE already failed once in this session.
    ice_failed: Cell<bool>,

    /// Single-flight guard of the network-recovery listener.
    listening_network_change: Cell<bool>,

    /// Single-flight guard of the bitrate-driven disconnection strategy.
    running_disconnection_strategy: Cell<bool>,

    /// Bitrate sampler of the disconnection strategy.
    sampler: RefCell<BitrateSampler>,

    /// Weak self-reference for spawning recovery tasks.
    weak_this: RefCell<Weak<InnerCall>>,
}

impl InnerCall {
    /// Returns a [`Weak`] reference to this [`InnerCall`].
    fn weak(&self) -> Weak<InnerCall> {
        self.weak_this.borrow().clone()
    }

    /// Moves the state machine to the provided phase.
    fn set_state(&self, state: CallState) {
        if self.state.get() != state {
            log::debug!("call state: {} -> {}", self.state.get(), state);
            self.state.set(state);
        }
    }

    /// Runs the start sequence: media, then signaling, then waiting for a
    /// peer.
    async fn start(
        &self,
        room_id: RoomId,
        constraints: Option<MediaStreamSettings>,
    ) {
        if self.finished.get() {
            log::warn!("start() on a finished call is a no-op");
            return;
        }
        self.room_id.replace(Some(room_id.clone()));
        if constraints.is_some() {
            self.constraints.replace(constraints);
        }

        self.set_state(CallState::AcquiringMedia);
        if self.ensure_local_stream().await.is_none() {
            return;
        }
        if self.finished.get() {
            return;
        }

        if !self.signaling.connected() {
            if let Err(e) = self.signaling.connect(room_id).await {
                log::error!("signaling connect failed: {e}");
                self.events.emit(&CallEvent::Error(CallError::Signaling(
                    e.to_string(),
                )));
                return;
            }
            if self.finished.get() {
                return;
            }
        }
        self.set_state(CallState::SignalingConnected);
        self.events.emit(&CallEvent::Change);
    }

    /// Finishes the call. `announce` controls whether the outbound `finish`
    /// signaling message is sent (it is not when reacting to a remote
    /// finish).
    async fn finish(
        &self,
        announce: bool,
    ) -> Result<(), Traced<FinishCallError>> {
        if self.finished.get() {
            log::warn!("finish() on an already finished call is a no-op");
            return Ok(());
        }
        let room_id = self
            .room_id
            .borrow_mut()
            .take()
            .ok_or_else(|| tracerr::new!(FinishCallError::NoActiveCall))?;

        self.finished.set(true);
        self.constraints.replace(None);
        self.clean();
        if let Some(stream) = self.local_stream.borrow_mut().take() {
            stream.stop_all();
        }
        self.media.reset();
        self.set_state(CallState::Finished);

        if announce {
            if let Err(e) = self.signaling.finish(&room_id).await {
                log::warn!("signaling finish failed: {e}");
            }
        }
        if let Err(e) = self.signaling.disconnect(&room_id).await {
            log::warn!("signaling disconnect failed: {e}");
        }

        self.events.emit(&CallEvent::Finish);
        self.events.emit(&CallEvent::Change);
        Ok(())
    }

    /// Tears the peer connection down while preserving local tracks, so the
    /// call can be rebuilt.
    fn clean(&self) {
        if let Some(conn) = self.peer.borrow_mut().take() {
            conn.close();
        }
        self.candidates.clear();
        self.external_controls.replace(None);
        self.matched.set(false);
        self.remote_tracks.borrow_mut().clear();
        self.peer_stream.replace(None);
    }

    /// Returns the existing local stream or acquires a new one, publishing
    /// device errors through the event surface.
    async fn ensure_local_stream(&self) -> Option<Rc<LocalStream>> {
        if let Some(stream) = self.local_stream.borrow().clone() {
            return Some(stream);
        }
        let settings = self.constraints.borrow().clone().unwrap_or_default();
        match self.media.acquire(&settings).await {
            Ok(stream) => {
                let stream = Rc::new(stream);
                if self.finished.get() {
                    stream.stop_all();
                    return None;
                }
                self.local_stream.replace(Some(Rc::clone(&stream)));
                self.events.emit(&CallEvent::LocalTrackChange);
                Some(stream)
            }
            Err(e) => {
                log::error!("failed to acquire local media: {e}");
                self.events
                    .emit(&CallEvent::Error(media_error(e.as_ref())));
                None
            }
        }
    }

    /// Replaces the current peer connection with a freshly created one.
    ///
    /// The previous connection (if any) is closed and cleared first, so at
    /// most one is ever live.
    fn create_peer(&self) -> Option<Rc<Connection>> {
        if let Some(prev) = self.peer.borrow_mut().take() {
            prev.close();
        }
        self.candidates.clear();

        match self.peers.create(&self.config.rtc_configuration) {
            Ok(peer) => {
                let conn =
                    Rc::new(Connection::new(peer, self.peer_events_tx.clone()));
                self.peer.replace(Some(Rc::clone(&conn)));
                Some(conn)
            }
            Err(e) => {
                log::error!("failed to create peer connection: {e}");
                self.schedule_reconnection();
                None
            }
        }
    }

    /// Runs the offerer path: peer connection, data channel, local tracks.
    /// The host's `negotiationneeded` callback then drives the offer out.
    async fn handle_new_peer(&self) {
        if self.finished.get() {
            return;
        }
        let Some(conn) = self.create_peer() else {
            return;
        };
        if let Err(e) = conn.create_data_channel() {
            log::error!("{e}");
        }
        let Some(stream) = self.ensure_local_stream().await else {
            return;
        };
        if self.finished.get() || self.peer.borrow().is_none() {
            return;
        }
        self.add_local_tracks(&conn, &stream);
        self.set_state(CallState::Negotiating(NegotiationRole::Offerer));
        self.events.emit(&CallEvent::Change);
    }

    /// Runs the answerer path for the provided incoming offer.
    async fn handle_new_offer(&self, sdp: SessionDescription) {
        if self.finished.get() {
            return;
        }
        let Some(offer @ SdpType::Offer(_)) = sdp.into_sdp_type() else {
            log::warn!("newOffer carried a non-offer description, dropping");
            return;
        };
        let Some(conn) = self.create_peer() else {
            return;
        };
        if let Err(e) = conn.set_remote_description(offer).await {
            log::error!("{e}");
            self.schedule_reconnection();
            return;
        }
        if self.finished.get() {
            return;
        }
        let Some(stream) = self.ensure_local_stream().await else {
            return;
        };
        if self.finished.get() || self.peer.borrow().is_none() {
            return;
        }
        self.add_local_tracks(&conn, &stream);
        self.set_state(CallState::Negotiating(NegotiationRole::Answerer));
        self.events.emit(&CallEvent::Change);

        match conn.create_answer().await {
            Ok(raw) => {
                if self.finished.get() {
                    return;
                }
                let answer = self.rewriter.rewrite(&raw);
                if let Err(e) = conn
                    .set_local_description(SdpType::Answer(answer.clone()))
                    .await
                {
                    log::error!("{e}");
                    self.schedule_reconnection();
                    return;
                }
                let Some(room_id) = self.room_id.borrow().clone() else {
                    return;
                };
                let desc = SessionDescription {
                    kind: SdpKind::Answer,
                    sdp: answer,
                };
                if let Err(e) =
                    self.signaling.send_sdp_answer(&desc, &room_id).await
                {
                    log::error!("failed to send SDP answer: {e}");
                }
            }
            Err(e) => {
                log::error!("{e}");
                self.schedule_reconnection();
            }
        }
    }

    /// Applies an incoming answer, if the signaling state admits one.
    async fn handle_new_answer(&self, sdp: SessionDescription) {
        if self.finished.get() {
            return;
        }
        let Some(conn) = self.peer.borrow().clone() else {
            log::warn!("newAnswer with no peer connection, dropping");
            return;
        };
        match conn.signaling_state() {
            SignalingState::HaveLocalOffer
            | SignalingState::HaveRemotePranswer => {}
            state => {
                log::warn!("dropping newAnswer in signaling state '{state}'");
                return;
            }
        }
        let Some(SdpType::Answer(raw)) = sdp.into_sdp_type() else {
            log::warn!("newAnswer carried a non-answer description, dropping");
            return;
        };
        let answer = self.rewriter.rewrite(&raw);
        if let Err(e) =
            conn.set_remote_description(SdpType::Answer(answer)).await
        {
            log::error!("{e}");
        }
    }

    /// Applies, drops or buffers an incoming remote ICE candidate.
    async fn handle_new_ice_candidate(&self, msg: IceCandidateMessage) {
        if self.finished.get() {
            return;
        }
        let candidate = IceCandidate::from(msg);
        let conn = self.peer.borrow().clone();
        match conn {
            Some(conn) if conn.has_remote_description() => {
                if let Err(e) = conn.add_ice_candidate(candidate).await {
                    log::error!("{e}");
                }
            }
            Some(conn)
                if conn.signaling_state() == SignalingState::Stable =>
            {
                log::warn!(
                    "dropping ICE candidate received in stable state with \
                     no remote description",
                );
            }
            _ => self.candidates.push(candidate),
        }
    }

    /// Produces, rewrites, applies and sends an SDP offer.
    async fn send_offer(&self, ice_restart: bool) {
        let Some(conn) = self.peer.borrow().clone() else {
            return;
        };
        let options = OfferOptions {
            offer_to_receive_audio: true,
            offer_to_receive_video: true,
            ice_restart,
        };
        match conn.create_offer(options).await {
            Ok(raw) => {
                if self.finished.get() {
                    return;
                }
                let offer = self.rewriter.rewrite(&raw);
                if let Err(e) = conn
                    .set_local_description(SdpType::Offer(offer.clone()))
                    .await
                {
                    log::error!("{e}");
                    self.schedule_reconnection();
                    return;
                }
                let Some(room_id) = self.room_id.borrow().clone() else {
                    return;
                };
                let desc = SessionDescription {
                    kind: SdpKind::Offer,
                    sdp: offer,
                };
                if let Err(e) =
                    self.signaling.send_sdp_offer(&desc, &room_id).await
                {
                    log::error!("failed to send SDP offer: {e}");
                }
            }
            Err(e) => {
                log::error!("{e}");
                self.schedule_reconnection();
            }
        }
    }

    /// Adds local tracks to the peer connection, surfacing a missing host
    /// primitive as [`CallError::Support`].
    fn add_local_tracks(&self, conn: &Connection, stream: &LocalStream) {
        if let Err(e) = conn.add_local_tracks(stream) {
            if let PeerConnectionError::AddTrackFailed(cause) = e.as_ref() {
                if cause.kind() == platform::ErrorKind::NotSupported {
                    self.events.emit(&CallEvent::Error(CallError::Support));
                    return;
                }
            }
            log::error!("{e}");
        }
    }

    /// Applies every buffered remote candidate, in arrival order.
    async fn drain_candidates(&self, conn: &Connection) {
        for candidate in self.candidates.drain() {
            if let Err(e) = conn.add_ice_candidate(candidate).await {
                log::error!("failed to apply buffered ICE candidate: {e}");
            }
        }
    }

    /// Reacts to an ICE failure: restart ICE on the first one, surface
    /// [`CallError::PoorConnection`] on the second.
    async fn handle_ice_failure(&self) {
        if self.finished.get() {
            return;
        }
        if self.ice_failed.get() {
            self.events
                .emit(&CallEvent::Error(CallError::PoorConnection));
            return;
        }
        self.ice_failed.set(true);
        self.set_state(CallState::Reconnecting);
        self.events.emit(&CallEvent::Change);
        self.restart_ice().await;
    }

    /// Restarts ICE natively, or through an offer with the restart flag when
    /// the host lacks the primitive.
    async fn restart_ice(&self) {
        let Some(conn) = self.peer.borrow().clone() else {
            return;
        };
        if !conn.restart_ice() {
            self.send_offer(true).await;
        }
    }

    /// Spawns the connection-failure recovery: probe the network, then
    /// either restart the call or wait for the next online transition.
    fn schedule_reconnection(&self) {
        let weak = self.weak();
        platform::spawn(async move {
            let Some(this) = weak.upgrade() else { return };
            if this.finished.get() {
                return;
            }
            this.set_state(CallState::Reconnecting);
            this.events.emit(&CallEvent::Change);

            let online = this.network.is_online(network::PROBE_TIMEOUT).await;
            if this.finished.get() {
                return;
            }
            if online {
                this.restart_call().await;
            } else {
                this.events
                    .emit(&CallEvent::Error(CallError::NoInternetAccess));
                this.listen_for_network_recovery();
            }
        });
    }

    /// Subscribes to network transitions and restarts the call on the first
    /// online one. Guarded by a single-flight flag; the subscription is
    /// dropped once used.
    fn listen_for_network_recovery(&self) {
        if self.listening_network_change.get() {
            return;
        }
        self.listening_network_change.set(true);

        let weak = self.weak();
        let mut changes = self.network.on_change().fuse();
        let mut finished = self.finished.when_eq(true).fuse();
        platform::spawn(async move {
            loop {
                futures::select! {
                    online = changes.next() => match online {
                        Some(true) => {
                            if let Some(this) = weak.upgrade() {
                                if !this.finished.get() {
                                    this.restart_call().await;
                                }
                            }
                            break;
                        }
                        Some(false) => {}
                        None => break,
                    },
                    _ = finished => break,
                }
            }
            if let Some(this) = weak.upgrade() {
                this.listening_network_change.set(false);
            }
        });
    }

    /// The restart-call procedure: teardown, re-run of the start sequence
    /// with the preserved room and constraints, then a synthetic local
    /// `newPeer` to re-enter the offerer path.
    async fn restart_call(&self) {
        if self.finished.get() {
            return;
        }
        let Some(room_id) = self.room_id.borrow().clone() else {
            return;
        };
        self.clean();
        self.start(room_id, None).await;
        if self.finished.get() {
            return;
        }
        self.handle_new_peer().await;
    }

    /// Tears the call down and starts it over with the video source swapped
    /// (screen/camera sharing).
    async fn restart_with_video_source(&self, source: VideoSource) {
        if self.finished.get() {
            return;
        }
        let Some(room_id) = self.room_id.borrow().clone() else {
            log::warn!("cannot share media before the call is started");
            return;
        };
        let settings = self
            .constraints
            .borrow()
            .clone()
            .unwrap_or_default()
            .with_video_source(source);

        self.clean();
        if let Some(stream) = self.local_stream.borrow_mut().take() {
            stream.stop_all();
        }
        self.start(room_id, Some(settings)).await;
        if self.finished.get() {
            return;
        }
        self.handle_new_peer().await;
    }

    /// Schedules the stalled-connection check 3 seconds after ICE gathering
    /// completes.
    fn schedule_stall_check(&self) {
        let weak = self.weak();
        platform::spawn(async move {
            platform::delay_for(ICE_STALL_CHECK_DELAY).await;
            let Some(this) = weak.upgrade() else { return };
            if this.finished.get() {
                return;
            }
            let Some(conn) = this.peer.borrow().clone() else {
                return;
            };
            if conn.ice_connection_state() == IceConnectionState::Checking
                || conn.connection_state() == PeerConnectionState::Connecting
            {
                log::warn!(
                    "connection still stuck after ICE gathering completed, \
                     restarting the call",
                );
                this.restart_call().await;
            }
        });
    }

    /// Spawns the bitrate-driven disconnection strategy, if enabled and not
    /// already running.
    fn schedule_disconnected_strategy(&self) {
        if !self.config.bitrate_check {
            return;
        }
        if self.running_disconnection_strategy.get() {
            return;
        }
        self.running_disconnection_strategy.set(true);

        let weak = self.weak();
        platform::spawn(async move {
            let Some(this) = weak.upgrade() else { return };
            this.run_disconnected_strategy().await;
            this.running_disconnection_strategy.set(false);
        });
    }

    /// Samples the bitrate twice, 4 seconds apart, and restarts ICE when the
    /// most relevant channel dropped by more than
    /// [`BITRATE_DROP_THRESHOLD_KBPS`].
    async fn run_disconnected_strategy(&self) {
        let Some(conn) = self.peer.borrow().clone() else {
            return;
        };
        let before = match conn.get_stats().await {
            Ok(stats) => self.sampler.borrow_mut().sample(&stats),
            Err(e) => {
                log::error!("{e}");
                return;
            }
        };

        platform::delay_for(BITRATE_SAMPLE_WINDOW).await;
        if self.finished.get() {
            return;
        }
        let Some(conn) = self.peer.borrow().clone() else {
            return;
        };
        let after = match conn.get_stats().await {
            Ok(stats) => self.sampler.borrow_mut().sample(&stats),
            Err(e) => {
                log::error!("{e}");
                return;
            }
        };

        let (old_rate, new_rate) = self.relevant_channel(before, after);
        let difference = old_rate as i64 - new_rate as i64;
        if difference > BITRATE_DROP_THRESHOLD_KBPS {
            log::warn!(
                "bitrate dropped by {difference} kbps while disconnected, \
                 restarting ICE",
            );
            self.restart_ice().await;
        }
    }

    /// Picks the most relevant bitrate channel: local video out if local
    /// video is enabled, else peer video in if the peer has video, else
    /// local audio out, else peer audio in.
    fn relevant_channel(&self, before: Bitrate, after: Bitrate) -> (u64, u64) {
        let local = self.local_stream.borrow().clone();
        let controls = (*self.external_controls.borrow()).unwrap_or_default();

        if local
            .as_ref()
            .map_or(false, |s| s.is_enabled(MediaKind::Video))
        {
            (before.video.output, after.video.output)
        } else if controls.video {
            (before.video.input, after.video.input)
        } else if local
            .as_ref()
            .map_or(false, |s| s.is_enabled(MediaKind::Audio))
        {
            (before.audio.output, after.audio.output)
        } else {
            (before.audio.input, after.audio.input)
        }
    }

    /// Flips the enabled flag of every local track of the provided kind and
    /// reports the new controls to the peer.
    fn toggle(&self, kind: MediaKind) {
        let Some(stream) = self.local_stream.borrow().clone() else {
            return;
        };
        stream.toggle(kind);
        self.push_controls();
        self.events.emit(&CallEvent::Change);
    }

    /// Sends the current local controls over the data channel.
    fn push_controls(&self) {
        let Some(conn) = self.peer.borrow().clone() else {
            return;
        };
        let frame = ControlFrame {
            kind: CONTROL_FRAME_KIND.to_owned(),
            data: self.current_controls(),
        };
        match serde_json::to_string(&frame) {
            Ok(json) => {
                conn.send(&json);
            }
            Err(e) => log::error!("failed to encode control frame: {e}"),
        }
    }

    /// Snapshots the local controls out of the local stream.
    fn current_controls(&self) -> ExternalControls {
        let stream = self.local_stream.borrow().clone();
        ExternalControls {
            audio: stream
                .as_ref()
                .map_or(false, |s| s.is_enabled(MediaKind::Audio)),
            video: stream
                .as_ref()
                .map_or(false, |s| s.is_enabled(MediaKind::Video)),
        }
    }

    /// Decodes an inbound data channel message: control frames update the
    /// external controls, everything else surfaces as
    /// [`CallEvent::Message`].
    fn handle_channel_message(&self, data: &str) {
        let value: Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("undecodable data channel message: {e}");
                return;
            }
        };
        if value.get("type").and_then(Value::as_str)
            == Some(CONTROL_FRAME_KIND)
        {
            let data = value.get("data").cloned().unwrap_or(Value::Null);
            match serde_json::from_value::<ExternalControls>(data) {
                Ok(controls) => {
                    self.external_controls.replace(Some(controls));
                    self.events.emit(&CallEvent::Change);
                }
                Err(e) => log::warn!("undecodable external controls: {e}"),
            }
        } else {
            self.events.emit(&CallEvent::Message(value));
        }
    }

    /// Switches the remembered device and replaces the outbound track.
    async fn set_active_device(
        &self,
        device: InputDeviceInfo,
    ) -> Result<(), Traced<DeviceSwitchError>> {
        let kind = match device.kind {
            MediaDeviceKind::VideoInput => MediaKind::Video,
            MediaDeviceKind::AudioInput => MediaKind::Audio,
            MediaDeviceKind::AudioOutput => {
                log::warn!("cannot capture from an audio output device");
                return Ok(());
            }
        };
        if self.local_stream.borrow().is_none() {
            return Ok(());
        }
        self.media.set_active_device(device);
        self.apply_device_switch(kind).await
    }

    /// Rotates to the next video input, preferring an in-place camera flip
    /// when the host track exposes one.
    async fn next_video_device(
        &self,
    ) -> Result<(), Traced<DeviceSwitchError>> {
        let Some(stream) = self.local_stream.borrow().clone() else {
            return Ok(());
        };
        if let Some(track) = stream.track(MediaKind::Video) {
            if let Some(switch) = track.switch_camera() {
                return switch.await.map_err(|e| {
                    tracerr::new!(DeviceSwitchError::SwitchCameraFailed(e))
                });
            }
        }
        let next = self
            .media
            .next_video_device()
            .await
            .map_err(tracerr::map_from_and_wrap!())?;
        if next.is_some() {
            self.apply_device_switch(MediaKind::Video).await
        } else {
            Ok(())
        }
    }

    /// Replaces the local track of the provided kind with one captured from
    /// the currently remembered device.
    ///
    /// Senders supporting in-place replacement are updated directly;
    /// otherwise the track is re-added and a new offer with an ICE restart
    /// is sent.
    async fn apply_device_switch(
        &self,
        kind: MediaKind,
    ) -> Result<(), Traced<DeviceSwitchError>> {
        let Some(stream) = self.local_stream.borrow().clone() else {
            return Ok(());
        };
        let settings = self.constraints.borrow().clone().unwrap_or_default();
        let was_enabled = stream.is_enabled(kind);
        let conn = self.peer.borrow().clone();

        match conn {
            Some(conn) => {
                let senders = conn.senders_of(kind);
                if !senders.is_empty()
                    && senders.iter().all(|s| s.replaceable())
                {
                    let track = self
                        .media
                        .acquire_kind(kind, &settings)
                        .await
                        .map_err(tracerr::map_from_and_wrap!())?;
                    for sender in senders {
                        sender.replace_track(Rc::clone(&track)).await.map_err(
                            |e| {
                                tracerr::new!(
                                    DeviceSwitchError::ReplaceTrackFailed(e)
                                )
                            },
                        )?;
                    }
                    track.set_enabled(was_enabled);
                    if let Some(old) = stream.track(kind) {
                        old.stop();
                    }
                    stream.set_track(kind, track);
                    self.events.emit(&CallEvent::LocalTrackChange);
                    self.events.emit(&CallEvent::Change);
                } else {
                    conn.remove_senders_of(kind)
                        .map_err(tracerr::map_from_and_wrap!())?;
                    let track = self
                        .media
                        .acquire_kind(kind, &settings)
                        .await
                        .map_err(tracerr::map_from_and_wrap!())?;
                    track.set_enabled(was_enabled);
                    if let Some(old) = stream.track(kind) {
                        old.stop();
                    }
                    stream.set_track(kind, Rc::clone(&track));
                    conn.add_track(track)
                        .map_err(tracerr::map_from_and_wrap!())?;
                    self.events.emit(&CallEvent::LocalTrackChange);
                    self.send_offer(true).await;
                    self.events.emit(&CallEvent::Change);
                }
            }
            None => {
                let track = self
                    .media
                    .acquire_kind(kind, &settings)
                    .await
                    .map_err(tracerr::map_from_and_wrap!())?;
                track.set_enabled(was_enabled);
                if let Some(old) = stream.track(kind) {
                    old.stop();
                }
                stream.set_track(kind, track);
                self.events.emit(&CallEvent::LocalTrackChange);
                self.events.emit(&CallEvent::Change);
            }
        }
        Ok(())
    }

    /// Forwards the provided payload over the data channel, if open.
    fn send(&self, data: &str) {
        if let Some(conn) = self.peer.borrow().clone() {
            if !conn.send(data) {
                log::debug!("data channel is not open, message dropped");
            }
        }
    }

    /// Rebuilds the peer stream out of the received tracks and announces the
    /// change.
    fn rebuild_peer_stream(&self) {
        let stream = RemoteStream::assemble(&self.remote_tracks.borrow());
        self.peer_stream.replace(Some(stream));
        self.events.emit(&CallEvent::TrackChange);
    }
}

/// Signaling events handling.
#[async_trait(?Send)]
impl SignalingEventHandler for InnerCall {
    type Output = ();

    /// Publishes the connectivity change.
    async fn on_open(&self) -> Self::Output {
        self.events.emit(&CallEvent::Change);
    }

    /// Publishes the connectivity change.
    async fn on_close(&self) -> Self::Output {
        self.events.emit(&CallEvent::Change);
    }

    /// Forwards the signaling error verbatim.
    async fn on_error(&self, message: String) -> Self::Output {
        self.events
            .emit(&CallEvent::Error(CallError::Signaling(message)));
    }

    /// Enters the offerer path.
    async fn on_new_peer(&self, id: RoomId) -> Self::Output {
        if self.room_id.borrow().as_ref() != Some(&id) {
            log::warn!("newPeer for foreign room '{id}', dropping");
            return;
        }
        self.handle_new_peer().await;
    }

    /// The remote peer left: the peer connection is torn down, the call
    /// stays alive so a returning peer can renegotiate.
    async fn on_disconnected(&self, id: RoomId) -> Self::Output {
        if self.finished.get() {
            return;
        }
        log::info!("peer left room '{id}'");
        self.clean();
        self.events.emit(&CallEvent::Change);
    }

    /// The call was finished remotely: run the local teardown without
    /// echoing `finish` back.
    async fn on_finished(&self, _: RoomId) -> Self::Output {
        if let Err(e) = self.finish(false).await {
            log::warn!("teardown after remote finish failed: {e}");
        }
    }

    /// Enters the answerer path.
    async fn on_new_offer(&self, sdp: SessionDescription) -> Self::Output {
        self.handle_new_offer(sdp).await;
    }

    /// Applies the answer, if the signaling state admits one.
    async fn on_new_answer(&self, sdp: SessionDescription) -> Self::Output {
        self.handle_new_answer(sdp).await;
    }

    /// Applies or buffers the remote candidate.
    async fn on_new_ice_candidate(&self, candidate: IceCandidateMessage) -> Self::Output {
        self.handle_new_ice_candidate(candidate).await;
    }
}

/// Peer connection events handling.
#[async_trait(?Send)]
impl PeerEventHandler for InnerCall {
    type Output = ();

    /// Forwards the discovered candidate through signaling.
    async fn on_ice_candidate_discovered(
        &self,
        candidate: Option<IceCandidate>,
    ) -> Self::Output {
        if self.finished.get() {
            return;
        }
        let Some(candidate) = candidate else {
            return;
        };
        let Some(room_id) = self.room_id.borrow().clone() else {
            return;
        };
        if let Err(e) = self
            .signaling
            .send_ice_candidate(&candidate.into(), &room_id)
            .await
        {
            log::error!("failed to send ICE candidate: {e}");
        }
    }

    /// Sends an offer, as long as negotiation is not already in progress.
    async fn on_negotiation_needed(&self) -> Self::Output {
        if self.finished.get() {
            return;
        }
        let Some(conn) = self.peer.borrow().clone() else {
            return;
        };
        if conn.signaling_state() == SignalingState::Stable {
            self.send_offer(false).await;
        } else {
            log::debug!(
                "negotiationneeded in signaling state '{}', ignored",
                conn.signaling_state(),
            );
        }
    }

    /// Drains the candidate buffer once a remote description exists.
    async fn on_signaling_state_changed(&self, state: SignalingState) -> Self::Output {
        log::debug!("signaling state: {state}");
        let Some(conn) = self.peer.borrow().clone() else {
            return;
        };
        if conn.has_remote_description() {
            self.drain_candidates(&conn).await;
        }
        self.events.emit(&CallEvent::Change);
    }

    /// Routes ICE connectivity transitions into the recovery strategies.
    async fn on_ice_connection_state_changed(
        &self,
        state: IceConnectionState,
    ) -> Self::Output {
        if self.finished.get() {
            return;
        }
        match state {
            IceConnectionState::Failed => self.handle_ice_failure().await,
            IceConnectionState::Disconnected => {
                self.schedule_disconnected_strategy();
            }
            IceConnectionState::Connected
            | IceConnectionState::Completed => {
                if self.matched.get() {
                    self.set_state(CallState::Sustaining);
                }
                self.events.emit(&CallEvent::Change);
            }
            _ => self.events.emit(&CallEvent::Change),
        }
    }

    /// Schedules the stalled-connection check when gathering completes.
    async fn on_ice_gathering_state_changed(&self, state: IceGatheringState) -> Self::Output {
        if state == IceGatheringState::Complete
            && self.config.ice_stalled_check
            && !self.finished.get()
        {
            self.schedule_stall_check();
        }
    }

    /// Routes transport failures into the reconnection strategy.
    async fn on_connection_state_changed(&self, state: PeerConnectionState) -> Self::Output {
        if self.finished.get() {
            return;
        }
        match state {
            PeerConnectionState::Failed => self.schedule_reconnection(),
            _ => self.events.emit(&CallEvent::Change),
        }
    }

    /// Adds the remote track to the peer stream.
    async fn on_remote_track_added(&self, track: Rc<dyn MediaStreamTrack>) -> Self::Output {
        self.remote_tracks.borrow_mut().push(track);
        self.rebuild_peer_stream();
    }

    /// Announces the remote track state transition.
    async fn on_remote_track_state_changed(
        &self,
        id: String,
        event: TrackEvent,
    ) -> Self::Output {
        log::debug!("remote track '{id}': {event:?}");
        self.events.emit(&CallEvent::TrackChange);
    }

    /// The channel is open: the peers are matched, controls are pushed.
    async fn on_data_channel_opened(&self) -> Self::Output {
        if self.finished.get() {
            return;
        }
        self.matched.set(true);
        self.set_state(CallState::Matched);
        self.push_controls();
        self.events.emit(&CallEvent::Change);
    }

    /// Decodes the inbound channel payload.
    async fn on_data_channel_message(&self, data: String) -> Self::Output {
        self.handle_channel_message(&data);
    }

    /// The channel errored: the peers are no longer matched.
    async fn on_data_channel_error(&self, message: String) -> Self::Output {
        log::warn!("data channel error: {message}");
        self.matched.set(false);
        self.events.emit(&CallEvent::Change);
    }

    /// The channel closed: the peers are no longer matched.
    async fn on_data_channel_closed(&self) -> Self::Output {
        self.matched.set(false);
        self.events.emit(&CallEvent::Change);
    }
}

/// Maps a media acquisition failure onto the consumer error surface.
fn media_error(err: &MediaManagerError) -> CallError {
    match err {
        MediaManagerError::EnumerateDevicesFailed(e) => {
            classify_device_error(e, MediaKind::Video)
        }
        MediaManagerError::GetUserMediaFailed { kind, error } => {
            classify_device_error(error, *kind)
        }
        MediaManagerError::GetDisplayMediaFailed(e) => {
            classify_device_error(e, MediaKind::Video)
        }
        MediaManagerError::NoUsableTrack(kind) => {
            CallError::DeviceNotFound(*kind)
        }
    }
}

/// Classifies a host device error by its kind.
fn classify_device_error(
    err: &platform::Error,
    kind: MediaKind,
) -> CallError {
    use platform::ErrorKind as Kind;

    match err.kind() {
        Kind::NotFound | Kind::NotReadable | Kind::Overconstrained => {
            CallError::DeviceNotFound(kind)
        }
        Kind::Abort | Kind::Security | Kind::NotAllowed => {
            CallError::DevicePermission(kind)
        }
        Kind::NotSupported => CallError::Support,
        Kind::Other => {
            log::error!("unclassified {} error: {err}", device_name(kind));
            CallError::DeviceNotFound(kind)
        }
    }
}
