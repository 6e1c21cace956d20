//! Facade over the host peer connection.
//!
//! [`Connection`] wires every callback of the host [`RtcPeerConnection`] —
//! and of its data channel and remote tracks — into a single [`PeerEvent`]
//! channel consumed by the orchestrator's dispatcher. Closing the
//! [`Connection`] aborts the forwarding task, so no callback can fire
//! against a torn-down peer.

use std::{cell::RefCell, rc::Rc};

use derive_more::Display;
use futures::{
    channel::mpsc,
    future::{AbortHandle, Abortable},
    stream::{LocalBoxStream, SelectAll},
    StreamExt as _,
};
use medea_macro::dispatchable;
use tracerr::Traced;

use crate::{
    media::{LocalStream, MediaKind},
    platform::{
        self, DataChannelEvent, DataChannelState, IceCandidate,
        IceConnectionState, IceGatheringState, MediaStreamTrack, OfferOptions,
        PeerConnectionEvent, PeerConnectionState, RtcStats, RtpSender,
        SdpType, SignalingState, TrackEvent,
    },
};

/// Label of the peer-to-peer data channel.
pub const DATA_CHANNEL_LABEL: &str = "data-channel";

/// Errors that may occur while driving the host peer connection.
#[derive(Clone, Debug, Display)]
pub enum PeerConnectionError {
    /// Host failed to create a new peer connection.
    #[display(fmt = "Failed to create PeerConnection: {}", _0)]
    PeerCreationError(platform::Error),

    /// Host failed to produce an SDP offer.
    #[display(fmt = "Failed to create SDP offer: {}", _0)]
    CreateOfferFailed(platform::Error),

    /// Host failed to produce an SDP answer.
    #[display(fmt = "Failed to create SDP answer: {}", _0)]
    CreateAnswerFailed(platform::Error),

    /// Host rejected the local session description.
    #[display(fmt = "Failed to set local SDP description: {}", _0)]
    SetLocalDescriptionFailed(platform::Error),

    /// Host rejected the remote session description.
    #[display(fmt = "Failed to set remote SDP description: {}", _0)]
    SetRemoteDescriptionFailed(platform::Error),

    /// Host rejected a remote ICE candidate.
    #[display(fmt = "Failed to add ICE candidate: {}", _0)]
    AddIceCandidateFailed(platform::Error),

    /// Host failed to attach a local track.
    #[display(fmt = "Failed to add local track: {}", _0)]
    AddTrackFailed(platform::Error),

    /// Host failed to detach a sender.
    #[display(fmt = "Failed to remove track: {}", _0)]
    RemoveTrackFailed(platform::Error),

    /// Host failed to create the data channel.
    #[display(fmt = "Failed to create data channel: {}", _0)]
    CreateDataChannelFailed(platform::Error),

    /// Host failed to snapshot the statistics report.
    #[display(fmt = "PeerConnection.getStats() failed: {}", _0)]
    GetStatsFailed(platform::Error),
}

type Result<T> = std::result::Result<T, Traced<PeerConnectionError>>;

/// Events fanned in from the host peer connection, its data channel and its
/// remote tracks.
#[dispatchable(self: &Self, async_trait(?Send))]
pub enum PeerEvent {
    /// Local ICE candidate was discovered; [`None`] marks the end of
    /// candidates.
    IceCandidateDiscovered {
        /// Discovered candidate.
        candidate: Option<IceCandidate>,
    },

    /// Host requests an offer/answer exchange.
    NegotiationNeeded,

    /// [`SignalingState`] of the peer connection changed.
    SignalingStateChanged {
        /// New state.
        state: SignalingState,
    },

    /// [`IceConnectionState`] of the peer connection changed.
    IceConnectionStateChanged {
        /// New state.
        state: IceConnectionState,
    },

    /// [`IceGatheringState`] of the peer connection changed.
    IceGatheringStateChanged {
        /// New state.
        state: IceGatheringState,
    },

    /// [`PeerConnectionState`] of the peer connection changed.
    ConnectionStateChanged {
        /// New state.
        state: PeerConnectionState,
    },

    /// Remote track arrived.
    RemoteTrackAdded {
        /// The received track.
        track: Rc<dyn MediaStreamTrack>,
    },

    /// A remote track muted, unmuted or ended.
    RemoteTrackStateChanged {
        /// Id of the affected track.
        id: String,

        /// What happened to it.
        event: TrackEvent,
    },

    /// Data channel reached its open state.
    DataChannelOpened,

    /// Data channel delivered a text message.
    DataChannelMessage {
        /// Raw message payload.
        data: String,
    },

    /// Data channel errored.
    DataChannelError {
        /// Host-provided error description.
        message: String,
    },

    /// Data channel closed.
    DataChannelClosed,
}

/// Maps a host [`DataChannelEvent`] onto the [`PeerEvent`] surface.
fn channel_event(event: DataChannelEvent) -> PeerEvent {
    match event {
        DataChannelEvent::Open => PeerEvent::DataChannelOpened,
        DataChannelEvent::Message(data) => {
            PeerEvent::DataChannelMessage { data }
        }
        DataChannelEvent::Error(message) => {
            PeerEvent::DataChannelError { message }
        }
        DataChannelEvent::Close => PeerEvent::DataChannelClosed,
    }
}

/// Live peer connection of a call.
///
/// At most one [`Connection`] exists per call at any instant; creating a new
/// one always goes through closing the previous one first.
pub struct Connection {
    /// Host peer connection under this facade.
    peer: Rc<dyn platform::RtcPeerConnection>,

    /// Data channel towards the remote peer, once one exists (created by the
    /// offerer, received by the answerer).
    channel: Rc<RefCell<Option<Rc<dyn platform::DataChannel>>>>,

    /// Sender of additional event streams (data channel, remote tracks) to
    /// be merged into the forwarding task.
    new_streams_tx: mpsc::UnboundedSender<LocalBoxStream<'static, PeerEvent>>,

    /// Abort handle of the forwarding task; fired on close to null out every
    /// listener at once.
    listeners: AbortHandle,
}

impl Connection {
    /// Creates a new [`Connection`] over the provided host peer connection,
    /// forwarding everything it fires into `events_tx`.
    #[must_use]
    pub fn new(
        peer: Rc<dyn platform::RtcPeerConnection>,
        events_tx: mpsc::UnboundedSender<PeerEvent>,
    ) -> Self {
        let channel = Rc::new(RefCell::new(None));
        let (new_streams_tx, new_streams_rx) = mpsc::unbounded();
        let (listeners, registration) = AbortHandle::new_pair();

        let forward = forward_events(
            peer.on_event(),
            new_streams_rx,
            events_tx,
            Rc::clone(&channel),
        );
        platform::spawn(async move {
            drop(Abortable::new(forward, registration).await);
        });

        Self {
            peer,
            channel,
            new_streams_tx,
            listeners,
        }
    }

    /// Creates the peer-to-peer data channel (offerer side) and wires its
    /// events into the call's event channel.
    ///
    /// # Errors
    ///
    /// With [`PeerConnectionError::CreateDataChannelFailed`] if the host
    /// channel creation fails.
    pub fn create_data_channel(&self) -> Result<()> {
        let channel = self
            .peer
            .create_data_channel(DATA_CHANNEL_LABEL, true)
            .map_err(PeerConnectionError::CreateDataChannelFailed)
            .map_err(tracerr::wrap!())?;
        drop(
            self.new_streams_tx.unbounded_send(Box::pin(
                channel.on_event().map(channel_event),
            )),
        );
        self.channel.replace(Some(channel));
        Ok(())
    }

    /// Obtains an SDP offer from the host.
    ///
    /// # Errors
    ///
    /// With [`PeerConnectionError::CreateOfferFailed`] if the host call
    /// fails.
    pub async fn create_offer(&self, options: OfferOptions) -> Result<String> {
        self.peer
            .create_offer(options)
            .await
            .map_err(PeerConnectionError::CreateOfferFailed)
            .map_err(tracerr::wrap!())
    }

    /// Obtains an SDP answer from the host.
    ///
    /// # Errors
    ///
    /// With [`PeerConnectionError::CreateAnswerFailed`] if the host call
    /// fails.
    pub async fn create_answer(&self) -> Result<String> {
        self.peer
            .create_answer()
            .await
            .map_err(PeerConnectionError::CreateAnswerFailed)
            .map_err(tracerr::wrap!())
    }

    /// Sets the local session description.
    ///
    /// # Errors
    ///
    /// With [`PeerConnectionError::SetLocalDescriptionFailed`] if the host
    /// rejects the description.
    pub async fn set_local_description(&self, sdp: SdpType) -> Result<()> {
        self.peer
            .set_local_description(sdp)
            .await
            .map_err(PeerConnectionError::SetLocalDescriptionFailed)
            .map_err(tracerr::wrap!())
    }

    /// Sets the remote session description.
    ///
    /// # Errors
    ///
    /// With [`PeerConnectionError::SetRemoteDescriptionFailed`] if the host
    /// rejects the description.
    pub async fn set_remote_description(&self, sdp: SdpType) -> Result<()> {
        self.peer
            .set_remote_description(sdp)
            .await
            .map_err(PeerConnectionError::SetRemoteDescriptionFailed)
            .map_err(tracerr::wrap!())
    }

    /// Applies a remote ICE candidate.
    ///
    /// # Errors
    ///
    /// With [`PeerConnectionError::AddIceCandidateFailed`] if the host
    /// rejects the candidate.
    pub async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.peer
            .add_ice_candidate(candidate)
            .await
            .map_err(PeerConnectionError::AddIceCandidateFailed)
            .map_err(tracerr::wrap!())
    }

    /// Indicates whether a remote description is currently set.
    #[inline]
    #[must_use]
    pub fn has_remote_description(&self) -> bool {
        self.peer.has_remote_description()
    }

    /// Returns the current [`SignalingState`].
    #[inline]
    #[must_use]
    pub fn signaling_state(&self) -> SignalingState {
        self.peer.signaling_state()
    }

    /// Returns the current [`IceConnectionState`].
    #[inline]
    #[must_use]
    pub fn ice_connection_state(&self) -> IceConnectionState {
        self.peer.ice_connection_state()
    }

    /// Returns the current [`IceGatheringState`].
    #[inline]
    #[must_use]
    pub fn ice_gathering_state(&self) -> IceGatheringState {
        self.peer.ice_gathering_state()
    }

    /// Returns the current [`PeerConnectionState`].
    #[inline]
    #[must_use]
    pub fn connection_state(&self) -> PeerConnectionState {
        self.peer.connection_state()
    }

    /// Requests a native ICE restart from the host.
    ///
    /// Returns `false` when the host has no such primitive.
    #[inline]
    pub fn restart_ice(&self) -> bool {
        self.peer.restart_ice()
    }

    /// Adds every track of the provided [`LocalStream`] to the peer
    /// connection, unless tracks were added to it before.
    ///
    /// # Errors
    ///
    /// With [`PeerConnectionError::AddTrackFailed`] if the host insertion
    /// fails.
    pub fn add_local_tracks(&self, stream: &LocalStream) -> Result<()> {
        if !self.peer.senders().is_empty() {
            log::debug!("local tracks already added to this peer connection");
            return Ok(());
        }
        for track in stream.tracks() {
            self.peer
                .add_track(track)
                .map_err(PeerConnectionError::AddTrackFailed)
                .map_err(tracerr::wrap!())?;
        }
        Ok(())
    }

    /// Adds a single local track to the peer connection.
    ///
    /// # Errors
    ///
    /// With [`PeerConnectionError::AddTrackFailed`] if the host insertion
    /// fails.
    pub fn add_track(&self, track: Rc<dyn MediaStreamTrack>) -> Result<()> {
        self.peer
            .add_track(track)
            .map_err(PeerConnectionError::AddTrackFailed)
            .map_err(tracerr::wrap!())
    }

    /// Returns the senders currently carrying a track of the provided kind.
    #[must_use]
    pub fn senders_of(&self, kind: MediaKind) -> Vec<Rc<dyn RtpSender>> {
        self.peer
            .senders()
            .into_iter()
            .filter(|s| s.track_kind() == Some(kind))
            .collect()
    }

    /// Removes every sender carrying a track of the provided kind.
    ///
    /// # Errors
    ///
    /// With [`PeerConnectionError::RemoveTrackFailed`] if the host removal
    /// fails.
    pub fn remove_senders_of(&self, kind: MediaKind) -> Result<()> {
        for sender in self.senders_of(kind) {
            self.peer
                .remove_track(&sender)
                .map_err(PeerConnectionError::RemoveTrackFailed)
                .map_err(tracerr::wrap!())?;
        }
        Ok(())
    }

    /// Snapshots the statistics report of the peer connection.
    ///
    /// # Errors
    ///
    /// With [`PeerConnectionError::GetStatsFailed`] if the host retrieval
    /// fails.
    pub async fn get_stats(&self) -> Result<RtcStats> {
        self.peer
            .get_stats()
            .await
            .map_err(PeerConnectionError::GetStatsFailed)
            .map_err(tracerr::wrap!())
    }

    /// Sends a text message over the data channel.
    ///
    /// Returns `false` (without sending) if no open channel exists.
    pub fn send(&self, data: &str) -> bool {
        let channel = self.channel.borrow().clone();
        match channel {
            Some(ch) if ch.ready_state() == DataChannelState::Open => {
                if let Err(e) = ch.send(data) {
                    log::warn!("data channel send failed: {e}");
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    /// Indicates whether the data channel exists and is open.
    #[must_use]
    pub fn is_channel_open(&self) -> bool {
        self.channel
            .borrow()
            .as_ref()
            .map_or(false, |ch| ch.ready_state() == DataChannelState::Open)
    }

    /// Closes the data channel and the peer connection, aborting every
    /// installed listener first.
    pub fn close(&self) {
        self.listeners.abort();
        if let Some(channel) = self.channel.borrow_mut().take() {
            channel.close();
        }
        self.peer.close();
    }
}

impl Drop for Connection {
    /// Aborts the forwarding task, so no host callback outlives the facade.
    fn drop(&mut self) {
        self.listeners.abort();
    }
}

/// Forwards host peer connection events — and the events of every stream
/// attached along the way (data channel, remote tracks) — into `tx`.
async fn forward_events(
    peer_events: LocalBoxStream<'static, PeerConnectionEvent>,
    new_streams: mpsc::UnboundedReceiver<LocalBoxStream<'static, PeerEvent>>,
    tx: mpsc::UnboundedSender<PeerEvent>,
    channel: Rc<RefCell<Option<Rc<dyn platform::DataChannel>>>>,
) {
    let mut peer_events = peer_events.fuse();
    let mut new_streams = new_streams.fuse();
    let mut merged = SelectAll::<LocalBoxStream<'static, PeerEvent>>::new();

    loop {
        let event = futures::select! {
            event = peer_events.next() => match event {
                Some(event) => event,
                None => break,
            },
            event = merged.select_next_some() => {
                drop(tx.unbounded_send(event));
                continue;
            }
            stream = new_streams.select_next_some() => {
                merged.push(stream);
                continue;
            }
        };

        let mapped = match event {
            PeerConnectionEvent::IceCandidate(candidate) => {
                PeerEvent::IceCandidateDiscovered { candidate }
            }
            PeerConnectionEvent::NegotiationNeeded => {
                PeerEvent::NegotiationNeeded
            }
            PeerConnectionEvent::SignalingStateChange(state) => {
                PeerEvent::SignalingStateChanged { state }
            }
            PeerConnectionEvent::IceConnectionStateChange(state) => {
                PeerEvent::IceConnectionStateChanged { state }
            }
            PeerConnectionEvent::IceGatheringStateChange(state) => {
                PeerEvent::IceGatheringStateChanged { state }
            }
            PeerConnectionEvent::ConnectionStateChange(state) => {
                PeerEvent::ConnectionStateChanged { state }
            }
            PeerConnectionEvent::Track(track) => {
                let id = track.id();
                merged.push(Box::pin(track.on_event().map(move |event| {
                    PeerEvent::RemoteTrackStateChanged {
                        id: id.clone(),
                        event,
                    }
                })));
                PeerEvent::RemoteTrackAdded { track }
            }
            PeerConnectionEvent::DataChannel(ch) => {
                merged.push(Box::pin(ch.on_event().map(channel_event)));
                channel.replace(Some(ch));
                continue;
            }
        };
        drop(tx.unbounded_send(mapped));
    }
}
