//! Fake collaborators driving the orchestrator in integration tests.

#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::Duration,
};

use futures::{
    channel::mpsc,
    future::{self, LocalBoxFuture},
    stream::{self, LocalBoxStream},
};
use parley::{
    media::{
        DisplayMediaConstraints, MediaKind, MediaManager,
        MediaStreamConstraints,
    },
    network::{NetworkStatus, NetworkSupervisor},
    platform::{
        DataChannel, DataChannelEvent, DataChannelState, Error, ErrorKind,
        IceCandidate, IceConnectionState, IceGatheringState, InputDeviceInfo,
        MediaDeviceKind, MediaDevices, MediaStreamTrack, OfferOptions,
        PeerConnectionEvent, PeerConnectionFactory, PeerConnectionState,
        RtcConfiguration, RtcPeerConnection, RtcStat, RtcStatKind, RtcStats,
        RtpSender, SdpType, SignalingState, TrackEvent,
    },
    signaling::{
        RoomAck, RoomId, RoomInteraction, RoomRequest, SignalingClient,
        SignalingTransport, TransportError,
    },
    Call, CallConfig, CallEvent, CallHandle,
};
use serde_json::{json, Value};

/// SDP every fake peer produces and receives; two media sections, each with
/// a connection line.
pub const SDP: &str = "v=0\r\n\
                       o=- 1 0 IN IP4 127.0.0.1\r\n\
                       s=-\r\n\
                       t=0 0\r\n\
                       m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
                       c=IN IP4 0.0.0.0\r\n\
                       a=sendrecv\r\n\
                       m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
                       c=IN IP4 0.0.0.0\r\n\
                       a=sendrecv\r\n";

/// Lets every queued local task and channel hop run.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Advances the paused clock past the given duration, letting timers fire.
pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
    settle().await;
}

// ===== Media =====

/// Host track fake.
pub struct FakeTrack {
    pub id: String,
    pub kind: MediaKind,
    pub device_id: Option<String>,
    pub enabled: Cell<bool>,
    pub stopped: Cell<bool>,
    events_tx: mpsc::UnboundedSender<TrackEvent>,
    events_rx: RefCell<Option<mpsc::UnboundedReceiver<TrackEvent>>>,
}

impl FakeTrack {
    pub fn new(kind: MediaKind, id: &str, device_id: Option<String>) -> Rc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded();
        Rc::new(Self {
            id: id.to_owned(),
            kind,
            device_id,
            enabled: Cell::new(true),
            stopped: Cell::new(false),
            events_tx,
            events_rx: RefCell::new(Some(events_rx)),
        })
    }

    /// Fires a host-side track lifecycle event.
    pub fn fire(&self, event: TrackEvent) {
        self.events_tx.unbounded_send(event).unwrap();
    }
}

impl MediaStreamTrack for FakeTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn label(&self) -> String {
        self.id.clone()
    }

    fn device_id(&self) -> Option<String> {
        self.device_id.clone()
    }

    fn enabled(&self) -> bool {
        self.enabled.get()
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    fn stop(&self) {
        self.stopped.set(true);
    }

    fn on_event(&self) -> LocalBoxStream<'static, TrackEvent> {
        match self.events_rx.borrow_mut().take() {
            Some(rx) => Box::pin(rx),
            None => Box::pin(stream::pending()),
        }
    }

    fn switch_camera(
        &self,
    ) -> Option<LocalBoxFuture<'static, Result<(), Error>>> {
        None
    }
}

/// Host media entry point fake: one camera and one microphone by default.
pub struct FakeDevices {
    pub devices: RefCell<Vec<InputDeviceInfo>>,
    pub fail_user_media: RefCell<Option<Error>>,
    pub acquired: RefCell<Vec<Rc<FakeTrack>>>,
    counter: Cell<usize>,
}

impl FakeDevices {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            devices: RefCell::new(vec![
                InputDeviceInfo {
                    device_id: "cam-1".to_owned(),
                    kind: MediaDeviceKind::VideoInput,
                    label: "Integrated Camera".to_owned(),
                    facing: None,
                },
                InputDeviceInfo {
                    device_id: "mic-1".to_owned(),
                    kind: MediaDeviceKind::AudioInput,
                    label: "Integrated Microphone".to_owned(),
                    facing: None,
                },
            ]),
            fail_user_media: RefCell::new(None),
            acquired: RefCell::new(Vec::new()),
            counter: Cell::new(0),
        })
    }

    fn make_track(
        &self,
        kind: MediaKind,
        device_id: Option<String>,
    ) -> Rc<FakeTrack> {
        let n = self.counter.get();
        self.counter.set(n + 1);
        let track = FakeTrack::new(kind, &format!("{kind}-{n}"), device_id);
        self.acquired.borrow_mut().push(Rc::clone(&track));
        track
    }
}

impl MediaDevices for FakeDevices {
    fn enumerate_devices(
        &self,
    ) -> LocalBoxFuture<'static, Result<Vec<InputDeviceInfo>, Error>> {
        Box::pin(future::ready(Ok(self.devices.borrow().clone())))
    }

    fn get_user_media(
        &self,
        caps: MediaStreamConstraints,
    ) -> LocalBoxFuture<'static, Result<Vec<Rc<dyn MediaStreamTrack>>, Error>>
    {
        if let Some(err) = self.fail_user_media.borrow().clone() {
            return Box::pin(future::ready(Err(err)));
        }
        let mut tracks: Vec<Rc<dyn MediaStreamTrack>> = Vec::new();
        if let Some(video) = caps.video {
            tracks.push(self.make_track(MediaKind::Video, video.device_id));
        }
        if let Some(audio) = caps.audio {
            tracks.push(self.make_track(MediaKind::Audio, audio.device_id));
        }
        Box::pin(future::ready(Ok(tracks)))
    }

    fn get_display_media(
        &self,
        _: DisplayMediaConstraints,
    ) -> LocalBoxFuture<'static, Result<Vec<Rc<dyn MediaStreamTrack>>, Error>>
    {
        let track: Rc<dyn MediaStreamTrack> =
            self.make_track(MediaKind::Video, None);
        Box::pin(future::ready(Ok(vec![track])))
    }
}

// ===== Peer connection =====

/// Host sender fake.
pub struct FakeSender {
    pub kind: MediaKind,
    pub replaceable: bool,
    pub track: RefCell<Rc<dyn MediaStreamTrack>>,
    pub replacements: Cell<usize>,
}

impl RtpSender for FakeSender {
    fn track_kind(&self) -> Option<MediaKind> {
        Some(self.kind)
    }

    fn replaceable(&self) -> bool {
        self.replaceable
    }

    fn replace_track(
        &self,
        track: Rc<dyn MediaStreamTrack>,
    ) -> LocalBoxFuture<'static, Result<(), Error>> {
        self.track.replace(track);
        self.replacements.set(self.replacements.get() + 1);
        Box::pin(future::ready(Ok(())))
    }
}

/// Host data channel fake.
pub struct FakeChannel {
    pub state: Cell<DataChannelState>,
    pub sent: RefCell<Vec<String>>,
    pub closed: Cell<bool>,
    events_tx: mpsc::UnboundedSender<DataChannelEvent>,
    events_rx: RefCell<Option<mpsc::UnboundedReceiver<DataChannelEvent>>>,
}

impl FakeChannel {
    pub fn new() -> Rc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded();
        Rc::new(Self {
            state: Cell::new(DataChannelState::Connecting),
            sent: RefCell::new(Vec::new()),
            closed: Cell::new(false),
            events_tx,
            events_rx: RefCell::new(Some(events_rx)),
        })
    }

    /// Transitions the channel to its open state.
    pub fn open(&self) {
        self.state.set(DataChannelState::Open);
        self.events_tx
            .unbounded_send(DataChannelEvent::Open)
            .unwrap();
    }

    /// Delivers an inbound message.
    pub fn deliver(&self, msg: &str) {
        self.events_tx
            .unbounded_send(DataChannelEvent::Message(msg.to_owned()))
            .unwrap();
    }

    /// Closes the channel from the remote side.
    pub fn remote_close(&self) {
        self.state.set(DataChannelState::Closed);
        self.events_tx
            .unbounded_send(DataChannelEvent::Close)
            .unwrap();
    }
}

impl DataChannel for FakeChannel {
    fn send(&self, data: &str) -> Result<(), Error> {
        if self.state.get() == DataChannelState::Open {
            self.sent.borrow_mut().push(data.to_owned());
            Ok(())
        } else {
            Err(Error::new(ErrorKind::Other, "channel is not open"))
        }
    }

    fn ready_state(&self) -> DataChannelState {
        self.state.get()
    }

    fn on_event(&self) -> LocalBoxStream<'static, DataChannelEvent> {
        match self.events_rx.borrow_mut().take() {
            Some(rx) => Box::pin(rx),
            None => Box::pin(stream::pending()),
        }
    }

    fn close(&self) {
        self.state.set(DataChannelState::Closed);
        self.closed.set(true);
    }
}

/// Host peer connection fake, with browser-faithful signaling state
/// transitions on description application.
pub struct FakePeer {
    pub signaling_state: Cell<SignalingState>,
    pub ice_connection: Cell<IceConnectionState>,
    pub ice_gathering: Cell<IceGatheringState>,
    pub connection: Cell<PeerConnectionState>,
    pub has_remote: Cell<bool>,
    pub local_sdp: RefCell<Option<SdpType>>,
    pub remote_sdp: RefCell<Option<SdpType>>,
    pub added_candidates: RefCell<Vec<IceCandidate>>,
    pub senders: RefCell<Vec<Rc<FakeSender>>>,
    pub channel: RefCell<Option<Rc<FakeChannel>>>,
    pub restart_ice_supported: bool,
    pub sender_replaceable: bool,
    pub restart_ice_calls: Cell<usize>,
    pub ice_restart_offers: Cell<usize>,
    pub stats: RefCell<RtcStats>,
    pub get_stats_calls: Cell<usize>,
    pub closed: Cell<bool>,
    events_tx: mpsc::UnboundedSender<PeerConnectionEvent>,
    events_rx: RefCell<Option<mpsc::UnboundedReceiver<PeerConnectionEvent>>>,
}

impl FakePeer {
    pub fn new(restart_ice_supported: bool, sender_replaceable: bool) -> Rc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded();
        Rc::new(Self {
            signaling_state: Cell::new(SignalingState::Stable),
            ice_connection: Cell::new(IceConnectionState::New),
            ice_gathering: Cell::new(IceGatheringState::New),
            connection: Cell::new(PeerConnectionState::New),
            has_remote: Cell::new(false),
            local_sdp: RefCell::new(None),
            remote_sdp: RefCell::new(None),
            added_candidates: RefCell::new(Vec::new()),
            senders: RefCell::new(Vec::new()),
            channel: RefCell::new(None),
            restart_ice_supported,
            sender_replaceable,
            restart_ice_calls: Cell::new(0),
            ice_restart_offers: Cell::new(0),
            stats: RefCell::new(RtcStats::default()),
            get_stats_calls: Cell::new(0),
            closed: Cell::new(false),
            events_tx,
            events_rx: RefCell::new(Some(events_rx)),
        })
    }

    fn emit(&self, event: PeerConnectionEvent) {
        drop(self.events_tx.unbounded_send(event));
    }

    /// Fires the host `negotiationneeded` callback.
    pub fn fire_negotiation_needed(&self) {
        self.emit(PeerConnectionEvent::NegotiationNeeded);
    }

    /// Discovers a local ICE candidate.
    pub fn discover_candidate(&self, candidate: IceCandidate) {
        self.emit(PeerConnectionEvent::IceCandidate(Some(candidate)));
    }

    /// Transitions the ICE connection state.
    pub fn set_ice_connection_state(&self, state: IceConnectionState) {
        self.ice_connection.set(state);
        self.emit(PeerConnectionEvent::IceConnectionStateChange(state));
    }

    /// Transitions the ICE gathering state.
    pub fn set_ice_gathering_state(&self, state: IceGatheringState) {
        self.ice_gathering.set(state);
        self.emit(PeerConnectionEvent::IceGatheringStateChange(state));
    }

    /// Transitions the aggregate connection state.
    pub fn set_connection_state(&self, state: PeerConnectionState) {
        self.connection.set(state);
        self.emit(PeerConnectionEvent::ConnectionStateChange(state));
    }

    /// Delivers a remote track.
    pub fn deliver_remote_track(&self, track: Rc<FakeTrack>) {
        self.emit(PeerConnectionEvent::Track(track));
    }

    /// Delivers a remotely opened data channel (answerer side).
    pub fn deliver_data_channel(&self, channel: Rc<FakeChannel>) {
        self.emit(PeerConnectionEvent::DataChannel(channel));
    }
}

impl RtcPeerConnection for FakePeer {
    fn create_offer(
        &self,
        options: OfferOptions,
    ) -> LocalBoxFuture<'static, Result<String, Error>> {
        if options.ice_restart {
            self.ice_restart_offers.set(self.ice_restart_offers.get() + 1);
        }
        Box::pin(future::ready(Ok(SDP.to_owned())))
    }

    fn create_answer(&self) -> LocalBoxFuture<'static, Result<String, Error>> {
        Box::pin(future::ready(Ok(SDP.to_owned())))
    }

    fn set_local_description(
        &self,
        sdp: SdpType,
    ) -> LocalBoxFuture<'static, Result<(), Error>> {
        let state = match &sdp {
            SdpType::Offer(_) => SignalingState::HaveLocalOffer,
            SdpType::Answer(_) => SignalingState::Stable,
        };
        self.local_sdp.replace(Some(sdp));
        self.signaling_state.set(state);
        self.emit(PeerConnectionEvent::SignalingStateChange(state));
        Box::pin(future::ready(Ok(())))
    }

    fn set_remote_description(
        &self,
        sdp: SdpType,
    ) -> LocalBoxFuture<'static, Result<(), Error>> {
        let state = match &sdp {
            SdpType::Offer(_) => SignalingState::HaveRemoteOffer,
            SdpType::Answer(_) => SignalingState::Stable,
        };
        self.remote_sdp.replace(Some(sdp));
        self.has_remote.set(true);
        self.signaling_state.set(state);
        self.emit(PeerConnectionEvent::SignalingStateChange(state));
        Box::pin(future::ready(Ok(())))
    }

    fn has_remote_description(&self) -> bool {
        self.has_remote.get()
    }

    fn add_ice_candidate(
        &self,
        candidate: IceCandidate,
    ) -> LocalBoxFuture<'static, Result<(), Error>> {
        self.added_candidates.borrow_mut().push(candidate);
        Box::pin(future::ready(Ok(())))
    }

    fn restart_ice(&self) -> bool {
        if self.restart_ice_supported {
            self.restart_ice_calls.set(self.restart_ice_calls.get() + 1);
            true
        } else {
            false
        }
    }

    fn signaling_state(&self) -> SignalingState {
        self.signaling_state.get()
    }

    fn ice_connection_state(&self) -> IceConnectionState {
        self.ice_connection.get()
    }

    fn ice_gathering_state(&self) -> IceGatheringState {
        self.ice_gathering.get()
    }

    fn connection_state(&self) -> PeerConnectionState {
        self.connection.get()
    }

    fn add_track(&self, track: Rc<dyn MediaStreamTrack>) -> Result<(), Error> {
        self.senders.borrow_mut().push(Rc::new(FakeSender {
            kind: track.kind(),
            replaceable: self.sender_replaceable,
            track: RefCell::new(track),
            replacements: Cell::new(0),
        }));
        Ok(())
    }

    fn senders(&self) -> Vec<Rc<dyn RtpSender>> {
        self.senders
            .borrow()
            .iter()
            .map(|s| Rc::clone(s) as Rc<dyn RtpSender>)
            .collect()
    }

    fn remove_track(&self, sender: &Rc<dyn RtpSender>) -> Result<(), Error> {
        let kind = sender.track_kind();
        self.senders
            .borrow_mut()
            .retain(|s| Some(s.kind) != kind);
        Ok(())
    }

    fn create_data_channel(
        &self,
        _label: &str,
        _ordered: bool,
    ) -> Result<Rc<dyn DataChannel>, Error> {
        let channel = FakeChannel::new();
        self.channel.replace(Some(Rc::clone(&channel)));
        Ok(channel)
    }

    fn get_stats(&self) -> LocalBoxFuture<'static, Result<RtcStats, Error>> {
        self.get_stats_calls.set(self.get_stats_calls.get() + 1);
        Box::pin(future::ready(Ok(self.stats.borrow().clone())))
    }

    fn on_event(&self) -> LocalBoxStream<'static, PeerConnectionEvent> {
        match self.events_rx.borrow_mut().take() {
            Some(rx) => Box::pin(rx),
            None => Box::pin(stream::pending()),
        }
    }

    fn close(&self) {
        self.closed.set(true);
        self.signaling_state.set(SignalingState::Closed);
    }
}

/// Factory of [`FakePeer`]s, recording every creation.
pub struct FakeFactory {
    pub created: RefCell<Vec<Rc<FakePeer>>>,
    pub fail_next: Cell<bool>,
    pub restart_ice_supported: Cell<bool>,
    pub sender_replaceable: Cell<bool>,
}

impl FakeFactory {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            created: RefCell::new(Vec::new()),
            fail_next: Cell::new(false),
            restart_ice_supported: Cell::new(true),
            sender_replaceable: Cell::new(true),
        })
    }

    /// Returns the most recently created peer.
    pub fn latest(&self) -> Rc<FakePeer> {
        Rc::clone(self.created.borrow().last().unwrap())
    }

    pub fn created_count(&self) -> usize {
        self.created.borrow().len()
    }
}

impl PeerConnectionFactory for FakeFactory {
    fn create(
        &self,
        _: &RtcConfiguration,
    ) -> Result<Rc<dyn RtcPeerConnection>, Error> {
        if self.fail_next.replace(false) {
            return Err(Error::new(ErrorKind::Other, "creation failed"));
        }
        let peer = FakePeer::new(
            self.restart_ice_supported.get(),
            self.sender_replaceable.get(),
        );
        self.created.borrow_mut().push(Rc::clone(&peer));
        Ok(peer)
    }
}

// ===== Network =====

/// Reachability probe fake.
pub struct FakeNetwork {
    /// Probe answer; [`None`] stalls forever (probe timeout path).
    pub online: RefCell<Option<bool>>,
    pub probes: Cell<usize>,
    change_txs: RefCell<Vec<mpsc::UnboundedSender<bool>>>,
}

impl FakeNetwork {
    pub fn new(online: Option<bool>) -> Rc<Self> {
        Rc::new(Self {
            online: RefCell::new(online),
            probes: Cell::new(0),
            change_txs: RefCell::new(Vec::new()),
        })
    }

    /// Publishes an online/offline transition.
    pub fn emit_change(&self, online: bool) {
        self.change_txs
            .borrow_mut()
            .retain(|tx| tx.unbounded_send(online).is_ok());
    }

    pub fn listeners(&self) -> usize {
        self.change_txs
            .borrow()
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }
}

impl NetworkStatus for FakeNetwork {
    fn is_online(&self, _: Duration) -> LocalBoxFuture<'static, bool> {
        self.probes.set(self.probes.get() + 1);
        match *self.online.borrow() {
            Some(online) => Box::pin(future::ready(online)),
            None => Box::pin(future::pending()),
        }
    }

    fn on_change(&self) -> LocalBoxStream<'static, bool> {
        let (tx, rx) = mpsc::unbounded();
        self.change_txs.borrow_mut().push(tx);
        Box::pin(rx)
    }
}

// ===== Signaling =====

/// Outbound signaling call recorded by [`FakeSignaling`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SentCall {
    Connect(String),
    Joined(String),
    Disconnect(String),
    Finish(String),
    Offer(String),
    Answer(String),
    Candidate(String),
}

/// Signaling transport fake driven by the test.
pub struct FakeSignaling {
    pub calls: RefCell<Vec<SentCall>>,
    sub_tx: RefCell<
        Option<mpsc::UnboundedSender<Result<RoomInteraction, TransportError>>>,
    >,
}

impl FakeSignaling {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            calls: RefCell::new(Vec::new()),
            sub_tx: RefCell::new(None),
        })
    }

    fn record(&self, call: SentCall) {
        self.calls.borrow_mut().push(call);
    }

    /// Pushes a raw subscription item.
    pub fn push(&self, item: Result<RoomInteraction, TransportError>) {
        self.sub_tx
            .borrow()
            .as_ref()
            .unwrap()
            .unbounded_send(item)
            .unwrap();
    }

    /// Delivers a `newPeer` subscription payload.
    pub fn push_new_peer(&self, id: &str) {
        self.push(Ok(RoomInteraction {
            new_peer: Some(json!({ "id": id })),
            ..RoomInteraction::default()
        }));
    }

    /// Delivers a `newOffer` subscription payload.
    pub fn push_offer(&self, sdp: &str) {
        self.push(Ok(RoomInteraction {
            new_offer: Some(json!({ "type": "offer", "sdp": sdp })),
            ..RoomInteraction::default()
        }));
    }

    /// Delivers a `newAnswer` subscription payload.
    pub fn push_answer(&self, sdp: &str) {
        self.push(Ok(RoomInteraction {
            new_answer: Some(json!({ "type": "answer", "sdp": sdp })),
            ..RoomInteraction::default()
        }));
    }

    /// Delivers a `newIceCandidate` subscription payload.
    pub fn push_candidate(&self, candidate: &str, line_index: u16) {
        self.push(Ok(RoomInteraction {
            new_ice_candidate: Some(json!({
                "candidate": candidate,
                "sdpMid": "0",
                "sdpMLineIndex": line_index,
            })),
            ..RoomInteraction::default()
        }));
    }

    /// Returns every recorded call of the given shape.
    pub fn filter<F: Fn(&SentCall) -> Option<String>>(
        &self,
        f: F,
    ) -> Vec<String> {
        self.calls.borrow().iter().filter_map(f).collect()
    }

    pub fn offers(&self) -> Vec<String> {
        self.filter(|c| match c {
            SentCall::Offer(sdp) => Some(sdp.clone()),
            _ => None,
        })
    }

    pub fn answers(&self) -> Vec<String> {
        self.filter(|c| match c {
            SentCall::Answer(sdp) => Some(sdp.clone()),
            _ => None,
        })
    }

    pub fn candidates(&self) -> Vec<String> {
        self.filter(|c| match c {
            SentCall::Candidate(c) => Some(c.clone()),
            _ => None,
        })
    }

    pub fn count_finishes(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, SentCall::Finish(_)))
            .count()
    }

    pub fn count_disconnects(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, SentCall::Disconnect(_)))
            .count()
    }

    pub fn count_connects(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, SentCall::Connect(_)))
            .count()
    }
}

fn ack(
    id: RoomId,
) -> LocalBoxFuture<'static, Result<RoomAck, TransportError>> {
    Box::pin(future::ready(Ok(RoomAck { id })))
}

impl SignalingTransport for FakeSignaling {
    fn connect(
        &self,
        req: RoomRequest,
    ) -> LocalBoxFuture<'static, Result<RoomAck, TransportError>> {
        self.record(SentCall::Connect(req.id.0.clone()));
        ack(req.id)
    }

    fn joined(
        &self,
        req: RoomRequest,
    ) -> LocalBoxFuture<'static, Result<RoomAck, TransportError>> {
        self.record(SentCall::Joined(req.id.0.clone()));
        ack(req.id)
    }

    fn disconnect(
        &self,
        req: RoomRequest,
    ) -> LocalBoxFuture<'static, Result<RoomAck, TransportError>> {
        self.record(SentCall::Disconnect(req.id.0.clone()));
        ack(req.id)
    }

    fn finish(
        &self,
        req: RoomRequest,
    ) -> LocalBoxFuture<'static, Result<RoomAck, TransportError>> {
        self.record(SentCall::Finish(req.id.0.clone()));
        ack(req.id)
    }

    fn send_sdp_offer(
        &self,
        sdp: String,
        room_id: RoomId,
    ) -> LocalBoxFuture<'static, Result<RoomAck, TransportError>> {
        self.record(SentCall::Offer(sdp));
        ack(room_id)
    }

    fn send_sdp_answer(
        &self,
        sdp: String,
        room_id: RoomId,
    ) -> LocalBoxFuture<'static, Result<RoomAck, TransportError>> {
        self.record(SentCall::Answer(sdp));
        ack(room_id)
    }

    fn send_ice_candidate(
        &self,
        candidate: String,
        room_id: RoomId,
    ) -> LocalBoxFuture<'static, Result<RoomAck, TransportError>> {
        self.record(SentCall::Candidate(candidate));
        ack(room_id)
    }

    fn subscribe(
        &self,
    ) -> LocalBoxStream<'static, Result<RoomInteraction, TransportError>> {
        let (tx, rx) = mpsc::unbounded();
        self.sub_tx.replace(Some(tx));
        Box::pin(rx)
    }
}

// ===== Harness =====

/// A [`Call`] wired to fakes, with every observable surface recorded.
pub struct TestCall {
    pub call: Call,
    pub handle: CallHandle,
    pub signaling: Rc<FakeSignaling>,
    pub devices: Rc<FakeDevices>,
    pub network: Rc<FakeNetwork>,
    pub factory: Rc<FakeFactory>,
    pub events: Rc<RefCell<Vec<CallEvent>>>,
}

impl TestCall {
    pub fn build(config: CallConfig) -> Self {
        let signaling = FakeSignaling::new();
        let devices = FakeDevices::new();
        let network = FakeNetwork::new(Some(true));
        let factory = FakeFactory::new();

        let call = Call::new(
            Rc::new(SignalingClient::new(
                Rc::clone(&signaling) as Rc<dyn SignalingTransport>
            )),
            Rc::new(MediaManager::new(
                Rc::clone(&devices) as Rc<dyn MediaDevices>
            )),
            Rc::new(NetworkSupervisor::new(
                Rc::clone(&network) as Rc<dyn NetworkStatus>
            )),
            Rc::clone(&factory) as Rc<dyn PeerConnectionFactory>,
            config,
        );
        let handle = call.handle();

        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        handle
            .on_event(move |event| sink.borrow_mut().push(event.clone()))
            .unwrap();

        Self {
            call,
            handle,
            signaling,
            devices,
            network,
            factory,
            events,
        }
    }

    /// Starts the call in room `r1` and answers the synthetic peer arrival,
    /// leaving the call matched with an open data channel.
    pub async fn start_matched(&self) -> Rc<FakePeer> {
        self.handle
            .start(RoomId::from("r1"), parley::MediaStreamSettings::default())
            .await
            .unwrap();
        settle().await;
        self.signaling.push_new_peer("r1");
        settle().await;

        let peer = self.factory.latest();
        peer.fire_negotiation_needed();
        settle().await;
        self.signaling.push_answer(SDP);
        settle().await;
        let channel = peer.channel.borrow().clone().unwrap();
        channel.open();
        settle().await;
        peer
    }

    /// Codes of every error event seen so far.
    pub fn error_codes(&self) -> Vec<&'static str> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                CallEvent::Error(err) => Some(err.code()),
                _ => None,
            })
            .collect()
    }

    /// Number of `change` events seen so far.
    pub fn change_count(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| matches!(e, CallEvent::Change))
            .count()
    }
}

/// Builds a stats report with a single outbound-video entry.
pub fn video_out_stats(bytes: u64, timestamp_ms: f64) -> RtcStats {
    RtcStats(vec![RtcStat {
        id: "out-video".to_owned(),
        timestamp_ms,
        kind: RtcStatKind::OutboundRtp {
            media_kind: MediaKind::Video,
            bytes_sent: bytes,
        },
    }])
}

/// Extracts the SDP string out of a wire-encoded session description.
pub fn wire_sdp(json: &str) -> String {
    let value: Value = serde_json::from_str(json).unwrap();
    value["sdp"].as_str().unwrap().to_owned()
}
