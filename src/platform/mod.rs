//! Host-provided primitives the orchestrator is built against.
//!
//! Every contract here is satisfied by the embedder: a browser runtime, a
//! native WebRTC stack, or the fakes used in tests. The orchestrator itself
//! is host-agnostic.

pub mod error;
pub mod media;
pub mod peer;
pub mod rtc_stats;
pub mod task;

pub use self::{
    error::{Error, ErrorKind},
    media::{
        FacingMode, InputDeviceInfo, MediaDeviceKind, MediaDevices,
        MediaStreamTrack, TrackEvent,
    },
    peer::{
        DataChannel, DataChannelEvent, DataChannelState, IceCandidate,
        IceConnectionState, IceGatheringState, IceServer, OfferOptions,
        PeerConnectionEvent, PeerConnectionFactory, PeerConnectionState,
        RtcConfiguration, RtcPeerConnection, RtpSender, SdpType,
        SignalingState,
    },
    rtc_stats::{RtcStat, RtcStatKind, RtcStats},
    task::{delay_for, spawn},
};

#[cfg(feature = "mockable")]
pub use self::{
    media::{MockMediaDevices, MockMediaStreamTrack},
    peer::{
        MockDataChannel, MockPeerConnectionFactory, MockRtcPeerConnection,
        MockRtpSender,
    },
};
