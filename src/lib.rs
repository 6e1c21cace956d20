//! Client-side WebRTC call orchestrator.
//!
//! Drives a single peer-to-peer audio/video session from idle through device
//! acquisition, SDP offer/answer negotiation, ICE candidate exchange and
//! media streaming, to controlled teardown — restarting ICE or the entire
//! call when connectivity degrades.
//!
//! The host runtime (peer connection primitive, media devices), the
//! signaling carrier and the network probe are external collaborators,
//! plugged in through the contracts of the [`platform`], [`signaling`] and
//! [`network`] modules. Everything here runs on a single-threaded
//! cooperative executor; create a [`Call`] inside a `LocalSet`-like context.

#![allow(clippy::module_name_repetitions)]

pub mod call;
pub mod events;
pub mod media;
pub mod network;
pub mod peer;
pub mod platform;
pub mod sdp;
pub mod signaling;

pub use self::{
    call::{
        Call, CallConfig, CallError, CallHandle, CallState, DeviceSwitchError,
        ExternalControls, FinishCallError, HandleDetachedError,
        NegotiationRole,
    },
    events::{CallEvent, EventEmitter, SubscriptionId},
    media::{MediaKind, MediaManager, MediaStreamSettings},
    network::{NetworkStatus, NetworkSupervisor},
    sdp::BandwidthLimit,
    signaling::{RoomId, SignalingClient},
};
