//! Peer connection facade and its supporting pieces.

pub mod candidates;
pub mod conn;
pub mod stats;

pub use self::{
    candidates::IceCandidateBuffer,
    conn::{
        Connection, PeerConnectionError, PeerEvent, PeerEventHandler,
        DATA_CHANNEL_LABEL,
    },
    stats::{Bitrate, BitrateSampler, DirectionalBitrate},
};
