//! Statistics reports of a peer connection.
//!
//! A host [`RtcPeerConnection`] snapshots its [RTCStatsReport][1] into this
//! structured form; only the entries relevant to bitrate supervision are
//! modeled, everything else is [`RtcStatKind::Other`].
//!
//! [`RtcPeerConnection`]: super::RtcPeerConnection
//! [1]: https://w3.org/TR/webrtc/#dom-rtcstatsreport

use crate::media::MediaKind;

/// All statistics entries of a peer connection at one instant.
#[derive(Clone, Debug, Default)]
pub struct RtcStats(pub Vec<RtcStat>);

/// Single entry of an [`RtcStats`] report.
#[derive(Clone, Debug)]
pub struct RtcStat {
    /// Unique id of the object this entry was sampled from.
    pub id: String,

    /// Timestamp of this entry, in milliseconds since the UNIX epoch.
    pub timestamp_ms: f64,

    /// Typed payload of this entry.
    pub kind: RtcStatKind,
}

/// Payload of an [`RtcStat`] entry.
#[derive(Clone, Debug)]
pub enum RtcStatKind {
    /// [RTCInboundRtpStreamStats][1] of a received stream.
    ///
    /// [1]: https://w3.org/TR/webrtc-stats/#inboundrtpstats-dict*
    InboundRtp {
        /// Media kind of the measured stream.
        media_kind: MediaKind,

        /// Total bytes received on this stream so far.
        bytes_received: u64,
    },

    /// [RTCOutboundRtpStreamStats][1] of a sent stream.
    ///
    /// [1]: https://w3.org/TR/webrtc-stats/#outboundrtpstats-dict*
    OutboundRtp {
        /// Media kind of the measured stream.
        media_kind: MediaKind,

        /// Total bytes sent on this stream so far.
        bytes_sent: u64,
    },

    /// Entry irrelevant to bitrate supervision.
    Other,
}
