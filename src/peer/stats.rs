//! Conversion of raw statistics reports into sampled bitrates.

use std::collections::HashMap;

use crate::{
    media::MediaKind,
    platform::{RtcStatKind, RtcStats},
};

/// Per-direction bitrates of one media kind, in kbps.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DirectionalBitrate {
    /// Inbound (receiving) bitrate.
    pub input: u64,

    /// Outbound (sending) bitrate.
    pub output: u64,
}

/// Sampled bitrates of every media channel, in kbps.
///
/// A channel with no statistics (or no prior sample to diff against)
/// contributes `0`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Bitrate {
    /// Video channels.
    pub video: DirectionalBitrate,

    /// Audio channels.
    pub audio: DirectionalBitrate,
}

/// One of the four byte-counter channels a peer connection exposes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
enum Channel {
    VideoIn,
    VideoOut,
    AudioIn,
    AudioOut,
}

/// Retained `{bytes, timestamp}` of a channel's last report.
#[derive(Clone, Copy, Debug)]
struct Sample {
    bytes: u64,
    timestamp_ms: f64,
}

/// Stateful converter of successive [`RtcStats`] reports into [`Bitrate`]s.
///
/// Pure over successive calls except for the retained prior-sample state,
/// which is per-instance.
#[derive(Default)]
pub struct BitrateSampler {
    /// Last seen sample of every channel.
    last: HashMap<Channel, Sample>,
}

impl BitrateSampler {
    /// Creates a new [`BitrateSampler`] with no retained samples.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds the provided report into this sampler and returns the bitrates
    /// observed since the previous call.
    pub fn sample(&mut self, stats: &RtcStats) -> Bitrate {
        let mut bitrate = Bitrate::default();
        for stat in &stats.0 {
            let (channel, bytes) = match &stat.kind {
                RtcStatKind::InboundRtp {
                    media_kind,
                    bytes_received,
                } => (
                    match media_kind {
                        MediaKind::Video => Channel::VideoIn,
                        MediaKind::Audio => Channel::AudioIn,
                    },
                    *bytes_received,
                ),
                RtcStatKind::OutboundRtp {
                    media_kind,
                    bytes_sent,
                } => (
                    match media_kind {
                        MediaKind::Video => Channel::VideoOut,
                        MediaKind::Audio => Channel::AudioOut,
                    },
                    *bytes_sent,
                ),
                RtcStatKind::Other => continue,
            };

            let current = Sample {
                bytes,
                timestamp_ms: stat.timestamp_ms,
            };
            let kbps = self
                .last
                .insert(channel, current)
                .map_or(0, |prev| rate_kbps(prev, current));

            let slot = match channel {
                Channel::VideoIn => &mut bitrate.video.input,
                Channel::VideoOut => &mut bitrate.video.output,
                Channel::AudioIn => &mut bitrate.audio.input,
                Channel::AudioOut => &mut bitrate.audio.output,
            };
            *slot = kbps;
        }
        bitrate
    }
}

/// Computes `floor(8·Δbytes / Δtimestamp_ms)`, which is kbps given byte
/// counters and millisecond timestamps.
///
/// A non-positive time delta or a counter reset yields `0`.
fn rate_kbps(prev: Sample, current: Sample) -> u64 {
    let delta_ms = current.timestamp_ms - prev.timestamp_ms;
    if delta_ms <= 0.0 || current.bytes < prev.bytes {
        return 0;
    }
    let delta_bytes = (current.bytes - prev.bytes) as f64;
    (8.0 * delta_bytes / delta_ms).floor() as u64
}

#[cfg(test)]
mod tests {
    use crate::platform::RtcStat;

    use super::*;

    fn report(timestamp_ms: f64, bytes: u64) -> RtcStats {
        RtcStats(vec![
            RtcStat {
                id: "in-video".to_owned(),
                timestamp_ms,
                kind: RtcStatKind::InboundRtp {
                    media_kind: MediaKind::Video,
                    bytes_received: bytes,
                },
            },
            RtcStat {
                id: "out-video".to_owned(),
                timestamp_ms,
                kind: RtcStatKind::OutboundRtp {
                    media_kind: MediaKind::Video,
                    bytes_sent: bytes * 2,
                },
            },
            RtcStat {
                id: "out-audio".to_owned(),
                timestamp_ms,
                kind: RtcStatKind::OutboundRtp {
                    media_kind: MediaKind::Audio,
                    bytes_sent: bytes / 2,
                },
            },
        ])
    }

    #[test]
    fn first_sample_is_all_zeroes() {
        let mut sampler = BitrateSampler::new();
        assert_eq!(sampler.sample(&report(1_000.0, 125_000)), Bitrate::default());
    }

    #[test]
    fn computes_per_channel_rates() {
        let mut sampler = BitrateSampler::new();
        sampler.sample(&report(0.0, 0));
        let bitrate = sampler.sample(&report(1_000.0, 125_000));

        // 125000 bytes over 1000 ms is 1000 kbps.
        assert_eq!(bitrate.video.input, 1_000);
        assert_eq!(bitrate.video.output, 2_000);
        assert_eq!(bitrate.audio.output, 500);
        // No inbound audio entry at all.
        assert_eq!(bitrate.audio.input, 0);
    }

    #[test]
    fn identical_reports_yield_identical_output() {
        let mut sampler = BitrateSampler::new();
        sampler.sample(&report(0.0, 0));
        let first = sampler.sample(&report(2_000.0, 250_000));
        let second = sampler.sample(&report(2_000.0, 250_000));
        assert_ne!(first, Bitrate::default());
        assert_eq!(second, sampler.sample(&report(2_000.0, 250_000)));
    }

    #[test]
    fn counter_reset_contributes_zero() {
        let mut sampler = BitrateSampler::new();
        sampler.sample(&report(0.0, 125_000));
        let bitrate = sampler.sample(&report(1_000.0, 1_000));
        assert_eq!(bitrate.video.input, 0);
    }
}
