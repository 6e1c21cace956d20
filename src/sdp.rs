//! Rewriting of locally produced SDP.
//!
//! Two independent concerns:
//! - enforcing a maximum bitrate by maintaining [bandwidth lines][1]
//!   (`b=AS:…` in kbps and `b=TIAS:…` in bps) in every media section;
//! - optionally round-tripping the SDP through a structural parse to drop
//!   fields a receiving runtime might reject.
//!
//! [1]: https://tools.ietf.org/html/rfc4566#section-5.8

use std::io::Cursor;

use sdp::description::session::SessionDescription;

/// Default maximum bitrate requested from the remote peer, in kbps.
pub const DEFAULT_BANDWIDTH_KBPS: u64 = 600;

/// Maximum bitrate to encode into locally produced SDP.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BandwidthLimit {
    /// No limit; existing bandwidth lines are removed.
    Unlimited,

    /// Limit in kilobits per second.
    Kbps(u64),
}

impl Default for BandwidthLimit {
    #[inline]
    fn default() -> Self {
        Self::Kbps(DEFAULT_BANDWIDTH_KBPS)
    }
}

/// Rewriter applied to every locally produced offer and answer before it is
/// set as a local description and sent to the remote side.
#[derive(Clone, Copy, Debug, Default)]
pub struct SdpRewriter {
    /// Bandwidth limit to enforce.
    bandwidth: BandwidthLimit,

    /// Whether to parse-and-reserialize the SDP before enforcing bandwidth.
    transform: bool,
}

impl SdpRewriter {
    /// Creates a new [`SdpRewriter`] with the provided settings.
    #[inline]
    #[must_use]
    pub fn new(bandwidth: BandwidthLimit, transform: bool) -> Self {
        Self {
            bandwidth,
            transform,
        }
    }

    /// Rewrites the provided SDP.
    ///
    /// A failed structural parse never aborts negotiation: the SDP is used
    /// as-is and the failure is logged.
    #[must_use]
    pub fn rewrite(&self, sdp: &str) -> String {
        let sdp = if self.transform {
            match sanitize(sdp) {
                Some(clean) => clean,
                None => {
                    log::warn!("SDP transform failed to parse, using original");
                    sdp.to_owned()
                }
            }
        } else {
            sdp.to_owned()
        };

        match self.bandwidth {
            BandwidthLimit::Unlimited => strip_bandwidth(&sdp),
            BandwidthLimit::Kbps(kbps) => enforce_bandwidth(&sdp, kbps),
        }
    }
}

/// Round-trips the SDP through a structural parse, dropping everything the
/// parser does not understand. Returns [`None`] on parse failure.
fn sanitize(sdp: &str) -> Option<String> {
    let mut reader = Cursor::new(sdp.as_bytes());
    SessionDescription::unmarshal(&mut reader)
        .ok()
        .map(|desc| desc.marshal())
}

/// Returns the line terminator used by the provided SDP.
fn line_ending(sdp: &str) -> &'static str {
    if sdp.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

/// Indicates whether the line is a bandwidth line maintained by this module.
fn is_managed_bandwidth_line(line: &str) -> bool {
    line.starts_with("b=AS:") || line.starts_with("b=TIAS:")
}

/// Removes every `b=AS:…` and `b=TIAS:…` line.
fn strip_bandwidth(sdp: &str) -> String {
    if !sdp.contains("b=AS:") && !sdp.contains("b=TIAS:") {
        return sdp.to_owned();
    }

    let eol = line_ending(sdp);
    let trailing = sdp.ends_with('\n');
    let out: Vec<&str> = sdp
        .lines()
        .filter(|line| !is_managed_bandwidth_line(line))
        .collect();
    let mut joined = out.join(eol);
    if trailing {
        joined.push_str(eol);
    }
    joined
}

/// Rewrites every media section to carry exactly one `b=AS:<kbps>` and one
/// `b=TIAS:<kbps·1000>` line, placed immediately after the first `c=IN …`
/// line of the section.
fn enforce_bandwidth(sdp: &str, kbps: u64) -> String {
    let eol = line_ending(sdp);
    let trailing = sdp.ends_with('\n');

    let mut out: Vec<String> = Vec::new();
    let mut in_media = false;
    let mut inserted = false;
    for line in sdp.lines() {
        if line.starts_with("m=") {
            in_media = true;
            inserted = false;
        }
        if is_managed_bandwidth_line(line) {
            continue;
        }
        let is_connection = line.starts_with("c=IN ");
        out.push(line.to_owned());
        if in_media && is_connection && !inserted {
            out.push(format!("b=AS:{kbps}"));
            out.push(format!("b=TIAS:{}", kbps * 1000));
            inserted = true;
        }
    }

    let mut joined = out.join(eol);
    if trailing {
        joined.push_str(eol);
    }
    joined
}
