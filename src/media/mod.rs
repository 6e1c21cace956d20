//! Local media: constraints, device coordination and stream assembly.

pub mod constraints;
pub mod manager;
pub mod stream;

use derive_more::Display;

pub use self::{
    constraints::{
        AudioTrackConstraints, DisplayMediaConstraints, MediaStreamConstraints,
        MediaStreamSettings, VideoSource, VideoTrackConstraints,
    },
    manager::{MediaManager, MediaManagerError},
    stream::{LocalStream, RemoteStream},
};

/// [MediaStreamTrack.kind][1] representation.
///
/// [1]: https://w3.org/TR/mediacapture-streams/#dom-mediastreamtrack-kind
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum MediaKind {
    /// Audio track.
    #[display(fmt = "audio")]
    Audio,

    /// Video track.
    #[display(fmt = "video")]
    Video,
}
