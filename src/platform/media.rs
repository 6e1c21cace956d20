//! Host contracts for media devices and tracks.

use std::rc::Rc;

use derive_more::Display;
use futures::{future::LocalBoxFuture, stream::LocalBoxStream};

use crate::media::{
    DisplayMediaConstraints, MediaKind, MediaStreamConstraints,
};

use super::Error;

/// [MediaDeviceKind][1] of an [`InputDeviceInfo`].
///
/// [1]: https://w3.org/TR/mediacapture-streams/#dom-mediadevicekind
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum MediaDeviceKind {
    /// Video input device (camera).
    #[display(fmt = "videoinput")]
    VideoInput,

    /// Audio input device (microphone).
    #[display(fmt = "audioinput")]
    AudioInput,

    /// Audio output device (speakers, headphones).
    #[display(fmt = "audiooutput")]
    AudioOutput,
}

/// Direction a camera is facing, when the host can tell.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FacingMode {
    /// Camera facing the user (front camera on mobile).
    Front,

    /// Camera facing away from the user.
    Back,
}

/// Information about a single media device available to the host.
#[derive(Clone, Debug)]
pub struct InputDeviceInfo {
    /// Unique identifier of the device, stable across re-enumerations.
    pub device_id: String,

    /// Kind of the device.
    pub kind: MediaDeviceKind,

    /// Human-readable label (may be empty before a permission grant).
    pub label: String,

    /// Facing information of a camera, if known.
    pub facing: Option<FacingMode>,
}

/// Lifecycle events of a [`MediaStreamTrack`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TrackEvent {
    /// Track temporarily stopped providing data.
    Muted,

    /// Track resumed providing data.
    Unmuted,

    /// Track will never provide data again.
    Ended,
}

/// [MediaStreamTrack][1] provided by the host runtime.
///
/// [1]: https://w3.org/TR/mediacapture-streams/#mediastreamtrack
#[cfg_attr(feature = "mockable", mockall::automock)]
pub trait MediaStreamTrack {
    /// Returns unique id of this track.
    fn id(&self) -> String;

    /// Returns media kind of this track.
    fn kind(&self) -> MediaKind;

    /// Returns human-readable label of the track source.
    fn label(&self) -> String;

    /// Returns id of the device this track was sourced from, if known.
    fn device_id(&self) -> Option<String>;

    /// Indicates whether this track is allowed to render its source.
    fn enabled(&self) -> bool;

    /// Allows or forbids this track to render its source.
    fn set_enabled(&self, enabled: bool);

    /// Permanently stops this track, releasing the underlying source.
    fn stop(&self);

    /// Returns a [`Stream`] of this track's lifecycle events.
    ///
    /// Intended to be consumed by a single subscriber; the host may return an
    /// empty [`Stream`] on repeated calls.
    ///
    /// [`Stream`]: futures::Stream
    fn on_event(&self) -> LocalBoxStream<'static, TrackEvent>;

    /// In-place camera flip of a mobile runtime, if the host exposes one.
    ///
    /// Returns [`None`] when unsupported, in which case the caller is
    /// expected to switch devices by replacing the track.
    fn switch_camera(&self) -> Option<LocalBoxFuture<'static, Result<(), Error>>>;
}

/// Host entry point for enumerating and acquiring media.
///
/// Counterpart of [MediaDevices][1].
///
/// [1]: https://w3.org/TR/mediacapture-streams/#mediadevices
#[cfg_attr(feature = "mockable", mockall::automock)]
pub trait MediaDevices {
    /// Enumerates all media devices available to the host.
    fn enumerate_devices(
        &self,
    ) -> LocalBoxFuture<'static, Result<Vec<InputDeviceInfo>, Error>>;

    /// Acquires tracks satisfying the provided constraints from capture
    /// devices ([getUserMedia()][1]).
    ///
    /// [1]: https://w3.org/TR/mediacapture-streams/#dom-mediadevices-getusermedia
    fn get_user_media(
        &self,
        caps: MediaStreamConstraints,
    ) -> LocalBoxFuture<'static, Result<Vec<Rc<dyn MediaStreamTrack>>, Error>>;

    /// Acquires tracks capturing a screen or window
    /// ([getDisplayMedia()][1]).
    ///
    /// [1]: https://w3.org/TR/screen-capture/#dom-mediadevices-getdisplaymedia
    fn get_display_media(
        &self,
        caps: DisplayMediaConstraints,
    ) -> LocalBoxFuture<'static, Result<Vec<Rc<dyn MediaStreamTrack>>, Error>>;
}
