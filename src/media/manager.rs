//! Device coordination: enumeration, default selection and acquisition.

use std::{cell::RefCell, rc::Rc};

use derive_more::Display;
use tracerr::Traced;

use crate::platform::{
    self, InputDeviceInfo, MediaDeviceKind, MediaDevices, MediaStreamTrack,
};

use super::{
    AudioTrackConstraints, DisplayMediaConstraints, LocalStream, MediaKind,
    MediaStreamConstraints, MediaStreamSettings, VideoSource,
    VideoTrackConstraints,
};

/// Errors that may occur in a [`MediaManager`].
#[derive(Clone, Debug, Display)]
pub enum MediaManagerError {
    /// Device enumeration request failed.
    #[display(fmt = "MediaDevices.enumerateDevices() failed: {}", _0)]
    EnumerateDevicesFailed(platform::Error),

    /// Capture device acquisition request failed.
    #[display(fmt = "MediaDevices.getUserMedia({}) failed: {}", kind, error)]
    GetUserMediaFailed {
        /// Kind that was being acquired.
        kind: MediaKind,

        /// Host failure.
        error: platform::Error,
    },

    /// Display acquisition request failed.
    #[display(fmt = "MediaDevices.getDisplayMedia() failed: {}", _0)]
    GetDisplayMediaFailed(platform::Error),

    /// Acquisition succeeded but yielded no usable (enabled) track.
    #[display(fmt = "acquisition returned no usable {} track", _0)]
    NoUsableTrack(MediaKind),
}

type Result<T> = std::result::Result<T, Traced<MediaManagerError>>;

/// Coordinator of capture devices.
///
/// Picks default inputs on first acquisition, remembers the choice so device
/// identity survives re-acquisitions, and injects the remembered ids into
/// every host media request.
pub struct MediaManager {
    /// Host media entry point.
    devices: Rc<dyn MediaDevices>,

    /// Currently selected video input.
    video_device: RefCell<Option<InputDeviceInfo>>,

    /// Currently selected audio input.
    audio_device: RefCell<Option<InputDeviceInfo>>,
}

impl MediaManager {
    /// Creates a new [`MediaManager`] on top of the provided host media
    /// entry point.
    #[must_use]
    pub fn new(devices: Rc<dyn MediaDevices>) -> Self {
        Self {
            devices,
            video_device: RefCell::new(None),
            audio_device: RefCell::new(None),
        }
    }

    /// Enumerates all media devices available to the host.
    ///
    /// # Errors
    ///
    /// With [`MediaManagerError::EnumerateDevicesFailed`] if the host
    /// request fails.
    pub async fn enumerate_devices(&self) -> Result<Vec<InputDeviceInfo>> {
        self.devices
            .enumerate_devices()
            .await
            .map_err(MediaManagerError::EnumerateDevicesFailed)
            .map_err(tracerr::wrap!())
    }

    /// Acquires a [`LocalStream`] satisfying the provided settings.
    ///
    /// Each kind is requested separately with the selected device id
    /// injected into its constraints; from the returned tracks the first
    /// enabled one of each kind is taken.
    ///
    /// # Errors
    ///
    /// See [`MediaManagerError`] for details.
    pub async fn acquire(
        &self,
        settings: &MediaStreamSettings,
    ) -> Result<LocalStream> {
        let video = match &settings.video {
            Some(caps) => self.acquire_video(caps).await?,
            None => None,
        };
        let audio = match &settings.audio {
            Some(caps) => self.acquire_audio(caps).await?,
            None => None,
        };
        Ok(LocalStream::new(video, audio))
    }

    /// Acquires a single track of the provided [`MediaKind`].
    ///
    /// Used by device switches that replace a sender track in place.
    ///
    /// # Errors
    ///
    /// See [`MediaManagerError`] for details.
    pub async fn acquire_kind(
        &self,
        kind: MediaKind,
        settings: &MediaStreamSettings,
    ) -> Result<Rc<dyn MediaStreamTrack>> {
        let track = match kind {
            MediaKind::Video => {
                let caps = settings.video.clone().unwrap_or_default();
                self.acquire_video(&caps).await?
            }
            MediaKind::Audio => {
                let caps = settings.audio.clone().unwrap_or_default();
                self.acquire_audio(&caps).await?
            }
        };
        track.ok_or_else(|| {
            tracerr::new!(MediaManagerError::NoUsableTrack(kind))
        })
    }

    /// Remembers the provided device as the selected input of its kind.
    ///
    /// The next (re-)acquisition of that kind will target it.
    pub fn set_active_device(&self, device: InputDeviceInfo) {
        match device.kind {
            MediaDeviceKind::VideoInput => {
                self.video_device.replace(Some(device));
            }
            MediaDeviceKind::AudioInput => {
                self.audio_device.replace(Some(device));
            }
            MediaDeviceKind::AudioOutput => {
                log::warn!("cannot select an audio output as an input device");
            }
        }
    }

    /// Rotates the selected video input to the next `videoinput` (wrapping)
    /// and returns it.
    ///
    /// Returns [`None`] if the host reports no video inputs at all.
    ///
    /// # Errors
    ///
    /// With [`MediaManagerError::EnumerateDevicesFailed`] if the host
    /// request fails.
    pub async fn next_video_device(&self) -> Result<Option<InputDeviceInfo>> {
        let videos: Vec<_> = self
            .enumerate_devices()
            .await?
            .into_iter()
            .filter(|d| d.kind == MediaDeviceKind::VideoInput)
            .collect();
        if videos.is_empty() {
            return Ok(None);
        }

        let current = self.video_device.borrow().clone();
        let next = match current {
            Some(current) => {
                let position = videos
                    .iter()
                    .position(|d| d.device_id == current.device_id)
                    .unwrap_or(videos.len() - 1);
                videos[(position + 1) % videos.len()].clone()
            }
            None => videos[0].clone(),
        };
        self.video_device.replace(Some(next.clone()));
        Ok(Some(next))
    }

    /// Returns the device currently selected for the provided kind, if any.
    #[must_use]
    pub fn selected_device(&self, kind: MediaKind) -> Option<InputDeviceInfo> {
        match kind {
            MediaKind::Video => self.video_device.borrow().clone(),
            MediaKind::Audio => self.audio_device.borrow().clone(),
        }
    }

    /// Forgets both selected devices.
    pub fn reset(&self) {
        self.video_device.replace(None);
        self.audio_device.replace(None);
    }

    /// Acquires the video track for the provided constraints, dispatching to
    /// device or display capture.
    async fn acquire_video(
        &self,
        caps: &VideoTrackConstraints,
    ) -> Result<Option<Rc<dyn MediaStreamTrack>>> {
        let tracks = if caps.source == VideoSource::Display {
            self.devices
                .get_display_media(DisplayMediaConstraints {
                    video: Some(caps.clone()),
                })
                .await
                .map_err(MediaManagerError::GetDisplayMediaFailed)
                .map_err(tracerr::wrap!())?
        } else {
            let mut caps = caps.clone();
            if caps.device_id.is_none() {
                caps.device_id = self.selected_id(MediaKind::Video).await?;
            }
            self.devices
                .get_user_media(MediaStreamConstraints {
                    video: Some(caps),
                    audio: None,
                })
                .await
                .map_err(|error| MediaManagerError::GetUserMediaFailed {
                    kind: MediaKind::Video,
                    error,
                })
                .map_err(tracerr::wrap!())?
        };
        Ok(first_enabled(&tracks, MediaKind::Video))
    }

    /// Acquires the audio track for the provided constraints.
    async fn acquire_audio(
        &self,
        caps: &AudioTrackConstraints,
    ) -> Result<Option<Rc<dyn MediaStreamTrack>>> {
        let mut caps = caps.clone();
        if caps.device_id.is_none() {
            caps.device_id = self.selected_id(MediaKind::Audio).await?;
        }
        let tracks = self
            .devices
            .get_user_media(MediaStreamConstraints {
                audio: Some(caps),
                video: None,
            })
            .await
            .map_err(|error| MediaManagerError::GetUserMediaFailed {
                kind: MediaKind::Audio,
                error,
            })
            .map_err(tracerr::wrap!())?;
        Ok(first_enabled(&tracks, MediaKind::Audio))
    }

    /// Returns the device id to inject into constraints of the provided
    /// kind, refreshing the remembered selection against a fresh
    /// enumeration.
    ///
    /// A remembered device is re-found by id so its identity survives
    /// replugs and permission re-grants; a vanished device falls back to the
    /// default selection.
    async fn selected_id(&self, kind: MediaKind) -> Result<Option<String>> {
        let devices = self.enumerate_devices().await?;
        let slot = match kind {
            MediaKind::Video => &self.video_device,
            MediaKind::Audio => &self.audio_device,
        };

        let remembered = slot.borrow().clone();
        let refound = remembered.and_then(|d| {
            devices.iter().find(|i| i.device_id == d.device_id).cloned()
        });
        let selected = refound.or_else(|| match kind {
            MediaKind::Video => select_default_video(&devices),
            MediaKind::Audio => select_default_audio(&devices),
        });

        slot.replace(selected.clone());
        Ok(selected.map(|d| d.device_id))
    }
}

/// Picks the default video input: a front-facing camera if discoverable,
/// else the first `videoinput` whose label does not look like a back camera,
/// else the first `videoinput`.
fn select_default_video(
    devices: &[InputDeviceInfo],
) -> Option<InputDeviceInfo> {
    let videos: Vec<_> = devices
        .iter()
        .filter(|d| d.kind == MediaDeviceKind::VideoInput)
        .collect();

    videos
        .iter()
        .find(|d| d.facing == Some(platform::FacingMode::Front))
        .or_else(|| {
            videos.iter().find(|d| {
                let label = d.label.to_lowercase();
                !label.contains("back") && !label.contains("rear")
            })
        })
        .or_else(|| videos.first())
        .map(|d| (*d).clone())
}

/// Picks the default audio input: the first `audioinput`.
fn select_default_audio(
    devices: &[InputDeviceInfo],
) -> Option<InputDeviceInfo> {
    devices
        .iter()
        .find(|d| d.kind == MediaDeviceKind::AudioInput)
        .cloned()
}

/// Returns the first enabled track of the provided kind.
fn first_enabled(
    tracks: &[Rc<dyn MediaStreamTrack>],
    kind: MediaKind,
) -> Option<Rc<dyn MediaStreamTrack>> {
    tracks
        .iter()
        .find(|t| t.kind() == kind && t.enabled())
        .cloned()
}
