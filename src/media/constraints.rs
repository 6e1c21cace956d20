//! Constraints applied to media acquisition requests.

/// Source a video track is captured from.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum VideoSource {
    /// Capture device (camera).
    #[default]
    Device,

    /// Screen or window capture.
    Display,
}

/// Constraints of an audio track.
#[derive(Clone, Debug, Default)]
pub struct AudioTrackConstraints {
    /// Identifier of the device to capture from.
    pub device_id: Option<String>,

    /// Enable noise suppression on the capture pipeline.
    pub noise_suppression: Option<bool>,
}

/// Constraints of a video track.
#[derive(Clone, Debug, Default)]
pub struct VideoTrackConstraints {
    /// Identifier of the device to capture from. Ignored for
    /// [`VideoSource::Display`].
    pub device_id: Option<String>,

    /// Minimum width of the captured frames, in pixels.
    pub min_width: Option<u32>,

    /// Minimum height of the captured frames, in pixels.
    pub min_height: Option<u32>,

    /// Source to capture from.
    pub source: VideoSource,
}

/// Per-call media settings provided by the consumer on
/// [`CallHandle::start()`].
///
/// [`CallHandle::start()`]: crate::call::CallHandle::start
#[derive(Clone, Debug)]
pub struct MediaStreamSettings {
    /// Audio constraints; [`None`] disables audio capture.
    pub audio: Option<AudioTrackConstraints>,

    /// Video constraints; [`None`] disables video capture.
    pub video: Option<VideoTrackConstraints>,
}

impl Default for MediaStreamSettings {
    /// Both kinds enabled with no extra constraints.
    fn default() -> Self {
        Self {
            audio: Some(AudioTrackConstraints::default()),
            video: Some(VideoTrackConstraints::default()),
        }
    }
}

impl MediaStreamSettings {
    /// Returns a copy of these settings with the video source swapped.
    ///
    /// Used by screen/camera sharing transitions, which tear the call down
    /// and start it over with the new source.
    #[must_use]
    pub fn with_video_source(&self, source: VideoSource) -> Self {
        let mut settings = self.clone();
        if let Some(video) = &mut settings.video {
            video.source = source;
            video.device_id = None;
        } else {
            settings.video = Some(VideoTrackConstraints {
                source,
                ..VideoTrackConstraints::default()
            });
        }
        settings
    }

    /// Indicates whether video is to be captured from a display.
    #[inline]
    #[must_use]
    pub fn is_display_video(&self) -> bool {
        self.video
            .as_ref()
            .map_or(false, |v| v.source == VideoSource::Display)
    }
}

/// Constraints handed to the host's [getUserMedia()][1] call.
///
/// [1]: https://w3.org/TR/mediacapture-streams/#dom-mediadevices-getusermedia
#[derive(Clone, Debug, Default)]
pub struct MediaStreamConstraints {
    /// Audio part of the request.
    pub audio: Option<AudioTrackConstraints>,

    /// Video part of the request.
    pub video: Option<VideoTrackConstraints>,
}

/// Constraints handed to the host's [getDisplayMedia()][1] call.
///
/// [1]: https://w3.org/TR/screen-capture/#dom-mediadevices-getdisplaymedia
#[derive(Clone, Debug, Default)]
pub struct DisplayMediaConstraints {
    /// Video part of the request.
    pub video: Option<VideoTrackConstraints>,
}
