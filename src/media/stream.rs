//! Local and remote stream handles.

use std::{cell::RefCell, rc::Rc};

use crate::platform::MediaStreamTrack;

use super::MediaKind;

/// Composite stream of the local video and audio tracks.
///
/// Tracks are mutated in place when toggled and replaced in place on device
/// switches; the stream handle itself stays stable for the whole call.
#[derive(Default)]
pub struct LocalStream {
    /// Local video track, if video is captured.
    video: RefCell<Option<Rc<dyn MediaStreamTrack>>>,

    /// Local audio track, if audio is captured.
    audio: RefCell<Option<Rc<dyn MediaStreamTrack>>>,
}

impl LocalStream {
    /// Assembles a new [`LocalStream`] out of the provided tracks.
    #[must_use]
    pub fn new(
        video: Option<Rc<dyn MediaStreamTrack>>,
        audio: Option<Rc<dyn MediaStreamTrack>>,
    ) -> Self {
        Self {
            video: RefCell::new(video),
            audio: RefCell::new(audio),
        }
    }

    /// Returns the track of the provided [`MediaKind`], if any.
    #[must_use]
    pub fn track(&self, kind: MediaKind) -> Option<Rc<dyn MediaStreamTrack>> {
        match kind {
            MediaKind::Video => self.video.borrow().clone(),
            MediaKind::Audio => self.audio.borrow().clone(),
        }
    }

    /// Replaces the track of the provided [`MediaKind`].
    pub fn set_track(&self, kind: MediaKind, track: Rc<dyn MediaStreamTrack>) {
        match kind {
            MediaKind::Video => self.video.replace(Some(track)),
            MediaKind::Audio => self.audio.replace(Some(track)),
        };
    }

    /// Returns every track of this stream.
    #[must_use]
    pub fn tracks(&self) -> Vec<Rc<dyn MediaStreamTrack>> {
        [MediaKind::Video, MediaKind::Audio]
            .into_iter()
            .filter_map(|kind| self.track(kind))
            .collect()
    }

    /// Indicates whether the track of the provided [`MediaKind`] exists and
    /// is enabled.
    #[must_use]
    pub fn is_enabled(&self, kind: MediaKind) -> bool {
        self.track(kind).map_or(false, |t| t.enabled())
    }

    /// Sets the enabled flag on the track of the provided [`MediaKind`].
    pub fn set_enabled(&self, kind: MediaKind, enabled: bool) {
        if let Some(track) = self.track(kind) {
            track.set_enabled(enabled);
        }
    }

    /// Flips the enabled flag on the track of the provided [`MediaKind`].
    ///
    /// Returns the new state.
    pub fn toggle(&self, kind: MediaKind) -> bool {
        let enabled = !self.is_enabled(kind);
        self.set_enabled(kind, enabled);
        enabled
    }

    /// Permanently stops all tracks of this stream.
    pub fn stop_all(&self) {
        for track in self.tracks() {
            track.stop();
        }
    }
}

/// Stream assembled from every track received from the remote peer.
#[derive(Clone, Default)]
pub struct RemoteStream {
    /// Remote video tracks.
    video: Vec<Rc<dyn MediaStreamTrack>>,

    /// Remote audio tracks.
    audio: Vec<Rc<dyn MediaStreamTrack>>,
}

impl RemoteStream {
    /// Assembles a new [`RemoteStream`] out of the provided tracks.
    #[must_use]
    pub fn assemble(tracks: &[Rc<dyn MediaStreamTrack>]) -> Self {
        let mut stream = Self::default();
        for track in tracks {
            match track.kind() {
                MediaKind::Video => stream.video.push(Rc::clone(track)),
                MediaKind::Audio => stream.audio.push(Rc::clone(track)),
            }
        }
        stream
    }

    /// Returns the remote video tracks.
    #[inline]
    #[must_use]
    pub fn video_tracks(&self) -> &[Rc<dyn MediaStreamTrack>] {
        &self.video
    }

    /// Returns the remote audio tracks.
    #[inline]
    #[must_use]
    pub fn audio_tracks(&self) -> &[Rc<dyn MediaStreamTrack>] {
        &self.audio
    }

    /// Indicates whether this stream carries any video.
    #[inline]
    #[must_use]
    pub fn has_video(&self) -> bool {
        !self.video.is_empty()
    }

    /// Indicates whether this stream carries any audio.
    #[inline]
    #[must_use]
    pub fn has_audio(&self) -> bool {
        !self.audio.is_empty()
    }
}
