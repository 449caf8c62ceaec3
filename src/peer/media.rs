use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Captured local tracks, exclusively owned by one session.
pub struct LocalMedia {
    tracks: Vec<(TrackKind, Arc<TrackLocalStaticSample>)>,
    stopped: bool,
}

impl LocalMedia {
    pub fn new(tracks: Vec<(TrackKind, Arc<TrackLocalStaticSample>)>) -> Self {
        Self {
            tracks,
            stopped: false,
        }
    }

    pub fn tracks(&self) -> &[(TrackKind, Arc<TrackLocalStaticSample>)] {
        &self.tracks
    }

    pub fn kinds(&self) -> Vec<TrackKind> {
        self.tracks.iter().map(|(k, _)| *k).collect()
    }

    /// Second handle on the same tracks, handed to a connection backend.
    pub(crate) fn share(&self) -> LocalMedia {
        LocalMedia {
            tracks: self.tracks.clone(),
            stopped: self.stopped,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Releases every track. Calling it again does nothing.
    pub fn stop(&mut self) {
        if !self.stopped {
            tracing::debug!(tracks = self.tracks.len(), "stopping local media");
        }
        self.tracks.clear();
        self.stopped = true;
    }
}

impl fmt::Debug for LocalMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalMedia")
            .field("kinds", &self.kinds())
            .field("stopped", &self.stopped)
            .finish()
    }
}

/// Platform capture. Denial or a missing device kind is reported once, never
/// retried.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self, constraints: MediaConstraints) -> Result<LocalMedia>;
}

/// Capture that produces sample-fed tracks (Opus audio, VP8 video) for the
/// device kinds it is configured with.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticMediaSource {
    pub audio: bool,
    pub video: bool,
}

impl SyntheticMediaSource {
    pub fn new(audio: bool, video: bool) -> Self {
        Self { audio, video }
    }
}

const STREAM_ID: &str = "avatar-rtc";

fn track(mime_type: &str, clock_rate: u32, channels: u16, id: &str) -> Arc<TrackLocalStaticSample> {
    Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: mime_type.to_owned(),
            clock_rate,
            channels,
            ..Default::default()
        },
        id.to_owned(),
        STREAM_ID.to_owned(),
    ))
}

#[async_trait]
impl MediaSource for SyntheticMediaSource {
    async fn acquire(&self, constraints: MediaConstraints) -> Result<LocalMedia> {
        if !constraints.audio && !constraints.video {
            return Err(Error::MediaUnavailable("no media kind requested".into()));
        }
        if constraints.audio && !self.audio {
            return Err(Error::MediaUnavailable("no audio capture device".into()));
        }
        if constraints.video && !self.video {
            return Err(Error::MediaUnavailable("no video capture device".into()));
        }

        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push((TrackKind::Audio, track(MIME_TYPE_OPUS, 48000, 2, "audio")));
        }
        if constraints.video {
            tracks.push((TrackKind::Video, track(MIME_TYPE_VP8, 90000, 0, "video")));
        }
        tracing::debug!(audio = constraints.audio, video = constraints.video, "local media acquired");
        Ok(LocalMedia::new(tracks))
    }
}
