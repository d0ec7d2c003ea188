// libs/video-call-cell/src/services/media.rs
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::{MediaConstraints, MediaStream, MediaTrack, TrackKind, VideoCallError};

/// Platform camera/microphone capture.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Resolves once the user granted access. Fails with `MediaAccess` when
    /// permission is denied or no device is available.
    async fn get_user_media(&self, constraints: &MediaConstraints) -> Result<MediaStream, VideoCallError>;
}

/// Generates synthetic capture tracks. Used by the simulator and in tests.
pub struct SyntheticMediaDevices {
    label: String,
    deny: AtomicBool,
}

impl SyntheticMediaDevices {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            deny: AtomicBool::new(false),
        }
    }

    /// Devices that behave like a user who refused the permission prompt.
    pub fn denying(label: impl Into<String>) -> Self {
        let devices = Self::new(label);
        devices.set_permission_denied(true);
        devices
    }

    pub fn set_permission_denied(&self, denied: bool) {
        self.deny.store(denied, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaDevices for SyntheticMediaDevices {
    async fn get_user_media(&self, constraints: &MediaConstraints) -> Result<MediaStream, VideoCallError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(VideoCallError::MediaAccess {
                message: "Permission denied".to_string(),
            });
        }

        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(MediaTrack::new(TrackKind::Audio, format!("{} microphone", self.label)));
        }
        if constraints.video {
            tracks.push(MediaTrack::new(TrackKind::Video, format!("{} camera", self.label)));
        }

        Ok(MediaStream::new(tracks))
    }
}

/// Owns the session's local stream.
pub struct MediaAcquisition {
    devices: Arc<dyn MediaDevices>,
    constraints: MediaConstraints,
    local: Option<MediaStream>,
}

impl MediaAcquisition {
    pub fn new(devices: Arc<dyn MediaDevices>, constraints: MediaConstraints) -> Self {
        Self {
            devices,
            constraints,
            local: None,
        }
    }

    /// Requests camera and microphone. A second call returns the stream
    /// acquired by the first.
    pub async fn acquire(&mut self) -> Result<MediaStream, VideoCallError> {
        if let Some(stream) = &self.local {
            return Ok(stream.clone());
        }

        let stream = self.devices.get_user_media(&self.constraints).await?;
        if stream.tracks().is_empty() {
            return Err(VideoCallError::MediaAccess {
                message: "No capture device available".to_string(),
            });
        }

        info!("Acquired local media stream {} with {} track(s)", stream.id(), stream.tracks().len());
        self.local = Some(stream.clone());
        Ok(stream)
    }

    pub fn local_stream(&self) -> Option<&MediaStream> {
        self.local.as_ref()
    }

    pub fn is_acquired(&self) -> bool {
        self.local.is_some()
    }

    pub fn set_microphone_enabled(&self, enabled: bool) -> usize {
        self.set_enabled(TrackKind::Audio, enabled)
    }

    pub fn set_camera_enabled(&self, enabled: bool) -> usize {
        self.set_enabled(TrackKind::Video, enabled)
    }

    fn set_enabled(&self, kind: TrackKind, enabled: bool) -> usize {
        let Some(stream) = &self.local else {
            warn!("Ignoring {:?} toggle: no local media acquired", kind);
            return 0;
        };

        let changed = stream
            .tracks_of(kind)
            .filter(|track| track.set_enabled(enabled))
            .count();
        debug!("Set {} {:?} track(s) enabled={}", changed, kind, enabled);
        changed
    }

    /// Stops every local track. Safe to call repeatedly or before `acquire`.
    pub fn release(&mut self) -> usize {
        let Some(stream) = self.local.take() else {
            return 0;
        };

        let mut stopped = 0;
        for track in stream.tracks().iter().filter(|track| track.is_live()) {
            track.stop();
            stopped += 1;
        }
        info!("Released local media stream {} ({} track(s) stopped)", stream.id(), stopped);
        stopped
    }
}

impl Drop for MediaAcquisition {
    fn drop(&mut self) {
        self.release();
    }
}
