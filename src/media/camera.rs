use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use image::{codecs::jpeg::JpegEncoder, RgbaImage};
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use crate::classification::{CameraErrorKind, ErrorClassification};
use crate::config::CameraConfig;
use crate::models::{CapturedImage, ImageOrigin};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraConstraints {
    pub facing_mode: String,
    pub width: u32,
    pub height: u32,
}

impl From<&CameraConfig> for CameraConstraints {
    fn from(config: &CameraConfig) -> Self {
        Self {
            facing_mode: config.facing_mode.clone(),
            width: config.preferred_width,
            height: config.preferred_height,
        }
    }
}

/// Failure reported by the platform camera layer, e.g. `NotAllowedError`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{name}: {message}")]
pub struct DeviceError {
    pub name: String,
    pub message: String,
}

impl DeviceError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// One decoded video frame in RGBA8.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn open(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Box<dyn CameraStream>, DeviceError>;
}

#[async_trait]
pub trait CameraStream: Send + Sync {
    /// Current video dimensions; `(0, 0)` until frames are flowing.
    fn dimensions(&self) -> (u32, u32);
    /// Resolves once metadata has loaded or the first frame has decoded.
    async fn ready(&self);
    /// Ask the platform to start playback on a stream that never signalled readiness.
    fn kick_playback(&self);
    fn grab_frame(&self) -> Result<RawFrame, DeviceError>;
    fn stop_tracks(&self);
}

/// Exclusive owner of one open camera stream.
///
/// Tracks are stopped by [`CameraHandle::release`] or, failing that, on drop,
/// so the hardware is freed on every exit path.
pub struct CameraHandle {
    id: Uuid,
    stream: Box<dyn CameraStream>,
    released: bool,
}

impl CameraHandle {
    fn new(stream: Box<dyn CameraStream>) -> Self {
        Self {
            id: Uuid::new_v4(),
            stream,
            released: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn has_frames(&self) -> bool {
        let (width, height) = self.stream.dimensions();
        !self.released && width > 0 && height > 0
    }

    /// Stop every track. Calling it again is a no-op.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.stream.stop_tracks();
        self.released = true;
        log_info!("camera handle {} released", self.id);
    }
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        if !self.released {
            log_warn!("camera handle {} dropped while open; stopping tracks", self.id);
            self.release();
        }
    }
}

impl std::fmt::Debug for CameraHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraHandle")
            .field("id", &self.id)
            .field("released", &self.released)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CameraReadiness {
    Ready,
    /// The watchdog expired and playback was forced; frames are now flowing.
    ForcedAfterWatchdog,
    /// Still no frames after forcing playback. Capture stays disabled.
    Stalled,
}

impl CameraReadiness {
    pub fn can_capture(&self) -> bool {
        !matches!(self, CameraReadiness::Stalled)
    }
}

#[derive(Debug, Error)]
pub enum StillCaptureError {
    #[error("camera is not producing frames yet")]
    NotReady,
    #[error("frame grab failed: {0}")]
    Device(#[from] DeviceError),
    #[error("frame has {actual} bytes, expected {expected}")]
    MalformedFrame { expected: usize, actual: usize },
    #[error("still encoding failed: {0}")]
    Encode(String),
}

/// Owns the camera device; hands out at most one [`CameraHandle`] at a time
/// to whoever drives the capture flow.
#[derive(Clone)]
pub struct MediaAcquisitionManager {
    device: Arc<dyn CameraDevice>,
    constraints: CameraConstraints,
    acquire_timeout: Duration,
    watchdog: Duration,
    jpeg_quality: u8,
}

impl MediaAcquisitionManager {
    pub fn new(device: Arc<dyn CameraDevice>, config: &CameraConfig) -> Self {
        Self {
            device,
            constraints: CameraConstraints::from(config),
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
            watchdog: Duration::from_millis(config.ready_watchdog_ms),
            jpeg_quality: config.still_jpeg_quality.clamp(1, 100),
        }
    }

    /// Open the environment-facing camera.
    ///
    /// An open call that outlives `acquire_timeout` is reported as `unknown`
    /// so the user can try again or upload a file instead.
    pub async fn acquire(&self) -> Result<CameraHandle, ErrorClassification> {
        let opened = tokio::time::timeout(self.acquire_timeout, self.device.open(&self.constraints))
            .await
            .unwrap_or_else(|_| {
                Err(DeviceError::new(
                    "TimeoutError",
                    format!(
                        "camera did not open within {}ms",
                        self.acquire_timeout.as_millis()
                    ),
                ))
            });

        match opened {
            Ok(stream) => {
                let handle = CameraHandle::new(stream);
                log_info!(
                    "camera handle {} acquired ({} {}x{})",
                    handle.id(),
                    self.constraints.facing_mode,
                    self.constraints.width,
                    self.constraints.height
                );
                Ok(handle)
            }
            Err(err) => {
                let kind = CameraErrorKind::classify(&err.name, &err.message);
                log_warn!("camera acquisition failed ({}): {err}", kind.as_str());
                Err(ErrorClassification::camera(kind))
            }
        }
    }

    /// Wait for the stream's readiness signal, bounded by a single watchdog.
    ///
    /// When the watchdog fires, playback is forced exactly once and the
    /// result is decided from the frame dimensions at that moment.
    pub async fn wait_until_ready(&self, handle: &CameraHandle) -> CameraReadiness {
        if handle.has_frames() {
            return CameraReadiness::Ready;
        }

        let started = Instant::now();
        match tokio::time::timeout(self.watchdog, handle.stream.ready()).await {
            Ok(()) if handle.has_frames() => {
                log_debug!(
                    "camera {} ready after {}ms",
                    handle.id(),
                    started.elapsed().as_millis()
                );
                return CameraReadiness::Ready;
            }
            Ok(()) => log_warn!("camera {} signalled ready without frame dimensions", handle.id()),
            Err(_) => log_warn!(
                "camera {} not ready after {}ms; forcing playback",
                handle.id(),
                self.watchdog.as_millis()
            ),
        }

        handle.stream.kick_playback();
        if handle.has_frames() {
            CameraReadiness::ForcedAfterWatchdog
        } else {
            CameraReadiness::Stalled
        }
    }

    /// Take one still and release the camera immediately afterwards.
    ///
    /// On [`StillCaptureError::NotReady`] the handle stays open so the user
    /// can try again once frames arrive; on every other outcome it is released.
    pub async fn capture_still(
        &self,
        handle: &mut CameraHandle,
    ) -> Result<CapturedImage, StillCaptureError> {
        if !handle.has_frames() {
            return Err(StillCaptureError::NotReady);
        }

        let frame = handle.stream.grab_frame();
        handle.release();
        let frame = frame?;

        let quality = self.jpeg_quality;
        let bytes = tokio::task::spawn_blocking(move || encode_frame(frame, quality))
            .await
            .map_err(|err| StillCaptureError::Encode(format!("encoder worker join failed: {err}")))??;

        Ok(CapturedImage::new(
            bytes,
            "image/jpeg",
            format!("scale-{}.jpg", chrono::Utc::now().format("%Y%m%d-%H%M%S")),
            ImageOrigin::Camera,
        ))
    }
}

fn encode_frame(frame: RawFrame, quality: u8) -> Result<Vec<u8>, StillCaptureError> {
    let expected = frame.width as usize * frame.height as usize * 4;
    let actual = frame.rgba.len();
    let rgba = RgbaImage::from_raw(frame.width, frame.height, frame.rgba)
        .ok_or(StillCaptureError::MalformedFrame { expected, actual })?;
    let rgb = image::DynamicImage::ImageRgba8(rgba).to_rgb8();

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(&rgb)
        .map_err(|err| StillCaptureError::Encode(err.to_string()))?;
    Ok(bytes)
}
