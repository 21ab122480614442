use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;

use crate::classification::{CameraErrorKind, ErrorClassification};
use crate::completion::{ContactError, ContactForm, GateDecision, GateError};
use crate::config::{CaptureConfig, FINAL_CHALLENGE_DAY};
use crate::handoff::{BadgeHandoff, HandoffStore};
use crate::manual_entry::{ManualEntryError, ManualEntryFallback};
use crate::media::{
    validate_file, CameraDevice, CameraHandle, CameraReadiness, FileRejection,
    MediaAcquisitionManager, SelectedFile, StillCaptureError,
};
use crate::models::{ImageSummary, WeighInResult};
use crate::recognition::{
    PipelineStage, RecognitionError, RecognitionJob, RecognitionOrchestrator,
};
use crate::reporting::ErrorReporter;
use crate::services::{
    BlobStore, ContactSubmitter, RecognitionService, SessionProvider, WeighInRecorder,
};
use crate::transfer::{RetryNotice, TransferController};

use super::{CaptureEvent, CaptureSnapshot, CaptureState, CaptureStatus};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const EVENT_CAPACITY: usize = 64;

const STALLED_NOTICE: &str =
    "The camera isn't showing a picture. Cancel and try again, or upload a photo instead.";
const WARMING_NOTICE: &str = "The camera is still starting. Try again in a moment.";

/// Everything the capture flow talks to outside this crate.
#[derive(Clone)]
pub struct CaptureDeps {
    pub config: Arc<CaptureConfig>,
    pub sessions: Arc<dyn SessionProvider>,
    pub camera: Arc<dyn CameraDevice>,
    pub store: Arc<dyn BlobStore>,
    pub recognizer: Arc<dyn RecognitionService>,
    pub recorder: Arc<dyn WeighInRecorder>,
    pub contacts: Arc<dyn ContactSubmitter>,
    pub reporter: Arc<dyn ErrorReporter>,
    pub handoff: Option<Arc<HandoffStore>>,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Please sign in to record today's weigh-in.")]
    NotAuthenticated,
    #[error("day {0} is outside the challenge (1-{max})", max = FINAL_CHALLENGE_DAY)]
    InvalidDay(u8),
    #[error("cannot {action} while {status:?}")]
    InvalidTransition {
        action: &'static str,
        status: CaptureStatus,
    },
    #[error("{}", .0.message)]
    Camera(ErrorClassification),
    #[error(transparent)]
    Still(#[from] StillCaptureError),
    #[error(transparent)]
    File(#[from] FileRejection),
    #[error(transparent)]
    Manual(#[from] ManualEntryError),
    #[error(transparent)]
    Contact(#[from] ContactError),
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error("No recognition retries left for this photo. Please enter your weight manually.")]
    RetriesExhausted,
    /// The flow moved on (retake, cancel, exit) before the operation finished.
    #[error("operation superseded")]
    Superseded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    Recognized(WeighInResult),
    /// The image is kept and manual entry is offered.
    Failed(ErrorClassification),
    /// The result arrived for an image the user already discarded.
    Discarded,
}

struct CaptureInner {
    state: CaptureState,
    camera: Option<CameraHandle>,
    attempt: Option<CancellationToken>,
}

impl CaptureInner {
    fn begin_attempt(&mut self) -> (u64, CancellationToken) {
        self.cancel_attempt();
        let token = CancellationToken::new();
        self.attempt = Some(token.clone());
        (self.state.generation, token)
    }

    fn cancel_attempt(&mut self) {
        if let Some(token) = self.attempt.take() {
            token.cancel();
        }
    }

    fn release_camera(&mut self) {
        if let Some(mut handle) = self.camera.take() {
            handle.release();
        }
        self.state.camera_readiness = None;
    }

    /// Drop an in-flight camera open so the user can pick another route.
    fn abandon_acquisition(&mut self) {
        self.cancel_attempt();
        self.state.camera_pending = false;
        self.state.generation = self.state.generation.wrapping_add(1);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state.generation == generation && self.state.status != CaptureStatus::Exited
    }

    fn require(&self, status: CaptureStatus, action: &'static str) -> Result<(), CaptureError> {
        if self.state.status != status {
            return Err(CaptureError::InvalidTransition {
                action,
                status: self.state.status,
            });
        }
        Ok(())
    }
}

impl Drop for CaptureInner {
    fn drop(&mut self) {
        self.cancel_attempt();
        self.release_camera();
    }
}

/// Drives one day's weigh-in from photo to result.
///
/// Clones share the same session. The state lock is never held across an
/// await; work that suspends records the session generation first and
/// drops its result if the generation moved on in the meantime.
#[derive(Clone)]
pub struct CaptureController {
    inner: Arc<Mutex<CaptureInner>>,
    media: MediaAcquisitionManager,
    orchestrator: RecognitionOrchestrator,
    manual: ManualEntryFallback,
    contact: ContactForm,
    handoff: Option<Arc<HandoffStore>>,
    events: broadcast::Sender<CaptureEvent>,
    config: Arc<CaptureConfig>,
    session_id: Arc<str>,
    user_id: Arc<str>,
    day_number: u8,
}

impl CaptureController {
    /// Start a session for `day_number`. Requires a signed-in user.
    pub async fn open(deps: CaptureDeps, day_number: u8) -> Result<Self, CaptureError> {
        if !(1..=FINAL_CHALLENGE_DAY).contains(&day_number) {
            return Err(CaptureError::InvalidDay(day_number));
        }
        let session = deps
            .sessions
            .current_session()
            .await
            .ok_or(CaptureError::NotAuthenticated)?;

        let config = deps.config;
        let transfer = TransferController::new();
        let state = CaptureState::new(day_number, config.max_recognition_retries);
        let session_id: Arc<str> = Arc::from(state.session_id.as_str());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        log_info!(
            "capture session {} opened for day {} (user {})",
            session_id,
            day_number,
            session.user_id
        );

        Ok(Self {
            inner: Arc::new(Mutex::new(CaptureInner {
                state,
                camera: None,
                attempt: None,
            })),
            media: MediaAcquisitionManager::new(deps.camera, &config.camera),
            orchestrator: RecognitionOrchestrator::new(
                deps.store,
                deps.recognizer,
                deps.reporter.clone(),
                transfer.clone(),
                config.clone(),
            ),
            manual: ManualEntryFallback::new(
                deps.recorder,
                deps.reporter.clone(),
                transfer.clone(),
                config.clone(),
            ),
            contact: ContactForm::new(deps.contacts, deps.reporter, transfer, config.clone()),
            handoff: deps.handoff,
            events,
            config,
            session_id,
            user_id: Arc::from(session.user_id.as_str()),
            day_number,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.events.subscribe()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn snapshot(&self) -> CaptureSnapshot {
        self.inner.lock().await.state.snapshot()
    }

    /// Open the camera and wait (bounded by the watchdog) for frames.
    pub async fn take_photo(&self) -> Result<CameraReadiness, CaptureError> {
        let (generation, cancel) = {
            let mut inner = self.inner.lock().await;
            inner.require(CaptureStatus::Upload, "open the camera")?;
            if inner.state.camera_pending {
                return Err(CaptureError::InvalidTransition {
                    action: "open the camera",
                    status: CaptureStatus::Camera,
                });
            }
            inner.release_camera();
            inner.state.clear_messages();
            inner.state.camera_pending = true;
            let attempt = inner.begin_attempt();
            self.publish(&inner);
            attempt
        };

        let acquired = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            acquired = self.media.acquire() => Some(acquired),
        };

        let mut handle = {
            let mut inner = self.inner.lock().await;
            let current = inner.is_current(generation);
            match acquired {
                Some(Ok(handle)) if current => {
                    inner.state.status = CaptureStatus::Camera;
                    self.publish(&inner);
                    handle
                }
                Some(Ok(mut handle)) => {
                    handle.release();
                    return Err(CaptureError::Superseded);
                }
                Some(Err(classification)) if current => {
                    inner.state.camera_pending = false;
                    inner.attempt = None;
                    inner.state.error = Some(classification.clone());
                    self.publish(&inner);
                    return Err(CaptureError::Camera(classification));
                }
                Some(Err(_)) | None => return Err(CaptureError::Superseded),
            }
        };

        let readiness = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            readiness = self.media.wait_until_ready(&handle) => Some(readiness),
        };

        let mut inner = self.inner.lock().await;
        match readiness {
            Some(readiness)
                if inner.is_current(generation) && inner.state.status == CaptureStatus::Camera =>
            {
                inner.state.camera_pending = false;
                inner.attempt = None;
                inner.state.camera_readiness = Some(readiness);
                if !readiness.can_capture() {
                    inner.state.notice = Some(STALLED_NOTICE.to_string());
                }
                inner.camera = Some(handle);
                self.publish(&inner);
                Ok(readiness)
            }
            _ => {
                handle.release();
                Err(CaptureError::Superseded)
            }
        }
    }

    /// "Try again" after a camera error.
    pub async fn retry_camera(&self) -> Result<CameraReadiness, CaptureError> {
        log_debug!("session {} retrying camera acquisition", self.session_id);
        self.take_photo().await
    }

    /// Take the still; the camera is released as soon as the frame is grabbed.
    pub async fn capture(&self) -> Result<ImageSummary, CaptureError> {
        let (generation, mut handle) = {
            let mut inner = self.inner.lock().await;
            inner.require(CaptureStatus::Camera, "capture")?;
            let Some(handle) = inner.camera.take() else {
                inner.state.notice = Some(WARMING_NOTICE.to_string());
                self.publish(&inner);
                return Err(CaptureError::Still(StillCaptureError::NotReady));
            };
            (inner.state.generation, handle)
        };

        let outcome = self.media.capture_still(&mut handle).await;

        let mut inner = self.inner.lock().await;
        if !inner.is_current(generation) || inner.state.status != CaptureStatus::Camera {
            handle.release();
            return Err(CaptureError::Superseded);
        }

        match outcome {
            Ok(image) => {
                let summary = ImageSummary::from(&image);
                inner.state.hold_image(image);
                self.publish(&inner);
                Ok(summary)
            }
            Err(StillCaptureError::NotReady) => {
                inner.camera = Some(handle);
                inner.state.notice = Some(WARMING_NOTICE.to_string());
                self.publish(&inner);
                Err(CaptureError::Still(StillCaptureError::NotReady))
            }
            Err(err) => {
                log_warn!("session {} still capture failed: {err}", self.session_id);
                handle.release();
                inner.state.camera_readiness = None;
                inner.state.status = CaptureStatus::Upload;
                inner.state.error = Some(ErrorClassification::camera(CameraErrorKind::Unknown));
                self.publish(&inner);
                Err(CaptureError::Still(err))
            }
        }
    }

    /// Close the camera view, or abandon an open that is still in flight.
    pub async fn cancel_camera(&self) -> Result<(), CaptureError> {
        let mut inner = self.inner.lock().await;
        let opening = inner.state.status == CaptureStatus::Upload && inner.state.camera_pending;
        if !opening {
            inner.require(CaptureStatus::Camera, "cancel the camera")?;
        }
        inner.abandon_acquisition();
        inner.release_camera();
        inner.state.clear_messages();
        inner.state.status = CaptureStatus::Upload;
        self.publish(&inner);
        Ok(())
    }

    pub async fn select_file(&self, file: SelectedFile) -> Result<ImageSummary, CaptureError> {
        let mut inner = self.inner.lock().await;
        inner.require(CaptureStatus::Upload, "select a file")?;
        if inner.state.camera_pending {
            log_debug!("session {} abandoning camera open for a file", self.session_id);
            inner.abandon_acquisition();
        }

        match validate_file(file, self.config.image.max_file_bytes) {
            Ok(image) => {
                let summary = ImageSummary::from(&image);
                inner.state.hold_image(image);
                self.publish(&inner);
                Ok(summary)
            }
            Err(rejection) => {
                inner.state.error = None;
                inner.state.notice = Some(rejection.to_string());
                self.publish(&inner);
                Err(CaptureError::File(rejection))
            }
        }
    }

    /// Discard the image and go back to the source choice.
    pub async fn retake(&self) -> Result<(), CaptureError> {
        let mut inner = self.inner.lock().await;
        if !matches!(
            inner.state.status,
            CaptureStatus::Preview | CaptureStatus::Processing
        ) {
            return Err(CaptureError::InvalidTransition {
                action: "retake",
                status: inner.state.status,
            });
        }
        inner.cancel_attempt();
        inner.state.discard_image();
        self.publish(&inner);
        Ok(())
    }

    /// Upload the held image and ask the recognition service for the weight.
    pub async fn confirm_photo(&self) -> Result<ConfirmOutcome, CaptureError> {
        let (generation, cancel, image) = {
            let mut inner = self.inner.lock().await;
            inner.require(CaptureStatus::Preview, "submit the photo")?;
            let Some(image) = inner.state.image.clone() else {
                return Err(CaptureError::InvalidTransition {
                    action: "submit the photo",
                    status: CaptureStatus::Upload,
                });
            };
            if inner.state.retry_count >= inner.state.max_retries {
                return Err(CaptureError::RetriesExhausted);
            }
            inner.state.clear_messages();
            inner.state.status = CaptureStatus::Processing;
            let (generation, cancel) = inner.begin_attempt();
            self.publish(&inner);
            (generation, cancel, image)
        };

        let job = RecognitionJob {
            session_id: &self.session_id,
            user_id: &self.user_id,
            day_number: self.day_number,
            image: &image,
        };
        let outcome = self
            .orchestrator
            .recognize(job, &cancel, |stage, notice| self.retry_progress(stage, notice))
            .await;

        let mut inner = self.inner.lock().await;
        if !inner.is_current(generation) {
            log_debug!(
                "session {} discarding recognition result for superseded generation {generation}",
                self.session_id
            );
            return Ok(ConfirmOutcome::Discarded);
        }
        inner.attempt = None;

        match outcome {
            Ok(result) => {
                self.settle_success(&mut inner, result.clone());
                Ok(ConfirmOutcome::Recognized(result))
            }
            Err(RecognitionError::Classified(classification)) => {
                inner.state.record_failure(classification.clone());
                log_info!(
                    "session {} recognition failed ({}), retry {}/{}",
                    self.session_id,
                    classification.label(),
                    inner.state.retry_count,
                    inner.state.max_retries
                );
                self.publish(&inner);
                Ok(ConfirmOutcome::Failed(classification))
            }
            Err(RecognitionError::Cancelled) => {
                inner.state.status = CaptureStatus::Preview;
                self.publish(&inner);
                Ok(ConfirmOutcome::Discarded)
            }
        }
    }

    /// Record a typed weight once recognition has failed for this image.
    pub async fn submit_manual(&self, text: &str) -> Result<WeighInResult, CaptureError> {
        let (generation, cancel) = {
            let mut inner = self.inner.lock().await;
            inner.require(CaptureStatus::Preview, "enter a weight")?;
            if !inner.state.manual_entry_offered {
                return Err(CaptureError::InvalidTransition {
                    action: "enter a weight",
                    status: CaptureStatus::Preview,
                });
            }
            if let Err(err) = self.manual.validate(text) {
                inner.state.notice = Some(err.to_string());
                self.publish(&inner);
                return Err(CaptureError::Manual(ManualEntryError::Invalid(err)));
            }
            inner.state.notice = None;
            inner.state.status = CaptureStatus::Processing;
            let attempt = inner.begin_attempt();
            self.publish(&inner);
            attempt
        };

        let outcome = self
            .manual
            .submit(&self.session_id, self.day_number, text, &cancel, |stage, notice| {
                self.retry_progress(stage, notice)
            })
            .await;

        let mut inner = self.inner.lock().await;
        if !inner.is_current(generation) {
            return Err(CaptureError::Superseded);
        }
        inner.attempt = None;

        match outcome {
            Ok(result) => {
                self.settle_success(&mut inner, result.clone());
                Ok(result)
            }
            Err(ManualEntryError::Cancelled) => {
                inner.state.status = CaptureStatus::Preview;
                self.publish(&inner);
                Err(CaptureError::Superseded)
            }
            Err(err) => {
                inner.state.status = CaptureStatus::Preview;
                match &err {
                    ManualEntryError::Invalid(validation) => {
                        inner.state.notice = Some(validation.to_string())
                    }
                    ManualEntryError::Failed(classification) => {
                        inner.state.error = Some(classification.clone())
                    }
                    ManualEntryError::Cancelled => {}
                }
                self.publish(&inner);
                Err(CaptureError::Manual(err))
            }
        }
    }

    pub async fn request_skip(&self) -> Result<(), CaptureError> {
        let mut inner = self.inner.lock().await;
        inner.require(CaptureStatus::Success, "skip")?;
        inner.state.gate.request_skip()?;
        self.publish(&inner);
        Ok(())
    }

    /// Escape or outside click on the contact prompt.
    pub async fn dismiss(&self) -> Result<(), CaptureError> {
        let mut inner = self.inner.lock().await;
        inner.require(CaptureStatus::Success, "dismiss")?;
        inner.state.gate.dismiss()?;
        self.publish(&inner);
        Ok(())
    }

    pub async fn return_to_form(&self) -> Result<(), CaptureError> {
        let mut inner = self.inner.lock().await;
        inner.require(CaptureStatus::Success, "return to the form")?;
        inner.state.gate.return_to_form()?;
        self.publish(&inner);
        Ok(())
    }

    pub async fn confirm_skip(&self) -> Result<(), CaptureError> {
        let mut inner = self.inner.lock().await;
        inner.require(CaptureStatus::Success, "confirm skip")?;
        inner.state.gate.confirm_skip()?;
        log_info!("session {} skipped the contact prompt", self.session_id);
        self.conclude(&mut inner);
        Ok(())
    }

    pub async fn submit_contact(&self, phone: &str) -> Result<(), CaptureError> {
        let (generation, cancel) = {
            let mut inner = self.inner.lock().await;
            inner.require(CaptureStatus::Success, "submit contact details")?;
            inner.state.gate.begin_submit()?;
            let attempt = inner.begin_attempt();
            self.publish(&inner);
            attempt
        };

        let outcome = self
            .contact
            .submit(&self.session_id, phone, &cancel, |stage, notice| {
                self.retry_progress(stage, notice)
            })
            .await;

        let mut inner = self.inner.lock().await;
        if !inner.is_current(generation) {
            inner.state.gate.submission_abandoned();
            return Err(CaptureError::Superseded);
        }
        inner.attempt = None;

        match outcome {
            Ok(_) => {
                inner.state.gate.submission_succeeded();
                self.conclude(&mut inner);
                Ok(())
            }
            Err(ContactError::Cancelled) => {
                inner.state.gate.submission_abandoned();
                self.publish(&inner);
                Err(CaptureError::Superseded)
            }
            Err(err) => {
                inner.state.gate.submission_failed(err.user_message());
                self.publish(&inner);
                Err(CaptureError::Contact(err))
            }
        }
    }

    /// Navigation away. Releases the camera and abandons in-flight work.
    pub async fn exit(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state.status == CaptureStatus::Exited {
            return;
        }
        inner.cancel_attempt();
        inner.release_camera();
        inner.state.exit();
        log_info!("capture session {} exited", self.session_id);
        self.publish(&inner);
    }

    fn settle_success(&self, inner: &mut CaptureInner, result: WeighInResult) {
        inner.state.succeed(result.clone());
        match inner.state.gate.evaluate(&result) {
            GateDecision::Prompt => {
                log_info!(
                    "session {} completed the challenge; asking for contact details",
                    self.session_id
                );
                self.publish(inner);
                let _ = self.events.send(CaptureEvent::ContactPrompt {
                    day_number: result.day_number,
                });
            }
            GateDecision::Conclude => self.conclude(inner),
        }
    }

    fn conclude(&self, inner: &mut CaptureInner) {
        if let Err(err) = inner.state.gate.conclude() {
            log_warn!("session {} cannot conclude yet: {err}", self.session_id);
            return;
        }
        inner.state.concluded = true;
        self.publish(inner);

        let Some(result) = inner.state.result.clone() else {
            return;
        };
        self.hand_off_badge(&result);
        let _ = self.events.send(CaptureEvent::Concluded {
            result,
            gate: inner.state.gate.state(),
        });
    }

    fn hand_off_badge(&self, result: &WeighInResult) {
        let (Some(store), Some(badge)) = (&self.handoff, &result.badge_earned) else {
            return;
        };
        let handoff = BadgeHandoff {
            badge: badge.clone(),
            day_number: result.day_number,
            earned_at: result.recorded_at,
        };
        if let Err(err) = store.put_badge(handoff) {
            log_warn!("failed to hand off badge {badge}: {err:#}");
        }
    }

    fn retry_progress(&self, stage: PipelineStage, notice: &RetryNotice) {
        let _ = self.events.send(CaptureEvent::RetryProgress {
            stage,
            label: notice.progress_label(),
        });
    }

    fn publish(&self, inner: &CaptureInner) {
        let _ = self.events.send(CaptureEvent::StateChanged {
            snapshot: inner.state.snapshot(),
        });
    }
}
