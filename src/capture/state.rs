use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classification::ErrorClassification;
use crate::completion::{CompletionGate, GateSnapshot};
use crate::media::CameraReadiness;
use crate::models::{CapturedImage, ImageSummary, WeighInResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CaptureStatus {
    Upload,
    Camera,
    Preview,
    Processing,
    Success,
    Exited,
}

impl Default for CaptureStatus {
    fn default() -> Self {
        CaptureStatus::Upload
    }
}

#[derive(Debug, Clone)]
pub struct CaptureState {
    pub session_id: String,
    pub day_number: u8,
    pub status: CaptureStatus,
    /// Owned by the session until retake, exit or completion.
    pub image: Option<CapturedImage>,
    /// Failed recognition submissions of the current image.
    pub retry_count: u8,
    pub max_retries: u8,
    pub error: Option<ErrorClassification>,
    /// Field-level or inline message (file rejection, invalid weight, stalled camera).
    pub notice: Option<String>,
    pub manual_entry_offered: bool,
    pub camera_readiness: Option<CameraReadiness>,
    pub camera_pending: bool,
    pub result: Option<WeighInResult>,
    pub concluded: bool,
    pub gate: CompletionGate,
    /// Bumped whenever in-flight work must be ignored on arrival.
    pub generation: u64,
}

impl CaptureState {
    pub fn new(day_number: u8, max_retries: u8) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            day_number,
            status: CaptureStatus::Upload,
            image: None,
            retry_count: 0,
            max_retries,
            error: None,
            notice: None,
            manual_entry_offered: false,
            camera_readiness: None,
            camera_pending: false,
            result: None,
            concluded: false,
            gate: CompletionGate::new(),
            generation: 0,
        }
    }

    pub fn can_retry_recognition(&self) -> bool {
        self.status == CaptureStatus::Preview
            && self.image.is_some()
            && self.retry_count < self.max_retries
    }

    pub fn clear_messages(&mut self) {
        self.error = None;
        self.notice = None;
    }

    /// Move to preview with a fresh image; the retry budget starts over.
    pub fn hold_image(&mut self, image: CapturedImage) {
        self.image = Some(image);
        self.retry_count = 0;
        self.manual_entry_offered = false;
        self.camera_readiness = None;
        self.clear_messages();
        self.status = CaptureStatus::Preview;
    }

    pub fn record_failure(&mut self, classification: ErrorClassification) {
        self.retry_count = self.retry_count.saturating_add(1).min(self.max_retries);
        self.manual_entry_offered = classification.offers_manual_entry();
        self.error = Some(classification);
        self.status = CaptureStatus::Preview;
    }

    pub fn discard_image(&mut self) {
        self.image = None;
        self.retry_count = 0;
        self.manual_entry_offered = false;
        self.clear_messages();
        self.generation = self.generation.wrapping_add(1);
        self.status = CaptureStatus::Upload;
    }

    pub fn succeed(&mut self, result: WeighInResult) {
        self.image = None;
        self.clear_messages();
        self.manual_entry_offered = false;
        self.result = Some(result);
        self.status = CaptureStatus::Success;
    }

    pub fn exit(&mut self) {
        self.image = None;
        self.camera_readiness = None;
        self.camera_pending = false;
        self.manual_entry_offered = false;
        self.generation = self.generation.wrapping_add(1);
        self.status = CaptureStatus::Exited;
    }

    pub fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot {
            session_id: self.session_id.clone(),
            day_number: self.day_number,
            status: self.status,
            image: self.image.as_ref().map(ImageSummary::from),
            retry_count: self.retry_count,
            can_retry_recognition: self.can_retry_recognition(),
            manual_entry_offered: self.manual_entry_offered,
            error: self.error.clone(),
            notice: self.notice.clone(),
            camera_opening: self.camera_pending,
            camera_readiness: self.camera_readiness,
            result: self.result.clone(),
            concluded: self.concluded,
            gate: self.gate.snapshot(),
        }
    }
}

/// Serializable view of the session rendered by the UI.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSnapshot {
    pub session_id: String,
    pub day_number: u8,
    pub status: CaptureStatus,
    pub image: Option<ImageSummary>,
    pub retry_count: u8,
    pub can_retry_recognition: bool,
    pub manual_entry_offered: bool,
    pub error: Option<ErrorClassification>,
    pub notice: Option<String>,
    /// The camera is being opened; the UI offers cancel and file upload.
    pub camera_opening: bool,
    pub camera_readiness: Option<CameraReadiness>,
    pub result: Option<WeighInResult>,
    pub concluded: bool,
    pub gate: GateSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::RecognitionErrorKind;
    use crate::models::ImageOrigin;

    fn image() -> CapturedImage {
        CapturedImage::new(vec![1, 2, 3], "image/jpeg", "scale.jpg", ImageOrigin::File)
    }

    #[test]
    fn retry_count_saturates_and_withdraws_retry() {
        let mut state = CaptureState::new(3, 3);
        state.hold_image(image());
        for _ in 0..5 {
            state.record_failure(ErrorClassification::recognition(
                RecognitionErrorKind::ImageUnclear,
            ));
        }
        assert_eq!(state.retry_count, 3);
        assert!(!state.can_retry_recognition());
        assert!(state.manual_entry_offered);
        assert!(state.image.is_some());
    }

    #[test]
    fn discarding_resets_budget_and_bumps_generation() {
        let mut state = CaptureState::new(3, 3);
        state.hold_image(image());
        state.record_failure(ErrorClassification::recognition(
            RecognitionErrorKind::ApiError,
        ));
        let before = state.generation;

        state.discard_image();
        assert_eq!(state.status, CaptureStatus::Upload);
        assert_eq!(state.retry_count, 0);
        assert!(state.image.is_none());
        assert_eq!(state.error, None);
        assert_ne!(state.generation, before);
    }

    #[test]
    fn snapshot_hides_image_bytes() {
        let mut state = CaptureState::new(1, 3);
        state.hold_image(image());
        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(json["status"], "preview");
        assert_eq!(json["image"]["byteLen"], 3);
        assert_eq!(json["canRetryRecognition"], true);
        assert_eq!(json["gate"]["state"], "notAsked");
    }
}
