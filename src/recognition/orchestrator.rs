use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::classification::{ErrorClassification, RecognitionErrorKind};
use crate::config::CaptureConfig;
use crate::imaging::{ImagePreparer, PrepareError};
use crate::models::{CapturedImage, WeighInResult, WeighInSource};
use crate::reporting::{ErrorReport, ErrorReporter};
use crate::services::{BlobStore, RecognitionRequest, RecognitionResponse, RecognitionService};
use crate::transfer::{RetryNotice, TransferController, TransferError, TransferRequest};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const UPLOAD_ENDPOINT: &str = "storage.upload";
pub const RECOGNITION_ENDPOINT: &str = "weigh-in.recognize";
const PREPARE_ENDPOINT: &str = "image.prepare";

const SMALLER_IMAGE_REMEDY: &str =
    "This photo took too long to prepare. Try a smaller image, or enter your weight manually.";

/// Network stage a retry notice belongs to.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PipelineStage {
    Upload,
    Recognition,
    ManualRecord,
    Contact,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecognitionError {
    #[error("{}", .0.message)]
    Classified(ErrorClassification),
    /// The attempt was superseded (retake, exit) before it finished.
    #[error("recognition attempt cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
pub struct RecognitionJob<'a> {
    pub session_id: &'a str,
    pub user_id: &'a str,
    pub day_number: u8,
    pub image: &'a CapturedImage,
}

/// Drives image -> stored object -> recognition result and turns every
/// failure into a recognition-kind [`ErrorClassification`].
#[derive(Clone)]
pub struct RecognitionOrchestrator {
    store: Arc<dyn BlobStore>,
    recognizer: Arc<dyn RecognitionService>,
    reporter: Arc<dyn ErrorReporter>,
    transfer: TransferController,
    preparer: ImagePreparer,
    config: Arc<CaptureConfig>,
}

impl RecognitionOrchestrator {
    pub fn new(
        store: Arc<dyn BlobStore>,
        recognizer: Arc<dyn RecognitionService>,
        reporter: Arc<dyn ErrorReporter>,
        transfer: TransferController,
        config: Arc<CaptureConfig>,
    ) -> Self {
        Self {
            store,
            recognizer,
            reporter,
            transfer,
            preparer: ImagePreparer::new(&config.image),
            config,
        }
    }

    /// Run one recognition attempt. The caller keeps ownership of the image
    /// whatever the outcome.
    pub async fn recognize<R>(
        &self,
        job: RecognitionJob<'_>,
        cancel: &CancellationToken,
        mut on_retry: R,
    ) -> Result<WeighInResult, RecognitionError>
    where
        R: FnMut(PipelineStage, &RetryNotice),
    {
        let prepared = match self.preparer.prepare(job.image).await {
            Ok(prepared) => prepared,
            Err(err @ PrepareError::Timeout { .. }) => {
                let classification =
                    ErrorClassification::recognition(RecognitionErrorKind::ProcessingTimeout)
                        .with_remedy(SMALLER_IMAGE_REMEDY);
                self.report(&job, PREPARE_ENDPOINT, "LOCAL", &classification, 0, err.to_string());
                return Err(RecognitionError::Classified(classification));
            }
            Err(err) => {
                log_warn!("image preparation failed ({err}); uploading original");
                job.image.clone()
            }
        };

        if cancel.is_cancelled() {
            return Err(RecognitionError::Cancelled);
        }

        let path = format!(
            "{}/day-{}/{}.{}",
            job.user_id,
            job.day_number,
            Uuid::new_v4(),
            prepared.extension()
        );

        let store = self.store.clone();
        let stored_reference = self
            .transfer
            .execute(
                TransferRequest {
                    endpoint: UPLOAD_ENDPOINT,
                    method: "PUT",
                    timeout: self.config.upload_timeout(),
                    policy: &self.config.retry,
                },
                cancel,
                || store.upload(&path, &prepared.bytes, &prepared.mime_type),
                |notice| on_retry(PipelineStage::Upload, notice),
            )
            .await
            .map_err(|err| self.transfer_failure(&job, UPLOAD_ENDPOINT, "PUT", err))?;

        log_info!(
            "session {} day {} uploaded {} bytes to {}",
            job.session_id,
            job.day_number,
            prepared.len(),
            stored_reference
        );

        let request = RecognitionRequest {
            image_data: STANDARD.encode(&prepared.bytes),
            stored_reference,
            mime_type: prepared.mime_type.clone(),
            day_number: job.day_number,
        };

        let recognizer = self.recognizer.clone();
        let response = self
            .transfer
            .execute(
                TransferRequest {
                    endpoint: RECOGNITION_ENDPOINT,
                    method: "POST",
                    timeout: self.config.recognition_timeout(),
                    policy: &self.config.retry,
                },
                cancel,
                || recognizer.recognize(&request),
                |notice| on_retry(PipelineStage::Recognition, notice),
            )
            .await
            .map_err(|err| self.transfer_failure(&job, RECOGNITION_ENDPOINT, "POST", err))?;

        self.interpret(&job, response)
    }

    fn interpret(
        &self,
        job: &RecognitionJob<'_>,
        response: RecognitionResponse,
    ) -> Result<WeighInResult, RecognitionError> {
        if !response.success {
            let message = response.error_message.unwrap_or_default();
            let classification =
                ErrorClassification::recognition(RecognitionErrorKind::classify(&message));
            self.report(job, RECOGNITION_ENDPOINT, "POST", &classification, 0, message);
            return Err(RecognitionError::Classified(classification));
        }

        let weight_value = match response.weight_value {
            Some(value) if self.config.weight.contains(value) => value,
            other => {
                let classification =
                    ErrorClassification::recognition(RecognitionErrorKind::InvalidWeight);
                self.report(
                    job,
                    RECOGNITION_ENDPOINT,
                    "POST",
                    &classification,
                    0,
                    format!("recognized weight {other:?} outside plausible range"),
                );
                return Err(RecognitionError::Classified(classification));
            }
        };

        let result = WeighInResult {
            weight_value,
            day_number: response.day_number.unwrap_or(job.day_number),
            source: WeighInSource::Recognized,
            is_new_day: response.is_new_day,
            badge_earned: response.badge_earned,
            recorded_at: Utc::now(),
        };
        log_info!(
            "session {} recognized {:.1} for day {} (new day: {})",
            job.session_id,
            result.weight_value,
            result.day_number,
            result.is_new_day
        );
        Ok(result)
    }

    fn transfer_failure(
        &self,
        job: &RecognitionJob<'_>,
        endpoint: &str,
        method: &str,
        err: TransferError,
    ) -> RecognitionError {
        if err.is_cancelled() {
            log_debug!("session {} {endpoint} cancelled", job.session_id);
            return RecognitionError::Cancelled;
        }
        let classification = classify_transfer_error(&err);
        self.report(job, endpoint, method, &classification, err.retries(), err.to_string());
        RecognitionError::Classified(classification)
    }

    fn report(
        &self,
        job: &RecognitionJob<'_>,
        endpoint: &str,
        method: &str,
        classification: &ErrorClassification,
        retries: u32,
        detail: String,
    ) {
        self.reporter.report(
            ErrorReport::new(endpoint, method, classification.label(), detail)
                .with_session(job.session_id)
                .with_retries(retries),
        );
    }
}

/// Transport failures never reach the UI verbatim; only their classification does.
pub fn classify_transfer_error(err: &TransferError) -> ErrorClassification {
    let kind = match err {
        TransferError::Timeout { .. } => RecognitionErrorKind::ProcessingTimeout,
        TransferError::Rejected { message, .. } => RecognitionErrorKind::classify(message),
        TransferError::Exhausted { .. } | TransferError::Cancelled { .. } => {
            RecognitionErrorKind::ApiError
        }
    };
    ErrorClassification::recognition(kind)
}
