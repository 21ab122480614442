use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::classification::ErrorClassification;
use crate::config::{CaptureConfig, WeightRange};
use crate::models::{WeighInResult, WeighInSource};
use crate::recognition::{classify_transfer_error, PipelineStage};
use crate::reporting::{ErrorReport, ErrorReporter};
use crate::services::{ManualRecordRequest, WeighInRecorder};
use crate::transfer::{RetryNotice, TransferController, TransferRequest};

pub const MANUAL_RECORD_ENDPOINT: &str = "weigh-in.manual";

/// Field-level error shown under the manual weight input.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Please enter your weight.")]
    Empty,
    #[error("Please enter a number, for example 72.4.")]
    NotNumeric,
    #[error("Please enter a weight between {min} and {max}.")]
    OutOfRange { min: f64, max: f64 },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ManualEntryError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("{}", .0.message)]
    Failed(ErrorClassification),
    #[error("manual entry cancelled")]
    Cancelled,
}

/// Parse operator input. Accepts a decimal comma (`72,4`).
pub fn parse_weight(text: &str, range: &WeightRange) -> Result<f64, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }

    let value: f64 = trimmed
        .replace(',', ".")
        .parse()
        .map_err(|_| ValidationError::NotNumeric)?;
    if !value.is_finite() {
        return Err(ValidationError::NotNumeric);
    }
    if !range.contains(value) {
        return Err(ValidationError::OutOfRange {
            min: range.min,
            max: range.max,
        });
    }
    Ok(value)
}

#[derive(Clone)]
pub struct ManualEntryFallback {
    recorder: Arc<dyn WeighInRecorder>,
    reporter: Arc<dyn ErrorReporter>,
    transfer: TransferController,
    config: Arc<CaptureConfig>,
}

impl ManualEntryFallback {
    pub fn new(
        recorder: Arc<dyn WeighInRecorder>,
        reporter: Arc<dyn ErrorReporter>,
        transfer: TransferController,
        config: Arc<CaptureConfig>,
    ) -> Self {
        Self {
            recorder,
            reporter,
            transfer,
            config,
        }
    }

    pub fn validate(&self, text: &str) -> Result<f64, ValidationError> {
        parse_weight(text, &self.config.weight)
    }

    /// Validate and record a manually entered weight.
    pub async fn submit<R>(
        &self,
        session_id: &str,
        day_number: u8,
        text: &str,
        cancel: &CancellationToken,
        mut on_retry: R,
    ) -> Result<WeighInResult, ManualEntryError>
    where
        R: FnMut(PipelineStage, &RetryNotice),
    {
        let weight_value = self.validate(text)?;
        let request = ManualRecordRequest {
            day_number,
            weight_value,
        };

        let recorder = self.recorder.clone();
        let response = self
            .transfer
            .execute(
                TransferRequest {
                    endpoint: MANUAL_RECORD_ENDPOINT,
                    method: "POST",
                    timeout: self.config.record_timeout(),
                    policy: &self.config.retry,
                },
                cancel,
                || recorder.record_manual(&request),
                |notice| on_retry(PipelineStage::ManualRecord, notice),
            )
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) if err.is_cancelled() => return Err(ManualEntryError::Cancelled),
            Err(err) => {
                let classification = classify_transfer_error(&err);
                self.reporter.report(
                    ErrorReport::new(
                        MANUAL_RECORD_ENDPOINT,
                        "POST",
                        classification.label(),
                        err.to_string(),
                    )
                    .with_session(session_id)
                    .with_retries(err.retries()),
                );
                return Err(ManualEntryError::Failed(classification));
            }
        };

        log::info!(
            "session {session_id} recorded manual weight {weight_value:.1} for day {day_number}"
        );

        Ok(WeighInResult {
            weight_value,
            day_number,
            source: WeighInSource::Manual,
            is_new_day: response.is_new_day,
            badge_earned: response.badge_earned,
            recorded_at: Utc::now(),
        })
    }
}
