use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{CaptureConfig, ContactFormat};
use crate::recognition::PipelineStage;
use crate::reporting::{ErrorReport, ErrorReporter};
use crate::services::ContactSubmitter;
use crate::transfer::{RetryNotice, TransferController, TransferError, TransferRequest};

pub const CONTACT_ENDPOINT: &str = "profile.phone";

const GENERIC_CONTACT_FAILURE: &str = "We couldn't save your phone number. Please try again.";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PhoneError {
    #[error("Please enter your phone number.")]
    Empty,
    #[error("Phone number must be {prefix} followed by {digits} digits.")]
    Format { prefix: String, digits: usize },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContactError {
    #[error(transparent)]
    Invalid(#[from] PhoneError),
    /// Failure message from the profile service, shown verbatim.
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Failed(String),
    #[error("contact submission cancelled")]
    Cancelled,
}

impl ContactError {
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

/// Normalize to `<prefix><digits>`.
///
/// Separators are ignored, the prefix may be written with or without `+`,
/// and a national trunk `0` is replaced by the prefix.
pub fn normalize_phone(input: &str, format: &ContactFormat) -> Result<String, PhoneError> {
    let compact: String = input
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();
    if compact.is_empty() {
        return Err(PhoneError::Empty);
    }

    let bare_prefix = format.country_prefix.trim_start_matches('+');
    let national = if let Some(rest) = compact.strip_prefix(format.country_prefix.as_str()) {
        rest
    } else if let Some(rest) = compact
        .strip_prefix(bare_prefix)
        .filter(|rest| rest.len() == format.digits)
    {
        rest
    } else if let Some(rest) = compact.strip_prefix('0') {
        rest
    } else {
        compact.as_str()
    };

    if national.len() != format.digits || !national.chars().all(|c| c.is_ascii_digit()) {
        return Err(PhoneError::Format {
            prefix: format.country_prefix.clone(),
            digits: format.digits,
        });
    }

    Ok(format!("+{bare_prefix}{national}"))
}

/// Sends the phone number collected by the completion prompt.
#[derive(Clone)]
pub struct ContactForm {
    submitter: Arc<dyn ContactSubmitter>,
    reporter: Arc<dyn ErrorReporter>,
    transfer: TransferController,
    config: Arc<CaptureConfig>,
}

impl ContactForm {
    pub fn new(
        submitter: Arc<dyn ContactSubmitter>,
        reporter: Arc<dyn ErrorReporter>,
        transfer: TransferController,
        config: Arc<CaptureConfig>,
    ) -> Self {
        Self {
            submitter,
            reporter,
            transfer,
            config,
        }
    }

    pub async fn submit<R>(
        &self,
        session_id: &str,
        phone: &str,
        cancel: &CancellationToken,
        mut on_retry: R,
    ) -> Result<String, ContactError>
    where
        R: FnMut(PipelineStage, &RetryNotice),
    {
        let phone_number = normalize_phone(phone, &self.config.contact)?;

        let submitter = self.submitter.clone();
        let outcome = self
            .transfer
            .execute(
                TransferRequest {
                    endpoint: CONTACT_ENDPOINT,
                    method: "POST",
                    timeout: self.config.contact_timeout(),
                    policy: &self.config.retry,
                },
                cancel,
                || submitter.submit_phone(&phone_number),
                |notice| on_retry(PipelineStage::Contact, notice),
            )
            .await;

        let (classification, detail, retries, error) = match outcome {
            Ok(response) if response.success => {
                log::info!("session {session_id} submitted contact number");
                return Ok(phone_number);
            }
            Ok(response) => {
                let message = response
                    .message
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| GENERIC_CONTACT_FAILURE.to_string());
                (
                    "contact-rejected",
                    message.clone(),
                    0,
                    ContactError::Rejected(message),
                )
            }
            Err(err) if err.is_cancelled() => return Err(ContactError::Cancelled),
            Err(TransferError::Rejected {
                status, message, ..
            }) if !message.trim().is_empty() => (
                "contact-rejected",
                format!("HTTP {status}: {message}"),
                0,
                ContactError::Rejected(message),
            ),
            Err(err) => (
                if err.is_timeout() {
                    "contact-timeout"
                } else {
                    "contact-failed"
                },
                err.to_string(),
                err.retries(),
                ContactError::Failed(GENERIC_CONTACT_FAILURE.to_string()),
            ),
        };

        self.reporter.report(
            ErrorReport::new(CONTACT_ENDPOINT, "POST", classification, detail)
                .with_session(session_id)
                .with_retries(retries),
        );
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ContactResponse;
    use crate::testing::{FakeContactSubmitter, RecordingReporter};
    use crate::transfer::TransportError;

    fn thai() -> ContactFormat {
        ContactFormat::default()
    }

    #[test]
    fn normalizes_common_spellings() {
        let format = thai();
        assert_eq!(normalize_phone("+66 81 234 5678", &format).unwrap(), "+66812345678");
        assert_eq!(normalize_phone("081-234-5678", &format).unwrap(), "+66812345678");
        assert_eq!(normalize_phone("66812345678", &format).unwrap(), "+66812345678");
        assert_eq!(normalize_phone("812345678", &format).unwrap(), "+66812345678");
    }

    #[test]
    fn rejects_wrong_lengths_and_letters() {
        let format = thai();
        assert_eq!(normalize_phone("  ", &format), Err(PhoneError::Empty));
        assert!(normalize_phone("+6681234567", &format).is_err());
        assert!(normalize_phone("+66 81 234 567a", &format).is_err());
        let err = normalize_phone("12345", &format).unwrap_err();
        assert_eq!(err.to_string(), "Phone number must be +66 followed by 9 digits.");
    }

    fn form(submitter: Arc<FakeContactSubmitter>, reporter: Arc<RecordingReporter>) -> ContactForm {
        ContactForm::new(
            submitter,
            reporter,
            TransferController::new(),
            Arc::new(CaptureConfig::default()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn service_message_is_surfaced_verbatim() {
        let submitter = Arc::new(FakeContactSubmitter::default());
        submitter.push(Ok(ContactResponse {
            success: false,
            message: Some("This number is already registered to another account.".into()),
        }));
        let reporter = Arc::new(RecordingReporter::default());

        let err = form(submitter, reporter.clone())
            .submit("s", "0812345678", &CancellationToken::new(), |_, _| {})
            .await
            .unwrap_err();
        assert_eq!(
            err.user_message(),
            "This number is already registered to another account."
        );
        assert_eq!(reporter.reports()[0].classification, "contact-rejected");
    }

    #[tokio::test(start_paused = true)]
    async fn http_rejection_body_is_surfaced_verbatim() {
        let submitter = Arc::new(FakeContactSubmitter::default());
        submitter.push(Err(TransportError::status(
            409,
            "This number is already registered.",
        )));
        let reporter = Arc::new(RecordingReporter::default());

        let err = form(submitter.clone(), reporter.clone())
            .submit("s", "0812345678", &CancellationToken::new(), |_, _| {})
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ContactError::Rejected("This number is already registered.".into())
        );
        assert_eq!(err.user_message(), "This number is already registered.");
        assert_eq!(submitter.numbers().len(), 1);
        let reports = reporter.reports();
        assert_eq!(reports[0].classification, "contact-rejected");
        assert_eq!(reports[0].retry_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failures_use_the_generic_message() {
        let submitter = Arc::new(FakeContactSubmitter::default());
        for _ in 0..4 {
            submitter.push(Err(TransportError::Network("offline".into())));
        }
        let err = form(submitter.clone(), Arc::new(RecordingReporter::default()))
            .submit("s", "0812345678", &CancellationToken::new(), |_, _| {})
            .await
            .unwrap_err();
        assert_eq!(err, ContactError::Failed(GENERIC_CONTACT_FAILURE.into()));
        assert_eq!(submitter.numbers().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_numbers_are_not_sent() {
        let submitter = Arc::new(FakeContactSubmitter::default());
        let err = form(submitter.clone(), Arc::new(RecordingReporter::default()))
            .submit("s", "12", &CancellationToken::new(), |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, ContactError::Invalid(PhoneError::Format { .. })));
        assert!(submitter.numbers().is_empty());
    }
}
