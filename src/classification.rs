//! Failure taxonomies surfaced to the UI.
//!
//! Camera failures and recognition failures are kept in separate enums so a
//! camera problem can never be rendered with a recognition remedy (or the
//! reverse). Camera kinds always offer "try again"; recognition kinds always
//! offer manual entry in place.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum CameraErrorKind {
    PermissionDenied,
    NoCamera,
    InUse,
    Unknown,
}

impl CameraErrorKind {
    /// Classify a device failure by its error name and message.
    pub fn classify(name: &str, message: &str) -> Self {
        let message = message.to_ascii_lowercase();
        match name {
            "NotAllowedError" | "PermissionDeniedError" | "SecurityError" => {
                return CameraErrorKind::PermissionDenied
            }
            "NotFoundError" | "DevicesNotFoundError" | "OverconstrainedError" => {
                return CameraErrorKind::NoCamera
            }
            "NotReadableError" | "TrackStartError" | "AbortError" => {
                return CameraErrorKind::InUse
            }
            _ => {}
        }

        if contains_any(&message, &["permission", "denied", "not allowed"]) {
            CameraErrorKind::PermissionDenied
        } else if contains_any(&message, &["no camera", "not found", "requested device", "no device"]) {
            CameraErrorKind::NoCamera
        } else if contains_any(&message, &["in use", "could not start", "busy", "not readable"]) {
            CameraErrorKind::InUse
        } else {
            CameraErrorKind::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CameraErrorKind::PermissionDenied => "permission-denied",
            CameraErrorKind::NoCamera => "no-camera",
            CameraErrorKind::InUse => "in-use",
            CameraErrorKind::Unknown => "unknown",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            CameraErrorKind::PermissionDenied => "Camera access was denied.",
            CameraErrorKind::NoCamera => "No camera was found on this device.",
            CameraErrorKind::InUse => "The camera is being used by another app.",
            CameraErrorKind::Unknown => "The camera could not be started.",
        }
    }

    pub fn remedy(&self) -> &'static str {
        match self {
            CameraErrorKind::PermissionDenied => {
                "Re-enable camera access in your browser or device settings, then reload the page."
            }
            CameraErrorKind::NoCamera => "Upload a photo of your scale from your gallery instead.",
            CameraErrorKind::InUse => {
                "Close other apps or tabs that are using the camera, then try again."
            }
            CameraErrorKind::Unknown => "Try again, or upload a photo of your scale instead.",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum RecognitionErrorKind {
    NoWeightFound,
    ImageUnclear,
    InvalidWeight,
    ProcessingTimeout,
    ApiError,
}

impl RecognitionErrorKind {
    /// Classify a recognition failure message. Timeouts are checked first so
    /// "timed out reading digits" is not mistaken for an unreadable image.
    pub fn classify(message: &str) -> Self {
        let message = message.to_ascii_lowercase();
        if contains_any(&message, &["timeout", "timed out", "deadline"]) {
            RecognitionErrorKind::ProcessingTimeout
        } else if contains_any(
            &message,
            &[
                "no weight",
                "not find",
                "couldn't find",
                "could not find",
                "not detected",
                "no digits",
                "no number",
            ],
        ) {
            RecognitionErrorKind::NoWeightFound
        } else if contains_any(
            &message,
            &["unclear", "blur", "too dark", "unreadable", "low quality", "not clear"],
        ) {
            RecognitionErrorKind::ImageUnclear
        } else if contains_any(&message, &["invalid", "out of range", "implausible"]) {
            RecognitionErrorKind::InvalidWeight
        } else {
            RecognitionErrorKind::ApiError
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecognitionErrorKind::NoWeightFound => "no-weight-found",
            RecognitionErrorKind::ImageUnclear => "image-unclear",
            RecognitionErrorKind::InvalidWeight => "invalid-weight",
            RecognitionErrorKind::ProcessingTimeout => "processing-timeout",
            RecognitionErrorKind::ApiError => "api-error",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            RecognitionErrorKind::NoWeightFound => "We couldn't find a weight reading in this photo.",
            RecognitionErrorKind::ImageUnclear => "The photo is too blurry or dark to read.",
            RecognitionErrorKind::InvalidWeight => "The detected weight doesn't look right.",
            RecognitionErrorKind::ProcessingTimeout => "Reading your photo took too long.",
            RecognitionErrorKind::ApiError => "Something went wrong while reading your photo.",
        }
    }

    pub fn remedy(&self) -> &'static str {
        match self {
            RecognitionErrorKind::NoWeightFound => {
                "Make sure the whole scale display is in frame, or enter your weight manually."
            }
            RecognitionErrorKind::ImageUnclear => {
                "Retake the photo in good light with the phone held steady, or enter your weight manually."
            }
            RecognitionErrorKind::InvalidWeight => {
                "Check the reading on the display and enter your weight manually."
            }
            RecognitionErrorKind::ProcessingTimeout => {
                "Check your connection and try again, or enter your weight manually."
            }
            RecognitionErrorKind::ApiError => {
                "Try again in a moment, or enter your weight manually."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "domain", content = "kind", rename_all = "camelCase")]
pub enum ErrorKind {
    Camera(CameraErrorKind),
    Recognition(RecognitionErrorKind),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorClassification {
    pub kind: ErrorKind,
    pub message: String,
    pub remedy: String,
}

impl ErrorClassification {
    pub fn camera(kind: CameraErrorKind) -> Self {
        Self {
            kind: ErrorKind::Camera(kind),
            message: kind.message().to_string(),
            remedy: kind.remedy().to_string(),
        }
    }

    pub fn recognition(kind: RecognitionErrorKind) -> Self {
        Self {
            kind: ErrorKind::Recognition(kind),
            message: kind.message().to_string(),
            remedy: kind.remedy().to_string(),
        }
    }

    pub fn with_remedy(mut self, remedy: impl Into<String>) -> Self {
        self.remedy = remedy.into();
        self
    }

    pub fn camera_kind(&self) -> Option<CameraErrorKind> {
        match self.kind {
            ErrorKind::Camera(kind) => Some(kind),
            ErrorKind::Recognition(_) => None,
        }
    }

    pub fn recognition_kind(&self) -> Option<RecognitionErrorKind> {
        match self.kind {
            ErrorKind::Recognition(kind) => Some(kind),
            ErrorKind::Camera(_) => None,
        }
    }

    pub fn offers_retry(&self) -> bool {
        matches!(self.kind, ErrorKind::Camera(_))
    }

    pub fn offers_manual_entry(&self) -> bool {
        matches!(self.kind, ErrorKind::Recognition(_))
    }

    pub fn label(&self) -> &'static str {
        match self.kind {
            ErrorKind::Camera(kind) => kind.as_str(),
            ErrorKind::Recognition(kind) => kind.as_str(),
        }
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
