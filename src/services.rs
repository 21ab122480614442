//! Contracts for the hosted collaborators the capture flow talks to.
//!
//! Every network-facing call returns [`TransportError`] so the shared
//! [`crate::transfer::TransferController`] can decide what is worth retrying.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::transfer::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: String,
    pub access_token: String,
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// `None` when the visitor is not signed in.
    async fn current_session(&self) -> Option<AuthSession>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path` (already scoped to the user) and return the stored reference.
    async fn upload(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, TransportError>;
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionRequest {
    /// Base64 of the prepared image.
    pub image_data: String,
    pub stored_reference: String,
    pub mime_type: String,
    pub day_number: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RecognitionResponse {
    pub success: bool,
    pub weight_value: Option<f64>,
    pub day_number: Option<u8>,
    pub is_new_day: bool,
    pub badge_earned: Option<String>,
    pub error_message: Option<String>,
}

#[async_trait]
pub trait RecognitionService: Send + Sync {
    async fn recognize(
        &self,
        request: &RecognitionRequest,
    ) -> Result<RecognitionResponse, TransportError>;
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManualRecordRequest {
    pub day_number: u8,
    pub weight_value: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ManualRecordResponse {
    pub is_new_day: bool,
    pub badge_earned: Option<String>,
}

#[async_trait]
pub trait WeighInRecorder: Send + Sync {
    async fn record_manual(
        &self,
        request: &ManualRecordRequest,
    ) -> Result<ManualRecordResponse, TransportError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactResponse {
    pub success: bool,
    pub message: Option<String>,
}

#[async_trait]
pub trait ContactSubmitter: Send + Sync {
    async fn submit_phone(&self, phone_number: &str) -> Result<ContactResponse, TransportError>;
}
