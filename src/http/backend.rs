use std::sync::RwLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use crate::services::{
    AuthSession, BlobStore, ContactResponse, ContactSubmitter, ManualRecordRequest,
    ManualRecordResponse, RecognitionRequest, RecognitionResponse, RecognitionService,
    SessionProvider, WeighInRecorder,
};
use crate::transfer::TransportError;

use super::{error_message, map_reqwest_error};

const RECOGNIZE_FUNCTION: &str = "recognize-weight";
const RECORD_FUNCTION: &str = "record-weigh-in";
const PHONE_FUNCTION: &str = "update-phone";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpBackendConfig {
    /// Project root, e.g. `https://project.example.co`.
    pub base_url: String,
    /// Public anon key sent as `apikey`.
    pub api_key: String,
    pub bucket: String,
}

impl HttpBackendConfig {
    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.bucket,
            path.trim_start_matches('/')
        )
    }

    fn function_url(&self, name: &str) -> String {
        format!("{}/functions/v1/{name}", self.base_url.trim_end_matches('/'))
    }
}

/// Talks to the hosted backend on behalf of the signed-in user.
///
/// Per-attempt deadlines are enforced by the transfer controller; the client
/// timeout here only bounds connection setup.
pub struct HttpBackend {
    http: Client,
    config: HttpBackendConfig,
    session: RwLock<Option<AuthSession>>,
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(rename = "Key")]
    key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PhoneUpdate<'a> {
    phone_number: &'a str,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            config,
            session: RwLock::new(None),
        })
    }

    /// Sign-in itself happens elsewhere; the app hands over the session here.
    pub fn set_session(&self, session: Option<AuthSession>) {
        *self
            .session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = session;
    }

    fn bearer(&self) -> Result<String, TransportError> {
        self.session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|session| format!("Bearer {}", session.access_token))
            .ok_or_else(|| TransportError::status(401, "not signed in"))
    }

    async fn post_function<B, T>(&self, name: &str, body: &B) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .http
            .post(self.config.function_url(name))
            .header("apikey", &self.config.api_key)
            .header("Authorization", self.bearer()?)
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        check_status(response)
            .await?
            .json::<T>()
            .await
            .map_err(map_reqwest_error)
    }
}

async fn check_status(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::status(status.as_u16(), error_message(&body)))
}

#[async_trait]
impl SessionProvider for HttpBackend {
    async fn current_session(&self) -> Option<AuthSession> {
        self.session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl BlobStore for HttpBackend {
    async fn upload(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, TransportError> {
        let response = self
            .http
            .put(self.config.object_url(path))
            .header("apikey", &self.config.api_key)
            .header("Authorization", self.bearer()?)
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let uploaded = check_status(response)
            .await?
            .json::<UploadResponse>()
            .await
            .ok()
            .and_then(|body| body.key);
        Ok(uploaded.unwrap_or_else(|| format!("{}/{path}", self.config.bucket)))
    }
}

#[async_trait]
impl RecognitionService for HttpBackend {
    async fn recognize(
        &self,
        request: &RecognitionRequest,
    ) -> Result<RecognitionResponse, TransportError> {
        self.post_function(RECOGNIZE_FUNCTION, request).await
    }
}

#[async_trait]
impl WeighInRecorder for HttpBackend {
    async fn record_manual(
        &self,
        request: &ManualRecordRequest,
    ) -> Result<ManualRecordResponse, TransportError> {
        self.post_function(RECORD_FUNCTION, request).await
    }
}

#[async_trait]
impl ContactSubmitter for HttpBackend {
    async fn submit_phone(&self, phone_number: &str) -> Result<ContactResponse, TransportError> {
        self.post_function(PHONE_FUNCTION, &PhoneUpdate { phone_number })
            .await
    }
}
