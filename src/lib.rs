pub mod capture;
pub mod classification;
pub mod completion;
pub mod config;
mod db;
pub mod handoff;
pub mod http;
pub mod imaging;
pub mod manual_entry;
pub mod media;
pub mod models;
pub mod recognition;
pub mod reporting;
pub mod services;
pub mod transfer;
mod utils;

#[cfg(test)]
mod testing;

use std::{path::Path, sync::Arc};

use anyhow::Result;

use capture::{CaptureController, CaptureDeps, CaptureError};
use config::ConfigStore;
use handoff::HandoffStore;
use http::{HttpBackend, HttpBackendConfig};
use media::CameraDevice;
use reporting::JournalReporter;

pub use db::Database;
pub use utils::init_logging;

/// Long-lived services shared by every capture session in the host app.
pub struct WeighInApp {
    config: ConfigStore,
    db: Database,
    backend: Arc<HttpBackend>,
    handoff: Arc<HandoffStore>,
    camera: Arc<dyn CameraDevice>,
}

impl WeighInApp {
    /// Open (or create) the app data directory and wire the collaborators.
    pub fn bootstrap(
        data_dir: &Path,
        backend: HttpBackendConfig,
        camera: Arc<dyn CameraDevice>,
    ) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;

        let config = ConfigStore::new(data_dir.join("capture.json"))?;
        let db = Database::new(data_dir.join("weighin.sqlite3"))?;
        let handoff = Arc::new(HandoffStore::new(data_dir.join("handoff.json"))?);
        let backend = Arc::new(HttpBackend::new(backend)?);

        let current = config.config();
        log::info!(
            "weigh-in capture ready (upload {}ms, recognition {}ms, {} retries, debug={})",
            current.upload_timeout_ms,
            current.recognition_timeout_ms,
            current.retry.max_retries,
            current.debug
        );

        Ok(Self {
            config,
            db,
            backend,
            handoff,
            camera,
        })
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn backend(&self) -> &Arc<HttpBackend> {
        &self.backend
    }

    pub fn handoff(&self) -> &HandoffStore {
        &self.handoff
    }

    pub fn journal(&self) -> &Database {
        &self.db
    }

    /// Collaborators for a new session, with a config snapshot taken now.
    pub fn deps(&self) -> CaptureDeps {
        CaptureDeps {
            config: Arc::new(self.config.config()),
            sessions: self.backend.clone(),
            camera: self.camera.clone(),
            store: self.backend.clone(),
            recognizer: self.backend.clone(),
            recorder: self.backend.clone(),
            contacts: self.backend.clone(),
            reporter: Arc::new(JournalReporter::new(self.db.clone())),
            handoff: Some(self.handoff.clone()),
        }
    }

    pub async fn open_capture(&self, day_number: u8) -> Result<CaptureController, CaptureError> {
        CaptureController::open(self.deps(), day_number).await
    }
}
