use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::transfer::RetryPolicy;

/// Day of the challenge that can trigger the contact prompt.
pub const FINAL_CHALLENGE_DAY: u8 = 7;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CameraConfig {
    pub preferred_width: u32,
    pub preferred_height: u32,
    /// `environment` is the rear-facing camera on phones.
    pub facing_mode: String,
    /// Upper bound on the platform's open call, e.g. a permission prompt left unanswered.
    pub acquire_timeout_ms: u64,
    pub ready_watchdog_ms: u64,
    pub still_jpeg_quality: u8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            preferred_width: 1920,
            preferred_height: 1080,
            facing_mode: "environment".into(),
            acquire_timeout_ms: 15_000,
            ready_watchdog_ms: 3_000,
            still_jpeg_quality: 92,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageConfig {
    pub max_file_bytes: usize,
    pub max_edge_px: u32,
    pub jpeg_quality: u8,
    /// Images already under this size and within `max_edge_px` are sent untouched.
    pub target_bytes: usize,
    pub prepare_budget_ms: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
            max_edge_px: 2048,
            jpeg_quality: 85,
            target_bytes: 1_000_000,
            prepare_budget_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WeightRange {
    pub min: f64,
    pub max: f64,
}

impl Default for WeightRange {
    fn default() -> Self {
        Self {
            min: 30.0,
            max: 300.0,
        }
    }
}

impl WeightRange {
    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactFormat {
    pub country_prefix: String,
    pub digits: usize,
}

impl Default for ContactFormat {
    fn default() -> Self {
        Self {
            country_prefix: "+66".into(),
            digits: 9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConfig {
    pub upload_timeout_ms: u64,
    pub recognition_timeout_ms: u64,
    pub record_timeout_ms: u64,
    pub contact_timeout_ms: u64,
    pub retry: RetryPolicy,
    /// Recognition resubmissions allowed per image before only manual entry remains.
    pub max_recognition_retries: u8,
    pub camera: CameraConfig,
    pub image: ImageConfig,
    pub weight: WeightRange,
    pub contact: ContactFormat,
    pub debug: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            upload_timeout_ms: 30_000,
            recognition_timeout_ms: 45_000,
            record_timeout_ms: 15_000,
            contact_timeout_ms: 15_000,
            retry: RetryPolicy::default(),
            max_recognition_retries: 3,
            camera: CameraConfig::default(),
            image: ImageConfig::default(),
            weight: WeightRange::default(),
            contact: ContactFormat::default(),
            debug: false,
        }
    }
}

impl CaptureConfig {
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    pub fn recognition_timeout(&self) -> Duration {
        Duration::from_millis(self.recognition_timeout_ms)
    }

    pub fn record_timeout(&self) -> Duration {
        Duration::from_millis(self.record_timeout_ms)
    }

    pub fn contact_timeout(&self) -> Duration {
        Duration::from_millis(self.contact_timeout_ms)
    }

    pub fn camera_watchdog(&self) -> Duration {
        Duration::from_millis(self.camera.ready_watchdog_ms)
    }

    pub fn prepare_budget(&self) -> Duration {
        Duration::from_millis(self.image.prepare_budget_ms)
    }

    /// Apply `WEIGHIN_*` overrides. Unparsable values are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("WEIGHIN_DEBUG") {
            self.debug = value == "1" || value.eq_ignore_ascii_case("true");
        }
        override_u64(&lookup, "WEIGHIN_UPLOAD_TIMEOUT_MS", &mut self.upload_timeout_ms);
        override_u64(
            &lookup,
            "WEIGHIN_RECOGNITION_TIMEOUT_MS",
            &mut self.recognition_timeout_ms,
        );
        if let Some(raw) = lookup("WEIGHIN_MAX_RETRIES") {
            match raw.trim().parse::<u32>() {
                Ok(value) => self.retry.max_retries = value,
                Err(_) => log::warn!("Ignoring WEIGHIN_MAX_RETRIES={raw:?}: not a number"),
            }
        }
    }
}

fn override_u64<F>(lookup: &F, key: &str, target: &mut u64)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<u64>() {
            Ok(value) => *target = value,
            Err(_) => log::warn!("Ignoring {key}={raw:?}: not a number"),
        }
    }
}

/// JSON-backed configuration with environment overrides layered on load.
pub struct ConfigStore {
    path: PathBuf,
    data: RwLock<CaptureConfig>,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read capture config from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("Capture config at {} is invalid ({err}); using defaults", path.display());
                CaptureConfig::default()
            })
        } else {
            CaptureConfig::default()
        };
        data.apply_overrides(|key| std::env::var(key).ok());

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn config(&self) -> CaptureConfig {
        self.read().clone()
    }

    pub fn update(&self, config: CaptureConfig) -> Result<()> {
        let mut guard = self.write();
        *guard = config;
        self.persist(&guard)
    }

    fn persist(&self, data: &CaptureConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write capture config to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, CaptureConfig> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CaptureConfig> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("capture.json")).unwrap();
        let config = store.config();
        assert_eq!(config.image.max_file_bytes, 10 * 1024 * 1024);
        assert_eq!(config.weight, WeightRange { min: 30.0, max: 300.0 });
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn update_is_persisted_and_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("capture.json");
        let store = ConfigStore::new(path.clone()).unwrap();

        let mut config = store.config();
        config.upload_timeout_ms = 12_345;
        config.contact.digits = 10;
        store.update(config).unwrap();

        let reloaded = ConfigStore::new(path).unwrap().config();
        assert_eq!(reloaded.upload_timeout_ms, 12_345);
        assert_eq!(reloaded.contact.digits, 10);
    }

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.json");
        fs::write(&path, r#"{"camera":{"readyWatchdogMs":500}}"#).unwrap();

        let config = ConfigStore::new(path).unwrap().config();
        assert_eq!(config.camera.ready_watchdog_ms, 500);
        assert_eq!(config.camera.facing_mode, "environment");
        assert_eq!(config.recognition_timeout_ms, 45_000);
    }

    #[test]
    fn overrides_apply_and_bad_values_are_ignored() {
        let mut config = CaptureConfig::default();
        config.apply_overrides(|key| match key {
            "WEIGHIN_UPLOAD_TIMEOUT_MS" => Some("2500".into()),
            "WEIGHIN_MAX_RETRIES" => Some("five".into()),
            "WEIGHIN_DEBUG" => Some("TRUE".into()),
            _ => None,
        });
        assert_eq!(config.upload_timeout_ms, 2_500);
        assert_eq!(config.retry.max_retries, 3);
        assert!(config.debug);
    }

    #[test]
    fn weight_range_rejects_non_finite() {
        let range = WeightRange::default();
        assert!(range.contains(30.0));
        assert!(range.contains(300.0));
        assert!(!range.contains(29.99));
        assert!(!range.contains(f64::NAN));
    }
}
