use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

/// Badge earned by the weigh-in, picked up by the screen shown after the flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BadgeHandoff {
    pub badge: String,
    pub day_number: u8,
    pub earned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HandoffData {
    pending_badge: Option<BadgeHandoff>,
}

pub struct HandoffStore {
    path: PathBuf,
    data: RwLock<HandoffData>,
}

impl HandoffStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read handoff from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            HandoffData::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn peek_badge(&self) -> Option<BadgeHandoff> {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pending_badge
            .clone()
    }

    /// Replace any badge not yet picked up.
    pub fn put_badge(&self, handoff: BadgeHandoff) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.pending_badge = Some(handoff);
        self.persist(&guard)
    }

    /// Read and clear the pending badge.
    pub fn take_badge(&self) -> Result<Option<BadgeHandoff>> {
        let mut guard = self
            .data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let taken = guard.pending_badge.take();
        if taken.is_some() {
            self.persist(&guard)?;
        }
        Ok(taken)
    }

    fn persist(&self, data: &HandoffData) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write handoff to {}", self.path.display()))
    }
}
