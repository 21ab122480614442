use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::FINAL_CHALLENGE_DAY;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum WeighInSource {
    Recognized,
    Manual,
}

impl WeighInSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeighInSource::Recognized => "recognized",
            WeighInSource::Manual => "manual",
        }
    }
}

/// Outcome of a completed capture session. Never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeighInResult {
    pub weight_value: f64,
    pub day_number: u8,
    pub source: WeighInSource,
    /// Whether this day had no weigh-in recorded before this session.
    pub is_new_day: bool,
    pub badge_earned: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl WeighInResult {
    /// The final challenge day recorded for the first time.
    pub fn completes_challenge(&self) -> bool {
        self.day_number == FINAL_CHALLENGE_DAY && self.is_new_day
    }
}
