use serde::Serialize;

use crate::completion::GateState;
use crate::models::WeighInResult;
use crate::recognition::PipelineStage;

use super::CaptureSnapshot;

/// Published on the controller's broadcast channel for the UI layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CaptureEvent {
    #[serde(rename_all = "camelCase")]
    StateChanged { snapshot: CaptureSnapshot },
    /// "Retrying… attempt 2/3" while a network stage backs off.
    #[serde(rename_all = "camelCase")]
    RetryProgress { stage: PipelineStage, label: String },
    #[serde(rename_all = "camelCase")]
    ContactPrompt { day_number: u8 },
    /// The flow is over; the next screen may read the badge handoff.
    #[serde(rename_all = "camelCase")]
    Concluded {
        result: WeighInResult,
        gate: GateState,
    },
}

impl CaptureEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CaptureEvent::StateChanged { .. } => "capture-state-changed",
            CaptureEvent::RetryProgress { .. } => "capture-retry-progress",
            CaptureEvent::ContactPrompt { .. } => "capture-contact-prompt",
            CaptureEvent::Concluded { .. } => "capture-concluded",
        }
    }
}
