use serde::Serialize;
use thiserror::Error;

use crate::models::WeighInResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GateState {
    NotAsked,
    Pending,
    Submitted,
    Skipped,
    Done,
}

impl GateState {
    pub fn is_resolved(self) -> bool {
        matches!(self, GateState::Submitted | GateState::Skipped | GateState::Done)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Show the contact prompt before concluding.
    Prompt,
    Conclude,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot {action} while the contact prompt is {from:?}")]
pub struct GateError {
    pub from: GateState,
    pub action: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GateSnapshot {
    pub state: GateState,
    pub confirming_skip: bool,
    pub submitting: bool,
    pub error: Option<String>,
}

/// Holds the one-time contact prompt shown after the final challenge day.
///
/// Once the prompt has been resolved (submitted or skipped) it is never
/// shown again for the lifetime of the gate.
#[derive(Debug, Clone)]
pub struct CompletionGate {
    state: GateState,
    confirming_skip: bool,
    submitting: bool,
    error: Option<String>,
}

impl Default for CompletionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionGate {
    pub fn new() -> Self {
        Self {
            state: GateState::NotAsked,
            confirming_skip: false,
            submitting: false,
            error: None,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn is_prompt_open(&self) -> bool {
        self.state == GateState::Pending
    }

    pub fn snapshot(&self) -> GateSnapshot {
        GateSnapshot {
            state: self.state,
            confirming_skip: self.confirming_skip,
            submitting: self.submitting,
            error: self.error.clone(),
        }
    }

    /// Decide whether a successful weigh-in needs the contact prompt.
    pub fn evaluate(&mut self, result: &WeighInResult) -> GateDecision {
        match self.state {
            GateState::NotAsked if result.completes_challenge() => {
                self.state = GateState::Pending;
                GateDecision::Prompt
            }
            GateState::Pending => GateDecision::Prompt,
            _ => GateDecision::Conclude,
        }
    }

    /// Closing the prompt or pressing skip asks for confirmation first.
    pub fn request_skip(&mut self) -> Result<(), GateError> {
        self.require_form("skip")?;
        self.confirming_skip = true;
        Ok(())
    }

    pub fn dismiss(&mut self) -> Result<(), GateError> {
        self.request_skip().map_err(|err| GateError {
            action: "dismiss",
            ..err
        })
    }

    pub fn return_to_form(&mut self) -> Result<(), GateError> {
        if self.state != GateState::Pending || !self.confirming_skip {
            return Err(self.invalid("return to the form"));
        }
        self.confirming_skip = false;
        Ok(())
    }

    pub fn confirm_skip(&mut self) -> Result<(), GateError> {
        if self.state != GateState::Pending || !self.confirming_skip || self.submitting {
            return Err(self.invalid("confirm skip"));
        }
        self.confirming_skip = false;
        self.error = None;
        self.state = GateState::Skipped;
        Ok(())
    }

    /// Mark a submission in flight. Rejects a second concurrent submit.
    pub fn begin_submit(&mut self) -> Result<(), GateError> {
        self.require_form("submit")?;
        self.submitting = true;
        self.error = None;
        Ok(())
    }

    pub fn submission_succeeded(&mut self) {
        if self.state == GateState::Pending {
            self.state = GateState::Submitted;
        }
        self.submitting = false;
        self.error = None;
    }

    /// Keep the form open with `message` shown beneath it.
    pub fn submission_failed(&mut self, message: impl Into<String>) {
        self.submitting = false;
        if self.state == GateState::Pending {
            self.error = Some(message.into());
        }
    }

    /// Abandon an in-flight submission without an error (e.g. flow exited).
    pub fn submission_abandoned(&mut self) {
        self.submitting = false;
    }

    /// Finish the gate once the result has been handed off. A gate that was
    /// never asked stays not-asked.
    pub fn conclude(&mut self) -> Result<(), GateError> {
        match self.state {
            GateState::Pending => Err(self.invalid("conclude")),
            GateState::NotAsked => Ok(()),
            _ => {
                self.state = GateState::Done;
                Ok(())
            }
        }
    }

    fn require_form(&self, action: &'static str) -> Result<(), GateError> {
        if self.state != GateState::Pending || self.confirming_skip || self.submitting {
            return Err(self.invalid(action));
        }
        Ok(())
    }

    fn invalid(&self, action: &'static str) -> GateError {
        GateError {
            from: self.state,
            action,
        }
    }
}
