pub mod controller;
pub mod events;
pub mod state;

pub use controller::{CaptureController, CaptureDeps, CaptureError, ConfirmOutcome};
pub use events::CaptureEvent;
pub use state::{CaptureSnapshot, CaptureState, CaptureStatus};
