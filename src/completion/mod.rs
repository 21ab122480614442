pub mod contact;
pub mod gate;

pub use contact::{normalize_phone, ContactError, ContactForm, PhoneError, CONTACT_ENDPOINT};
pub use gate::{CompletionGate, GateDecision, GateError, GateSnapshot, GateState};
