pub mod controller;
pub mod error;
pub mod policy;

pub use controller::{RetryNotice, TransferController, TransferRequest};
pub use error::{TransferError, TransportError};
pub use policy::RetryPolicy;
