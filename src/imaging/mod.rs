pub mod prepare;

pub use prepare::{ImagePreparer, PrepareError};
